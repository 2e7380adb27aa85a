//! Account registration, authentication and password management.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::error::HttpError;
use crate::application::repos::{CreateUserParams, RepoError, UsersRepo};
use crate::domain::entities::{UserId, UserRecord};

const MIN_HASH_COST: u32 = 4;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("email address is already registered")]
    DuplicateEmail,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user not found")]
    NotFound,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for AccountError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::NotFound => AccountError::NotFound,
            other => AccountError::Repo(other),
        }
    }
}

impl From<AccountError> for HttpError {
    fn from(error: AccountError) -> Self {
        match error {
            AccountError::NotFound => HttpError::not_found("application::accounts"),
            other => HttpError::server_fault("application::accounts", &other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterCommand {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct AccountService {
    repo: Arc<dyn UsersRepo>,
    hash_cost: u32,
}

impl AccountService {
    pub fn new(repo: Arc<dyn UsersRepo>) -> Self {
        Self {
            repo,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt work factor (minimum 4).
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost.max(MIN_HASH_COST);
        self
    }

    pub async fn register(&self, command: RegisterCommand) -> Result<UserId, AccountError> {
        let hashed_password = self.hash_password(command.password).await?;
        let params = CreateUserParams {
            name: command.name,
            email: command.email,
            hashed_password,
        };

        match self.repo.insert_user(params).await {
            Ok(id) => Ok(id),
            Err(RepoError::Duplicate { .. }) => Err(AccountError::DuplicateEmail),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<UserId, AccountError> {
        let Some(credentials) = self.repo.find_credentials(email).await? else {
            debug!(target = "bestdeal::accounts", "login for unknown email");
            return Err(AccountError::InvalidCredentials);
        };

        if self
            .verify_password(password.to_string(), credentials.hashed_password)
            .await?
        {
            Ok(credentials.id)
        } else {
            Err(AccountError::InvalidCredentials)
        }
    }

    pub async fn exists(&self, id: UserId) -> Result<bool, AccountError> {
        Ok(self.repo.user_exists(id).await?)
    }

    pub async fn find(&self, id: UserId) -> Result<UserRecord, AccountError> {
        Ok(self.repo.find_user(id).await?)
    }

    pub async fn change_password(
        &self,
        id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AccountError> {
        let stored = self
            .repo
            .find_password_hash(id)
            .await?
            .ok_or(AccountError::NotFound)?;

        if !self
            .verify_password(current_password.to_string(), stored)
            .await?
        {
            return Err(AccountError::InvalidCredentials);
        }

        let hashed = self.hash_password(new_password.to_string()).await?;
        self.repo.update_password(id, hashed).await?;
        Ok(())
    }

    async fn hash_password(&self, password: String) -> Result<String, AccountError> {
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|err| AccountError::Hashing(err.to_string()))?
            .map_err(|err| AccountError::Hashing(err.to_string()))
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, AccountError> {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|err| AccountError::Hashing(err.to_string()))?
            .map_err(|err| AccountError::Hashing(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryRepositories;

    fn service() -> AccountService {
        AccountService::new(Arc::new(MemoryRepositories::new())).with_hash_cost(4)
    }

    fn alice() -> RegisterCommand {
        RegisterCommand {
            name: "Alice".into(),
            email: "alice@example.com".into(),
            password: "correct horse".into(),
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let accounts = service();
        let id = accounts.register(alice()).await.expect("registered");

        let authenticated = accounts
            .authenticate("alice@example.com", "correct horse")
            .await
            .expect("authenticated");
        assert_eq!(authenticated, id);
        assert!(accounts.exists(id).await.expect("lookup"));
    }

    #[tokio::test]
    async fn duplicate_email_is_reported() {
        let accounts = service();
        accounts.register(alice()).await.expect("registered");
        let err = accounts.register(alice()).await.expect_err("duplicate");
        assert!(matches!(err, AccountError::DuplicateEmail));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let accounts = service();
        accounts.register(alice()).await.expect("registered");

        let wrong = accounts
            .authenticate("alice@example.com", "battery staple")
            .await
            .expect_err("wrong password");
        let unknown = accounts
            .authenticate("bob@example.com", "correct horse")
            .await
            .expect_err("unknown email");

        assert!(matches!(wrong, AccountError::InvalidCredentials));
        assert!(matches!(unknown, AccountError::InvalidCredentials));
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let accounts = service();
        let id = accounts.register(alice()).await.expect("registered");

        let err = accounts
            .change_password(id, "not it", "new secret value")
            .await
            .expect_err("rejected");
        assert!(matches!(err, AccountError::InvalidCredentials));

        accounts
            .change_password(id, "correct horse", "new secret value")
            .await
            .expect("changed");
        accounts
            .authenticate("alice@example.com", "new secret value")
            .await
            .expect("new password works");
    }
}
