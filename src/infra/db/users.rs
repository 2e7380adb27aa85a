use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateUserParams, RepoError, UsersRepo},
    domain::entities::{UserCredentials, UserId, UserRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    created_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    id: i64,
    hashed_password: String,
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn insert_user(&self, params: CreateUserParams) -> Result<UserId, RepoError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (name, email, hashed_password, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING id
            "#,
        )
        .bind(&params.name)
        .bind(&params.email)
        .bind(&params.hashed_password)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|row| UserCredentials {
            id: row.id,
            hashed_password: row.hashed_password,
        }))
    }

    async fn find_password_hash(&self, id: UserId) -> Result<Option<String>, RepoError> {
        sqlx::query_scalar("SELECT hashed_password FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_user(&self, id: UserId) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(UserRecord::from).ok_or(RepoError::NotFound)
    }

    async fn user_exists(&self, id: UserId) -> Result<bool, RepoError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn update_password(
        &self,
        id: UserId,
        hashed_password: String,
    ) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE users SET hashed_password = $2 WHERE id = $1")
            .bind(id)
            .bind(&hashed_password)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
