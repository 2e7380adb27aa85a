//! In-process repositories used when no database is configured and in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::{
    application::repos::{
        CreateProductParams, CreateUserParams, ProductsRepo, RepoError, UsersRepo,
    },
    domain::entities::{ProductId, ProductRecord, UserCredentials, UserId, UserRecord},
};

#[derive(Debug, Clone)]
struct StoredUser {
    record: UserRecord,
    hashed_password: String,
}

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<ProductId, ProductRecord>,
    users: BTreeMap<UserId, StoredUser>,
    next_product_id: ProductId,
    next_user_id: UserId,
}

#[derive(Debug, Default)]
pub struct MemoryRepositories {
    tables: RwLock<Tables>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a product with explicit timestamps, bypassing the expiry rules.
    pub async fn seed_product(&self, record: ProductRecord) -> ProductId {
        let mut tables = self.tables.write().await;
        let id = record.id;
        tables.next_product_id = tables.next_product_id.max(id);
        tables.products.insert(id, record);
        id
    }
}

#[async_trait]
impl ProductsRepo for MemoryRepositories {
    async fn insert_product(&self, params: CreateProductParams) -> Result<ProductId, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.write().await;
        tables.next_product_id += 1;
        let id = tables.next_product_id;
        tables.products.insert(
            id,
            ProductRecord {
                id,
                title: params.title,
                content: params.content,
                created_at: now,
                expires_at: now + Duration::days(i64::from(params.expires_days)),
            },
        );
        Ok(id)
    }

    async fn find_product(&self, id: ProductId) -> Result<ProductRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let tables = self.tables.read().await;
        tables
            .products
            .get(&id)
            .filter(|product| !product.is_expired(now))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn latest_products(&self, limit: u32) -> Result<Vec<ProductRecord>, RepoError> {
        let now = OffsetDateTime::now_utc();
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .rev()
            .filter(|product| !product.is_expired(now))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UsersRepo for MemoryRepositories {
    async fn insert_user(&self, params: CreateUserParams) -> Result<UserId, RepoError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|user| user.record.email == params.email)
        {
            return Err(RepoError::Duplicate {
                constraint: "users_uc_email".to_string(),
            });
        }

        tables.next_user_id += 1;
        let id = tables.next_user_id;
        tables.users.insert(
            id,
            StoredUser {
                record: UserRecord {
                    id,
                    name: params.name,
                    email: params.email,
                    created_at: OffsetDateTime::now_utc(),
                },
                hashed_password: params.hashed_password,
            },
        );
        Ok(id)
    }

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.record.email == email)
            .map(|user| UserCredentials {
                id: user.record.id,
                hashed_password: user.hashed_password.clone(),
            }))
    }

    async fn find_password_hash(&self, id: UserId) -> Result<Option<String>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).map(|user| user.hashed_password.clone()))
    }

    async fn find_user(&self, id: UserId) -> Result<UserRecord, RepoError> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(&id)
            .map(|user| user.record.clone())
            .ok_or(RepoError::NotFound)
    }

    async fn user_exists(&self, id: UserId) -> Result<bool, RepoError> {
        Ok(self.tables.read().await.users.contains_key(&id))
    }

    async fn update_password(
        &self,
        id: UserId,
        hashed_password: String,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        user.hashed_password = hashed_password;
        Ok(())
    }
}
