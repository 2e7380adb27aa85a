//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{ProductId, ProductRecord, UserCredentials, UserId, UserRecord};

/// Number of products shown on the home page.
pub const LATEST_PRODUCTS_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateProductParams {
    pub title: String,
    pub content: String,
    pub expires_days: i32,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub name: String,
    pub email: String,
    pub hashed_password: String,
}

#[async_trait]
pub trait ProductsRepo: Send + Sync {
    async fn insert_product(&self, params: CreateProductParams) -> Result<ProductId, RepoError>;

    /// Unexpired product by id; `RepoError::NotFound` otherwise.
    async fn find_product(&self, id: ProductId) -> Result<ProductRecord, RepoError>;

    /// Unexpired products, newest first.
    async fn latest_products(&self, limit: u32) -> Result<Vec<ProductRecord>, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    /// Fails with `RepoError::Duplicate` when the email is taken.
    async fn insert_user(&self, params: CreateUserParams) -> Result<UserId, RepoError>;

    async fn find_credentials(&self, email: &str) -> Result<Option<UserCredentials>, RepoError>;

    async fn find_password_hash(&self, id: UserId) -> Result<Option<String>, RepoError>;

    async fn find_user(&self, id: UserId) -> Result<UserRecord, RepoError>;

    async fn user_exists(&self, id: UserId) -> Result<bool, RepoError>;

    async fn update_password(&self, id: UserId, hashed_password: String)
    -> Result<(), RepoError>;
}
