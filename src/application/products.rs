//! Product listing queries and creation.

use std::sync::Arc;

use crate::application::repos::{
    CreateProductParams, LATEST_PRODUCTS_LIMIT, ProductsRepo, RepoError,
};
use crate::domain::entities::{ProductId, ProductRecord};

#[derive(Clone)]
pub struct ProductService {
    repo: Arc<dyn ProductsRepo>,
}

impl ProductService {
    pub fn new(repo: Arc<dyn ProductsRepo>) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        title: String,
        content: String,
        expires_days: i32,
    ) -> Result<ProductId, RepoError> {
        self.repo
            .insert_product(CreateProductParams {
                title,
                content,
                expires_days,
            })
            .await
    }

    pub async fn find(&self, id: ProductId) -> Result<ProductRecord, RepoError> {
        self.repo.find_product(id).await
    }

    pub async fn latest(&self) -> Result<Vec<ProductRecord>, RepoError> {
        self.repo.latest_products(LATEST_PRODUCTS_LIMIT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryRepositories;

    #[tokio::test]
    async fn latest_is_newest_first_and_capped() {
        let products = ProductService::new(Arc::new(MemoryRepositories::new()));
        for n in 0..12 {
            products
                .create(format!("Item {n}"), "content".into(), 7)
                .await
                .expect("inserted");
        }

        let latest = products.latest().await.expect("listed");
        assert_eq!(latest.len(), LATEST_PRODUCTS_LIMIT as usize);
        assert_eq!(latest[0].title, "Item 11");
        assert!(latest.windows(2).all(|pair| pair[0].id > pair[1].id));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let products = ProductService::new(Arc::new(MemoryRepositories::new()));
        let err = products.find(999_999).await.expect_err("missing");
        assert!(matches!(err, RepoError::NotFound));
    }
}
