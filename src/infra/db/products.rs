use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateProductParams, ProductsRepo, RepoError},
    domain::entities::{ProductId, ProductRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    title: String,
    content: String,
    created_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

#[async_trait]
impl ProductsRepo for PostgresRepositories {
    async fn insert_product(&self, params: CreateProductParams) -> Result<ProductId, RepoError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (title, content, created_at, expires_at)
            VALUES ($1, $2, now(), now() + make_interval(days => $3))
            RETURNING id
            "#,
        )
        .bind(&params.title)
        .bind(&params.content)
        .bind(params.expires_days)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn find_product(&self, id: ProductId) -> Result<ProductRecord, RepoError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, title, content, created_at, expires_at
            FROM products
            WHERE id = $1 AND expires_at > now()
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(ProductRecord::from).ok_or(RepoError::NotFound)
    }

    async fn latest_products(&self, limit: u32) -> Result<Vec<ProductRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, title, content, created_at, expires_at
            FROM products
            WHERE expires_at > now()
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }
}
