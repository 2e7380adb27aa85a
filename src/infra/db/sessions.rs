//! Postgres session store. Tokens are stored as SHA-256 digests so a leaked
//! table cannot be replayed as cookies.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{postgres::PgPool, types::Json};
use time::OffsetDateTime;

use crate::application::session::{SessionData, SessionError, SessionRecord, SessionStore};

#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    data: Json<SessionData>,
    expiry: OffsetDateTime,
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn find(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT data, expiry FROM sessions WHERE token_hash = $1",
        )
        .bind(digest(token))
        .fetch_optional(&self.pool)
        .await
        .map_err(SessionError::store)?;

        Ok(row.map(|row| SessionRecord {
            data: row.data.0,
            expires_at: row.expiry,
        }))
    }

    async fn commit(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, data, expiry)
            VALUES ($1, $2, $3)
            ON CONFLICT (token_hash)
            DO UPDATE SET data = EXCLUDED.data, expiry = EXCLUDED.expiry
            "#,
        )
        .bind(digest(token))
        .bind(Json(&record.data))
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(SessionError::store)?;
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(digest(token))
            .execute(&self.pool)
            .await
            .map_err(SessionError::store)?;
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiry <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(SessionError::store)?;
        Ok(result.rows_affected())
    }
}
