//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

/// Identifier of a stored product.
pub type ProductId = i64;

/// Identifier of a registered user.
pub type UserId = i64;

/// Permitted product lifetimes, in days.
pub const PERMITTED_EXPIRY_DAYS: [i32; 3] = [1, 7, 365];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl ProductRecord {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: OffsetDateTime,
}

/// Stored login material for a user. Never leaves the persistence/application boundary.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: UserId,
    pub hashed_password: String,
}
