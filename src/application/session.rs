//! Server-side sessions keyed by an opaque, client-held token.
//!
//! A [`Session`] is the request-scoped handle the pipeline hands to the auth
//! gate and to handlers. Reads and writes only touch the handle; the
//! [`SessionManager`] persists the outcome once the response is ready, minting
//! a fresh token whenever the session was renewed (or is new) and deleting the
//! superseded one so it can never be replayed.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

/// Session key holding the id of the signed-in user.
pub const AUTHENTICATED_USER_ID: &str = "authenticated_user_id";
/// One-shot message shown on the next rendered page.
pub const FLASH: &str = "flash";
/// Token every state-changing form must echo back.
pub const CSRF_TOKEN: &str = "csrf_token";
/// Path a signed-out visitor asked for before being sent to the login page.
pub const REDIRECT_AFTER_LOGIN: &str = "redirect_after_login";

pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);

pub type SessionData = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub data: SessionData,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Store(String),
    #[error("session value `{key}` could not be encoded: {message}")]
    Encode { key: String, message: String },
}

impl SessionError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

/// Backing storage for session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, token: &str) -> Result<Option<SessionRecord>, SessionError>;

    async fn commit(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError>;

    async fn delete(&self, token: &str) -> Result<(), SessionError>;

    /// Purge records whose expiry is at or before `now`; returns how many were removed.
    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, SessionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unmodified,
    Modified,
    Destroyed,
}

#[derive(Debug)]
struct SessionState {
    token: Option<String>,
    superseded: Option<String>,
    data: SessionData,
    status: Status,
}

/// Request-scoped session handle. Clones share the same state.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    fn new(token: Option<String>, data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                token,
                superseded: None,
                data,
                status: Status::Unmodified,
            })),
        }
    }

    /// An empty session without a token; a token is minted on first commit.
    pub fn fresh() -> Self {
        Self::new(None, SessionData::new())
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current token, `None` until the session has been persisted once.
    pub fn token(&self) -> Option<String> {
        self.state().token.clone()
    }

    /// Typed read. A value of the wrong shape reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.state().data.get(key).cloned()?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(target = "bestdeal::sessions", key, error = %err, "undecodable session value");
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().data.contains_key(key)
    }

    pub fn put<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let encoded = serde_json::to_value(value).map_err(|err| SessionError::Encode {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        let mut state = self.state();
        state.data.insert(key.to_string(), encoded);
        if state.status != Status::Destroyed {
            state.status = Status::Modified;
        }
        Ok(())
    }

    /// Read and remove in one step.
    pub fn pop<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = {
            let mut state = self.state();
            let value = state.data.remove(key)?;
            if state.status != Status::Destroyed {
                state.status = Status::Modified;
            }
            value
        };
        serde_json::from_value(value).ok()
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.state();
        if state.data.remove(key).is_some() && state.status != Status::Destroyed {
            state.status = Status::Modified;
        }
    }

    /// Retire the current token; the data carries over under a new one.
    ///
    /// Call after every privilege change (login, logout).
    pub fn renew_token(&self) {
        let mut state = self.state();
        if let Some(current) = state.token.take() {
            state.superseded.get_or_insert(current);
        }
        state.status = Status::Modified;
    }

    pub fn destroy(&self) {
        let mut state = self.state();
        state.data.clear();
        state.status = Status::Destroyed;
    }
}

/// What the pipeline must tell the client after a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing changed; no cookie needs to be written.
    Unchanged,
    /// The session was stored under `token` for `lifetime`.
    Saved { token: String, lifetime: Duration },
    /// The client-side cookie must be cleared.
    Destroyed,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    lifetime: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, lifetime: Duration) -> Self {
        Self { store, lifetime }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Resolve the handle for `token`, falling back to a fresh session when the
    /// token is absent, unknown or expired.
    pub async fn load(&self, token: Option<&str>) -> Result<Session, SessionError> {
        let Some(token) = token.filter(|value| !value.is_empty()) else {
            return Ok(Session::fresh());
        };

        match self.store.find(token).await? {
            Some(record) if record.expires_at > OffsetDateTime::now_utc() => {
                Ok(Session::new(Some(token.to_string()), record.data))
            }
            Some(_) => {
                debug!(target = "bestdeal::sessions", "expired session presented");
                self.store.delete(token).await?;
                Ok(Session::fresh())
            }
            None => Ok(Session::fresh()),
        }
    }

    pub async fn commit(&self, session: &Session) -> Result<CommitOutcome, SessionError> {
        let (status, token, superseded, data) = {
            let mut state = session.state();
            (
                state.status,
                state.token.clone(),
                state.superseded.take(),
                state.data.clone(),
            )
        };

        if let Some(old) = superseded.as_deref() {
            self.store.delete(old).await?;
        }

        match status {
            Status::Unmodified => Ok(CommitOutcome::Unchanged),
            Status::Destroyed => {
                if let Some(token) = token.as_deref() {
                    self.store.delete(token).await?;
                }
                session.state().token = None;
                Ok(CommitOutcome::Destroyed)
            }
            Status::Modified => {
                let token = token.unwrap_or_else(generate_token);
                let record = SessionRecord {
                    data,
                    expires_at: OffsetDateTime::now_utc() + self.lifetime,
                };
                self.store.commit(&token, &record).await?;

                let mut state = session.state();
                state.token = Some(token.clone());
                state.status = Status::Unmodified;

                Ok(CommitOutcome::Saved {
                    token,
                    lifetime: self.lifetime,
                })
            }
        }
    }
}

pub(crate) fn generate_token() -> String {
    let mut raw = [0u8; 32];
    raw[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    raw[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(raw)
}
