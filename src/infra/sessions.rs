//! In-process session store and the background purge of expired records.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::session::{SessionError, SessionRecord, SessionStore};

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: DashMap<String, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.records.get(token).map(|entry| entry.value().clone()))
    }

    async fn commit(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError> {
        self.records.insert(token.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        self.records.remove(token);
        Ok(())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<u64, SessionError> {
        let before = self.records.len();
        self.records.retain(|_, record| record.expires_at > now);
        Ok((before - self.records.len()) as u64)
    }
}

/// Periodically purge expired sessions until the runtime shuts down.
pub fn spawn_session_cleanup(store: Arc<dyn SessionStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.delete_expired(OffsetDateTime::now_utc()).await {
                Ok(0) => {}
                Ok(removed) => {
                    debug!(target = "bestdeal::sessions", removed, "purged expired sessions")
                }
                Err(err) => {
                    warn!(target = "bestdeal::sessions", error = %err, "session purge failed")
                }
            }
        }
    })
}
