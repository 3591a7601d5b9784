//! Registry of session tokens that were revoked before their natural expiry.
//!
//! Entries are keyed by the hex SHA-256 of the raw token, so the registry never
//! holds a usable credential. An entry only needs to live until the token's own
//! `exp`; after that the signature check rejects the token anyway and the entry
//! can be pruned.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
pub trait RevocationRegistry: Send + Sync {
    /// Marks `token` revoked until `expires_at`. Revoking twice is a no-op.
    async fn revoke(&self, token: &str, expires_at: OffsetDateTime) -> anyhow::Result<()>;
    async fn is_revoked(&self, token: &str) -> anyhow::Result<bool>;
    /// Drops entries whose token expired at or before `now`. Returns how many went.
    async fn prune_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

#[derive(Default)]
pub struct MemoryRevocationRegistry {
    entries: RwLock<HashMap<String, OffsetDateTime>>,
}

impl MemoryRevocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl RevocationRegistry for MemoryRevocationRegistry {
    async fn revoke(&self, token: &str, expires_at: OffsetDateTime) -> anyhow::Result<()> {
        let key = fingerprint(token);
        self.entries.write().entry(key).or_insert(expires_at);
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> anyhow::Result<bool> {
        let key = fingerprint(token);
        Ok(self.entries.read().contains_key(&key))
    }

    async fn prune_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

/// Postgres-backed registry; see `migrations/0002_create_revoked_tokens.sql`.
#[derive(Clone)]
pub struct PgRevocationRegistry {
    db: PgPool,
}

impl PgRevocationRegistry {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RevocationRegistry for PgRevocationRegistry {
    async fn revoke(&self, token: &str, expires_at: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_hash, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(fingerprint(token))
        .bind(expires_at)
        .execute(&self.db)
        .await
        .context("insert revoked token")?;
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> anyhow::Result<bool> {
        let revoked: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE token_hash = $1)"#,
        )
        .bind(fingerprint(token))
        .fetch_one(&self.db)
        .await
        .context("lookup revoked token")?;
        Ok(revoked)
    }

    async fn prune_expired(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        let res = sqlx::query(r#"DELETE FROM revoked_tokens WHERE expires_at <= $1"#)
            .bind(now)
            .execute(&self.db)
            .await
            .context("prune revoked tokens")?;
        Ok(res.rows_affected())
    }
}

pub fn spawn_pruner(
    registry: Arc<dyn RevocationRegistry>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match registry.prune_expired(OffsetDateTime::now_utc()).await {
                Ok(0) => debug!("no expired revocations to prune"),
                Ok(n) => info!(pruned = n, "pruned expired revocations"),
                Err(e) => warn!(error = %e, "revocation prune failed"),
            }
        }
    })
}
