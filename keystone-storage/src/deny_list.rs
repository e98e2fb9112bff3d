//! Token deny list.
//!
//! Revoked tokens are recorded as existence-only keys
//! (`token:blacklist:<token>`) that expire when the token itself would
//! have. The gate [`DenyListGuard::is_denied`] fails closed: if the cache
//! cannot answer, the token is treated as revoked.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keystone_core::CacheError;

use crate::cache::{deny_list_key, CacheResult, CacheStore};

/// Value stored under deny-list keys. Only presence matters.
const DENIED_MARKER: &[u8] = b"1";

/// Existence-only revocation list for bearer tokens.
pub struct DenyListGuard<C: ?Sized> {
    cache: Arc<C>,
    timeout: Duration,
}

impl<C: CacheStore + ?Sized> DenyListGuard<C> {
    pub fn new(cache: Arc<C>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Deny `token` for its remaining lifetime.
    ///
    /// A zero lifetime is a no-op: the token is already dead.
    pub async fn add(&self, token: &str, remaining: Duration) -> CacheResult<()> {
        if remaining.is_zero() {
            tracing::debug!("Token already expired, not adding to deny list");
            return Ok(());
        }
        let key = deny_list_key(token);
        self.bounded("set", self.cache.set(&key, DENIED_MARKER, Some(remaining)))
            .await
    }

    /// Deny `token` until its absolute expiry time.
    pub async fn add_until(&self, token: &str, expires_at: DateTime<Utc>) -> CacheResult<()> {
        let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.add(token, remaining).await
    }

    /// Whether `token` is on the deny list. Cache errors are returned.
    pub async fn contains(&self, token: &str) -> CacheResult<bool> {
        let key = deny_list_key(token);
        self.bounded("exists", self.cache.exists(&key)).await
    }

    /// Authorization gate: `true` if the token must be rejected.
    ///
    /// Lookup failures deny.
    pub async fn is_denied(&self, token: &str) -> bool {
        match self.contains(token).await {
            Ok(denied) => denied,
            Err(e) => {
                tracing::warn!(error = %e, "Deny list lookup failed, rejecting token");
                true
            }
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> CacheResult<T>
    where
        F: std::future::Future<Output = CacheResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                operation: operation.to_string(),
                after: self.timeout,
            }),
        }
    }
}
