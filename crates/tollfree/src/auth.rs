//! Caller checks consumed from the surrounding platform.
//!
//! Session handling lives outside this crate; here a bearer token is either an owner
//! token (resolved through an [`OwnerDirectory`]) or one of the shared operator secrets.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::config::AccessConfig;
use crate::store::BusinessId;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("missing or invalid credentials")]
    Unauthenticated,
    #[error("caller does not own this business")]
    Forbidden,
}

/// Answers "does the holder of this token own business X?".
pub trait OwnerDirectory: Send + Sync {
    /// `None` when the token is unknown.
    fn owns(&self, token: &str, business_id: &BusinessId) -> Option<bool>;
}

/// Token directory loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnerDirectory {
    tokens: BTreeMap<String, BTreeSet<String>>,
}

impl StaticOwnerDirectory {
    pub fn new(tokens: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self { tokens }
    }

    pub fn with_owner(mut self, token: &str, business_id: &str) -> Self {
        self.tokens
            .entry(token.to_string())
            .or_default()
            .insert(business_id.to_string());
        self
    }
}

impl OwnerDirectory for StaticOwnerDirectory {
    fn owns(&self, token: &str, business_id: &BusinessId) -> Option<bool> {
        self.tokens
            .get(token)
            .map(|businesses| businesses.contains(business_id.as_str()))
    }
}

/// Request authorization for the HTTP routers.
#[derive(Clone)]
pub struct AccessControl {
    owners: Arc<dyn OwnerDirectory>,
    admin_token: Option<String>,
    cron_secret: Option<String>,
}

impl AccessControl {
    pub fn new(
        owners: Arc<dyn OwnerDirectory>,
        admin_token: Option<String>,
        cron_secret: Option<String>,
    ) -> Self {
        Self {
            owners,
            admin_token,
            cron_secret,
        }
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        Self::new(
            Arc::new(StaticOwnerDirectory::new(config.owner_tokens.clone())),
            config.admin_token.clone(),
            config.cron_secret.clone(),
        )
    }

    pub fn authorize_owner(
        &self,
        headers: &HeaderMap,
        business_id: &BusinessId,
    ) -> Result<(), AccessError> {
        let token = bearer_token(headers).ok_or(AccessError::Unauthenticated)?;
        match self.owners.owns(token, business_id) {
            Some(true) => Ok(()),
            Some(false) => Err(AccessError::Forbidden),
            None => Err(AccessError::Unauthenticated),
        }
    }

    pub fn authorize_admin(&self, headers: &HeaderMap) -> Result<(), AccessError> {
        check_shared_secret(headers, ADMIN_TOKEN_HEADER, self.admin_token.as_deref())
    }

    pub fn authorize_scheduler(&self, headers: &HeaderMap) -> Result<(), AccessError> {
        check_shared_secret(headers, CRON_SECRET_HEADER, self.cron_secret.as_deref())
    }
}

impl std::fmt::Debug for AccessControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControl")
            .field("admin_token", &self.admin_token.is_some())
            .field("cron_secret", &self.cron_secret.is_some())
            .finish_non_exhaustive()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn check_shared_secret(
    headers: &HeaderMap,
    header_name: &str,
    expected: Option<&str>,
) -> Result<(), AccessError> {
    // An unset secret keeps the endpoint closed.
    let expected = expected.ok_or(AccessError::Unauthenticated)?;
    let presented = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .or_else(|| bearer_token(headers))
        .ok_or(AccessError::Unauthenticated)?;

    if constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(AccessError::Unauthenticated)
    }
}

pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
