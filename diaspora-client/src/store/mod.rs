//! Accounts and access tokens
//!
//! The host application owns persistence. This module only defines what the
//! sign-in flow needs from it, plus an in-memory implementation used by the
//! bundled server and the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod memory;

/// Errors that can occur while reading or writing accounts and tokens
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint was violated, e.g. two accounts for one diaspora id.
    /// Callers treat this as "someone else created it first" and re-fetch.
    #[error("{0} already exists")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A local account, identified by its federated id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub diaspora_id: String,
    pub created_at: DateTime<Utc>,
}

/// Attributes of an account about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub diaspora_id: String,
}

/// Access token issued by a pod for one account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: String,
    pub account_id: String,
    /// Host of the pod that issued the token
    pub pod_host: String,
    /// User id on the pod
    pub uid: String,
    pub token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= Utc::now())
    }
}

// Token values stay out of logs
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("pod_host", &self.pod_host)
            .field("uid", &self.uid)
            .field("token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Attributes of a token about to be stored
#[derive(Clone, PartialEq, Eq)]
pub struct NewAccessToken {
    pub account_id: String,
    pub pod_host: String,
    pub uid: String,
    pub token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for NewAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccessToken")
            .field("account_id", &self.account_id)
            .field("pod_host", &self.pod_host)
            .field("uid", &self.uid)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Account persistence provided by the host application
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_diaspora_id(&self, diaspora_id: &str) -> Result<Option<Account>, StoreError>;

    /// Create an account. Fails with [`StoreError::Conflict`] when an account
    /// with the same diaspora id already exists.
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError>;
}

/// Token persistence provided by the host application
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_for_account(&self, account_id: &str) -> Result<Option<AccessToken>, StoreError>;

    /// Destroy every token owned by the account and store the new one.
    /// Implementations must make the swap atomic per account.
    async fn replace(&self, token: NewAccessToken) -> Result<AccessToken, StoreError>;

    /// Destroy the account's token. Returns whether there was one.
    async fn destroy(&self, account_id: &str) -> Result<bool, StoreError>;
}
