use super::{
    AccessToken, Account, AccountStore, NewAccessToken, NewAccount, StoreError, TokenStore,
};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Accounts and tokens kept in process memory.
///
/// Suitable for a single instance; everything is lost on restart.
#[derive(Default)]
pub struct InMemoryStore {
    accounts: RwLock<HashMap<String, Account>>,
    // account id -> tokens owned by it
    tokens: RwLock<HashMap<String, Vec<AccessToken>>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}_{id}")
    }

    /// Number of tokens currently stored for the account
    pub async fn token_count(&self, account_id: &str) -> usize {
        self.tokens
            .read()
            .await
            .get(account_id)
            .map_or(0, |tokens| tokens.len())
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn find(&self, id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(id).cloned())
    }

    async fn find_by_diaspora_id(&self, diaspora_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.diaspora_id == diaspora_id)
            .cloned())
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|existing| existing.diaspora_id == account.diaspora_id)
        {
            return Err(StoreError::Conflict(format!(
                "Account for {}",
                account.diaspora_id
            )));
        }

        let created = Account {
            id: self.next_id("acct"),
            diaspora_id: account.diaspora_id,
            created_at: Utc::now(),
        };
        debug!("Created account {} for {}", created.id, created.diaspora_id);
        accounts.insert(created.id.clone(), created.clone());
        Ok(created)
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn find_for_account(&self, account_id: &str) -> Result<Option<AccessToken>, StoreError> {
        Ok(self
            .tokens
            .read()
            .await
            .get(account_id)
            .and_then(|tokens| tokens.last().cloned()))
    }

    async fn replace(&self, token: NewAccessToken) -> Result<AccessToken, StoreError> {
        let stored = AccessToken {
            id: self.next_id("tok"),
            account_id: token.account_id,
            pod_host: token.pod_host,
            uid: token.uid,
            token: token.token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };

        // Destroy and create under one write lock
        let mut tokens = self.tokens.write().await;
        let previous = tokens.insert(stored.account_id.clone(), vec![stored.clone()]);
        debug!(
            "Stored token {} for account {} (replaced {})",
            stored.id,
            stored.account_id,
            previous.map_or(0, |p| p.len())
        );
        Ok(stored)
    }

    async fn destroy(&self, account_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .tokens
            .write()
            .await
            .remove(account_id)
            .is_some_and(|removed| !removed.is_empty()))
    }
}
