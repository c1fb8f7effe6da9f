//! Login sessions
//!
//! A session is a server-side record, keyed by an opaque cookie value, that
//! names the account currently signed in. The cookie value itself is never
//! stored; records are keyed by its SHA-256 digest.

use crate::config::{SessionConfig, SessionStoreKind};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

mod current;
pub mod memory;
pub mod redis;

pub use current::CurrentSession;

const KEY_PREFIX: &str = "diaspora-client:session:";

/// Errors that can occur during session store operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to parse session: {0}")]
    Deserialization(String),
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// What a session remembers about its principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub account_id: String,
}

/// Interface every session store backend implements
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    /// Store a value under `key` for the configured session lifetime
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError>;

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError>;

    async fn delete(&self, key: &str) -> Result<(), SessionError>;

    /// Returns Ok(()) if the backend is reachable
    async fn health_check(&self) -> Result<(), String>;
}

/// Session store selected by configuration
#[derive(Clone)]
pub enum SessionStore {
    InMemory(memory::InMemorySessions),
    Redis(redis::RedisSessions),
}

#[async_trait::async_trait]
impl SessionBackend for SessionStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        match self {
            Self::InMemory(store) => store.set(key, value).await,
            Self::Redis(store) => store.set(key, value).await,
        }
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        match self {
            Self::InMemory(store) => store.get(key).await,
            Self::Redis(store) => store.get(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        match self {
            Self::InMemory(store) => store.delete(key).await,
            Self::Redis(store) => store.delete(key).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

impl SessionStore {
    /// Load the session behind a cookie value
    pub async fn load(&self, session_id: &str) -> Result<Option<SessionData>, SessionError> {
        self.get(&storage_key(session_id)).await
    }

    pub async fn save(&self, session_id: &str, data: &SessionData) -> Result<(), SessionError> {
        self.set(&storage_key(session_id), data).await
    }

    pub async fn remove(&self, session_id: &str) -> Result<(), SessionError> {
        self.delete(&storage_key(session_id)).await
    }
}

/// Create the session store named by the configuration
pub async fn create_session_store(config: &SessionConfig) -> Result<SessionStore, SessionError> {
    match config.store {
        SessionStoreKind::InMemory => {
            let store = memory::InMemorySessions::new(config.ttl, config.capacity)
                .map_err(SessionError::Config)?;
            Ok(SessionStore::InMemory(store))
        }
        SessionStoreKind::Redis => {
            if config.redis_url.is_empty() {
                return Err(SessionError::Config(
                    "Redis URL is required for the redis session store".to_string(),
                ));
            }
            let store = redis::RedisSessions::new(&config.redis_url, config.ttl)
                .await
                .map_err(SessionError::Config)?;
            Ok(SessionStore::Redis(store))
        }
    }
}

/// A fresh, unguessable cookie value
pub fn new_session_id() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Store key for a cookie value
pub fn storage_key(session_id: &str) -> String {
    let digest = Sha256::digest(session_id.as_bytes());
    format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(digest))
}
