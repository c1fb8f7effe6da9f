use confique::Config;
use serde::Deserialize;

/// Specifies which session store implementation to use
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "String")]
pub enum SessionStoreKind {
    #[default]
    InMemory,
    Redis,
}

impl TryFrom<String> for SessionStoreKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in-memory" | "memory" => Ok(Self::InMemory),
            "redis" => Ok(Self::Redis),
            other => Err(format!(
                "unknown session store '{other}', expected 'in-memory' or 'redis'"
            )),
        }
    }
}

/// Configuration for the login session
#[derive(Debug, Config, Clone)]
pub struct SessionConfig {
    /// Session store type: "in-memory" or "redis" (default: in-memory)
    #[config(env = "DIASPORA_CLIENT_SESSION_STORE", default = "in-memory")]
    pub store: SessionStoreKind,

    /// Session lifetime in seconds (default: 86400 = 1 day)
    #[config(env = "DIASPORA_CLIENT_SESSION_TTL", default = 86400)]
    pub ttl: u64,

    /// Maximum in-memory store size in MiB (default: 16)
    #[config(env = "DIASPORA_CLIENT_SESSION_CAPACITY", default = 16)]
    pub capacity: usize,

    /// Redis connection string, required for the redis store
    #[config(env = "DIASPORA_CLIENT_SESSION_REDIS_URL", default = "")]
    pub redis_url: String,

    /// Name of the session cookie (default: diaspora_client_session)
    #[config(
        env = "DIASPORA_CLIENT_SESSION_COOKIE_NAME",
        default = "diaspora_client_session"
    )]
    pub cookie_name: String,

    /// Mark the session cookie `Secure` (default: false)
    #[config(env = "DIASPORA_CLIENT_SESSION_SECURE_COOKIE", default = false)]
    pub secure_cookie: bool,
}

impl SessionConfig {
    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self {
            store: SessionStoreKind::InMemory,
            ttl: 60,
            capacity: 1,
            redis_url: String::new(),
            cookie_name: "diaspora_client_session".to_string(),
            secure_cookie: false,
        }
    }
}
