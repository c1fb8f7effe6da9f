use super::{SessionBackend, SessionError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};

/// Sessions kept in Redis, shared by every instance of the application
#[derive(Clone)]
pub struct RedisSessions {
    conn_manager: ConnectionManager,
    ttl_secs: u64,
}

impl RedisSessions {
    /// Connect and verify the server answers PING
    pub async fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, String> {
        let client =
            Client::open(redis_url).map_err(|err| format!("Invalid Redis URL: {}", err))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|err| format!("Failed to connect to Redis: {}", err))?;

        let mut conn = conn_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|err| format!("Failed to ping Redis: {}", err))?;

        Ok(Self {
            conn_manager,
            ttl_secs,
        })
    }
}

#[async_trait]
impl SessionBackend for RedisSessions {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), SessionError> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.conn_manager.clone();
        conn.set_ex::<_, _, ()>(key, serialized, self.ttl_secs)
            .await
            .map_err(|err| {
                error!("Redis error while storing session: {}", err);
                SessionError::Redis(err.to_string())
            })
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(|err| {
            error!("Redis error while loading session: {}", err);
            SessionError::Redis(err.to_string())
        })?;

        value
            .map(|value| {
                serde_json::from_str(&value)
                    .map_err(|e| SessionError::Deserialization(e.to_string()))
            })
            .transpose()
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(key).await.map_err(|err| {
            error!("Redis error while deleting session: {}", err);
            SessionError::Redis(err.to_string())
        })
    }

    async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| format!("Redis health check failed: {}", err))
    }
}
