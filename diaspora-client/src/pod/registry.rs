use super::{PodClient, PodError, PodRegistry, ResourceServer};
use async_trait::async_trait;
use log::{debug, warn};
use moka::future::Cache as MokaCache;
use std::sync::Arc;

const MAX_PODS: u64 = 10_000;

/// Pod registrations kept in memory.
///
/// First contact with a host is single-flight: concurrent resolves for the
/// same host share one registration request.
#[derive(Clone)]
pub struct CachedPodRegistry {
    pods: MokaCache<String, ResourceServer>,
    client: PodClient,
}

impl CachedPodRegistry {
    pub fn new(client: PodClient) -> Self {
        Self {
            pods: MokaCache::builder().max_capacity(MAX_PODS).build(),
            client,
        }
    }
}

fn host_key(host: &str) -> String {
    host.to_ascii_lowercase()
}

#[async_trait]
impl PodRegistry for CachedPodRegistry {
    async fn find_by_host(&self, host: &str) -> Result<Option<ResourceServer>, PodError> {
        Ok(self.pods.get(&host_key(host)).await)
    }

    async fn register(&self, host: &str) -> Result<ResourceServer, PodError> {
        let key = host_key(host);
        let pod = self.client.register(&key).await?;
        self.pods.insert(key, pod.clone()).await;
        Ok(pod)
    }

    async fn resolve(&self, host: &str) -> Result<ResourceServer, PodError> {
        let key = host_key(host);
        let registration = self.client.register(&key);
        self.pods
            .try_get_with(key.clone(), async {
                debug!("No registration for {}, registering", key);
                registration.await
            })
            .await
            .map_err(|shared: Arc<PodError>| {
                // Other waiters may still hold the shared error
                Arc::try_unwrap(shared).unwrap_or_else(|shared| {
                    warn!("Shared registration for {} failed: {}", key, shared);
                    match shared.as_ref() {
                        PodError::Timeout => PodError::Timeout,
                        other => PodError::Registration {
                            host: key.clone(),
                            message: other.to_string(),
                        },
                    }
                })
            })
    }
}
