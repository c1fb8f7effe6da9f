use crate::config::Settings;
use crate::errors::Error;
use crate::permissions::Permissions;
use crate::pod::{CachedPodRegistry, PodClient, PodRegistry};
use crate::session::{create_session_store, SessionBackend, SessionStore};
use crate::store::memory::InMemoryStore;
use crate::store::{AccountStore, TokenStore};
use log::error;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Everything the handlers share, built once at start-up
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub http_client: Client,
    pub pod_client: PodClient,
    pub pods: Arc<dyn PodRegistry>,
    pub accounts: Arc<dyn AccountStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub sessions: Arc<SessionStore>,
    /// Permissions requested from every pod
    pub permissions: Arc<Permissions>,
}

impl AppState {
    fn create_http_client(settings: &Settings) -> Result<Client, Error> {
        Client::builder()
            .timeout(settings.oauth.request_timeout())
            .connect_timeout(settings.oauth.connect_timeout())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .user_agent(concat!("diaspora-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))
    }

    /// State backed by the configured session store and in-memory accounts
    /// and tokens
    pub async fn new(settings: Settings) -> Result<Self, Error> {
        let sessions = create_session_store(&settings.session).await?;
        let store = Arc::new(InMemoryStore::new());
        Self::from_parts(settings, sessions, store.clone(), store)
    }

    /// State backed by the host application's own account and token stores
    pub fn from_parts(
        settings: Settings,
        sessions: SessionStore,
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, Error> {
        let permissions = settings.oauth.get_permissions()?;
        let http_client = Self::create_http_client(&settings)?;
        let pod_client = PodClient::new(
            http_client.clone(),
            &settings.oauth.pod_scheme,
            &settings.manifest_url(),
        );
        let pods = Arc::new(CachedPodRegistry::new(pod_client.clone()));

        Ok(Self {
            settings: Arc::new(settings),
            http_client,
            pod_client,
            pods,
            accounts,
            tokens,
            sessions: Arc::new(sessions),
            permissions: Arc::new(permissions),
        })
    }

    /// Replace the pod registry, e.g. with one backed by a database
    pub fn with_pod_registry(mut self, pods: Arc<dyn PodRegistry>) -> Self {
        self.pods = pods;
        self
    }

    pub async fn health_check(&self) -> bool {
        match self.sessions.health_check().await {
            Ok(()) => true,
            Err(e) => {
                error!("Session store health check failed: {}", e);
                false
            }
        }
    }
}
