//! Pods and their OAuth client registrations
//!
//! A pod is known to this application once it has registered us as an OAuth
//! client. Registrations are looked up by host and created on first contact.

use crate::errors::ErrorKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use url::Url;

pub mod client;
pub mod registry;

pub use client::{PodClient, TokenGrant};
pub use registry::CachedPodRegistry;

/// Errors that can occur while talking to a pod
#[derive(Debug, Error)]
pub enum PodError {
    #[error("'{0}' is not a valid pod address")]
    InvalidHost(String),
    #[error("Registration with {host} failed: {message}")]
    Registration { host: String, message: String },
    #[error("Access denied")]
    AccessDenied,
    #[error("Pod responded with HTTP {status}")]
    Provider { status: u16, body: String },
    #[error("Invalid response from pod: {0}")]
    InvalidResponse(String),
    #[error("Request to pod timed out")]
    Timeout,
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for PodError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PodError::Timeout
        } else {
            PodError::Http(err)
        }
    }
}

impl PodError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PodError::InvalidHost(_) => ErrorKind::MalformedIdentity,
            PodError::Registration { .. } => ErrorKind::Registration,
            PodError::AccessDenied | PodError::Provider { .. } => ErrorKind::OAuthExchangeFailure,
            PodError::InvalidResponse(_) | PodError::Http(_) => ErrorKind::Transport,
            PodError::Timeout => ErrorKind::Timeout,
        }
    }
}

/// A pod that has registered this application as an OAuth client
#[derive(Clone, PartialEq, Eq)]
pub struct ResourceServer {
    pub host: String,
    pub client_id: String,
    pub client_secret: String,
    /// `scheme://host` the pod is reached at
    pub base_url: String,
    /// Manifest URL the registration was made with
    pub manifest_url: String,
    pub registered_at: DateTime<Utc>,
}

impl fmt::Debug for ResourceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceServer")
            .field("host", &self.host)
            .field("client_id", &self.client_id)
            .field("base_url", &self.base_url)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

impl ResourceServer {
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth/authorize", self.base_url)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }

    /// Form parameters identifying this client to the pod. Sent when
    /// registering and again with every code exchange.
    pub fn register_body(&self) -> Vec<(&'static str, String)> {
        vec![
            ("type", "client_associate".to_string()),
            ("manifest_url", self.manifest_url.clone()),
        ]
    }

    /// Browser URL asking the user to authorize this application
    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        uid: &str,
        scope: Option<&str>,
    ) -> Result<Url, PodError> {
        let mut url = Url::parse(&self.authorize_endpoint())
            .map_err(|_| PodError::InvalidHost(self.host.clone()))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("uid", uid);
            if let Some(scope) = scope.filter(|scope| !scope.is_empty()) {
                query.append_pair("scope", scope);
            }
        }
        Ok(url)
    }

    /// `host[:port]` of the authorization server, the port only when it is
    /// not the scheme's default
    pub fn authority(&self) -> Result<String, PodError> {
        let url = Url::parse(&self.authorize_endpoint())
            .map_err(|_| PodError::InvalidHost(self.host.clone()))?;
        let host = url
            .host_str()
            .ok_or_else(|| PodError::InvalidHost(self.host.clone()))?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }
}

/// Where pod registrations live
#[async_trait]
pub trait PodRegistry: Send + Sync {
    async fn find_by_host(&self, host: &str) -> Result<Option<ResourceServer>, PodError>;

    /// Register with the pod, replacing any registration already stored
    async fn register(&self, host: &str) -> Result<ResourceServer, PodError>;

    /// The stored registration for `host`, registering first if there is none
    async fn resolve(&self, host: &str) -> Result<ResourceServer, PodError> {
        match self.find_by_host(host).await? {
            Some(pod) => Ok(pod),
            None => self.register(host).await,
        }
    }
}
