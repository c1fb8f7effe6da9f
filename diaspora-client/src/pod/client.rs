//! HTTP calls to pods: client registration, code exchange and the `me` lookup

use super::{PodError, ResourceServer};
use crate::errors::bounded;
use chrono::{DateTime, TimeDelta, Utc};
use http::StatusCode;
use log::{debug, error, info};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use url::Url;

/// Longest pod response body kept in an error
const MAX_ERROR_BODY: usize = 2000;

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Me {
    uid: String,
}

/// Credentials handed out by a pod's token endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Talks to pods over HTTP
#[derive(Clone)]
pub struct PodClient {
    client: Client,
    scheme: String,
    manifest_url: String,
}

impl PodClient {
    pub fn new(client: Client, scheme: &str, manifest_url: &str) -> Self {
        Self {
            client,
            scheme: scheme.to_string(),
            manifest_url: manifest_url.to_string(),
        }
    }

    /// `scheme://host` for a pod host
    pub fn base_url(&self, host: &str) -> Result<String, PodError> {
        let base_url = format!("{}://{}", self.scheme, host);
        match Url::parse(&base_url) {
            Ok(url) if url.host_str().is_some() && url.path() == "/" => Ok(base_url),
            _ => Err(PodError::InvalidHost(host.to_string())),
        }
    }

    /// Register this application with the pod at `host`
    pub async fn register(&self, host: &str) -> Result<ResourceServer, PodError> {
        let base_url = self.base_url(host)?;
        let url = format!("{}/oauth/token", base_url);
        info!("Registering with pod {}", host);

        let response = self
            .client
            .post(&url)
            .form(&[
                ("type", "client_associate"),
                ("manifest_url", self.manifest_url.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Registration with {} failed with HTTP {}", host, status);
            return Err(PodError::Registration {
                host: host.to_string(),
                message: format!("HTTP {}: {}", status, bounded(&body, MAX_ERROR_BODY)),
            });
        }

        let registration: RegistrationResponse = response
            .json()
            .await
            .map_err(|e| PodError::InvalidResponse(format!("registration response: {e}")))?;

        debug!(
            "Pod {} registered us as client {}",
            host, registration.client_id
        );
        Ok(ResourceServer {
            host: host.to_string(),
            client_id: registration.client_id,
            client_secret: registration.client_secret,
            base_url,
            manifest_url: self.manifest_url.clone(),
            registered_at: Utc::now(),
        })
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(
        &self,
        pod: &ResourceServer,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, PodError> {
        let mut form: Vec<(&str, String)> = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("client_id", pod.client_id.clone()),
            ("client_secret", pod.client_secret.clone()),
        ];
        form.extend(pod.register_body());
        form.push(("redirect_uri", redirect_uri.to_string()));

        debug!("Exchanging authorization code with {}", pod.host);
        let response = self
            .client
            .post(pod.token_endpoint())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(PodError::AccessDenied);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Code exchange with {} failed with HTTP {}", pod.host, status);
            return Err(PodError::Provider {
                status: status.as_u16(),
                body: bounded(&body, MAX_ERROR_BODY),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PodError::InvalidResponse(format!("token response: {e}")))?;

        let expires_at = token
            .expires_in
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
        })
    }

    /// User id of the token's owner on the pod
    pub async fn fetch_uid(
        &self,
        pod: &ResourceServer,
        access_token: &str,
    ) -> Result<String, PodError> {
        let url = format!("{}/api/v0/me", pod.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(PodError::AccessDenied);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PodError::Provider {
                status: status.as_u16(),
                body: bounded(&body, MAX_ERROR_BODY),
            });
        }

        let me: Me = response
            .json()
            .await
            .map_err(|e| PodError::InvalidResponse(format!("profile response: {e}")))?;
        Ok(me.uid)
    }
}
