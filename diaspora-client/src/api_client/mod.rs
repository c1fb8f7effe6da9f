//! Authenticated calls to a pod's REST API on behalf of an account

use crate::errors::ErrorKind;
use crate::pod::PodError;
use crate::state::AppState;
use crate::store::StoreError;
use log::{debug, warn};
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors raised by the API client.
///
/// Responses the pod answers with an error status are not errors here; they
/// come back as `{"error": <body>}`.
#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("{0}")]
    NotAuthorized(String),
    #[error("Request to pod timed out")]
    Timeout,
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    #[error("Pod returned invalid JSON: {0}")]
    Decode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pod(#[from] PodError),
}

impl From<reqwest::Error> for ApiClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiClientError::Timeout
        } else {
            ApiClientError::Http(err)
        }
    }
}

impl ApiClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiClientError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            ApiClientError::Timeout => ErrorKind::Timeout,
            ApiClientError::Http(_) | ApiClientError::Decode(_) => ErrorKind::Transport,
            ApiClientError::Store(_) => ErrorKind::Store,
            ApiClientError::Pod(err) => err.kind(),
        }
    }
}

/// HTTP verbs the client issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl From<Verb> for Method {
    fn from(verb: Verb) -> Self {
        match verb {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Delete => Method::DELETE,
        }
    }
}

/// API client bound to one access token
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    prefix: String,
    token: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for a token. `version` selects the `/api/{version}/`
    /// prefix; without it paths are used as given.
    pub fn new(
        client: Client,
        base_url: &str,
        token: Option<&str>,
        version: Option<&str>,
    ) -> Result<Self, ApiClientError> {
        let token = token.filter(|token| !token.is_empty()).ok_or_else(|| {
            ApiClientError::NotAuthorized(format!("Can't retrieve access token via {base_url}"))
        })?;
        let prefix = match version.filter(|version| !version.is_empty()) {
            Some(version) => format!("/api/{version}/"),
            None => String::new(),
        };
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix,
            token: token.to_string(),
        })
    }

    /// Client for the stored token of an account
    pub async fn for_account(
        state: &AppState,
        account_id: Option<&str>,
    ) -> Result<Self, ApiClientError> {
        let Some(account_id) = account_id else {
            return Err(ApiClientError::NotAuthorized(
                "Can't retrieve access token without a signed-in account".to_string(),
            ));
        };
        let token = state.tokens.find_for_account(account_id).await?;
        let Some(token) = token.filter(|token| !token.is_expired()) else {
            return Err(ApiClientError::NotAuthorized(format!(
                "Can't retrieve access token via account {account_id}"
            )));
        };
        let base_url = state.pod_client.base_url(&token.pod_host)?;
        Self::new(
            state.http_client.clone(),
            &base_url,
            Some(&token.token),
            state.settings.oauth.api_version.as_deref(),
        )
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn url(&self, path: &str) -> String {
        let path = if self.prefix.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            format!("{}{}", self.prefix, path.trim_start_matches('/'))
        };
        format!("{}{}", self.base_url, path)
    }

    /// Issue `verb` against `path` and return the JSON body with its keys
    /// normalized to snake_case
    pub async fn request(
        &self,
        verb: Verb,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiClientError> {
        let url = self.url(path);
        debug!("{:?} {}", verb, url);

        let mut request = self
            .client
            .request(verb.into(), &url)
            .bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!("Pod answered {:?} {} with HTTP {}", verb, url, status);
            return Ok(json!({ "error": text }));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ApiClientError::Decode(e.to_string()))?;
        Ok(normalize_keys(value))
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiClientError> {
        self.request(Verb::Get, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiClientError> {
        self.request(Verb::Post, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiClientError> {
        self.request(Verb::Put, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiClientError> {
        self.request(Verb::Delete, path, None).await
    }
}

/// Rewrite every object key, at any depth, to snake_case.
///
/// When two keys of one object map to the same snake_case key, the value of
/// the key already written in snake_case is kept.
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut normalized = Map::with_capacity(map.len());
            for (key, value) in map {
                let snake = to_snake_case(&key);
                if snake != key && normalized.contains_key(&snake) {
                    continue;
                }
                normalized.insert(snake, normalize_keys(value));
            }
            Value::Object(normalized)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev: Option<char> = None;
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' || c == ' ' {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else if c.is_uppercase() {
            let next_is_lower = chars.peek().is_some_and(|next| next.is_lowercase());
            let boundary = match prev {
                Some(p) => {
                    p.is_lowercase() || p.is_ascii_digit() || (p.is_uppercase() && next_is_lower)
                }
                None => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}
