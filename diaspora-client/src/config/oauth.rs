//! OAuth 2.0 client configuration

use crate::permissions::{PermissionError, Permissions};
use confique::Config;
use std::time::Duration;

/// How this application talks to diaspora pods
#[derive(Debug, Config, Clone)]
pub struct OAuthConfig {
    /// URL scheme used to reach pods (default: https)
    #[config(env = "DIASPORA_CLIENT_OAUTH_POD_SCHEME", default = "https")]
    pub pod_scheme: String,

    /// Timeout for requests to pods in seconds (default: 10)
    #[config(env = "DIASPORA_CLIENT_OAUTH_REQUEST_TIMEOUT", default = 10)]
    pub request_timeout: u64,

    /// Timeout for establishing connections to pods in seconds (default: 2)
    #[config(env = "DIASPORA_CLIENT_OAUTH_CONNECT_TIMEOUT", default = 2)]
    pub connect_timeout: u64,

    /// Requested permissions, comma-separated `type:access` pairs
    /// (e.g. "profile:read,posts:write"; default: none)
    #[config(env = "DIASPORA_CLIENT_OAUTH_PERMISSIONS", default = "")]
    pub permissions: String,

    /// Pod API version used by the API client, e.g. "v0" (default: no prefix)
    #[config(env = "DIASPORA_CLIENT_OAUTH_API_VERSION")]
    pub api_version: Option<String>,

    /// Application name shown by pods on the authorization page
    #[config(env = "DIASPORA_CLIENT_OAUTH_APP_NAME", default = "diaspora client")]
    pub app_name: String,

    /// Application description published in the manifest
    #[config(env = "DIASPORA_CLIENT_OAUTH_APP_DESCRIPTION", default = "")]
    pub app_description: String,

    /// Application homepage published in the manifest
    #[config(env = "DIASPORA_CLIENT_OAUTH_HOMEPAGE_URL")]
    pub homepage_url: Option<String>,

    /// Application icon published in the manifest
    #[config(env = "DIASPORA_CLIENT_OAUTH_ICON_URL")]
    pub icon_url: Option<String>,

    /// Short sentence explaining why the permissions are needed
    #[config(env = "DIASPORA_CLIENT_OAUTH_PERMISSIONS_OVERVIEW", default = "")]
    pub permissions_overview: String,
}

impl OAuthConfig {
    /// Parse the declared permissions
    pub fn get_permissions(&self) -> Result<Permissions, PermissionError> {
        self.permissions.parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self {
            pod_scheme: "http".to_string(),
            request_timeout: 5,
            connect_timeout: 1,
            permissions: "profile:read,posts:write".to_string(),
            api_version: Some("v0".to_string()),
            app_name: "Test App".to_string(),
            app_description: "An application under test".to_string(),
            homepage_url: Some("http://localhost:7766".to_string()),
            icon_url: None,
            permissions_overview: "Reads your profile".to_string(),
        }
    }
}
