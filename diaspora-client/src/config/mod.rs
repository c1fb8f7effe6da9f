pub use crate::config::oauth::OAuthConfig;
pub use crate::config::session::{SessionConfig, SessionStoreKind};
use confique::Config;

pub mod oauth;
pub mod session;

/// Environment variable naming an optional TOML configuration file
pub const CONFIG_FILE_ENV: &str = "DIASPORA_CLIENT_CONFIG";

/// Main configuration structure for the diaspora client service
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// The port the server will listen to (default: 7766)
    #[config(env = "DIASPORA_CLIENT_PORT", default = 7766)]
    pub port: u16,

    /// Path the sign-in endpoints are mounted under (default: /auth/diaspora)
    #[config(env = "DIASPORA_CLIENT_MOUNT_PATH", default = "/auth/diaspora")]
    pub mount_path: String,

    /// Where users land once the OAuth dance is over (default: /)
    #[config(env = "DIASPORA_CLIENT_AFTER_OAUTH_REDIRECT_PATH", default = "/")]
    pub after_oauth_redirect_path: String,

    /// Public base URL of this application, used for redirect and manifest URLs
    /// (default: http://localhost:7766)
    #[config(env = "DIASPORA_CLIENT_PUBLIC_URL", default = "http://localhost:7766")]
    pub public_url: String,

    /// OAuth client configuration
    #[config(nested)]
    pub oauth: OAuthConfig,

    /// Session configuration
    #[config(nested)]
    pub session: SessionConfig,
}

impl Settings {
    /// Loads the configuration from environment variables, layered over the
    /// TOML file named by `DIASPORA_CLIENT_CONFIG` when it is set
    pub fn new() -> Result<Self, String> {
        let mut builder = Self::builder().env();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.file(path);
        }
        builder.load().map_err(|e| e.to_string())
    }

    /// Mount path without trailing slash; the root mount is `/`
    pub fn mount_path(&self) -> String {
        let trimmed = self.mount_path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }

    /// The path pods redirect back to after authorization
    pub fn callback_path(&self) -> String {
        self.mounted("callback")
    }

    pub fn manifest_path(&self) -> String {
        self.mounted("manifest.json")
    }

    pub fn profile_path(&self) -> String {
        self.mounted("profile")
    }

    /// Absolute URL of the application manifest
    pub fn manifest_url(&self) -> String {
        self.public(&self.manifest_path())
    }

    /// Absolute URL of the callback, without query
    pub fn callback_url(&self) -> String {
        self.public(&self.callback_path())
    }

    /// `path` below `public_url`, keeping any path `public_url` has
    fn public(&self, path: &str) -> String {
        format!("{}{}", self.public_url.trim_end_matches('/'), path)
    }

    fn mounted(&self, segment: &str) -> String {
        let mount = self.mount_path();
        if mount == "/" {
            format!("/{segment}")
        } else {
            format!("{mount}/{segment}")
        }
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0, // Let the OS choose a port
            mount_path: "/auth/diaspora".to_string(),
            after_oauth_redirect_path: "/".to_string(),
            public_url: "http://localhost:7766".to_string(),
            oauth: OAuthConfig::for_test(),
            session: SessionConfig::for_test(),
        }
    }
}
