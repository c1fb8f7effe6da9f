use crate::config::OAuthConfig;
use crate::permissions::{ManifestEntry, Permissions};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query of the sign-in start endpoint
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StartParams {
    /// The user's diaspora id, `user@pod.example`
    pub diaspora_id: Option<String>,
}

/// Query the pod redirects back with
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// Authorization code, present on success
    pub code: Option<String>,
    /// OAuth error code, present on failure
    pub error: Option<String>,
    pub error_description: Option<String>,
    /// Echoed from the redirect URI sent at authorization
    pub diaspora_id: Option<String>,
}

/// Application manifest pods fetch while registering this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub permissions_overview: String,
    pub permissions: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(config: &OAuthConfig, permissions: &Permissions) -> Self {
        Self {
            name: config.app_name.clone(),
            description: config.app_description.clone(),
            homepage_url: config.homepage_url.clone(),
            icon_url: config.icon_url.clone(),
            permissions_overview: config.permissions_overview.clone(),
            permissions: permissions.to_manifest(),
        }
    }
}
