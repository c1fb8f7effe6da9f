use crate::api::health::{self, Health};
use crate::api::oauth::handlers;
use crate::api::oauth::models::Manifest;
use crate::permissions::{AccessLevel, ManifestEntry, ResourceType};
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const SIGN_IN_TAG: &str = "Sign-in API";

/// Paths are documented for the default mount path
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::ready_check,
        handlers::start,
        handlers::callback,
        handlers::logout,
        handlers::manifest,
        handlers::profile,
    ),
    components(schemas(Health, Manifest, ManifestEntry, ResourceType, AccessLevel)),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = SIGN_IN_TAG, description = "Sign in with a diaspora* pod"),
    ),
    info(
        title = "diaspora client API",
        description = "OAuth2 sign-in against diaspora* pods",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
