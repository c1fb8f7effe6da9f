//! Sign in with a diaspora* pod
//!
//! All routes live under the configured mount path (default `/auth/diaspora`):
//!
//! - `GET {mount}?diaspora_id=user@pod`: start the authorization code flow
//! - `GET {mount}/callback`: where the pod sends the user back
//! - `DELETE {mount}`: sign out of the pod (destroys the stored token)
//! - `GET {mount}/manifest.json`: the manifest pods read while registering us
//! - `GET {mount}/profile`: the signed-in user's profile, fetched from the pod

pub mod flow;
pub mod handlers;
pub mod models;

use crate::config::Settings;
use crate::state::AppState;
use axum::routing::{get, Router};

/// Creates the sign-in routes under the configured mount path
pub fn router(settings: &Settings) -> Router<AppState> {
    Router::new()
        .route(
            &settings.mount_path(),
            get(handlers::start).delete(handlers::logout),
        )
        .route(&settings.callback_path(), get(handlers::callback))
        .route(&settings.manifest_path(), get(handlers::manifest))
        .route(&settings.profile_path(), get(handlers::profile))
}
