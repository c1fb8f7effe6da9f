//! Sign in with a diaspora* pod.
//!
//! Users enter their diaspora id (`user@pod.example`). The pod is registered as
//! an OAuth client on first contact, the user authorizes this application on
//! their pod, and the resulting access token is stored against a local account.
//! [`api_client::ApiClient`] then calls the pod's API on the account's behalf.
//!
//! [`create_app`] returns an axum router serving the sign-in endpoints; host
//! applications that own their accounts build the state with
//! [`state::AppState::from_parts`] and their own stores.

mod api;
pub mod api_client;
pub mod config;
pub mod errors;
mod headers;
pub mod identity;
mod openapi;
pub mod permissions;
pub mod pod;
pub mod session;
pub mod state;
pub mod store;
#[cfg(test)]
mod test_utils;

use crate::state::AppState;
use axum::Router;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable};

pub use crate::errors::{Error, ErrorKind};

/// Create the application router for a given state
pub fn create_app(state: AppState) -> Router {
    let (openapi_router, api_doc) =
        OpenApiRouter::with_openapi(openapi::ApiDoc::openapi()).split_for_parts();

    Router::new()
        .merge(api::router(&state))
        .merge(openapi_router)
        .merge(Scalar::with_url("/scalar", api_doc))
        .with_state(state)
}
