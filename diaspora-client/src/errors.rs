use crate::api_client::ApiClientError;
use crate::identity::IdentityError;
use crate::permissions::PermissionError;
use crate::pod::PodError;
use crate::session::SessionError;
use crate::store::StoreError;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Error kinds across the crate.
///
/// Each kind has one propagation policy: permission and identity errors are
/// returned to the caller, sign-in flow errors end up in a redirect carrying a
/// bounded message, and pod API errors answered by the pod come back as data
/// (`{"error": body}`) rather than as an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidResourceType,
    InvalidAccessLevel,
    MalformedIdentity,
    NotAuthorized,
    Transport,
    OAuthExchangeFailure,
    InvalidClientRegistration,
    Timeout,
    Registration,
    Store,
    Session,
    Configuration,
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Pod(#[from] PodError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    ApiClient(#[from] ApiClientError),
    #[error("Client registration for {0} is no longer valid")]
    InvalidClientRegistration(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Permission(PermissionError::InvalidResourceType { .. }) => {
                ErrorKind::InvalidResourceType
            }
            Error::Permission(PermissionError::InvalidAccessLevel { .. }) => {
                ErrorKind::InvalidAccessLevel
            }
            Error::Identity(_) => ErrorKind::MalformedIdentity,
            Error::Pod(err) => err.kind(),
            Error::Store(_) => ErrorKind::Store,
            Error::Session(_) => ErrorKind::Session,
            Error::ApiClient(err) => err.kind(),
            Error::InvalidClientRegistration(_) => ErrorKind::InvalidClientRegistration,
            Error::Config(_) => ErrorKind::Configuration,
        }
    }
}

/// JSON error body returned by the service endpoints
#[derive(Debug, Clone)]
pub struct ApiError {
    pub detail: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a detail message and status code
    pub fn new<S: ToString>(detail: S, status_code: StatusCode) -> Self {
        Self {
            detail: detail.to_string(),
            status_code,
        }
    }

    /// Create new Internal Server Error (500) with a detail message
    pub fn internal<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create new Unauthorized Error (401) with a detail message
    pub fn unauthorized<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::UNAUTHORIZED)
    }

    /// Create new Bad Gateway (502) with a detail message
    pub fn bad_gateway<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::BAD_GATEWAY)
    }

    /// Create new Gateway Timeout (504) with a detail message
    pub fn gateway_timeout<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::GATEWAY_TIMEOUT)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err.kind() {
            ErrorKind::NotAuthorized => ApiError::unauthorized(err),
            ErrorKind::Timeout => ApiError::gateway_timeout(err),
            ErrorKind::Transport
            | ErrorKind::Registration
            | ErrorKind::OAuthExchangeFailure
            | ErrorKind::InvalidClientRegistration => ApiError::bad_gateway(err),
            ErrorKind::InvalidResourceType
            | ErrorKind::InvalidAccessLevel
            | ErrorKind::MalformedIdentity => ApiError::new(err, StatusCode::BAD_REQUEST),
            ErrorKind::Store | ErrorKind::Session | ErrorKind::Configuration => {
                ApiError::internal(err)
            }
        }
    }
}

/// At most `max_chars` characters of `message`, cut on a character boundary
pub fn bounded(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((end, _)) => message[..end].to_string(),
        None => message.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let body = json!({
            "detail": self.detail,
        });
        (status_code, Json(body)).into_response()
    }
}
