use super::{new_session_id, SessionData, SessionError, SessionStore};
use crate::config::SessionConfig;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use http::header::COOKIE;
use http::{HeaderMap, HeaderValue};
use log::{debug, error};
use std::convert::Infallible;

/// The session attached to the request, if any.
///
/// Requests without a cookie, or with a cookie naming an expired session,
/// get an anonymous session that can still be signed in.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession {
    id: Option<String>,
    data: Option<SessionData>,
}

impl CurrentSession {
    /// Look up the session named by the cookie value
    pub async fn load(
        store: &SessionStore,
        session_id: Option<String>,
    ) -> Result<Self, SessionError> {
        let Some(id) = session_id else {
            return Ok(Self::default());
        };
        let data = store.load(&id).await?;
        if data.is_none() {
            debug!("Session cookie names no live session");
        }
        Ok(Self {
            id: Some(id),
            data,
        })
    }

    /// Account id of the current principal
    pub fn account_id(&self) -> Option<&str> {
        self.data.as_ref().map(|data| data.account_id.as_str())
    }

    /// Make `account_id` the principal of a fresh session.
    ///
    /// The session id is rotated on every sign-in and the previous record is
    /// removed. Returns the `Set-Cookie` value for the new id.
    pub async fn sign_in(
        &mut self,
        store: &SessionStore,
        config: &SessionConfig,
        account_id: &str,
    ) -> Result<HeaderValue, SessionError> {
        let id = new_session_id();
        let data = SessionData {
            account_id: account_id.to_string(),
        };
        store.save(&id, &data).await?;
        if let Some(previous) = self.id.replace(id.clone()) {
            store.remove(&previous).await?;
        }
        self.data = Some(data);
        session_cookie_header(config, &id)
    }
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = Infallible;

    /// A session that fails to load is treated as anonymous
    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session_id = session_cookie(&parts.headers, &state.settings.session.cookie_name);
        match Self::load(&state.sessions, session_id).await {
            Ok(session) => Ok(session),
            Err(e) => {
                error!("Failed to load session, continuing without one: {}", e);
                Ok(Self::default())
            }
        }
    }
}

/// Value of the named cookie across all `Cookie` headers
pub fn session_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn session_cookie_header(
    config: &SessionConfig,
    session_id: &str,
) -> Result<HeaderValue, SessionError> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name, session_id, config.ttl
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| SessionError::Config(format!("Invalid session cookie: {}", e)))
}
