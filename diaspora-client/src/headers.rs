//! Caching headers for the sign-in endpoints.
//!
//! Flow redirects carry per-user state (authorize URLs, error messages, session
//! cookies) and must never be stored. The manifest is the same for every pod
//! and may be cached.

use axum::http::HeaderValue;
use axum::response::Response;
use chrono::{TimeDelta, Utc};
use http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use log::warn;

/// Cache policy applied to a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// `no-store`, for anything tied to a user or a session
    NoStore,
    /// `public, max-age=<seconds>`
    Public { max_age: u32 },
}

impl CachePolicy {
    fn cache_control(&self) -> HeaderValue {
        match self {
            CachePolicy::NoStore => HeaderValue::from_static("no-store, no-cache, must-revalidate"),
            CachePolicy::Public { max_age } => {
                HeaderValue::from_str(&format!("public, max-age={max_age}"))
                    .unwrap_or(HeaderValue::from_static("public"))
            }
        }
    }

    /// Set Cache-Control, Pragma and Expires on a response
    pub fn apply<B>(&self, response: &mut Response<B>) {
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, self.cache_control());

        match self {
            CachePolicy::NoStore => {
                headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
                headers.insert(EXPIRES, HeaderValue::from_static("0"));
            }
            CachePolicy::Public { max_age } => {
                let expires = TimeDelta::try_seconds(i64::from(*max_age))
                    .and_then(|ttl| Utc::now().checked_add_signed(ttl));
                let value = expires
                    .map(|at| at.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
                    .and_then(|at| HeaderValue::from_str(&at).ok());
                match value {
                    Some(value) => {
                        headers.insert(EXPIRES, value);
                    }
                    None => warn!("failed to compute expires header for max-age {max_age}"),
                }
            }
        }
    }
}
