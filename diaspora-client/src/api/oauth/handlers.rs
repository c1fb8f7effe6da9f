//! Sign-in endpoint handlers

use super::flow::{back_target, restart_path, with_error_param, AuthFlow, CallbackOutcome};
use super::models::{CallbackParams, Manifest, StartParams};
use crate::api_client::ApiClient;
use crate::errors::{ApiError, Error};
use crate::headers::CachePolicy;
use crate::openapi::SIGN_IN_TAG;
use crate::session::CurrentSession;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::header::{REFERER, SET_COOKIE},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use log::{debug, error, info};
use serde_json::Value;

/// Manifest responses may be cached by pods for this long
const MANIFEST_MAX_AGE: u32 = 300;

fn redirect(target: &str) -> Response {
    let mut response = Redirect::to(target).into_response();
    CachePolicy::NoStore.apply(&mut response);
    response
}

/// Start signing in with a diaspora id
#[utoipa::path(
    get,
    path = "/auth/diaspora",
    params(StartParams),
    responses(
        (status = 303, description = "Redirect to the pod's authorization page, or back with `diaspora-client-error` on failure")
    ),
    tag = SIGN_IN_TAG
)]
pub async fn start(
    State(state): State<AppState>,
    Query(params): Query<StartParams>,
    headers: HeaderMap,
) -> Response {
    match AuthFlow::new(&state).begin(params.diaspora_id.as_deref()).await {
        Ok(url) => {
            debug!("Redirecting to {}", url.path());
            redirect(url.as_str())
        }
        Err(err) => {
            info!("Could not start sign-in: {}", err);
            let referer = headers.get(REFERER).and_then(|value| value.to_str().ok());
            let target = back_target(
                referer,
                &state.settings.public_url,
                &state.settings.after_oauth_redirect_path,
            );
            redirect(&with_error_param(&target, &err.to_string()))
        }
    }
}

/// Redirect target of the pod's authorization page
#[utoipa::path(
    get,
    path = "/auth/diaspora/callback",
    params(CallbackParams),
    responses(
        (status = 303, description = "Redirect to the post-login path, carrying `diaspora-client-error` on failure or the start path when the pod asks to register again")
    ),
    tag = SIGN_IN_TAG
)]
pub async fn callback(
    State(state): State<AppState>,
    mut session: CurrentSession,
    Query(params): Query<CallbackParams>,
) -> Response {
    let after_path = state.settings.after_oauth_redirect_path.as_str();
    let outcome = AuthFlow::new(&state)
        .complete(&params, session.account_id())
        .await;

    match outcome {
        CallbackOutcome::Authenticated {
            account,
            new_principal,
            ..
        } => {
            if !new_principal {
                return redirect(after_path);
            }
            match session
                .sign_in(&state.sessions, &state.settings.session, &account.id)
                .await
            {
                Ok(cookie) => {
                    let mut response = redirect(after_path);
                    response.headers_mut().insert(SET_COOKIE, cookie);
                    response
                }
                Err(err) => {
                    error!("Failed to sign in account {}: {}", account.id, err);
                    redirect(&with_error_param(after_path, "Failed to start session"))
                }
            }
        }
        CallbackOutcome::Reauthorize { diaspora_id } => {
            redirect(&restart_path(&state.settings.mount_path(), &diaspora_id))
        }
        CallbackOutcome::Failed { message } => redirect(&with_error_param(after_path, &message)),
    }
}

/// Sign out of the pod by destroying the current account's token
#[utoipa::path(
    delete,
    path = "/auth/diaspora",
    responses(
        (status = 303, description = "Token destroyed, or there was none; redirect to the post-login path")
    ),
    tag = SIGN_IN_TAG
)]
pub async fn logout(State(state): State<AppState>, session: CurrentSession) -> Response {
    let after_path = state.settings.after_oauth_redirect_path.as_str();
    let Some(account_id) = session.account_id() else {
        debug!("Logout without a session");
        return redirect(after_path);
    };

    match state.tokens.destroy(account_id).await {
        Ok(true) => {
            info!("Destroyed access token of account {}", account_id);
            redirect(after_path)
        }
        Ok(false) => {
            debug!("Account {} had no access token", account_id);
            redirect(after_path)
        }
        Err(err) => {
            error!("Failed to destroy token of account {}: {}", account_id, err);
            redirect(&with_error_param(after_path, &err.to_string()))
        }
    }
}

/// Application manifest fetched by pods during registration
#[utoipa::path(
    get,
    path = "/auth/diaspora/manifest.json",
    responses(
        (status = 200, description = "Application manifest", body = Manifest)
    ),
    tag = SIGN_IN_TAG
)]
pub async fn manifest(State(state): State<AppState>) -> Response {
    let manifest = Manifest::new(&state.settings.oauth, &state.permissions);
    let mut response = Json(manifest).into_response();
    CachePolicy::Public {
        max_age: MANIFEST_MAX_AGE,
    }
    .apply(&mut response);
    response
}

/// Profile of the signed-in user, as the pod reports it
#[utoipa::path(
    get,
    path = "/auth/diaspora/profile",
    responses(
        (status = 200, description = "The pod's `me` document with snake_case keys, or `{\"error\": body}` when the pod refused"),
        (status = 401, description = "No signed-in account with an access token"),
        (status = 502, description = "The pod could not be reached")
    ),
    tag = SIGN_IN_TAG
)]
pub async fn profile(
    State(state): State<AppState>,
    session: CurrentSession,
) -> Result<Json<Value>, ApiError> {
    let client = ApiClient::for_account(&state, session.account_id())
        .await
        .map_err(Error::from)?;
    let path = if client.prefix().is_empty() {
        "/api/v0/me"
    } else {
        "me"
    };
    let me = client.get(path).await.map_err(Error::from)?;
    Ok(Json(me))
}

#[cfg(test)]
mod tests {
    use crate::api::oauth::flow::ERROR_PARAM;
    use crate::session::{storage_key, SessionBackend};
    use crate::store::memory::InMemoryStore;
    use crate::store::{Account, AccountStore, NewAccount, StoreError, TokenStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn error_param(location: &str) -> Option<String> {
        let url = url::Url::parse(&format!("http://localhost{location}")).unwrap();
        url.query_pairs()
            .find(|(key, _)| key == ERROR_PARAM)
            .map(|(_, value)| value.into_owned())
    }

    #[tokio::test]
    async fn test_start_redirects_to_pod() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        let diaspora_id = fixture.diaspora_id("alice");

        let response = fixture
            .get(format!("/auth/diaspora?diaspora_id={}", diaspora_id))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);

        let location = url::Url::parse(response.location()).unwrap();
        assert!(location.as_str().starts_with(&format!(
            "{}/oauth/authorize?",
            fixture.pod_mock.uri()
        )));
        let query: Vec<(String, String)> = location.query_pairs().into_owned().collect();
        assert!(query.contains(&("client_id".to_string(), "client-1".to_string())));
        assert!(query.contains(&("uid".to_string(), "alice".to_string())));
        assert!(query.contains(&("scope".to_string(), "profile,posts".to_string())));
        assert!(query.contains(&(
            "redirect_uri".to_string(),
            format!(
                "http://localhost:7766/auth/diaspora/callback?diaspora_id={}",
                diaspora_id.replace('@', "%40").replace(':', "%3A")
            )
        )));
        assert_eq!(
            response.headers.get("cache-control").unwrap(),
            "no-store, no-cache, must-revalidate"
        );
    }

    #[tokio::test]
    async fn test_start_with_malformed_id() {
        let fixture = TestFixture::new().await;

        let response = fixture.get("/auth/diaspora?diaspora_id=bad-identity").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert!(response.location().starts_with("/?"));
        assert_eq!(
            error_param(response.location()).unwrap(),
            "'bad-identity' is not a valid diaspora id, expected user@host"
        );
    }

    #[tokio::test]
    async fn test_start_failure_returns_to_referer() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .get_with_headers(
                "/auth/diaspora",
                &[("referer", "http://localhost:7766/login")],
            )
            .await;
        assert!(response.location().starts_with("/login?"));
        assert_eq!(
            error_param(response.location()).unwrap(),
            "diaspora_id is required"
        );

        let response = fixture
            .get_with_headers("/auth/diaspora", &[("referer", "https://elsewhere.example/")])
            .await;
        assert!(response.location().starts_with("/?"));
    }

    #[tokio::test]
    async fn test_start_registration_failure() {
        let fixture = TestFixture::new().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(3000)))
            .mount(&fixture.pod_mock)
            .await;

        let response = fixture
            .get(format!(
                "/auth/diaspora?diaspora_id={}",
                fixture.diaspora_id("alice")
            ))
            .await;
        let message = error_param(response.location()).unwrap();
        assert!(message.starts_with("Registration with"));
        assert_eq!(message.chars().count(), 800);
    }

    #[tokio::test]
    async fn test_callback_signs_in() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 1).await;
        fixture.mock_me("token-1", "alice").await;
        let diaspora_id = fixture.diaspora_id("alice");

        let response = fixture.callback(&diaspora_id, "code-1", None).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/");
        let cookie = response.session_cookie().expect("session cookie");

        let account = fixture
            .store
            .find_by_diaspora_id(&diaspora_id)
            .await
            .unwrap()
            .expect("account created");
        let token = fixture
            .store
            .find_for_account(&account.id)
            .await
            .unwrap()
            .expect("token stored");
        assert_eq!(token.token, "token-1");
        assert_eq!(token.uid, "alice");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh-token-1"));
        assert!(token.expires_at.is_some());

        let session = crate::session::CurrentSession::load(
            &fixture.state.sessions,
            Some(cookie.clone()),
        )
        .await
        .unwrap();
        assert_eq!(session.account_id(), Some(account.id.as_str()));
    }

    #[tokio::test]
    async fn test_second_exchange_replaces_token() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 2).await;
        fixture.mock_me("token-1", "alice").await;
        let diaspora_id = fixture.diaspora_id("alice");

        let first = fixture.callback(&diaspora_id, "code-1", None).await;
        let cookie = first.session_cookie().unwrap();
        let second = fixture
            .callback(&diaspora_id, "code-2", Some(&cookie))
            .await;
        assert_eq!(second.location(), "/");
        // Already the principal: no new session
        assert!(second.session_cookie().is_none());

        let account = fixture
            .store
            .find_by_diaspora_id(&diaspora_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fixture.store.token_count(&account.id).await, 1);
        assert_eq!(fixture.store.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_returning_user_gets_existing_account() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 1).await;
        fixture.mock_me("token-1", "alice").await;
        let diaspora_id = fixture.diaspora_id("alice");
        let existing = fixture
            .store
            .create(NewAccount {
                diaspora_id: diaspora_id.clone(),
            })
            .await
            .unwrap();

        let response = fixture.callback(&diaspora_id, "code-1", None).await;
        assert!(response.session_cookie().is_some());
        assert_eq!(fixture.store.account_count().await, 1);
        assert_eq!(fixture.store.token_count(&existing.id).await, 1);
    }

    /// Misses the account on the first lookup, as if another request
    /// created it between the lookup and the insert
    struct LateAccounts {
        inner: Arc<InMemoryStore>,
        missed: AtomicBool,
    }

    #[async_trait]
    impl AccountStore for LateAccounts {
        async fn find(&self, id: &str) -> Result<Option<Account>, StoreError> {
            self.inner.find(id).await
        }

        async fn find_by_diaspora_id(
            &self,
            diaspora_id: &str,
        ) -> Result<Option<Account>, StoreError> {
            if !self.missed.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.find_by_diaspora_id(diaspora_id).await
        }

        async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
            self.inner.create(account).await
        }
    }

    #[tokio::test]
    async fn test_callback_recovers_from_account_conflict() {
        let fixture = TestFixture::with_accounts(|store| {
            Arc::new(LateAccounts {
                inner: store,
                missed: AtomicBool::new(false),
            })
        })
        .await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 1).await;
        fixture.mock_me("token-1", "alice").await;
        let diaspora_id = fixture.diaspora_id("alice");
        let existing = fixture
            .store
            .create(NewAccount {
                diaspora_id: diaspora_id.clone(),
            })
            .await
            .unwrap();

        let response = fixture.callback(&diaspora_id, "code-1", None).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/");
        let cookie = response.session_cookie().expect("session cookie");

        let session =
            crate::session::CurrentSession::load(&fixture.state.sessions, Some(cookie))
                .await
                .unwrap();
        assert_eq!(session.account_id(), Some(existing.id.as_str()));
        assert_eq!(fixture.store.account_count().await, 1);
        assert_eq!(fixture.store.token_count(&existing.id).await, 1);
    }

    #[tokio::test]
    async fn test_unreadable_session_still_redirects() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 1).await;
        fixture.mock_me("token-1", "alice").await;
        fixture
            .state
            .sessions
            .set(&storage_key("broken"), &"not a session")
            .await
            .unwrap();

        let response = fixture.delete("/auth/diaspora", Some("broken")).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/");

        let diaspora_id = fixture.diaspora_id("alice");
        let response = fixture
            .callback(&diaspora_id, "code-1", Some("broken"))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/");
        let cookie = response.session_cookie().expect("session cookie");
        assert_ne!(cookie, "broken");
    }

    #[tokio::test]
    async fn test_callback_access_denied() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .with_priority(1)
            .mount(&fixture.pod_mock)
            .await;

        let response = fixture
            .callback(&fixture.diaspora_id("alice"), "code-1", None)
            .await;
        assert!(response.location().starts_with("/?"));
        assert_eq!(error_param(response.location()).unwrap(), "Access denied");
        assert!(response.session_cookie().is_none());
        assert_eq!(fixture.store.account_count().await, 0);
    }

    #[tokio::test]
    async fn test_callback_provider_error_is_bounded() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(400).set_body_string("e".repeat(5000)))
            .with_priority(1)
            .mount(&fixture.pod_mock)
            .await;

        let response = fixture
            .callback(&fixture.diaspora_id("alice"), "code-1", None)
            .await;
        assert_eq!(
            error_param(response.location()).unwrap(),
            "e".repeat(800)
        );
    }

    #[tokio::test]
    async fn test_callback_invalid_client_reregisters() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 2).await;
        let diaspora_id = fixture.diaspora_id("alice");

        // First contact registers the pod
        fixture
            .get(format!("/auth/diaspora?diaspora_id={}", diaspora_id))
            .await;

        let response = fixture
            .get(format!(
                "/auth/diaspora/callback?error=invalid_client&diaspora_id={}",
                diaspora_id
            ))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        let encoded: String =
            url::form_urlencoded::byte_serialize(diaspora_id.as_bytes()).collect();
        assert_eq!(
            response.location(),
            format!("/auth/diaspora?diaspora_id={encoded}")
        );
    }

    #[tokio::test]
    async fn test_callback_other_error() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .get(format!(
                "/auth/diaspora/callback?error=access_denied&error_description=User%20said%20no&diaspora_id={}",
                fixture.diaspora_id("alice")
            ))
            .await;
        assert_eq!(error_param(response.location()).unwrap(), "User said no");
    }

    #[tokio::test]
    async fn test_callback_without_code() {
        let fixture = TestFixture::new().await;

        let response = fixture
            .get(format!(
                "/auth/diaspora/callback?diaspora_id={}",
                fixture.diaspora_id("alice")
            ))
            .await;
        assert_eq!(
            error_param(response.location()).unwrap(),
            "Missing authorization code"
        );
    }

    #[tokio::test]
    async fn test_logout_destroys_token() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 1).await;
        fixture.mock_me("token-1", "alice").await;
        let diaspora_id = fixture.diaspora_id("alice");
        let cookie = fixture
            .callback(&diaspora_id, "code-1", None)
            .await
            .session_cookie()
            .unwrap();
        let account = fixture
            .store
            .find_by_diaspora_id(&diaspora_id)
            .await
            .unwrap()
            .unwrap();

        let response = fixture.delete("/auth/diaspora", Some(&cookie)).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/");
        assert_eq!(fixture.store.token_count(&account.id).await, 0);

        // No token left: still a plain redirect
        let response = fixture.delete("/auth/diaspora", Some(&cookie)).await;
        assert_eq!(response.location(), "/");
    }

    #[tokio::test]
    async fn test_logout_without_session() {
        let fixture = TestFixture::new().await;

        let response = fixture.delete("/auth/diaspora", None).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.location(), "/");
    }

    #[tokio::test]
    async fn test_manifest() {
        let fixture = TestFixture::new().await;

        let response = fixture.get("/auth/diaspora/manifest.json").await;
        response.assert_ok();
        assert_eq!(response.json["name"], "Test App");
        assert_eq!(
            response.json["permissions"],
            json!([
                {"type": "profile", "access": "read"},
                {"type": "posts", "access": "write"},
            ])
        );
        assert_eq!(
            response.headers.get("cache-control").unwrap(),
            "public, max-age=300"
        );
    }

    #[tokio::test]
    async fn test_profile() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 1).await;
        Mock::given(method("GET"))
            .and(path("/api/v0/me"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uid": "alice",
                "displayName": "Alice",
            })))
            .mount(&fixture.pod_mock)
            .await;
        let cookie = fixture
            .callback(&fixture.diaspora_id("alice"), "code-1", None)
            .await
            .session_cookie()
            .unwrap();

        let response = fixture
            .get_with_cookie("/auth/diaspora/profile", &cookie)
            .await;
        response.assert_ok();
        assert_eq!(
            response.json,
            json!({"uid": "alice", "display_name": "Alice"})
        );
    }

    #[tokio::test]
    async fn test_profile_requires_sign_in() {
        let fixture = TestFixture::new().await;

        let response = fixture.get("/auth/diaspora/profile").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert!(response.json["detail"]
            .as_str()
            .unwrap()
            .starts_with("Can't retrieve access token"));
    }

    #[tokio::test]
    async fn test_profile_after_logout() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 1).await;
        fixture.mock_me("token-1", "alice").await;
        let cookie = fixture
            .callback(&fixture.diaspora_id("alice"), "code-1", None)
            .await
            .session_cookie()
            .unwrap();
        fixture.delete("/auth/diaspora", Some(&cookie)).await;

        let response = fixture
            .get_with_cookie("/auth/diaspora/profile", &cookie)
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_profile_provider_error_as_data() {
        let fixture = TestFixture::new().await;
        fixture.mock_registration("client-1", 1).await;
        fixture.mock_token_exchange("token-1", 1).await;
        // The uid lookup during sign-in succeeds once, later calls are refused
        Mock::given(method("GET"))
            .and(path("/api/v0/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uid": "alice"})))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&fixture.pod_mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v0/me"))
            .respond_with(ResponseTemplate::new(403).set_body_string("revoked"))
            .with_priority(2)
            .mount(&fixture.pod_mock)
            .await;
        let cookie = fixture
            .callback(&fixture.diaspora_id("alice"), "code-1", None)
            .await
            .session_cookie()
            .unwrap();

        let response = fixture
            .get_with_cookie("/auth/diaspora/profile", &cookie)
            .await;
        response.assert_ok();
        assert_eq!(response.json, json!({"error": "revoked"}));
    }
}
