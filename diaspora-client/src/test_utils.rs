use crate::config::Settings;
use crate::create_app;
use crate::session::create_session_store;
use crate::state::AppState;
use crate::store::memory::InMemoryStore;
use crate::store::AccountStore;
use axum::body::Body;
use axum::Router;
use http::header::{COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test fixture: the application router backed by in-memory stores, with a
/// mock server standing in for the user's pod.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_sign_in() {
///     let fixture = TestFixture::new().await;
///     fixture.mock_registration("client-1", 1).await;
///     fixture.mock_token_exchange("token-1", 1).await;
///     fixture.mock_me("token-1", "alice").await;
///
///     let response = fixture
///         .callback(&fixture.diaspora_id("alice"), "code-1", None)
///         .await;
///     assert_eq!(response.location(), "/");
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// State shared with the router
    pub state: AppState,
    /// Configuration settings
    pub settings: Settings,
    /// Accounts and tokens behind the state
    pub store: Arc<InMemoryStore>,
    /// Mock server for the pod
    pub pod_mock: MockServer,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_accounts(|store| store).await
    }

    /// Fixture whose account store wraps the in-memory one
    pub async fn with_accounts<F>(accounts: F) -> Self
    where
        F: FnOnce(Arc<InMemoryStore>) -> Arc<dyn AccountStore>,
    {
        Self::setup_logger(LevelFilter::Debug);

        let pod_mock = MockServer::start().await;
        let settings = Settings::for_test();

        let sessions = create_session_store(&settings.session)
            .await
            .expect("Failed to create session store");
        let store = Arc::new(InMemoryStore::new());
        let state = AppState::from_parts(
            settings.clone(),
            sessions,
            accounts(store.clone()),
            store.clone(),
        )
        .expect("Failed to create app state");
        let app = create_app(state.clone());

        Self {
            app,
            state,
            settings,
            store,
            pod_mock,
        }
    }

    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// A diaspora id on the mock pod
    pub fn diaspora_id(&self, uid: &str) -> String {
        format!("{}@{}", uid, self.pod_mock.address())
    }

    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder().method(method).uri(uri.as_ref())
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_headers(uri, &[]).await
    }

    pub async fn get_with_cookie(&self, uri: impl AsRef<str>, session_id: &str) -> TestResponse {
        let cookie = self.cookie_header(session_id);
        self.get_with_headers(uri, &[(COOKIE.as_str(), cookie.as_str())])
            .await
    }

    pub async fn get_with_headers(
        &self,
        uri: impl AsRef<str>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = self.request_builder(Method::GET, uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");
        self.send(request).await
    }

    pub async fn delete(&self, uri: impl AsRef<str>, session_id: Option<&str>) -> TestResponse {
        let mut builder = self.request_builder(Method::DELETE, uri);
        if let Some(session_id) = session_id {
            builder = builder.header(COOKIE, self.cookie_header(session_id));
        }
        let request = builder.body(Body::empty()).expect("Failed to build request");
        self.send(request).await
    }

    /// Simulate the pod redirecting back with an authorization code
    pub async fn callback(
        &self,
        diaspora_id: &str,
        code: &str,
        session_id: Option<&str>,
    ) -> TestResponse {
        let uri = format!(
            "{}?code={}&diaspora_id={}",
            self.settings.callback_path(),
            code,
            diaspora_id
        );
        match session_id {
            Some(session_id) => self.get_with_cookie(uri, session_id).await,
            None => self.get(uri).await,
        }
    }

    fn cookie_header(&self, session_id: &str) -> String {
        format!("{}={}", self.settings.session.cookie_name, session_id)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse {
            status,
            headers,
            json,
            cookie_name: self.settings.session.cookie_name.clone(),
        }
    }

    /// Pod registration answering with `client_id`, expected `expected_calls` times
    pub async fn mock_registration(&self, client_id: &str, expected_calls: u64) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/oauth/token"))
            .and(matchers::body_string_contains("type=client_associate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "client_id": client_id,
                "client_secret": format!("{client_id}-secret"),
            })))
            .expect(expected_calls)
            .mount(&self.pod_mock)
            .await;
    }

    /// Code exchange handing out `token`. Takes precedence over the
    /// registration mock, whose body matcher also matches exchanges.
    pub async fn mock_token_exchange(&self, token: &str, expected_calls: u64) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/oauth/token"))
            .and(matchers::body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": token,
                "refresh_token": format!("refresh-{token}"),
                "expires_in": 3600,
                "token_type": "bearer",
            })))
            .with_priority(1)
            .expect(expected_calls)
            .mount(&self.pod_mock)
            .await;
    }

    /// `GET /api/v0/me` answering with `uid` for `token`
    pub async fn mock_me(&self, token: &str, uid: &str) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/v0/me"))
            .and(matchers::header("authorization", format!("Bearer {token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "uid": uid })))
            .mount(&self.pod_mock)
            .await;
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
    cookie_name: String,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Redirect target
    pub fn location(&self) -> &str {
        self.headers
            .get(LOCATION)
            .expect("Response has no Location header")
            .to_str()
            .expect("Location header is not ASCII")
    }

    /// Session id set by the response, if any
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.to_string())
    }
}
