// gatehouse-server/tests/auth_api.rs
// ============================================================================
// Module: Auth API Tests
// Description: End-to-end tests for the authorization and admin APIs.
// Purpose: Validate status codes, headers, and flows over real HTTP.
// Dependencies: gatehouse-core, gatehouse-server, reqwest, tokio
// ============================================================================

//! Authorization API integration tests. Each test spawns the axum app on an
//! ephemeral port and drives it with a plain HTTP client, the way the
//! front-end server would.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

use std::net::SocketAddr;
use std::sync::Arc;

use gatehouse_core::DirectoryStore;
use gatehouse_core::LoginTokenCodec;
use gatehouse_core::OpenAccessMode;
use gatehouse_core::SharedDirectoryStore;
use gatehouse_core::SiteId;
use gatehouse_core::runtime::InMemoryDirectoryStore;
use gatehouse_server::AppState;
use gatehouse_server::AuditLoginMailer;
use gatehouse_server::GatehouseConfig;
use gatehouse_server::InMemorySessionStore;
use gatehouse_server::NoopAuditSink;
use gatehouse_server::router;
use reqwest::StatusCode;

/// Site URL used by every test.
const SITE_URL: &str = "https://site.example";

/// Site id used by every test.
const SITE_ID: &str = "test-site";

/// Signing secret used by every test.
const SECRET: &str = "0123456789abcdef0123456789abcdef";

/// A spawned test server with its store handle.
struct TestServer {
    /// Base URL of the spawned app.
    base: String,
    /// Directory store behind the app.
    store: SharedDirectoryStore,
    /// Codec sharing the server's secret.
    codec: LoginTokenCodec,
    /// Plain client without redirect following.
    client: reqwest::Client,
}

impl TestServer {
    /// Spawns the app on an ephemeral port with one configured site.
    async fn start() -> Self {
        let config: GatehouseConfig = toml::from_str(&format!(
            "[server]\nbind = \"127.0.0.1:0\"\nsecret = \"{SECRET}\"\n"
        ))
        .expect("config parses");
        let store = SharedDirectoryStore::from_store(InMemoryDirectoryStore::new());
        let site_id = SiteId::new(SITE_ID);
        store.create_site(&site_id).unwrap();
        store.create_alias(&site_id, SITE_URL).unwrap();
        let state = Arc::new(AppState::new(
            config,
            store.clone(),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(AuditLoginMailer::new(Arc::new(NoopAuditSink))),
            Arc::new(NoopAuditSink),
        ));
        let app = router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        Self {
            base: format!("http://{addr}"),
            store,
            codec: LoginTokenCodec::new(SECRET.as_bytes().to_vec()),
            client,
        }
    }

    /// Returns the configured site id.
    fn site_id(&self) -> SiteId {
        SiteId::new(SITE_ID)
    }

    /// Sends an auth request for a raw path, with optional session cookie.
    async fn is_authorized(&self, raw_path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .get(format!("{}/auth/api/is-authorized/?path={raw_path}", self.base))
            .header("Site-Url", SITE_URL);
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await.unwrap()
    }

    /// Logs a user in through a freshly issued token, returning the session
    /// cookie pair.
    async fn login(&self, email: &str) -> String {
        let now = i64::try_from(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs(),
        )
        .unwrap();
        let token = self.codec.issue(&self.site_id(), SITE_URL, email, now).unwrap();
        let response = self
            .client
            .get(format!("{}/auth/api/login/?token={token}&next=/dest", self.base))
            .header("Site-Url", SITE_URL)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get("location").unwrap(), "/dest");
        let set_cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    /// Fetches a CSRF token and returns (cookie, token).
    async fn csrf(&self) -> (String, String) {
        let response = self
            .client
            .post(format!("{}/auth/api/csrftoken/", self.base))
            .header("Site-Url", SITE_URL)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get("set-cookie")
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let body: serde_json::Value = response.json().await.unwrap();
        let token = body["csrfToken"].as_str().unwrap().to_string();
        (cookie, token)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn anonymous_request_to_protected_path_is_401() {
    let server = TestServer::start().await;
    server.store.create_location(&server.site_id(), "/protected").unwrap();
    let response = server.is_authorized("/protected", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get("www-authenticate").unwrap(), "VerifiedEmail");
    assert!(response.headers().get("user").is_none());
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-cache, no-store, must-revalidate, max-age=0"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn open_no_login_location_is_200_for_everyone() {
    let server = TestServer::start().await;
    let location = server.store.create_location(&server.site_id(), "/pub").unwrap();
    server
        .store
        .set_open_access(&server.site_id(), &location.uuid, OpenAccessMode::OpenNoLogin)
        .unwrap();
    let response = server.is_authorized("/pub/page", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("user").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_paths_are_400_before_any_lookup() {
    let server = TestServer::start().await;
    for raw in ["/foo/../bar", "relative", "/foo/./bar", "/%2e%2e/x"] {
        let response = server.is_authorized(raw, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "path {raw}");
    }
    let response = server
        .client
        .get(format!("{}/auth/api/is-authorized/", server.base))
        .header("Site-Url", SITE_URL)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn forged_user_header_is_rejected() {
    let server = TestServer::start().await;
    let response = server
        .client
        .get(format!("{}/auth/api/is-authorized/?path=/", server.base))
        .header("Site-Url", SITE_URL)
        .header("User", "admin@example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_site_url_is_400() {
    let server = TestServer::start().await;
    let response = server
        .client
        .get(format!("{}/auth/api/is-authorized/?path=/", server.base))
        .header("Site-Url", "https://other.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn login_grants_access_and_surfaces_the_email() {
    let server = TestServer::start().await;
    let site_id = server.site_id();
    let location = server.store.create_location(&site_id, "/app").unwrap();
    let user = server.store.create_user(&site_id, "u@example.com").unwrap();
    server.store.grant_access(&site_id, &location.uuid, &user.uuid).unwrap();

    let cookie = server.login("u@example.com").await;
    let response = server.is_authorized("/app/page", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("user").unwrap(), "u@example.com");

    let response = server.is_authorized("/elsewhere", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers().get("user").unwrap(), "u@example.com");
}

#[tokio::test(flavor = "multi_thread")]
async fn login_with_bad_token_is_400() {
    let server = TestServer::start().await;
    let response = server
        .client
        .get(format!("{}/auth/api/login/?token=garbage", server.base))
        .header("Site-Url", SITE_URL)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn login_of_unknown_user_is_403_on_closed_sites() {
    let server = TestServer::start().await;
    server.store.create_location(&server.site_id(), "/app").unwrap();
    let now = i64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs(),
    )
    .unwrap();
    let token =
        server.codec.issue(&server.site_id(), SITE_URL, "nobody@example.com", now).unwrap();
    let response = server
        .client
        .get(format!("{}/auth/api/login/?token={token}", server.base))
        .header("Site-Url", SITE_URL)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn login_creates_users_for_open_with_login_sites() {
    let server = TestServer::start().await;
    let site_id = server.site_id();
    let location = server.store.create_location(&site_id, "/").unwrap();
    server
        .store
        .set_open_access(&site_id, &location.uuid, OpenAccessMode::OpenWithLogin)
        .unwrap();
    let cookie = server.login("newcomer@example.com").await;
    assert!(server.store.find_user_by_email(&site_id, "newcomer@example.com").unwrap().is_some());
    let response = server.is_authorized("/anything", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("user").unwrap(), "newcomer@example.com");
}

#[tokio::test(flavor = "multi_thread")]
async fn sessions_do_not_leak_across_sites() {
    let server = TestServer::start().await;
    let other = SiteId::new("other-site");
    server.store.create_site(&other).unwrap();
    server.store.create_alias(&other, "https://other.example").unwrap();
    let location = server.store.create_location(&other, "/").unwrap();
    server
        .store
        .set_open_access(&other, &location.uuid, OpenAccessMode::OpenWithLogin)
        .unwrap();

    let site_id = server.site_id();
    let app = server.store.create_location(&site_id, "/app").unwrap();
    let user = server.store.create_user(&site_id, "u@example.com").unwrap();
    server.store.grant_access(&site_id, &app.uuid, &user.uuid).unwrap();
    let cookie = server.login("u@example.com").await;

    // The session belongs to test-site; presenting it to the other site must
    // resolve to anonymous.
    let (csrf_cookie, csrf_token) = server.csrf().await;
    let response = server
        .client
        .get(format!("{}/auth/api/whoami/", server.base))
        .header("Site-Url", "https://other.example")
        .header("Cookie", format!("{cookie}; {csrf_cookie}"))
        .header("X-CSRFToken", &csrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = server
        .client
        .get(format!("{}/auth/api/whoami/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Cookie", format!("{cookie}; {csrf_cookie}"))
        .header("X-CSRFToken", &csrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn logout_requires_csrf_and_clears_the_session() {
    let server = TestServer::start().await;
    let site_id = server.site_id();
    let location = server.store.create_location(&site_id, "/app").unwrap();
    let user = server.store.create_user(&site_id, "u@example.com").unwrap();
    server.store.grant_access(&site_id, &location.uuid, &user.uuid).unwrap();
    let session_cookie = server.login("u@example.com").await;

    // Without the CSRF token pair the logout is rejected.
    let response = server
        .client
        .post(format!("{}/auth/api/logout/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Cookie", &session_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (csrf_cookie, csrf_token) = server.csrf().await;
    let response = server
        .client
        .post(format!("{}/auth/api/logout/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Cookie", format!("{session_cookie}; {csrf_cookie}"))
        .header("X-CSRFToken", &csrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server.is_authorized("/app", Some(&session_cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn admin_api_manages_the_acl_behind_csrf() {
    let server = TestServer::start().await;
    let (csrf_cookie, csrf_token) = server.csrf().await;

    // Mutations without the token pair are rejected.
    let response = server
        .client
        .post(format!("{}/admin/api/locations/", server.base))
        .header("Site-Url", SITE_URL)
        .json(&serde_json::json!({"path": "/wiki"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = server
        .client
        .post(format!("{}/admin/api/locations/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .json(&serde_json::json!({"path": "/wiki"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location: serde_json::Value = response.json().await.unwrap();
    assert_eq!(location["path"], "/wiki");
    let location_id = location["id"].as_str().unwrap().strip_prefix("urn:uuid:").unwrap();

    let response = server
        .client
        .post(format!("{}/admin/api/users/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .json(&serde_json::json!({"email": "Member@Example.Com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let user: serde_json::Value = response.json().await.unwrap();
    assert_eq!(user["email"], "member@example.com");
    let user_id = user["id"].as_str().unwrap().strip_prefix("urn:uuid:").unwrap();

    // First grant creates; the second answers 200 with the same edge.
    let grant_url = format!(
        "{}/admin/api/locations/{location_id}/allowed-users/{user_id}/",
        server.base
    );
    let response = server
        .client
        .put(&grant_url)
        .header("Site-Url", SITE_URL)
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = server
        .client
        .put(&grant_url)
        .header("Site-Url", SITE_URL)
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The grant is immediately visible to the authorization endpoint.
    let cookie = server.login("member@example.com").await;
    let response = server.is_authorized("/wiki/page", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Revoking flips the decision back to 403.
    let response = server
        .client
        .delete(&grant_url)
        .header("Site-Url", SITE_URL)
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = server.is_authorized("/wiki/page", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Revoking a revoked edge is a 404.
    let response = server
        .client
        .delete(&grant_url)
        .header("Site-Url", SITE_URL)
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn cross_origin_mutations_are_rejected() {
    let server = TestServer::start().await;
    let (csrf_cookie, csrf_token) = server.csrf().await;
    let response = server
        .client
        .post(format!("{}/admin/api/locations/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Origin", "https://evil.example")
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .json(&serde_json::json!({"path": "/x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn send_token_validates_the_email() {
    let server = TestServer::start().await;
    let (csrf_cookie, csrf_token) = server.csrf().await;
    let response = server
        .client
        .post(format!("{}/auth/api/send-token/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .json(&serde_json::json!({"email": "u@example.com", "path": "/return"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = server
        .client
        .post(format!("{}/auth/api/send-token/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Cookie", &csrf_cookie)
        .header("X-CSRFToken", &csrf_token)
        .json(&serde_json::json!({"email": "not-an-email"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn whoami_reports_the_signed_in_user() {
    let server = TestServer::start().await;
    let site_id = server.site_id();
    let location = server.store.create_location(&site_id, "/app").unwrap();
    let user = server.store.create_user(&site_id, "u@example.com").unwrap();
    server.store.grant_access(&site_id, &location.uuid, &user.uuid).unwrap();
    let session_cookie = server.login("u@example.com").await;
    let (csrf_cookie, csrf_token) = server.csrf().await;
    let response = server
        .client
        .get(format!("{}/auth/api/whoami/", server.base))
        .header("Site-Url", SITE_URL)
        .header("Cookie", format!("{session_cookie}; {csrf_cookie}"))
        .header("X-CSRFToken", &csrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["email"], "u@example.com");
}
