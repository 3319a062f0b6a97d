//! Authenticated transport tests against a mock API server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use quire_core::error::{AuthError, Error};
use quire_core::{
    ACCESS_TOKEN_KEY, ApiUrl, Credentials, MemoryTokenStore, REFRESH_TOKEN_KEY, TokenPair,
    TokenStore,
};
use quire_http::{ApiRequest, AuthSession, AuthenticatedTransport, HttpClient};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_url(server: &MockServer) -> ApiUrl {
    ApiUrl::new(format!("{}/api/v1", server.uri())).unwrap()
}

fn seeded_store() -> Arc<MemoryTokenStore> {
    let store = Arc::new(MemoryTokenStore::new());
    store
        .save(&TokenPair::new("old-access", "old-refresh"))
        .unwrap();
    store
}

fn transport(server: &MockServer, store: Arc<MemoryTokenStore>) -> AuthenticatedTransport {
    let session = AuthSession::init(HttpClient::new(api_url(server)), store).unwrap();
    AuthenticatedTransport::new(session)
}

async fn mount_projects(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/projects"))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/projects"))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "p1"}])))
        .mount(server)
        .await;
}

/// Wait until a request has started the shared refresh.
async fn wait_for_refresh(session: &AuthSession) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !session.is_refreshing() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("refresh never started");
}

fn refresh_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "new-access",
        "refresh_token": "new-refresh",
        "token_type": "bearer"
    }))
}

// ============================================================================
// Login / Logout
// ============================================================================

#[tokio::test]
async fn test_login_success_persists_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .and(body_json(json!({
            "email": "alice@example.com",
            "password": "secret123"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {
                "id": "u-1",
                "email": "alice@example.com",
                "full_name": "Alice Chen",
                "role": "editor"
            },
            "tokens": {
                "access_token": "a-1",
                "refresh_token": "r-1",
                "token_type": "bearer"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let session = AuthSession::init(HttpClient::new(api_url(&server)), store.clone()).unwrap();

    let user = session
        .login(Credentials::new("alice@example.com", "secret123"))
        .await
        .unwrap();

    assert_eq!(user.full_name, "Alice Chen");
    assert!(session.is_authenticated());
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a-1"));
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r-1"));
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Incorrect email or password"})),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let session = AuthSession::init(HttpClient::new(api_url(&server)), store.clone()).unwrap();

    let err = session
        .login(Credentials::new("alice@example.com", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
    assert!(err.requires_login());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_logout_removes_authorization_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = seeded_store();
    let transport = transport(&server, store.clone());

    transport.session().logout().unwrap();
    let _: Value = transport.get_json("templates").await.unwrap();

    assert!(store.is_empty());
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_bearer_attached_and_query_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/projects"))
        .and(query_param("page", "2"))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server, seeded_store());
    let body: Value = transport
        .send_json(ApiRequest::get("projects").with_query("page", "2"))
        .await
        .unwrap();

    assert_eq!(body, json!({"items": []}));
}

#[tokio::test]
async fn test_non_401_errors_pass_through() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/projects/missing"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Project not found"})),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(refresh_ok())
        .expect(0)
        .mount(&server)
        .await;

    let transport = transport(&server, seeded_store());

    let response = transport
        .dispatch(ApiRequest::get("projects/missing"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let err = transport
        .get_json::<Value>("projects/missing")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "protocol error: HTTP 404: Project not found");
}

#[tokio::test]
async fn test_put_and_delete() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/sections/s1"))
        .and(body_json(json!({"title": "Budget"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "s1", "title": "Budget"})))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/sections/s1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server, seeded_store());

    let updated: Value = transport
        .put_json("sections/s1", &json!({"title": "Budget"}))
        .await
        .unwrap();
    assert_eq!(updated["title"], "Budget");

    transport.delete("sections/s1").await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind and release a port so nothing is listening on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = ApiUrl::new(format!("http://127.0.0.1:{port}/api/v1")).unwrap();

    let session = AuthSession::init(HttpClient::new(url), seeded_store()).unwrap();
    let transport = AuthenticatedTransport::new(session);

    let err = transport.get_json::<Value>("projects").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_current_user() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/auth/me"))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-1",
            "email": "alice@example.com",
            "full_name": "Alice Chen",
            "role": "admin",
            "is_active": true
        })))
        .mount(&server)
        .await;

    let transport = transport(&server, seeded_store());
    let user = transport.current_user().await.unwrap();

    assert_eq!(user.id, "u-1");
    assert_eq!(user.role, "admin");
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_and_replay() {
    let server = MockServer::start().await;
    mount_projects(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .and(body_json(json!({"refresh_token": "old-refresh"})))
        .respond_with(refresh_ok())
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store();
    let transport = transport(&server, store.clone());

    let projects: Value = transport.get_json("projects").await.unwrap();

    assert_eq!(projects, json!([{"id": "p1"}]));
    assert_eq!(
        store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
        Some("new-access")
    );
    assert_eq!(
        store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("new-refresh")
    );
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    mount_projects(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(refresh_ok().set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server, seeded_store());

    let results = join_all((0..5).map(|_| transport.get_json::<Value>("projects"))).await;

    for result in results {
        assert_eq!(result.unwrap(), json!([{"id": "p1"}]));
    }
    assert!(!transport.session().is_refreshing());

    // Five rejected requests plus five replays.
    let gets = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(gets, 10);
}

#[tokio::test]
async fn test_concurrent_refresh_failure_expires_everyone() {
    let server = MockServer::start().await;
    mount_projects(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Invalid refresh token"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store();
    let transport = transport(&server, store.clone());

    let results = join_all((0..5).map(|_| transport.get_json::<Value>("projects"))).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(
            matches!(err, Error::Auth(AuthError::SessionExpired { .. })),
            "got {err:?}"
        );
        assert!(err.requires_login());
    }
    assert!(!transport.session().is_authenticated());
    assert!(store.is_empty());

    // Anything sent after the failure goes out without credentials.
    let _ = transport.get_json::<Value>("projects").await;
    let requests = server.received_requests().await.unwrap();
    let last = requests.last().unwrap();
    assert_eq!(last.url.path(), "/api/v1/projects");
    assert!(last.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_dropped_leader_interrupts_waiters() {
    let server = MockServer::start().await;
    mount_projects(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(refresh_ok().set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let transport = transport(&server, seeded_store());

    let leader = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.get_json::<Value>("projects").await })
    };
    wait_for_refresh(transport.session()).await;

    let waiter = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.get_json::<Value>("projects").await })
    };
    // Let the waiter's request come back 401 and queue on the refresh.
    tokio::time::sleep(Duration::from_millis(200)).await;

    leader.abort();
    let _ = leader.await;

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter should be released when the leader is dropped")
        .unwrap();

    let err = result.unwrap_err();
    assert!(
        matches!(err, Error::Auth(AuthError::RefreshInterrupted)),
        "got {err:?}"
    );
    assert!(!transport.session().is_refreshing());
}

#[tokio::test]
async fn test_logout_during_refresh_discards_new_tokens() {
    let server = MockServer::start().await;
    mount_projects(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(refresh_ok().set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store();
    let transport = transport(&server, store.clone());

    let request = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.get_json::<Value>("projects").await })
    };
    wait_for_refresh(transport.session()).await;

    transport.session().logout().unwrap();

    let err = request.await.unwrap().unwrap_err();
    assert!(
        matches!(err, Error::Auth(AuthError::SessionExpired { .. })),
        "got {err:?}"
    );
    assert!(store.is_empty());
    assert!(!transport.session().is_authenticated());
    assert!(!transport.session().is_refreshing());
}

#[tokio::test]
async fn test_second_401_is_unauthenticated() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/admin/users"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Not allowed"})))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(refresh_ok())
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server, seeded_store());
    let err = transport.get_json::<Value>("admin/users").await.unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::Unauthenticated)));
    // The refreshed pair is kept; only this request failed.
    assert_eq!(
        transport.session().access_token().unwrap().as_str(),
        "new-access"
    );
}

#[tokio::test]
async fn test_missing_refresh_token_expires_without_network() {
    let server = MockServer::start().await;
    mount_projects(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .respond_with(refresh_ok())
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    store.set(ACCESS_TOKEN_KEY, "old-access").unwrap();
    let transport = transport(&server, store.clone());

    let err = transport.get_json::<Value>("projects").await.unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::SessionExpired { .. })));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_explicit_refresh_rotates_pair() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/refresh"))
        .and(body_json(json!({"refresh_token": "old-refresh"})))
        .respond_with(refresh_ok())
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store();
    let session = AuthSession::init(HttpClient::new(api_url(&server)), store.clone()).unwrap();

    let token = session.refresh().await.unwrap();

    assert_eq!(token.as_str(), "new-access");
    assert_eq!(
        store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
        Some("new-refresh")
    );
}
