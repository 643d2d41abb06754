//! Axum router, shared state and the bearer identity gate.

use crate::analysis::QueryAnalyzer;
use crate::models::ApiResponse;
use crate::server::handlers;
use crate::store::Database;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use sha2::{Digest, Sha256};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<dyn QueryAnalyzer>,
    pub database: Arc<Database>,
    pub bearer_token: Option<String>,
    pub model_name: String,
    pub request_timeout: Duration,
}

/// Compare tokens through their digests so the comparison time does not
/// depend on where the first differing byte is.
fn token_matches(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Reject requests without the configured bearer token.
async fn require_bearer(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let Some(expected) = state.bearer_token.as_deref() else {
        return next.run(req).await;
    };

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token_matches(token, expected));

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::err("Unauthorized")),
        )
            .into_response();
    }

    next.run(req).await
}

/// Build the application router.
///
/// `/api/analyze` is left out of the request timeout: the model client has
/// its own timeout and answers with the placeholder analysis when it fires.
pub fn build_app(state: AppState) -> Router {
    let analyze = Router::new()
        .route(
            "/api/analyze",
            get(handlers::analyze_get).post(handlers::analyze_post),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/info", get(handlers::info))
        .route("/api/auth/sign-up", post(handlers::sign_up))
        .route("/api/auth/sign-in", post(handlers::sign_in))
        .layer(TimeoutLayer::new(state.request_timeout))
        .merge(analyze)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn start_server(bind: SocketAddr, state: AppState) -> Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", bind))?;

    info!("Starting HTTP server on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisResponse;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Analyzer that echoes the query into the placeholder text.
    #[derive(Default)]
    struct StubAnalyzer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryAnalyzer for StubAnalyzer {
        async fn analyze(&self, query: &str) -> AnalysisResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut analysis = AnalysisResponse::unavailable(query);
            analysis.summary = format!("stub summary for {}", query);
            analysis
        }
    }

    /// Analyzer slower than the server's request timeout.
    struct SlowAnalyzer {
        delay: Duration,
    }

    #[async_trait]
    impl QueryAnalyzer for SlowAnalyzer {
        async fn analyze(&self, query: &str) -> AnalysisResponse {
            tokio::time::sleep(self.delay).await;
            AnalysisResponse::unavailable(query)
        }
    }

    struct Harness {
        _dir: TempDir,
        analyzer: Arc<StubAnalyzer>,
        app: Router,
    }

    fn state_with(
        dir: &TempDir,
        analyzer: Arc<dyn QueryAnalyzer>,
        db_path: Option<&str>,
        bearer_token: Option<&str>,
    ) -> AppState {
        let path = match db_path {
            Some(p) => p.to_string(),
            None => dir.path().join("users.db").to_string_lossy().into_owned(),
        };
        AppState {
            analyzer,
            database: Arc::new(Database::new(path)),
            bearer_token: bearer_token.map(String::from),
            model_name: "stub-model".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn harness_with(db_path: Option<&str>, bearer_token: Option<&str>) -> Harness {
        let dir = TempDir::new().unwrap();
        let analyzer = Arc::new(StubAnalyzer::default());
        let state = state_with(&dir, analyzer.clone(), db_path, bearer_token);
        Harness {
            _dir: dir,
            analyzer,
            app: build_app(state),
        }
    }

    fn harness() -> Harness {
        harness_with(None, None)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let response = h.app.clone().oneshot(get_req("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_info_reports_lazy_database() {
        let h = harness();
        let (status, body) = send(&h.app, get_req("/info")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"], "stub-model");
        assert_eq!(body["database"]["connected"], false);
    }

    #[tokio::test]
    async fn test_analyze_get() {
        let h = harness();
        let (status, body) = send(&h.app, get_req("/api/analyze?q=edge%20AI")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["summary"], "stub summary for edge AI");
        assert!(body["data"]["graphs"]["hype_curve"]["series"].is_array());
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analyze_get_missing_query() {
        let h = harness();
        for uri in ["/api/analyze", "/api/analyze?q="] {
            let (status, body) = send(&h.app, get_req(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                body,
                json!({ "success": false, "error": "Query parameter \"q\" is required" })
            );
        }
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_analyze_post() {
        let h = harness();
        let (status, body) = send(
            &h.app,
            post_json("/api/analyze", json!({ "query": "lidar" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["generated_text"], "Unable to analyze \"lidar\".");
    }

    #[tokio::test]
    async fn test_analyze_post_missing_query() {
        let h = harness();
        let (status, body) = send(&h.app, post_json("/api/analyze", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Query field is required in request body");
    }

    #[tokio::test]
    async fn test_analyze_post_malformed_body() {
        let h = harness();
        let req = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_bearer_gate() {
        let h = harness_with(None, Some("secret"));

        let (status, body) = send(&h.app, get_req("/api/analyze?q=x")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let req = Request::builder()
            .uri("/api/analyze?q=x")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&h.app, req).await.0, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/api/analyze?q=x")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&h.app, req).await.0, StatusCode::OK);

        // Open routes stay reachable.
        assert_eq!(send(&h.app, get_req("/info")).await.0, StatusCode::OK);
    }

    fn sign_up_body() -> Value {
        json!({
            "username": "AdaL",
            "email": "ada@example.com",
            "name": "Ada Lovelace",
            "password": "analytical-engine"
        })
    }

    #[tokio::test]
    async fn test_sign_up_flow() {
        let h = harness();

        let (status, body) = send(&h.app, post_json("/api/auth/sign-up", sign_up_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "User created successfully");
        assert_eq!(body["user"]["username"], "adal");
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = send(&h.app, post_json("/api/auth/sign-up", sign_up_body())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "User already exists");
    }

    #[tokio::test]
    async fn test_sign_up_missing_fields() {
        let h = harness();
        let mut body = sign_up_body();
        body.as_object_mut().unwrap().remove("email");
        let (status, body) = send(&h.app, post_json("/api/auth/sign-up", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required fields");
    }

    #[tokio::test]
    async fn test_sign_up_without_database() {
        let h = harness_with(Some(""), None);
        let (status, body) = send(&h.app, post_json("/api/auth/sign-up", sign_up_body())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn test_sign_in() {
        let h = harness();
        send(&h.app, post_json("/api/auth/sign-up", sign_up_body())).await;

        let (status, body) = send(
            &h.app,
            post_json(
                "/api/auth/sign-in",
                json!({ "login": "ADA@example.com", "password": "analytical-engine" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "ada@example.com");

        let (status, body) = send(
            &h.app,
            post_json(
                "/api/auth/sign-in",
                json!({ "login": "adal", "password": "nope" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("secreT", "secret"));
        assert!(!token_matches("secret-longer", "secret"));
        assert!(!token_matches("", "secret"));
    }

    #[tokio::test]
    async fn test_slow_analysis_outlives_request_timeout() {
        let dir = TempDir::new().unwrap();
        let analyzer = Arc::new(SlowAnalyzer {
            delay: Duration::from_millis(300),
        });
        let mut state = state_with(&dir, analyzer, None, None);
        state.request_timeout = Duration::from_millis(50);
        let app = build_app(state);

        let (status, body) = send(&app, get_req("/api/analyze?q=x")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["generated_text"], "Unable to analyze \"x\".");

        let (status, _) = send(&app, post_json("/api/analyze", json!({ "query": "x" }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_post_without_content_type() {
        let h = harness();
        let req = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .body(Body::from(r#"{"query":"lidar"}"#))
            .unwrap();
        let (status, body) = send(&h.app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["summary"], "stub summary for lidar");

        let req = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "text/plain;charset=UTF-8")
            .body(Body::from(r#"{"query":"lidar"}"#))
            .unwrap();
        assert_eq!(send(&h.app, req).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyze_post_query_wrong_type() {
        let h = harness();
        let (status, body) = send(&h.app, post_json("/api/analyze", json!({ "query": 42 }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
        assert_eq!(h.analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sign_up_without_content_type() {
        let h = harness();
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/sign-up")
            .body(Body::from(sign_up_body().to_string()))
            .unwrap();
        assert_eq!(send(&h.app, req).await.0, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_sign_in_missing_fields() {
        let h = harness();
        for body in [
            json!({ "login": "", "password": "analytical-engine" }),
            json!({ "login": "adal", "password": "   " }),
            json!({ "login": "adal" }),
        ] {
            let (status, body) = send(&h.app, post_json("/api/auth/sign-in", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["message"], "Missing required fields");
        }
    }

    #[tokio::test]
    async fn test_sign_in_unknown_user() {
        let h = harness();
        let (status, body) = send(
            &h.app,
            post_json(
                "/api/auth/sign-in",
                json!({ "login": "nobody@example.com", "password": "analytical-engine" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_sign_in_records_login() {
        let h = harness();
        let (_, created) = send(&h.app, post_json("/api/auth/sign-up", sign_up_body())).await;
        let created_login = created["user"]["last_login"].as_str().unwrap().to_string();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let (status, body) = send(
            &h.app,
            post_json(
                "/api/auth/sign-in",
                json!({ "login": "adal", "password": "analytical-engine" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Signed in");

        let signed_in = body["user"]["last_login"].as_str().unwrap();
        let before = chrono::DateTime::parse_from_rfc3339(&created_login).unwrap();
        let after = chrono::DateTime::parse_from_rfc3339(signed_in).unwrap();
        assert!(after > before);
        assert_eq!(body["user"]["updated_at"], body["user"]["last_login"]);
        assert_eq!(body["user"]["created_at"], created["user"]["created_at"]);
    }

    #[tokio::test]
    async fn test_sign_in_username_shadowed_by_email() {
        let h = harness();
        let alice = json!({
            "username": "alice",
            "email": "bob@x.com",
            "name": "Alice",
            "password": "alice-password"
        });
        let bob = json!({
            "username": "bob@x.com",
            "email": "bob@elsewhere.com",
            "name": "Bob",
            "password": "bob-password"
        });
        assert_eq!(send(&h.app, post_json("/api/auth/sign-up", alice)).await.0, StatusCode::CREATED);
        assert_eq!(send(&h.app, post_json("/api/auth/sign-up", bob)).await.0, StatusCode::CREATED);

        let (status, body) = send(
            &h.app,
            post_json(
                "/api/auth/sign-in",
                json!({ "login": "bob@x.com", "password": "bob-password" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Bob");
    }
}
