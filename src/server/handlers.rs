//! Request handlers.

use crate::error::ForecastError;
use crate::models::ApiResponse;
use crate::server::router::AppState;
use crate::store::{NewUser, UserStore};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

/// Query string of `GET /api/analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    #[serde(default)]
    pub q: Option<String>,
}

/// Body of `POST /api/analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeBody {
    #[serde(default)]
    pub query: Option<String>,
}

/// Body of `POST /api/auth/sign-in`. `login` is an email or a username.
#[derive(Debug, Deserialize)]
pub struct SignInBody {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a JSON body regardless of the declared content type.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, serde_json::Error> {
    serde_json::from_slice(body)
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

fn message(status: StatusCode, text: &str) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal Server Error", "error": err.to_string() })),
    )
        .into_response()
}

/// Liveness check.
pub async fn health() -> impl IntoResponse {
    "ok"
}

/// Service information.
pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.model_name,
        "database": {
            "path": state.database.path(),
            "connected": state.database.is_connected()
        },
        "auth_required": state.bearer_token.is_some()
    }))
}

async fn run_analysis(state: &AppState, query: &str) -> Response {
    info!("Analyzing query: {}", query);
    let analysis = state.analyzer.analyze(query).await;
    if analysis.is_unavailable() {
        warn!("Returning placeholder analysis for query: {}", query);
    }
    (StatusCode::OK, Json(ApiResponse::ok(analysis))).into_response()
}

/// `GET /api/analyze?q=...`
pub async fn analyze_get(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeParams>,
) -> Response {
    match non_blank(params.q) {
        Some(query) => run_analysis(&state, &query).await,
        None => api_error(
            StatusCode::BAD_REQUEST,
            "Query parameter \"q\" is required",
        ),
    }
}

/// `POST /api/analyze` with `{ "query": ... }`.
pub async fn analyze_post(
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let body: AnalyzeBody = match parse_body(&body) {
        Ok(body) => body,
        Err(e) => {
            error!("API analysis error: {}", e);
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match non_blank(body.query) {
        Some(query) => run_analysis(&state, &query).await,
        None => api_error(
            StatusCode::BAD_REQUEST,
            "Query field is required in request body",
        ),
    }
}

/// Open the user store, logging instead of failing when the database is down.
async fn user_store(state: &AppState) -> Option<UserStore> {
    match state.database.connect().await {
        Ok(conn) => Some(UserStore::new(conn)),
        Err(e) => {
            error!("Database error: {}", e);
            None
        }
    }
}

/// Redacted bearer subject for logs: the first few characters of the token.
fn bearer_subject(headers: &HeaderMap) -> Option<String> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))?
        .trim();
    if token.is_empty() {
        return None;
    }
    let prefix: String = token.chars().take(4).collect();
    Some(format!("{}***", prefix))
}

/// `POST /api/auth/sign-up`
pub async fn sign_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let store = user_store(&state).await;

    let new_user: NewUser = match parse_body(&body) {
        Ok(body) => body,
        Err(e) => return internal_error(e),
    };

    let valid = match new_user.validate() {
        Ok(valid) => valid,
        Err(e) => return message(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let Some(store) = store else {
        return internal_error("Database unavailable");
    };

    match store
        .find_by_email_or_username(&valid.email, &valid.username)
        .await
    {
        Ok(Some(_)) => return message(StatusCode::CONFLICT, "User already exists"),
        Ok(None) => {}
        Err(e) => return internal_error(e),
    }

    match bearer_subject(&headers) {
        Some(subject) => debug!("Sign-up caller: {}", subject),
        None => debug!("Sign-up caller: anonymous"),
    }

    match store.create(valid).await {
        Ok(user) => {
            info!("User created: {}", user.username);
            (
                StatusCode::CREATED,
                Json(json!({ "message": "User created successfully", "user": user })),
            )
                .into_response()
        }
        Err(ForecastError::Conflict { .. }) => message(StatusCode::CONFLICT, "User already exists"),
        Err(e) => internal_error(e),
    }
}

/// `POST /api/auth/sign-in`
pub async fn sign_in(
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let body: SignInBody = match parse_body(&body) {
        Ok(body) => body,
        Err(e) => return internal_error(e),
    };

    let (Some(login), Some(password)) = (non_blank(body.login), non_blank(body.password)) else {
        return message(StatusCode::BAD_REQUEST, "Missing required fields");
    };

    let Some(store) = user_store(&state).await else {
        return internal_error("Database unavailable");
    };

    let mut user = match store.authenticate(&login, &password).await {
        Ok(Some(user)) => user,
        Ok(None) => return message(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(e) => return internal_error(e),
    };

    if let Err(e) = store.record_login(&mut user).await {
        return internal_error(e);
    }

    info!("User signed in: {}", user.username);
    (
        StatusCode::OK,
        Json(json!({ "message": "Signed in", "user": user })),
    )
        .into_response()
}
