//! HTTP server for the README-update frontend.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/generate` | Run the pipeline for `{repo_url, pr_number}` |
//! | `GET`  | `/search-repos?q=` | First five matching repositories |
//! | `GET`  | `/list-prs?repo=owner/name` | First five open pull request numbers |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /generate` answers `{"response": <text or null>}` with status 200
//! whenever the run completes; `null` means no update was produced, whether
//! generation failed or the model returned nothing.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Invalid repository 'x': expected owner/name" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! Only the origins in `[server].allowed_origins` are allowed, with
//! credentials.

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use readme_rag_core::PipelineError;

use crate::config::{Config, Secrets};
use crate::connector_github::{parse_repo, GitHubClient};
use crate::pipeline::{run_pipeline, PipelineDeps, PipelineRequest};
use crate::traits::PullRequestPublisher;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    deps: PipelineDeps,
    github: Arc<GitHubClient>,
}

impl AppState {
    pub fn new(deps: PipelineDeps, github: GitHubClient) -> Self {
        Self {
            deps,
            github: Arc::new(github),
        }
    }
}

/// Build the router with CORS applied.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let origins = state
        .deps
        .config
        .server
        .allowed_origins
        .iter()
        .map(|o| HeaderValue::from_str(o))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("invalid server.allowed_origins entry: {}", e))?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/generate", post(handle_generate))
        .route("/search-repos", get(handle_search_repos))
        .route("/list-prs", get(handle_list_prs))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state))
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated. This is the entry point used by
/// `readme-rag serve`.
pub async fn run_server(config: &Config, secrets: &Secrets) -> anyhow::Result<()> {
    let github = GitHubClient::new(&config.github, secrets)?;
    let deps = PipelineDeps::from_config(config.clone(), secrets)?;
    let app = router(AppState::new(deps, github))?;

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("readme-rag server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// Invalid configuration is the caller's problem; anything else failed
/// upstream (GitHub unreachable, publication refused).
fn classify(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::InvalidConfiguration(_)) => bad_request(message),
        Some(_) => AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message,
        },
        None => AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "upstream_error",
            message,
        },
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /generate ============

#[derive(Deserialize)]
struct GenerateRequest {
    repo_url: String,
    pr_number: u64,
}

#[derive(Serialize)]
struct GenerateResponse {
    response: Option<String>,
}

async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let repo_ref = parse_repo(&req.repo_url).map_err(|e| bad_request(e.to_string()))?;
    let config = state.deps.config.as_ref();
    let repo = state.github.repository(repo_ref.clone(), &config.github);
    let request = PipelineRequest::new(&repo_ref.to_string(), req.pr_number, config);
    let publisher: Option<&dyn PullRequestPublisher> = if request.publish {
        Some(&repo)
    } else {
        None
    };

    let report = run_pipeline(&state.deps, &repo, publisher, &request)
        .await
        .map_err(classify)?;

    if let Some(pr) = report.published_pr {
        info!(repo = %repo_ref, pr, "README pull request opened");
    }
    Ok(Json(GenerateResponse {
        response: report.outcome.into_text(),
    }))
}

// ============ GET /search-repos ============

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

async fn handle_search_repos(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<String>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let names = state
        .github
        .search_repositories(&params.q)
        .await
        .map_err(|e| {
            warn!(error = %e, "repository search failed");
            classify(e)
        })?;
    Ok(Json(names))
}

// ============ GET /list-prs ============

#[derive(Deserialize)]
struct ListPrsParams {
    repo: String,
}

async fn handle_list_prs(
    State(state): State<AppState>,
    Query(params): Query<ListPrsParams>,
) -> Result<Json<Vec<String>>, AppError> {
    let repo = parse_repo(&params.repo).map_err(|e| bad_request(e.to_string()))?;
    let numbers = state
        .github
        .list_pull_requests(&repo)
        .await
        .map_err(classify)?;
    Ok(Json(numbers.into_iter().map(|n| n.to_string()).collect()))
}
