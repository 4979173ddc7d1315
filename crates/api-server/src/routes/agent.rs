//! Agent run endpoints

use agent_runner::DsaAgent;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use dsa_core::model::{LeetCodeSite, ModelId};
use dsa_core::run::{RunConfig, ToolCredentials};
use dsa_core::user_id::generate_user_id;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type RouteError = (StatusCode, Json<ErrorResponse>);

fn default_stream() -> bool {
    true
}

fn default_model() -> String {
    ModelId::default().as_str().to_string()
}

#[derive(Deserialize)]
pub struct RunRequest {
    message: String,
    #[serde(default = "default_stream")]
    stream: bool,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    debug_mode: Option<bool>,
    #[serde(default)]
    lc_site: Option<String>,
    #[serde(default)]
    lc_session: Option<String>,
    #[serde(default)]
    gh_token: Option<String>,
    #[serde(default)]
    gemini_api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    response: String,
    session_id: String,
    user_id: String,
}

fn route_error(status: StatusCode, error: impl Into<String>) -> RouteError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn not_found(error: impl std::fmt::Display) -> RouteError {
    route_error(StatusCode::NOT_FOUND, error.to_string())
}

fn internal_error(error: impl std::fmt::Display) -> RouteError {
    route_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Resolve a request into a run config, falling back to the environment
fn run_config(state: &AppState, body: &mut RunRequest) -> Result<RunConfig, RouteError> {
    let settings = state.settings();

    let model: ModelId = body.model.parse().map_err(not_found)?;
    let site = match present(body.lc_site.take()) {
        Some(raw) => raw.parse::<LeetCodeSite>().map_err(not_found)?,
        None => settings.leetcode_site,
    };

    let leetcode_session = present(body.lc_session.take())
        .or_else(|| settings.leetcode_session.clone())
        .unwrap_or_default();
    let github_token = present(body.gh_token.take())
        .or_else(|| settings.github_token.clone())
        .unwrap_or_default();
    let model_api_key = present(body.gemini_api_key.take())
        .or_else(|| settings.model_api_key.clone())
        .unwrap_or_default();

    let user_id = present(body.user_id.take())
        .unwrap_or_else(|| generate_user_id(&leetcode_session, &github_token));
    let session_id =
        present(body.session_id.take()).unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(RunConfig {
        user_id,
        session_id,
        model,
        debug_mode: body.debug_mode.unwrap_or(true),
        model_api_key,
        credentials: ToolCredentials {
            site,
            leetcode_session,
            github_token,
        },
    })
}

async fn create_run(
    State(state): State<AppState>,
    Json(mut body): Json<RunRequest>,
) -> Result<Response, RouteError> {
    tracing::debug!(
        "Run request: stream={}, model={}, message length {}",
        body.stream,
        body.model,
        body.message.len()
    );

    let config = run_config(&state, &mut body)?;
    let session_id = config.session_id.clone();
    let user_id = config.user_id.clone();

    let agent = DsaAgent::new(&state.settings().gateway, config, state.backends().clone())
        .map_err(|e| {
            if e.is_configuration() {
                tracing::warn!("Rejected run request: {}", e);
                not_found(e)
            } else {
                tracing::error!("Failed to build agent: {}", e);
                internal_error(e)
            }
        })?;

    if body.stream {
        let records = agent
            .stream(body.message, CancellationToken::new())
            .map(|record| Event::default().json_data(&record));
        return Ok(Sse::new(records)
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    let response = agent.run(&body.message).await.map_err(|e| {
        tracing::error!("Run failed for session {}: {}", session_id, e);
        internal_error(e)
    })?;

    Ok(Json(RunResponse {
        response,
        session_id,
        user_id,
    })
    .into_response())
}

/// Older clients address the agent by id; there is only one agent.
async fn create_agent_run(
    state: State<AppState>,
    Path(agent_id): Path<String>,
    body: Json<RunRequest>,
) -> Result<Response, RouteError> {
    tracing::debug!("Run request for agent {}", agent_id);
    create_run(state, body).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/agents/run", post(create_run))
        .route("/v1/agents/{agent_id}/runs", post(create_agent_run))
}
