//! REST API for the agent server

use crate::extract::{extract, CommandCandidate};
use crate::gate::{ExecutionGate, EXECUTION_DISABLED};
use crate::runner::{locate_executable, InferenceOutcome, ModelRunner};
use crate::{AgentConfig, ExecutionPolicy};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const SERVICE_NAME: &str = "SimpleBrain LLM API";

/// Upper bound on prompt length, in characters
pub const MAX_PROMPT_CHARS: usize = 10_000;

pub const EMPTY_OUTPUT_MESSAGE: &str =
    "Error: LLM produced no output. This might indicate a model loading issue.";

/// API state
pub struct ApiState {
    pub config: AgentConfig,
    pub runner: Arc<dyn ModelRunner>,
    pub gate: ExecutionGate,
}

impl ApiState {
    pub fn new(config: AgentConfig, runner: Arc<dyn ModelRunner>) -> Self {
        let gate = ExecutionGate::new(
            config.execution_policy,
            Duration::from_secs(config.command_timeout_secs),
        );
        Self {
            config,
            runner,
            gate,
        }
    }
}

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Prompt not provided")]
    MissingPrompt,

    #[error("Empty prompt provided")]
    EmptyPrompt,

    #[error("Prompt too long (max 10000 characters)")]
    PromptTooLong,

    #[error("LLM processing failed: {0}")]
    Inference(InferenceOutcome),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingPrompt | ApiError::EmptyPrompt | ApiError::PromptTooLong => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Inference(InferenceOutcome::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Inference(
                InferenceOutcome::ExecutableNotFound | InferenceOutcome::ModelNotFound,
            ) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Request to the agent endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Response from the agent endpoint
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub llm_response: String,
    pub executed_command: Option<String>,
    pub command_result: Option<String>,
}

/// Liveness response for `/`
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Detailed health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub model_path: Option<String>,
    pub model_exists: bool,
    pub llama_executable: Option<String>,
    pub llama_exists: bool,
    pub environment: EnvironmentInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub instance_name: String,
    pub model_type: String,
    pub api_port: String,
}

/// Create the API router
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/api/agent", post(agent_prompt))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health check including model and executable availability
async fn health_check(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<HealthResponse>) {
    let config = &state.config;
    let model_exists = config
        .model_path
        .as_deref()
        .map(|p| p.exists())
        .unwrap_or(false);
    let executable = locate_executable(&config.inference.executable_paths);
    let llama_exists = executable.is_some();
    let healthy = model_exists && llama_exists;

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        service: SERVICE_NAME.to_string(),
        model_path: config.model_path.as_ref().map(|p| p.display().to_string()),
        model_exists,
        llama_executable: executable.map(|p| p.display().to_string()),
        llama_exists,
        environment: EnvironmentInfo {
            instance_name: config.instance_name.clone(),
            model_type: config.model_type.clone(),
            api_port: config.api_port.to_string(),
        },
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

async fn agent_prompt(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<AgentRequest>, JsonRejection>,
) -> Result<Json<AgentResponse>, ApiError> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected agent request body");
            return Err(ApiError::MissingPrompt);
        }
    };

    let response = handle(&state, request.prompt.as_deref()).await?;
    Ok(Json(response))
}

/// Validate, run the model, then extract and gate any directive
pub async fn handle(state: &ApiState, prompt: Option<&str>) -> Result<AgentResponse, ApiError> {
    let prompt = validate_prompt(prompt)?;
    let full_prompt = build_prompt(prompt, state.gate.policy());

    let llm_response = match state.runner.generate(&full_prompt).await {
        InferenceOutcome::Success(text) => text,
        InferenceOutcome::Empty => {
            warn!(runner = state.runner.name(), "Model produced no output");
            return Ok(AgentResponse {
                llm_response: EMPTY_OUTPUT_MESSAGE.to_string(),
                executed_command: None,
                command_result: Some(idle_result(&state.gate, &CommandCandidate::none())),
            });
        }
        failure => {
            error!(runner = state.runner.name(), outcome = %failure, "LLM interface error");
            return Err(ApiError::Inference(failure));
        }
    };

    let candidate = extract(&llm_response);
    if let Some(command) = &candidate.command {
        info!(command = %command, "Found command in model output");
    }

    let (executed_command, command_result) = match state.gate.maybe_execute(&candidate).await {
        Some(result) => (Some(result.command), Some(result.output)),
        None => (None, Some(idle_result(&state.gate, &candidate))),
    };

    Ok(AgentResponse {
        llm_response,
        executed_command,
        command_result,
    })
}

/// `command_result` when nothing ran: the disabled marker or the extractor note
fn idle_result(gate: &ExecutionGate, candidate: &CommandCandidate) -> String {
    if gate.is_enabled() {
        candidate.note().to_string()
    } else {
        EXECUTION_DISABLED.to_string()
    }
}

fn validate_prompt(prompt: Option<&str>) -> Result<&str, ApiError> {
    let prompt = prompt.ok_or(ApiError::MissingPrompt)?;

    if prompt.trim().is_empty() {
        return Err(ApiError::EmptyPrompt);
    }

    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ApiError::PromptTooLong);
    }

    Ok(prompt)
}

/// Wrap the user prompt in the instruction template for the policy
pub fn build_prompt(prompt: &str, policy: ExecutionPolicy) -> String {
    match policy {
        ExecutionPolicy::Disabled => format!(
            "You are a helpful AI assistant. Your goal is to answer the user's question clearly \
             and concisely. User request: {}\n\nAssistant:",
            prompt
        ),
        ExecutionPolicy::Enabled => format!(
            "You are a helpful AI assistant. Your goal is to answer the user's question or \
             execute a command to satisfy their request. If a shell command is needed, \
             provide it inside [CMD]...[/CMD] tags.\n\nUser request: {}\n\nAssistant:",
            prompt
        ),
    }
}

async fn not_found() -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "Endpoint not found".to_string(),
        }),
    )
}
