use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    Json, Router,
    extract::{FromRequest, State},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    config::AppConfig,
    engine::GenerationParams,
    error::ServiceError,
    openai::{
        ChatChoice, ChatChunkChoice, ChatCompletionChunk, ChatCompletionResponse, ChatDelta,
        ChatMessage, ChatRequest, CompletionChoice, CompletionRequest, CompletionResponse,
        ModelDescriptor, ModelList, Usage,
    },
    policy::{self, CompletionMode, Language},
    sanitize::filter_sensitive,
    state::ModelState,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub model: Arc<ModelState>,
}

/// `axum::Json` with its rejection routed through [`ServiceError`], so a
/// malformed body gets the same `{"detail": ...}` shape as every other error.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ServiceError))]
struct ApiJson<T>(T);

pub fn build_router(config: Arc<AppConfig>, model: Arc<ModelState>) -> Router {
    let state = AppState { config, model };

    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/completions", post(completions))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.model.available() { "ok" } else { "error" };
    Json(HealthResponse {
        status,
        model: state.model.model_file().to_string(),
    })
}

async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".to_string(),
        data: vec![ModelDescriptor {
            id: state.config.model_name.clone(),
            object: "model".to_string(),
            owned_by: "local".to_string(),
        }],
    })
}

async fn completions(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CompletionRequest>,
) -> Result<Response, ServiceError> {
    if !state.model.available() {
        return Err(ServiceError::ModelUnavailable);
    }
    let start = Instant::now();

    let language = Language::detect(&request.prompt);
    let mode = CompletionMode::classify(&request.prompt);

    let max_tokens = request
        .max_tokens
        .unwrap_or_else(|| mode.default_max_tokens())
        .min(policy::HARD_TOKEN_CAP);
    let temperature = request
        .temperature
        .unwrap_or_else(|| mode.default_temperature());

    let mut stop = policy::stop_sequences(language, mode);
    if let Some(spec) = request.stop {
        spec.extend_into(&mut stop);
    }

    let req_id = request_id();
    info!(
        id = req_id,
        lang = language.as_str(),
        mode = mode.label(),
        prompt_len = request.prompt.len(),
        "completion request"
    );

    let params = GenerationParams {
        max_tokens,
        temperature,
        top_p: request.top_p,
        stop,
    };

    let (result, lost) = state
        .model
        .generate_healed(request.prompt, request.suffix, params)
        .await
        .inspect_err(|e| error!(id = req_id, error = %e, "completion failed"))?;

    let text = filter_sensitive(&format!("{lost}{}", result.text));
    let latency_ms = start.elapsed().as_millis();
    info!(
        id = req_id,
        tokens = result.completion_tokens,
        latency_ms,
        "completion done"
    );

    let response = CompletionResponse {
        id: format!("cmpl-{req_id}"),
        object: "text_completion".to_string(),
        created: unix_now(),
        model: request.model,
        choices: vec![CompletionChoice {
            text,
            index: 0,
            logprobs: None,
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::new(result.prompt_tokens, result.completion_tokens),
    };

    if request.stream {
        Ok(sse_frames(vec![json_event(&response)?]))
    } else {
        Ok(Json(response).into_response())
    }
}

async fn chat_completions(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> Result<Response, ServiceError> {
    if !state.model.available() {
        return Err(ServiceError::ModelUnavailable);
    }
    let start = Instant::now();

    let prompt = render_chat_prompt(&request.messages);

    let mut stop = policy::chat_stops();
    if let Some(spec) = request.stop {
        spec.extend_into(&mut stop);
    }

    info!(
        messages = request.messages.len(),
        prompt_len = prompt.len(),
        "chat request"
    );

    let params = GenerationParams {
        max_tokens: request.max_tokens.unwrap_or(512),
        temperature: request.temperature.unwrap_or(0.7),
        top_p: request.top_p,
        stop,
    };

    let result = state
        .model
        .generate(prompt, params)
        .await
        .inspect_err(|e| error!(error = %e, "chat failed"))?;

    let text = filter_sensitive(result.text.trim());
    let latency_ms = start.elapsed().as_millis();
    info!(tokens = result.completion_tokens, latency_ms, "chat done");

    let response = ChatCompletionResponse {
        id: format!("chatcmpl-{}", unix_now()),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: request.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: text.clone(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::new(result.prompt_tokens, result.completion_tokens),
    };

    if request.stream {
        let content = ChatCompletionChunk {
            id: response.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: response.created,
            model: response.model.clone(),
            choices: vec![ChatChunkChoice {
                index: 0,
                delta: ChatDelta {
                    content: Some(text),
                },
                finish_reason: None,
            }],
        };
        let terminal = ChatCompletionChunk {
            choices: vec![ChatChunkChoice {
                index: 0,
                delta: ChatDelta { content: None },
                finish_reason: Some("stop".to_string()),
            }],
            ..content.clone()
        };
        Ok(sse_frames(vec![json_event(&content)?, json_event(&terminal)?]))
    } else {
        Ok(Json(response).into_response())
    }
}

/// Flattens a message sequence into ChatML turn markup, ending with an open
/// assistant turn for the model to continue.
fn render_chat_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(&format!(
            "<|im_start|>{}\n{}<|im_end|>\n",
            message.role, message.content
        ));
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

/// Generation completes before any frame is sent; the streaming wire shape is
/// kept for client compatibility only. Every stream ends with the `[DONE]`
/// sentinel frame.
fn sse_frames(events: Vec<Event>) -> Response {
    let frames: Vec<Result<Event, Infallible>> = events
        .into_iter()
        .chain(std::iter::once(Event::default().data("[DONE]")))
        .map(Ok)
        .collect();
    Sse::new(futures::stream::iter(frames)).into_response()
}

fn json_event<T: Serialize>(payload: &T) -> Result<Event, ServiceError> {
    let data = serde_json::to_string(payload)
        .map_err(|e| ServiceError::Inference(format!("response serialization failed: {e}")))?;
    Ok(Event::default().data(data))
}

fn request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        % 10_000
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
