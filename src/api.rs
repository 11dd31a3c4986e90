//! HTTP client for the Helix backend.
//!
//! Every call posts or fetches JSON against `base_url` and fails with an
//! [`ApiError`] on transport errors, non-2xx statuses, or bodies missing the
//! fields we need. There is no retry, caching, or client-side timeout.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::diagnostics::DiagnosticTarget;
use crate::error::ApiError;
use crate::model::{ContextMessage, MessageKind, RawStep, SequenceContext, SequenceStep};
use crate::provider::Provider;
use crate::session::UserId;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub user_id: UserId,
    pub model_provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSequenceRequest {
    pub context: SequenceContext,
    pub user_id: UserId,
    pub model_provider: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceResponse {
    pub sequence: Vec<RawStep>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    /// Row id from the backend's store; numeric ids are kept as their decimal text
    #[serde(default, deserialize_with = "lenient_id")]
    pub sequence_id: Option<String>,
}

/// Informational string field: anything but a string reads as empty
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        _ => String::new(),
    })
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) if !id.is_empty() => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSequenceRequest<'a> {
    sequence_id: &'a str,
    steps: &'a [SequenceStep],
}

/// The two backend operations a conversation exchange needs.
///
/// `ApiClient` is the real implementation; tests drive the controller with
/// scripted ones.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError>;

    async fn generate_sequence(
        &self,
        request: &GenerateSequenceRequest,
    ) -> Result<SequenceResponse, ApiError>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send_chat_message(
        &self,
        message: &str,
        user_id: &UserId,
        provider: Provider,
        model_name: Option<&str>,
    ) -> Result<ChatResponse, ApiError> {
        let request = ChatRequest {
            message: message.to_string(),
            user_id: user_id.clone(),
            model_provider: provider,
            model_name: model_name.map(str::to_string),
        };
        self.chat(&request).await
    }

    pub async fn request_sequence(
        &self,
        context: SequenceContext,
        user_id: &UserId,
        provider: Provider,
        model_name: Option<&str>,
    ) -> Result<SequenceResponse, ApiError> {
        let request = GenerateSequenceRequest {
            context,
            user_id: user_id.clone(),
            model_provider: provider,
            model_name: model_name.map(str::to_string),
        };
        self.generate_sequence(&request).await
    }

    pub async fn update_sequence(
        &self,
        sequence_id: &str,
        steps: &[SequenceStep],
    ) -> Result<Value, ApiError> {
        let body = UpdateSequenceRequest { sequence_id, steps };
        let builder = self.request(Method::PUT, "/update-sequence").json(&body);
        self.execute(builder, "/update-sequence").await
    }

    pub async fn test_openai(&self) -> Result<Value, ApiError> {
        self.get(DiagnosticTarget::OpenAI.endpoint()).await
    }

    pub async fn test_gemini(&self) -> Result<Value, ApiError> {
        self.get(DiagnosticTarget::Gemini.endpoint()).await
    }

    pub async fn test_supabase(&self) -> Result<Value, ApiError> {
        self.get(DiagnosticTarget::Supabase.endpoint()).await
    }

    pub async fn health_check(&self) -> Result<Value, ApiError> {
        self.get("/health").await
    }

    pub(crate) async fn get(&self, endpoint: &str) -> Result<Value, ApiError> {
        let builder = self.request(Method::GET, endpoint);
        self.execute(builder, endpoint).await
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        self.client
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
    }

    async fn execute(&self, builder: RequestBuilder, endpoint: &str) -> Result<Value, ApiError> {
        let response = builder.send().await.map_err(|err| {
            warn!(endpoint, error = %err, "backend unreachable");
            ApiError::Transport(err)
        })?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "backend returned error status");
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body: serde_json::from_slice(&bytes).ok(),
            });
        }

        debug!(endpoint, bytes = bytes.len(), "backend response");
        serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::MalformedResponse(format!("{endpoint}: invalid JSON: {err}")))
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
        let builder = self.request(Method::POST, "/chat").json(request);
        let value = self.execute(builder, "/chat").await?;
        serde_json::from_value(value)
            .map_err(|err| ApiError::MalformedResponse(format!("/chat: {err}")))
    }

    async fn generate_sequence(
        &self,
        request: &GenerateSequenceRequest,
    ) -> Result<SequenceResponse, ApiError> {
        let builder = self.request(Method::POST, "/generate-sequence").json(request);
        let value = self.execute(builder, "/generate-sequence").await?;
        parse_sequence_response(value)
    }
}

/// Validate a generate-sequence body: `sequence` must be an array.
pub fn parse_sequence_response(value: Value) -> Result<SequenceResponse, ApiError> {
    match value.get("sequence") {
        Some(Value::Array(_)) => {}
        Some(_) => {
            return Err(ApiError::MalformedResponse(
                "/generate-sequence: `sequence` is not an array".to_string(),
            ))
        }
        None => {
            return Err(ApiError::MalformedResponse(
                "/generate-sequence: missing `sequence`".to_string(),
            ))
        }
    }
    serde_json::from_value(value)
        .map_err(|err| ApiError::MalformedResponse(format!("/generate-sequence: {err}")))
}

/// Everything the background exchange needs, captured at dispatch time
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub content: String,
    pub user_id: UserId,
    pub provider: Provider,
    pub model_name: Option<String>,
    /// Logical conversation so far, ending with the new user message
    pub transcript: Vec<ContextMessage>,
}

/// Progress of one chat-then-sequence exchange, in the order it happens
#[derive(Debug)]
pub enum ExchangeEvent {
    ChatReplied(ChatResponse),
    ChatFailed(ApiError),
    SequenceGenerated {
        response: SequenceResponse,
        context: SequenceContext,
    },
    SequenceFailed(ApiError),
    /// The exchange task ended without reporting an outcome
    Aborted(String),
}

impl ExchangeEvent {
    /// Whether this event ends the exchange
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExchangeEvent::ChatReplied(_))
    }
}

/// Run the two dependent backend calls for one user message.
///
/// The chat call goes first; sequence generation only runs after a reply,
/// with the reply included in its context. Events are handed to `emit` as
/// they happen and the last one is always terminal.
pub async fn run_exchange<B, F>(backend: &B, request: ExchangeRequest, mut emit: F)
where
    B: Backend + ?Sized,
    F: FnMut(ExchangeEvent),
{
    let ExchangeRequest {
        content,
        user_id,
        provider,
        model_name,
        mut transcript,
    } = request;

    let chat_request = ChatRequest {
        message: content.clone(),
        user_id: user_id.clone(),
        model_provider: provider,
        model_name: model_name.clone(),
    };

    let reply = match backend.chat(&chat_request).await {
        Ok(reply) => reply,
        Err(err) => {
            warn!(error = %err, "chat request failed");
            emit(ExchangeEvent::ChatFailed(err));
            return;
        }
    };
    info!(provider = %provider, status = %reply.status, "chat reply received");

    transcript.push(ContextMessage {
        content: reply.message.clone(),
        kind: MessageKind::Assistant,
    });
    emit(ExchangeEvent::ChatReplied(reply));

    let context = SequenceContext {
        messages: transcript,
        user_request: content,
    };
    let sequence_request = GenerateSequenceRequest {
        context: context.clone(),
        user_id,
        model_provider: provider,
        model_name,
    };

    match backend.generate_sequence(&sequence_request).await {
        Ok(response) => {
            info!(steps = response.sequence.len(), "sequence generated");
            emit(ExchangeEvent::SequenceGenerated { response, context });
        }
        Err(err) => {
            warn!(error = %err, "sequence generation failed");
            emit(ExchangeEvent::SequenceFailed(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{conversation, Message};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct StubState {
        chat_bodies: Arc<Mutex<Vec<Value>>>,
        sequence_bodies: Arc<Mutex<Vec<Value>>>,
        update_bodies: Arc<Mutex<Vec<Value>>>,
    }

    async fn stub_chat(State(state): State<StubState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let message = body["message"].as_str().unwrap_or_default().to_string();
        state.chat_bodies.lock().unwrap().push(body);
        if message == "fail" {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "model unavailable", "status": "error"})),
            );
        }
        (
            StatusCode::OK,
            Json(json!({"message": "Sure, here's a plan", "status": "success"})),
        )
    }

    async fn stub_sequence(State(state): State<StubState>, Json(body): Json<Value>) -> Json<Value> {
        let request = body["context"]["userRequest"].as_str().unwrap_or_default().to_string();
        state.sequence_bodies.lock().unwrap().push(body);
        if request == "bad shape" {
            return Json(json!({"sequence": "Step 1: hello", "status": "success"}));
        }
        Json(json!({
            "sequence": ["Intro email", {"step": "2", "content": "Follow-up"}],
            "status": "success",
            "sequenceId": "seq-1"
        }))
    }

    async fn stub_update(State(state): State<StubState>, Json(body): Json<Value>) -> Json<Value> {
        state.update_bodies.lock().unwrap().push(body);
        Json(json!({"message": "Sequence updated successfully", "status": "success"}))
    }

    async fn stub_test_openai() -> Json<Value> {
        Json(json!({"status": "success", "model": "gpt-4-turbo"}))
    }

    async fn stub_test_supabase() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "supabase down")
    }

    async fn spawn_stub_backend() -> anyhow::Result<(String, StubState)> {
        let state = StubState::default();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = Router::new()
            .route("/api/chat", post(stub_chat))
            .route("/api/generate-sequence", post(stub_sequence))
            .route("/api/update-sequence", put(stub_update))
            .route("/api/test-openai", get(stub_test_openai))
            .route("/api/test-supabase", get(stub_test_supabase))
            .with_state(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok((format!("http://{addr}/api"), state))
    }

    fn exchange_request(content: &str) -> ExchangeRequest {
        ExchangeRequest {
            content: content.to_string(),
            user_id: UserId::from("user-1"),
            provider: Provider::Gemini,
            model_name: None,
            transcript: conversation(&[Message::user(content)]),
        }
    }

    #[tokio::test]
    async fn test_chat_request_body() {
        let (url, state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);

        let reply = client
            .send_chat_message("hello", &UserId::from("user-1"), Provider::OpenAI, None)
            .await
            .expect("chat");
        assert_eq!(reply.message, "Sure, here's a plan");
        assert_eq!(reply.status, "success");

        let bodies = state.chat_bodies.lock().unwrap();
        assert_eq!(
            bodies[0],
            json!({"message": "hello", "userId": "user-1", "modelProvider": "openai"})
        );
    }

    #[tokio::test]
    async fn test_chat_sends_model_name_when_set() {
        let (url, state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);

        client
            .send_chat_message("hello", &UserId::from("user-1"), Provider::Gemini, Some("gemini-pro"))
            .await
            .expect("chat");

        let bodies = state.chat_bodies.lock().unwrap();
        assert_eq!(bodies[0]["modelName"], "gemini-pro");
        assert_eq!(bodies[0]["modelProvider"], "gemini");
    }

    #[tokio::test]
    async fn test_error_status_carries_code_and_body() {
        let (url, _state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);

        let err = client
            .send_chat_message("fail", &UserId::from("user-1"), Provider::OpenAI, None)
            .await
            .expect_err("should fail");
        match err {
            ApiError::HttpStatus { status, ref reason, ref body } => {
                assert_eq!(status, 500);
                assert_eq!(reason, "Internal Server Error");
                assert_eq!(body.as_ref().unwrap()["error"], "model unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ApiClient::new(&format!("http://{addr}/api"));
        let err = client.test_openai().await.expect_err("nothing listening");
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_diagnostic_passthrough_and_failure() {
        let (url, _state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);

        let value = client.test_openai().await.expect("openai test");
        assert_eq!(value["model"], "gpt-4-turbo");

        let err = client.test_supabase().await.expect_err("supabase down");
        assert_eq!(err.status(), Some(503));
        // Plain-text error bodies carry no structured details
        assert_eq!(err.details(), json!({}));

        let err = client.test_gemini().await.expect_err("no such route");
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_diagnostic_targets_hit_their_endpoints() {
        let (url, _state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);

        let value = DiagnosticTarget::OpenAI.run(&client).await.expect("openai test");
        assert_eq!(value["status"], "success");

        let err = DiagnosticTarget::Supabase.run(&client).await.expect_err("supabase down");
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_update_sequence_body() {
        let (url, state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);
        let steps = vec![SequenceStep::new("1", "Hi {{name}}")];

        client.update_sequence("seq-1", &steps).await.expect("update");

        let bodies = state.update_bodies.lock().unwrap();
        assert_eq!(
            bodies[0],
            json!({"sequenceId": "seq-1", "steps": [{"step": "1", "content": "Hi {{name}}"}]})
        );
    }

    #[test]
    fn test_parse_sequence_response_requires_array() {
        let err = parse_sequence_response(json!({"sequence": {"content": "x"}, "status": "ok"}))
            .expect_err("object is not an array");
        assert!(matches!(err, ApiError::MalformedResponse(_)));

        let err = parse_sequence_response(json!({"status": "ok"})).expect_err("missing");
        assert!(matches!(err, ApiError::MalformedResponse(_)));

        let ok = parse_sequence_response(json!({"sequence": [], "status": "ok"})).expect("empty array");
        assert!(ok.sequence.is_empty());
        assert_eq!(ok.sequence_id, None);
    }

    #[test]
    fn test_parse_sequence_response_accepts_numeric_id() {
        let ok = parse_sequence_response(json!({
            "sequence": ["Intro email"],
            "status": "success",
            "sequenceId": 42
        }))
        .expect("numeric id");
        assert_eq!(ok.sequence_id.as_deref(), Some("42"));
        assert_eq!(ok.sequence, vec![RawStep::Text("Intro email".to_string())]);
    }

    #[test]
    fn test_parse_sequence_response_tolerates_null_fields() {
        let ok = parse_sequence_response(json!({
            "sequence": ["Intro email"],
            "status": null,
            "sequenceId": null
        }))
        .expect("null status");
        assert_eq!(ok.status, "");
        assert_eq!(ok.sequence_id, None);
        assert_eq!(ok.sequence.len(), 1);
    }

    #[test]
    fn test_chat_response_tolerates_null_status() {
        let reply: ChatResponse =
            serde_json::from_value(json!({"message": "Sure", "status": null})).expect("null status");
        assert_eq!(reply.message, "Sure");
        assert_eq!(reply.status, "");

        let reply: ChatResponse = serde_json::from_value(json!({"message": "Sure"})).expect("no status");
        assert_eq!(reply.status, "");
    }

    #[tokio::test]
    async fn test_request_sequence_body_and_reply() {
        let (url, state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);
        let context = SequenceContext {
            messages: conversation(&[Message::user("Find me 3 candidates")]),
            user_request: "Find me 3 candidates".to_string(),
        };

        let response = client
            .request_sequence(context, &UserId::from("user-7"), Provider::OpenAI, Some("gpt-4o"))
            .await
            .expect("sequence");
        assert_eq!(response.sequence.len(), 2);
        assert_eq!(response.sequence_id.as_deref(), Some("seq-1"));

        let bodies = state.sequence_bodies.lock().unwrap();
        assert_eq!(
            bodies[0],
            json!({
                "context": {
                    "messages": [{"content": "Find me 3 candidates", "type": "user"}],
                    "userRequest": "Find me 3 candidates"
                },
                "userId": "user-7",
                "modelProvider": "openai",
                "modelName": "gpt-4o"
            })
        );
    }

    #[tokio::test]
    async fn test_run_exchange_full_flow() {
        let (url, state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);
        let mut events = Vec::new();

        run_exchange(&client, exchange_request("Find me 3 candidates"), |e| events.push(e)).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ExchangeEvent::ChatReplied(r) if r.message == "Sure, here's a plan"));
        match &events[1] {
            ExchangeEvent::SequenceGenerated { response, context } => {
                assert_eq!(response.sequence.len(), 2);
                assert_eq!(response.sequence_id.as_deref(), Some("seq-1"));
                assert_eq!(context.messages.len(), 2);
                assert_eq!(context.messages[1].kind, MessageKind::Assistant);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let bodies = state.sequence_bodies.lock().unwrap();
        assert_eq!(
            bodies[0]["context"],
            json!({
                "messages": [
                    {"content": "Find me 3 candidates", "type": "user"},
                    {"content": "Sure, here's a plan", "type": "assistant"}
                ],
                "userRequest": "Find me 3 candidates"
            })
        );
        assert_eq!(bodies[0]["userId"], "user-1");
        assert_eq!(bodies[0]["modelProvider"], "gemini");
    }

    #[tokio::test]
    async fn test_run_exchange_skips_sequence_after_chat_failure() {
        let (url, state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);
        let mut events = Vec::new();

        run_exchange(&client, exchange_request("fail"), |e| events.push(e)).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ExchangeEvent::ChatFailed(_)));
        assert!(state.sequence_bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_exchange_rejects_non_array_sequence() {
        let (url, _state) = spawn_stub_backend().await.expect("spawn stub");
        let client = ApiClient::new(&url);
        let mut events = Vec::new();

        run_exchange(&client, exchange_request("bad shape"), |e| events.push(e)).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            ExchangeEvent::SequenceFailed(ApiError::MalformedResponse(_))
        ));
    }
}
