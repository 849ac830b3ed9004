//! HTTP-backed [`MemberExecutor`] (§6): turns a member dispatch into an
//! OpenAI-compatible chat-completions call, the same shape the reference
//! codebase's agent factory speaks to its local and cloud inference
//! endpoints.

use std::time::{Duration, Instant};

use agent_teams_runtime::{MemberExecutor, MemberRequest, MemberResponse, RuntimeError, RuntimeResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Dispatches a member prompt against a single OpenAI-compatible
/// chat-completions endpoint. Model/provider selection, when present on the
/// member, is passed through as the `model` field; callers that need to
/// route different members to different endpoints compose several of these
/// behind their own `MemberExecutor`.
pub struct HttpMemberExecutor {
    client: reqwest::Client,
    endpoint_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl HttpMemberExecutor {
    pub fn new(endpoint_url: impl Into<String>, api_key: Option<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint_url: endpoint_url.into(),
            api_key,
            default_model: default_model.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl MemberExecutor for HttpMemberExecutor {
    async fn execute(&self, request: MemberRequest) -> RuntimeResult<MemberResponse> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.endpoint_url.trim_end_matches('/')))
            .timeout(Duration::from_millis(request.timeout_ms))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let started = Instant::now();
        let send = req.send();
        tokio::pin!(send);

        let response = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => {
                return Err(RuntimeError::Cancelled);
            }
            result = &mut send => result,
        };

        let response = response.map_err(|err| {
            if err.is_timeout() {
                RuntimeError::Timeout(request.timeout_ms)
            } else {
                RuntimeError::Transient(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} {}", status.as_u16(), body);
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(RuntimeError::Transient(message))
            } else {
                Err(RuntimeError::NonRetryable(message))
            };
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| RuntimeError::NonRetryable(format!("malformed chat-completions response: {err}")))?;
        let output = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RuntimeError::NonRetryable("chat-completions response had no choices".to_string()))?;

        Ok(MemberResponse {
            output,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Health probe used before dispatching any member, mirroring the reference
/// codebase's endpoint health check.
pub async fn check_endpoint(endpoint_url: &str, api_key: Option<&str>) -> bool {
    let client = reqwest::Client::new();
    let models_url = format!("{}/models", endpoint_url.trim_end_matches('/'));
    let mut req = client.get(&models_url).timeout(Duration::from_secs(5));
    if let Some(key) = api_key {
        req = req.bearer_auth(key);
    }
    matches!(req.send().await, Ok(resp) if resp.status().is_success())
}
