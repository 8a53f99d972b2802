//! Language model seam.
//!
//! Everything that talks to a model goes through [`LanguageModel`]. The
//! production implementation speaks the OpenAI-compatible chat-completions
//! protocol, which also covers local servers such as Ollama.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use campusguide_shared::{GuideError, LlmConfig, Result};

/// One system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    /// Ask the endpoint to constrain output to a JSON object.
    pub json_object: bool,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Return the model's reply text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible client
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChatModel {
    /// Build from config, reading the API key from `llm.api_key_env`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::with_api_key(config, config.api_key())
    }

    pub fn with_api_key(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GuideError::config(format!("failed to build model HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    #[instrument(skip_all, fields(model = %self.model, json = request.json_object))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            response_format: request.json_object.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| GuideError::Llm(format!("model request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(300).collect();
            return Err(GuideError::Llm(format!(
                "model endpoint returned {status}: {snippet}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GuideError::Llm(format!("unreadable model response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GuideError::Llm("model response has no message content".into()))?;

        debug!(chars = content.chars().count(), "model replied");
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Scripted model
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedModel;

#[cfg(any(test, feature = "testing"))]
mod scripted {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays queued replies in order and records every request.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_replies<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            let model = Self::new();
            for reply in replies {
                model.push_reply(reply);
            }
            model
        }

        pub fn push_reply(&self, reply: impl Into<String>) {
            self.lock_replies().push_back(Ok(reply.into()));
        }

        pub fn push_error(&self, error: GuideError) {
            self.lock_replies().push_back(Err(error));
        }

        /// Requests received so far, oldest first.
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap_or_else(|p| p.into_inner()).len()
        }

        fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
            self.replies.lock().unwrap_or_else(|p| p.into_inner())
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.requests
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(request.clone());
            self.lock_replies()
                .pop_front()
                .unwrap_or_else(|| Err(GuideError::Llm("no scripted reply left".into())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/v1/", server.uri()),
            timeout_secs: 5,
            ..LlmConfig::default()
        }
    }

    fn request(json_object: bool) -> CompletionRequest {
        CompletionRequest {
            system: "system prompt".into(),
            user: "user prompt".into(),
            temperature: 0.2,
            json_object,
        }
    }

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn posts_chat_request_with_json_mode_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4.1-mini",
                "temperature": 0.2,
                "response_format": {"type": "json_object"},
                "messages": [
                    {"role": "system", "content": "system prompt"},
                    {"role": "user", "content": "user prompt"}
                ]
            })))
            .respond_with(chat_reply(r#"{"faqs": []}"#))
            .expect(1)
            .mount(&server)
            .await;

        let model = OpenAiChatModel::with_api_key(&config_for(&server), Some("sk-test".into()))
            .expect("build model");
        let reply = model.complete(&request(true)).await.expect("complete");
        assert_eq!(reply, r#"{"faqs": []}"#);
    }

    #[tokio::test]
    async fn keyless_free_form_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(chat_reply("3층에 있습니다"))
            .mount(&server)
            .await;

        let model = OpenAiChatModel::with_api_key(&config_for(&server), None).unwrap();
        let reply = model.complete(&request(false)).await.unwrap();
        assert_eq!(reply, "3층에 있습니다");

        let received = server.received_requests().await.expect("recording enabled");
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("authorization").is_none());
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[tokio::test]
    async fn error_status_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let model = OpenAiChatModel::with_api_key(&config_for(&server), None).unwrap();
        let err = model.complete(&request(false)).await.unwrap_err();
        assert!(matches!(err, GuideError::Llm(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn empty_choices_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let model = OpenAiChatModel::with_api_key(&config_for(&server), None).unwrap();
        let err = model.complete(&request(false)).await.unwrap_err();
        assert!(matches!(err, GuideError::Llm(_)));
    }

    #[tokio::test]
    async fn scripted_model_replays_and_records() {
        let model = ScriptedModel::with_replies(["first", "second"]);
        assert_eq!(model.complete(&request(true)).await.unwrap(), "first");
        assert_eq!(model.complete(&request(false)).await.unwrap(), "second");
        assert!(model.complete(&request(false)).await.is_err());

        let requests = model.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].json_object);
        assert!(!requests[1].json_object);
    }
}
