//! Boundary to the external inference service.

use async_trait::async_trait;
use relay_common::config::InferenceConfig;
use relay_common::{Error, Result};
use relay_extensions::ExtensionInfo;
use relay_store::types::ConversationMessage;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Assistant reply. The service may hand back its own conversation id,
/// which the session layer adopts for subsequent turns.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    pub text: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Everything the session layer asks of the inference service.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Produce an assistant reply for `prompt`, given the conversation
    /// history tail. Bounded by the chat timeout.
    async fn chat(&self, prompt: &str, history: &[ConversationMessage]) -> Result<ChatReply>;

    /// Pick which extension (by name) should handle `message`, or none.
    /// Bounded by the classify timeout, which is much shorter than the
    /// chat timeout since this call gates every inbound message.
    async fn classify(
        &self,
        message: &str,
        extensions: &[ExtensionInfo],
    ) -> Result<Option<String>>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    prompt: &'a str,
    history: Vec<HistoryEntry<'a>>,
}

#[derive(Serialize)]
struct HistoryEntry<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    message: &'a str,
    extensions: &'a [ExtensionInfo],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    extension: Option<String>,
}

/// HTTP implementation speaking JSON to a configured base URL.
pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    chat_timeout: Duration,
    classify_timeout: Duration,
}

impl HttpInferenceClient {
    pub fn new(config: &InferenceConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_timeout: Duration::from_secs(config.chat_timeout_secs),
            classify_timeout: Duration::from_secs(config.classify_timeout_secs),
        }
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req, timeout: Duration) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        if !response.status().is_success() {
            return Err(Error::Inference(format!(
                "{path} returned {}",
                response.status()
            )));
        }

        response.json().await.map_err(classify_reqwest_error)
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::InferenceTimeout
    } else {
        Error::Inference(e.to_string())
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn chat(&self, prompt: &str, history: &[ConversationMessage]) -> Result<ChatReply> {
        let request = ChatRequest {
            prompt,
            history: history
                .iter()
                .map(|m| HistoryEntry {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        };
        self.post("/api/chat", &request, self.chat_timeout).await
    }

    async fn classify(
        &self,
        message: &str,
        extensions: &[ExtensionInfo],
    ) -> Result<Option<String>> {
        let request = ClassifyRequest {
            message,
            extensions,
        };
        let response: ClassifyResponse = self
            .post("/api/classify", &request, self.classify_timeout)
            .await?;

        // Some backends answer with a literal "none" instead of null.
        Ok(response
            .extension
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("none")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, chat_timeout_secs: u64) -> HttpInferenceClient {
        HttpInferenceClient::new(&InferenceConfig {
            base_url: server.uri(),
            chat_timeout_secs,
            classify_timeout_secs: 1,
        })
    }

    #[tokio::test]
    async fn chat_posts_prompt_and_parses_the_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({ "prompt": "hi" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "hello",
                "conversation_id": "conv-9"
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server, 5).chat("hi", &[]).await.unwrap();
        assert_eq!(reply.text, "hello");
        assert_eq!(reply.conversation_id.as_deref(), Some("conv-9"));
    }

    #[tokio::test]
    async fn chat_reply_without_conversation_id_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "hello" })),
            )
            .mount(&server)
            .await;

        let reply = client_for(&server, 5).chat("hi", &[]).await.unwrap();
        assert!(reply.conversation_id.is_none());
    }

    #[tokio::test]
    async fn server_error_surfaces_as_inference_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client_for(&server, 5).chat("hi", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[tokio::test]
    async fn slow_chat_surfaces_as_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "late" }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, 1).chat("hi", &[]).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn classify_normalizes_none_answers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/classify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "extension": "none" })),
            )
            .mount(&server)
            .await;

        let picked = client_for(&server, 5).classify("hi", &[]).await.unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn classify_returns_the_picked_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/classify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "extension": "weather" })),
            )
            .mount(&server)
            .await;

        let extensions = vec![ExtensionInfo {
            name: "weather".into(),
            version: "0.1.0".into(),
            description: "weather lookups".into(),
        }];
        let picked = client_for(&server, 5)
            .classify("how hot is it", &extensions)
            .await
            .unwrap();
        assert_eq!(picked.as_deref(), Some("weather"));
    }
}
