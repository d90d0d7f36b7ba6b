//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::config::LlmConfig;
use crate::error::{AppError, Result};
use crate::llm::schema::extract_json;
use crate::llm::{CandidateSummary, ExtractionRequest, LanguageModel, prompts};
use crate::models::{GapType, Node, Nugget};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DuplicateVerdict {
    duplicate: bool,
}

/// HTTP 语言模型客户端
pub struct HttpLanguageModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpLanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLanguageModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.is_some())
            .finish()
    }
}

impl HttpLanguageModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn complete(&self, system: &str, user: &str, json_mode: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.2,
            response_format: json_mode.then(|| serde_json::json!({ "type": "json_object" })),
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Collaborator(format!(
                "chat completion returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Collaborator("chat completion returned no content".into()))
    }
}

#[async_trait]
impl LanguageModel for HttpLanguageModel {
    async fn extract(&self, request: &ExtractionRequest) -> Result<String> {
        let user = prompts::extraction_user_prompt(request);
        self.complete(prompts::EXTRACTION_SYSTEM, &user, true).await
    }

    async fn confirm_duplicate(
        &self,
        candidate: &CandidateSummary,
        existing: &Node,
    ) -> Result<bool> {
        let user = prompts::confirm_user_prompt(candidate, existing);
        let raw = self.complete(prompts::CONFIRM_SYSTEM, &user, true).await?;
        let verdict: DuplicateVerdict = serde_json::from_str(extract_json(&raw))
            .map_err(|e| AppError::Collaborator(format!("invalid confirmation verdict: {}", e)))?;
        Ok(verdict.duplicate)
    }

    async fn generate_question(&self, nugget: &Nugget, gap: GapType) -> Result<String> {
        let user = prompts::question_user_prompt(nugget, gap);
        let text = self.complete(prompts::QUESTION_SYSTEM, &user, false).await?;
        Ok(text.trim().trim_matches('"').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeType;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> LlmConfig {
        LlmConfig {
            provider: "openai".into(),
            base_url: base_url.into(),
            model: "test-model".into(),
            api_key: Some("sk-test".into()),
            request_timeout: 5,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_extract_returns_raw_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("{\"candidates\":[]}")))
            .expect(1)
            .mount(&server)
            .await;

        let model = HttpLanguageModel::new(&config(&server.uri())).unwrap();
        let request = ExtractionRequest {
            message: "hello".into(),
            context: String::new(),
            correction: None,
        };
        let raw = model.extract(&request).await.unwrap();
        assert_eq!(raw, "{\"candidates\":[]}");
    }

    #[tokio::test]
    async fn test_confirm_duplicate_parses_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("```json\n{\"duplicate\": true}\n```")),
            )
            .mount(&server)
            .await;

        let model = HttpLanguageModel::new(&config(&server.uri())).unwrap();
        let candidate = CandidateSummary {
            node_type: NodeType::Idea,
            title: "Hire for fit".into(),
            summary: "Fit beats pedigree when hiring early employees.".into(),
        };
        let node = Node {
            id: "n1".into(),
            session_id: "s1".into(),
            node_type: NodeType::Idea,
            title: "Fit over pedigree".into(),
            summary: "Early hires should be chosen for fit.".into(),
            embedding: vec![],
            created_at: Utc::now(),
        };
        assert!(model.confirm_duplicate(&candidate, &node).await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_collaborator_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let model = HttpLanguageModel::new(&config(&server.uri())).unwrap();
        let request = ExtractionRequest {
            message: "hello".into(),
            context: String::new(),
            correction: None,
        };
        let err = model.extract(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Collaborator(_)));
        assert!(err.is_transient());
    }
}
