//! Chat-completion client for the generation stages.
//!
//! Wraps an OpenAI-compatible chat-completions API. The pipeline consumes
//! generation through the [`Generator`] trait: system prompt and user prompt
//! in, text out. The concrete [`ChatClient`] adds bearer authentication,
//! request timeouts and response validation, plus the standalone
//! four-perspective title generation used by the `titles` CLI command.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::LlmError;

/// Sampling temperature used for every pipeline stage call.
const STAGE_TEMPERATURE: f64 = 0.7;

/// Token budget for one pipeline stage call.
const STAGE_MAX_TOKENS: u32 = 1024;

/// Token budget for title generation.
const TITLES_MAX_TOKENS: u32 = 800;

/// A message in a conversation with the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for collaborators that can generate text.
///
/// Shared across all interleaved jobs; implementations must be safe to
/// invoke concurrently.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text for the given system and user prompts.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

/// Internal request structure for the chat-completions API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

/// Internal response structure from the chat-completions API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: String,
}

/// Client for an OpenAI-compatible chat-completions API.
pub struct ChatClient {
    api_base: String,
    api_key: String,
    model: String,
    http_client: Client,
}

impl ChatClient {
    /// Creates a new client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL of the API (e.g., "https://api.deepseek.com/v1")
    /// * `api_key` - Bearer token for authentication
    /// * `model` - Model identifier used for all requests
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            http_client: Client::builder()
                .timeout(Duration::from_secs(60))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a client from loaded settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.llm_api_base.clone(),
            settings.llm_api_key.clone(),
            settings.llm_model.clone(),
        )
    }

    /// Returns the configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one chat-completion request and returns the raw response.
    async fn chat_completion(&self, request: ApiRequest) -> Result<ApiResponse, LlmError> {
        let url = format!("{}/chat/completions", self.api_base);

        tracing::debug!(model = %request.model, "Calling chat completion");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))
    }

    /// Extracts the first choice's content, trimmed.
    fn first_content(response: ApiResponse) -> Result<String, LlmError> {
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or(LlmError::EmptyResponse)
    }

    /// Generates four-perspective title candidates for a keyword list.
    ///
    /// Returns the model's JSON object mapping each perspective to a list
    /// of candidate titles.
    pub async fn generate_titles(
        &self,
        keywords: &[String],
    ) -> Result<serde_json::Value, LlmError> {
        let request = ApiRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(TITLES_SYSTEM_PROMPT),
                Message::user(build_titles_prompt(keywords)),
            ],
            temperature: STAGE_TEMPERATURE,
            max_tokens: TITLES_MAX_TOKENS,
            response_format: Some(serde_json::json!({"type": "json_object"})),
        };

        let content = Self::first_content(self.chat_completion(request).await?)?;
        serde_json::from_str(&content).map_err(|e| LlmError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl Generator for ChatClient {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let request = ApiRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            temperature: STAGE_TEMPERATURE,
            max_tokens: STAGE_MAX_TOKENS,
            response_format: None,
        };

        Self::first_content(self.chat_completion(request).await?)
    }
}

/// System prompt for four-perspective title generation.
pub const TITLES_SYSTEM_PROMPT: &str =
    "你是资深中文标题编辑，注意精炼有冲击力，只返回JSON，不要解释。";

/// Builds the user prompt for four-perspective title generation.
pub fn build_titles_prompt(keywords: &[String]) -> String {
    let keyword_text = keywords.join("、");
    format!(
        "请根据以下关键词生成四个视角的标题，每个视角提供 3 条标题，以 JSON 格式返回。\n\
         关键词：{keyword_text}\n\
         返回 JSON 结构：{{\n\
           \"市场洞察\": [\"...\"],\n\
           \"问题驱动\": [\"...\"],\n\
           \"解决方案\": [\"...\"],\n\
           \"行动号召\": [\"...\"]\n\
         }}\n\
         要求：所有标题必须为中文，28 字以内，避免重复或带有解释性文字。"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::system("be helpful");
        assert_eq!(msg.role, "system");
        assert_eq!(msg.content, "be helpful");

        let msg = Message::user("hello");
        assert_eq!(msg.role, "user");
    }

    #[test]
    fn test_first_content_trims() {
        let response = ApiResponse {
            choices: vec![ApiChoice {
                message: ApiMessage {
                    content: "  生成文本  \n".to_string(),
                },
            }],
        };

        assert_eq!(ChatClient::first_content(response).unwrap(), "生成文本");
    }

    #[test]
    fn test_first_content_empty_choices() {
        let response = ApiResponse { choices: vec![] };
        assert!(matches!(
            ChatClient::first_content(response),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn test_build_titles_prompt_joins_keywords() {
        let prompt = build_titles_prompt(&["节能".to_string(), "家电".to_string()]);
        assert!(prompt.contains("节能、家电"));
        assert!(prompt.contains("市场洞察"));
    }

    #[test]
    fn test_api_request_skips_absent_response_format() {
        let request = ApiRequest {
            model: "m".to_string(),
            messages: vec![Message::user("hi")],
            temperature: 0.7,
            max_tokens: 16,
            response_format: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("response_format").is_none());
    }
}
