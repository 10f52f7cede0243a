use crate::config::ProviderConfig;
use almanac_core::{system_prompt, AlmanacError, Category, ContentProvider, USER_INSTRUCTION};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upstream error bodies are cut to this many characters in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionProvider {
    pub fn new(config: &ProviderConfig, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ContentProvider for ChatCompletionProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        category: Category,
        already_shown: &[String],
    ) -> almanac_core::Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt(category, already_shown),
                },
                ChatMessage {
                    role: "user",
                    content: USER_INSTRUCTION.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(category = %category, endpoint = %self.endpoint, "calling provider");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AlmanacError::Provider(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(AlmanacError::Provider(format!(
                "HTTP {}: {}",
                status, snippet
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AlmanacError::Provider(format!("undecodable response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AlmanacError::Provider("response contained no choices".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> ChatCompletionProvider {
        let config = ProviderConfig {
            base_url: format!("{}/api/v3/", server.uri()),
            ..ProviderConfig::default()
        };
        ChatCompletionProvider::new(&config, "sk-test").unwrap()
    }

    #[tokio::test]
    async fn test_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v3/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "doubao-1.5-thinking-pro-250415",
                "max_tokens": 1500,
                "response_format": {"type": "json_object"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "{\"proverb\":\"A\"}"}},
                    {"message": {"role": "assistant", "content": "ignored"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let text = provider.generate(Category::English, &[]).await.unwrap();
        assert_eq!(text, "{\"proverb\":\"A\"}");
    }

    #[tokio::test]
    async fn test_non_success_status_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .generate(Category::Tcm, &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PROVIDER_ERROR");
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .generate(Category::Chinese, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_garbage_body_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .generate(Category::English, &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PROVIDER_ERROR");
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        let config = ProviderConfig {
            base_url: "https://example.com/api/v3/".into(),
            ..ProviderConfig::default()
        };
        let provider = ChatCompletionProvider::new(&config, "k").unwrap();
        assert_eq!(provider.endpoint(), "https://example.com/api/v3/chat/completions");
    }
}
