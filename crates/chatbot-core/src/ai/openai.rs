use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::CompletionService;
use crate::error::CompletionError;
use crate::state::ChatMessage;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize, PartialEq, Eq)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for OpenAIMessage<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        Self {
            role: msg.role.as_str(),
            content: &msg.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIErrorBody,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Client for the OpenAI chat completions endpoint (or any compatible server)
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a preconfigured HTTP client (proxy, TLS settings)
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        let request = OpenAIRequest {
            model: &self.model,
            messages: messages.iter().map(OpenAIMessage::from).collect(),
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    tracing::warn!(error = %e, "chat completion request could not be built");
                    return CompletionError::Request(e.to_string());
                }
                if e.is_timeout() {
                    tracing::warn!(timeout = ?self.timeout, "chat completion request timed out");
                } else {
                    tracing::warn!(error = %e, "chat completion request failed");
                }
                CompletionError::NoResponse(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            // Classified by status; a broken body only loses the message
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "chat completion returned an error status");
            tracing::debug!(body = %body, "error response body");
            return Err(classify_failure(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::NoResponse(format!("Failed to read response: {}", e)))?;

        parse_reply(&body)
    }
}

impl fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl CompletionService for OpenAIClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        self.chat(messages).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Map an error status and its body onto the error taxonomy
fn classify_failure(status: StatusCode, body: &str) -> CompletionError {
    if status == StatusCode::UNAUTHORIZED {
        return CompletionError::Unauthorized;
    }

    let message = serde_json::from_str::<OpenAIErrorResponse>(body)
        .ok()
        .and_then(|e| e.error.message)
        .filter(|m| !m.is_empty());

    CompletionError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Pull `choices[0].message.content` out of a success body
fn parse_reply(body: &str) -> Result<String, CompletionError> {
    let response: OpenAIResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::InvalidResponse("No choices in response".to_string()))?;

    Ok(choice.message.content.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_maps_roles_in_order() {
        let history = vec![
            ChatMessage::assistant("Hello!"),
            ChatMessage::user("Hi"),
        ];
        let request = OpenAIRequest {
            model: DEFAULT_MODEL,
            messages: history.iter().map(OpenAIMessage::from).collect(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    { "role": "assistant", "content": "Hello!" },
                    { "role": "user", "content": "Hi" }
                ]
            })
        );
    }

    #[test]
    fn test_classify_unauthorized_ignores_body() {
        let err = classify_failure(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key provided"}}"#,
        );
        assert_eq!(err, CompletionError::Unauthorized);
    }

    #[test]
    fn test_classify_structured_message() {
        let err = classify_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":{"message":"overloaded","type":"server_error"}}"#,
        );
        assert_eq!(
            err,
            CompletionError::Api {
                status: 500,
                message: Some("overloaded".to_string())
            }
        );
    }

    #[test]
    fn test_classify_unstructured_body() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>");
        assert_eq!(err, CompletionError::Api { status: 502, message: None });

        let empty = classify_failure(StatusCode::TOO_MANY_REQUESTS, r#"{"error":{"message":""}}"#);
        assert_eq!(empty, CompletionError::Api { status: 429, message: None });
    }

    #[test]
    fn test_parse_reply_takes_first_choice() {
        let body = r#"{"choices":[
            {"message":{"role":"assistant","content":"Hi there"}},
            {"message":{"role":"assistant","content":"ignored"}}
        ]}"#;
        assert_eq!(parse_reply(body).unwrap(), "Hi there");
    }

    #[test]
    fn test_parse_reply_without_choices() {
        let err = parse_reply(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));

        let err = parse_reply("not json").unwrap_err();
        assert!(matches!(err, CompletionError::InvalidResponse(_)));
    }

    #[test]
    fn test_builder_and_debug_redacts_key() {
        let client = OpenAIClient::new("sk-secret")
            .with_base_url("http://localhost:8080/v1/")
            .with_model("gpt-4o-mini")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(CompletionService::model(&client), "gpt-4o-mini");
        assert!(!format!("{:?}", client).contains("sk-secret"));
    }
}
