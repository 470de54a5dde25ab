//! HTTP client for the Gemini `generateContent` endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::agent::{GatewayError, ModelGateway, ModelReply, Turn};
use crate::tools::ToolDeclaration;

use super::tool_use::{error_message, parse_reply, GenerateContentRequest, GenerateContentResponse};

/// Public Gemini REST endpoint for model calls
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini implementation of [`ModelGateway`]
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    /// Create a client; `timeout` bounds each HTTP request
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Point the client at another server (e.g. a proxy or a test double)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn send_request(
        &self,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GatewayError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GatewayError::Transport(format!("Gemini API request timed out: {}", err))
                } else {
                    GatewayError::Transport(format!("Gemini API request failed: {}", err))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| GatewayError::Transport(format!("failed to read Gemini response: {}", err)))?;

        if !status.is_success() {
            return Err(GatewayError::Transport(format!(
                "Gemini API returned {}: {}",
                status.as_u16(),
                error_message(&text)
            )));
        }

        serde_json::from_str(&text)
            .map_err(|err| GatewayError::Protocol(format!("failed to parse Gemini response: {}", err)))
    }
}

#[async_trait]
impl ModelGateway for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn next_step(
        &self,
        system_prompt: &str,
        transcript: &[Turn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelReply, GatewayError> {
        let request = GenerateContentRequest::new(system_prompt, transcript, tools);
        debug!(
            model = %self.model,
            contents = request.contents.len(),
            tools = tools.len(),
            "Sending generateContent request"
        );
        let response = self.send_request(&request).await?;
        parse_reply(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let client = GeminiClient::new("k", "gemini-2.0-flash", Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:9/models/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:9/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(client.model(), "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = GeminiClient::new("k", "m", Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:1");
        let transcript = vec![Turn::User { text: "hi".into() }];
        let err = client.next_step("", &transcript, &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
