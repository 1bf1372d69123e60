#![deny(missing_docs)]
//! OpenAI Chat Completions provider.
//!
//! Implements the [`Provider`] trait against an OpenAI-compatible HTTP
//! endpoint. The runtime's wire types already use the Chat Completions
//! shape, so this crate is transport only: authentication, status
//! mapping, and server-sent-event decoding for the streaming variant.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use tyler_types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, CompletionStream,
    Provider, ProviderError,
};

/// OpenAI API provider.
pub struct OpenAIProvider {
    api_key: String,
    client: reqwest::Client,
    api_url: String,
    org_id: Option<String>,
}

impl OpenAIProvider {
    /// Create a provider with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            org_id: None,
        }
    }

    /// Override the API URL (proxies, compatible servers, tests).
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the OpenAI-Organization header for multi-org accounts.
    #[must_use]
    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut http = self
            .client
            .post(&self.api_url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");
        if let Some(org_id) = &self.org_id {
            http = http.header("openai-organization", org_id);
        }

        let response = http
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Authentication(body));
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ServiceUnavailable(format!(
                "HTTP {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidRequest(format!(
                "HTTP {status}: {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn complete(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        request.stream = false;
        debug!(model = %request.model, messages = request.messages.len(), "sending completion");
        let response = self.send(&request).await?;
        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn complete_stream(
        &self,
        mut request: ChatCompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        request.stream = true;
        debug!(model = %request.model, messages = request.messages.len(), "opening completion stream");
        let response = self.send(&request).await?;

        let stream = async_stream::stream! {
            let mut bytes = Box::pin(response.bytes_stream());
            let mut buffer = String::new();
            let mut events = Vec::new();
            while let Some(item) = bytes.next().await {
                match item {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));
                        let done = drain_sse_events(&mut buffer, &mut events);
                        for data in events.drain(..) {
                            match serde_json::from_str::<ChatCompletionChunk>(&data) {
                                Ok(parsed) => yield Ok(parsed),
                                Err(e) => {
                                    yield Err(ProviderError::Stream(format!(
                                        "malformed chunk: {e}"
                                    )));
                                    return;
                                }
                            }
                        }
                        if done {
                            return;
                        }
                    }
                    Err(e) => {
                        yield Err(ProviderError::Network(e.to_string()));
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Pull complete `data:` payloads out of an SSE buffer. Returns whether
/// the terminal `[DONE]` marker was reached; payloads after it are
/// dropped.
fn drain_sse_events(buffer: &mut String, events: &mut Vec<String>) -> bool {
    while let Some(pos) = buffer.find('\n') {
        let line = buffer[..pos].trim().to_string();
        buffer.drain(..=pos);
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if data == "[DONE]" {
                return true;
            }
            if !data.is_empty() {
                events.push(data.to_string());
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tyler_types::{ChatMessage, MessageContent, Role};

    #[test]
    fn request_serializes_with_stream_flag() {
        let request = ChatCompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: MessageContent::Text("Hello".into()),
                sequence: 1,
                name: None,
                tool_calls: None,
                tool_call_id: None,
            }],
            temperature: 0.7,
            tools: None,
            stream: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], json!(true));
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "Hello");
    }

    #[test]
    fn drains_complete_data_lines() {
        let mut buffer = String::from(
            "data: {\"choices\":[]}\n\ndata: {\"usage\":{\"total_tokens\":3}}\ndata: {\"par",
        );
        let mut events = Vec::new();
        let done = drain_sse_events(&mut buffer, &mut events);
        assert!(!done);
        assert_eq!(events.len(), 2);
        // The partial payload stays buffered for the next network chunk.
        assert_eq!(buffer, "data: {\"par");
    }

    #[test]
    fn done_marker_terminates_the_stream() {
        let mut buffer = String::from("data: {\"choices\":[]}\ndata: [DONE]\ndata: {\"x\":1}\n");
        let mut events = Vec::new();
        let done = drain_sse_events(&mut buffer, &mut events);
        assert!(done);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn comment_and_blank_lines_are_skipped() {
        let mut buffer = String::from(": keep-alive\n\ndata: {\"choices\":[]}\n");
        let mut events = Vec::new();
        drain_sse_events(&mut buffer, &mut events);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn chunk_payloads_parse_into_wire_types() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(data).unwrap();
        assert_eq!(
            chunk.choices[0].delta.content.as_deref(),
            Some("Hel")
        );
    }
}
