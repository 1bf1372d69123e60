//! Chat Completions wire types.
//!
//! The runtime speaks a Chat Completions-style API natively: providers
//! convert transport-specific responses into these shapes once at the
//! boundary, so the agent loop never depends on provider types. The same
//! tagged shapes cover the full-response and chunk-stream variants.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{MessageContent, Role};
use crate::metrics::TokenUsage;

/// A message in the chat-completion projection of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The author role.
    pub role: Role,
    /// Text or multimodal parts; never absent (empty string when the
    /// source message had no content).
    pub content: MessageContent,
    /// Position within the thread, carried for consistency.
    pub sequence: u64,
    /// Tool name on tool results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls on assistant messages that emitted them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Correlation id on tool results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A model-emitted request to run a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id referenced by the tool result.
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The function to invoke.
    pub function: FunctionCall,
}

/// The function half of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments as a JSON string, exactly as emitted by the model.
    pub arguments: String,
}

/// An OpenAI-style tool definition offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The function surface.
    pub function: FunctionSpec,
}

impl ToolSpec {
    /// Wrap a function definition in the `{type:"function"}` envelope.
    #[must_use]
    pub fn function(function: FunctionSpec) -> Self {
        Self {
            kind: "function".into(),
            function,
        }
    }
}

/// A tool's callable surface: name, description, and JSON Schema input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Unique tool name.
    pub name: String,
    /// What the tool does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier.
    pub model: String,
    /// The thread projection, in stored order.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Registered tool definitions; omitted when the agent has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    /// Whether to stream the response.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

/// A full (non-streamed) completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Provider-assigned response id.
    #[serde(default)]
    pub id: String,
    /// The model that produced the response.
    #[serde(default)]
    pub model: String,
    /// Response choices; the loop reads the first.
    pub choices: Vec<Choice>,
    /// Token usage, when reported.
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ChatCompletionResponse {
    /// The assistant message of the first choice, if present.
    #[must_use]
    pub fn first_message(&self) -> Option<&ResponseMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

/// One completion choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index.
    #[serde(default)]
    pub index: u32,
    /// The generated assistant message.
    pub message: ResponseMessage,
    /// Why generation stopped (`"stop"`, `"tool_calls"`, ...).
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The assistant message inside a completion choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Author role, normally `"assistant"`.
    #[serde(default)]
    pub role: Option<String>,
    /// Generated text, if any.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls, if the model emitted them.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// The model, when reported on the chunk.
    #[serde(default)]
    pub model: Option<String>,
    /// Incremental choices.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Usage, reported on the final chunk by some providers.
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// One choice within a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index.
    #[serde(default)]
    pub index: u32,
    /// The incremental delta.
    #[serde(default)]
    pub delta: Delta,
    /// Why generation stopped, on the closing chunk.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The incremental payload of a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Author role, present on the first chunk.
    #[serde(default)]
    pub role: Option<String>,
    /// A text fragment.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool-call fragments.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A fragment of a tool call within a streamed delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the tool call within the response.
    #[serde(default)]
    pub index: Option<usize>,
    /// Correlation id, present on the fragment that opens the call.
    #[serde(default)]
    pub id: Option<String>,
    /// Call type, present on the opening fragment.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Function name/argument fragments.
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
}

/// Function fragments within a tool-call delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    /// Function name fragment.
    #[serde(default)]
    pub name: Option<String>,
    /// Argument JSON-string fragment; fragments concatenate lexically.
    #[serde(default)]
    pub arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_tools_and_stream_when_unset() {
        let request = ChatCompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![],
            temperature: 0.7,
            tools: None,
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("stream").is_none());
    }

    #[test]
    fn tool_spec_serializes_openai_shape() {
        let spec = ToolSpec::function(FunctionSpec {
            name: "calculate".into(),
            description: Some("Perform arithmetic".into()),
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "op": {"type": "string"},
                    "x": {"type": "number"},
                    "y": {"type": "number"}
                },
                "required": ["op", "x", "y"]
            })),
        });
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "calculate");
        assert_eq!(value["function"]["parameters"]["required"][0], "op");
    }

    #[test]
    fn response_parses_tool_calls() {
        let raw = json!({
            "id": "chatcmpl-123",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "calculate", "arguments": "{\"op\":\"divide\"}"}
                    }]
                }
            }],
            "usage": {"completion_tokens": 10, "prompt_tokens": 20, "total_tokens": 30}
        });
        let response: ChatCompletionResponse = serde_json::from_value(raw).unwrap();
        let message = response.first_message().unwrap();
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "calculate");
        assert_eq!(response.usage.as_ref().unwrap().total_tokens, 30);
    }

    #[test]
    fn chunk_parses_partial_tool_call() {
        let raw = json!({
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{"function": {"arguments": " \"x\": 1}"}}]}
            }]
        });
        let chunk: ChatCompletionChunk = serde_json::from_value(raw).unwrap();
        let deltas = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert!(deltas[0].id.is_none());
        assert_eq!(
            deltas[0].function.as_ref().unwrap().arguments.as_deref(),
            Some(" \"x\": 1}")
        );
    }

    #[test]
    fn empty_chunk_deserializes() {
        let chunk: ChatCompletionChunk = serde_json::from_str("{}").unwrap();
        assert!(chunk.choices.is_empty());
        assert!(chunk.usage.is_none());
    }
}
