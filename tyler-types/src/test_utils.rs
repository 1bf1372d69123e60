//! Scripted provider for tests.
//!
//! [`MockProvider`] returns pre-loaded responses and chunk scripts in
//! FIFO order and records every request it receives, so tests can drive
//! the agent loop without a network and assert on the requests the loop
//! built.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::completion::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Choice, ChunkChoice,
    Delta, FunctionCall, FunctionCallDelta, ResponseMessage, ToolCall, ToolCallDelta,
};
use crate::error::ProviderError;
use crate::metrics::TokenUsage;
use crate::traits::{CompletionStream, Provider};

/// A provider that replays scripted responses.
#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<VecDeque<ChatCompletionResponse>>,
    streams: Mutex<VecDeque<Vec<Result<ChatCompletionChunk, ProviderError>>>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl MockProvider {
    /// Create an empty mock with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a full response for the next `complete` call.
    pub fn push_response(&self, response: ChatCompletionResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Queue a chunk script for the next `complete_stream` call.
    pub fn push_stream(&self, chunks: Vec<Result<ChatCompletionChunk, ProviderError>>) {
        self.streams.lock().unwrap().push_back(chunks);
    }

    /// Queue a chunk script that always succeeds.
    pub fn push_stream_ok(&self, chunks: Vec<ChatCompletionChunk>) {
        self.push_stream(chunks.into_iter().map(Ok).collect());
    }

    /// The requests received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidRequest("no scripted response".into()))
    }

    async fn complete_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidRequest("no scripted stream".into()))?;
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// A text-only completion response.
#[must_use]
pub fn text_response(model: &str, text: &str, usage: (u64, u64)) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: "chatcmpl-test".into(),
        model: model.into(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: Some("assistant".into()),
                content: Some(text.into()),
                tool_calls: None,
            },
            finish_reason: Some("stop".into()),
        }],
        usage: Some(token_usage(usage)),
    }
}

/// A completion response that emits tool calls, optionally with text.
#[must_use]
pub fn tool_calls_response(
    model: &str,
    content: Option<&str>,
    calls: Vec<(&str, &str, &str)>,
    usage: (u64, u64),
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: "chatcmpl-test".into(),
        model: model.into(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: Some("assistant".into()),
                content: content.map(String::from),
                tool_calls: Some(
                    calls
                        .into_iter()
                        .map(|(id, name, arguments)| ToolCall {
                            id: id.into(),
                            kind: "function".into(),
                            function: FunctionCall {
                                name: name.into(),
                                arguments: arguments.into(),
                            },
                        })
                        .collect(),
                ),
            },
            finish_reason: Some("tool_calls".into()),
        }],
        usage: Some(token_usage(usage)),
    }
}

/// A streamed chunk carrying a content delta.
#[must_use]
pub fn content_chunk(text: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        model: None,
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role: Some("assistant".into()),
                content: Some(text.into()),
                tool_calls: None,
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

/// A streamed chunk that opens a tool call.
#[must_use]
pub fn tool_call_chunk(index: usize, id: &str, name: &str, arguments: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        model: None,
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role: Some("assistant".into()),
                content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index: Some(index),
                    id: Some(id.into()),
                    kind: Some("function".into()),
                    function: Some(FunctionCallDelta {
                        name: Some(name.into()),
                        arguments: Some(arguments.into()),
                    }),
                }]),
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

/// A streamed chunk carrying only an argument fragment for an already
/// opened tool call.
#[must_use]
pub fn arguments_chunk(index: Option<usize>, fragment: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        model: None,
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta {
                role: Some("assistant".into()),
                content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: None,
                    kind: None,
                    function: Some(FunctionCallDelta {
                        name: None,
                        arguments: Some(fragment.into()),
                    }),
                }]),
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

/// The closing chunk of a stream, carrying usage and the model name.
#[must_use]
pub fn usage_chunk(model: &str, usage: (u64, u64)) -> ChatCompletionChunk {
    ChatCompletionChunk {
        model: Some(model.into()),
        choices: vec![ChunkChoice {
            index: 0,
            delta: Delta::default(),
            finish_reason: Some("stop".into()),
        }],
        usage: Some(token_usage(usage)),
    }
}

fn token_usage((completion_tokens, prompt_tokens): (u64, u64)) -> TokenUsage {
    TokenUsage {
        completion_tokens,
        prompt_tokens,
        total_tokens: completion_tokens + prompt_tokens,
    }
}
