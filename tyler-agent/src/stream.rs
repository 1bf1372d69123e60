//! Streaming mode of the agent loop.
//!
//! [`Agent::go_stream`] yields ordered [`StreamUpdate`] events over a
//! channel while the turn is produced: content deltas as they stream,
//! the assembled assistant message at the end of each completion, a
//! tool message after each execution, and a final `Complete`. Any
//! failure surfaces as a single `Error` event and closes the stream;
//! the per-turn iteration counter resets on both paths.

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use tyler_types::{
    Message, MessageContent, MessageMetrics, ProviderError, Role, StreamUpdate, Thread, Timing,
    TokenUsage, ToolCall, ToolCallDelta, WeaveCall, time::now_utc,
};

use crate::{Agent, MAX_RECURSION_MESSAGE};

impl Agent {
    /// Run one turn in streaming mode.
    ///
    /// The turn executes on a spawned task; dropping the receiver stops
    /// it at the next send. Tool execution and iteration behave exactly
    /// as in [`go`](Agent::go).
    #[must_use]
    pub fn go_stream(&self, thread: Thread) -> mpsc::Receiver<StreamUpdate> {
        let (tx, rx) = mpsc::channel(64);
        let agent = self.clone();
        tokio::spawn(async move {
            agent.run_stream(thread, tx).await;
        });
        rx
    }

    async fn run_stream(&self, mut thread: Thread, tx: mpsc::Sender<StreamUpdate>) {
        self.prepare_turn(&mut thread).await;
        if let Err(e) = self.persist(&thread).await {
            let _ = tx
                .send(StreamUpdate::Error(format!("Failed to save thread: {e}")))
                .await;
            return;
        }

        let mut depth = 0usize;
        loop {
            if depth >= self.max_tool_recursion() {
                let appended = thread
                    .add_message(Message::new(Role::Assistant, MAX_RECURSION_MESSAGE))
                    .clone();
                if self.persist(&thread).await.is_err() {
                    let _ = tx
                        .send(StreamUpdate::Error("Failed to save thread".into()))
                        .await;
                    return;
                }
                let _ = tx.send(StreamUpdate::AssistantMessage(appended)).await;
                let _ = tx.send(StreamUpdate::Complete).await;
                return;
            }

            let request = self.request_for(&thread, true);
            let timeout = self.completion_timeout();
            let started_at = now_utc();
            let mut chunk_stream =
                match tokio::time::timeout(timeout, self.provider().complete_stream(request)).await
                {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        let _ = tx
                            .send(StreamUpdate::Error(format!("Chat completion failed: {e}")))
                            .await;
                        return;
                    }
                    Err(_) => {
                        let e = ProviderError::Timeout(timeout);
                        let _ = tx
                            .send(StreamUpdate::Error(format!("Chat completion failed: {e}")))
                            .await;
                        return;
                    }
                };

            let mut buffer = String::new();
            let mut accumulator = ToolCallAccumulator::default();
            let mut usage: Option<TokenUsage> = None;
            let mut model: Option<String> = None;

            while let Some(item) = chunk_stream.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(StreamUpdate::Error(format!("Chat completion failed: {e}")))
                            .await;
                        return;
                    }
                };
                if let Some(m) = &chunk.model {
                    model = Some(m.clone());
                }
                if let Some(u) = &chunk.usage {
                    usage = Some(u.clone());
                }
                for choice in &chunk.choices {
                    if let Some(content) = &choice.delta.content {
                        buffer.push_str(content);
                        if tx
                            .send(StreamUpdate::ContentChunk(content.clone()))
                            .await
                            .is_err()
                        {
                            // Consumer abandoned the stream.
                            return;
                        }
                    }
                    if let Some(deltas) = &choice.delta.tool_calls {
                        accumulator.apply(deltas);
                    }
                }
            }
            let ended_at = now_utc();

            let tool_calls = accumulator.into_tool_calls();
            debug!(
                content_len = buffer.len(),
                tool_calls = tool_calls.len(),
                "assembled streamed completion"
            );

            let metrics = MessageMetrics {
                model: Some(
                    model
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| self.model_name_owned()),
                ),
                timing: Timing::between(started_at, ended_at),
                usage: usage.unwrap_or_default(),
                weave_call: WeaveCall::default(),
            };

            let mut assistant = Message::new(Role::Assistant, "");
            assistant.content = if buffer.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(MessageContent::Text(buffer.clone()))
            };
            let assistant = assistant
                .with_tool_calls(tool_calls.clone())
                .with_metrics(metrics);
            let appended = thread.add_message(assistant).clone();
            if tx
                .send(StreamUpdate::AssistantMessage(appended))
                .await
                .is_err()
            {
                return;
            }

            if tool_calls.is_empty() {
                if let Err(e) = self.persist(&thread).await {
                    let _ = tx
                        .send(StreamUpdate::Error(format!("Failed to save thread: {e}")))
                        .await;
                    return;
                }
                let _ = tx.send(StreamUpdate::Complete).await;
                return;
            }

            let mut interrupted = false;
            for call in &tool_calls {
                let (message, is_interrupt) = self.run_tool(call).await;
                let appended = thread.add_message(message).clone();
                if tx.send(StreamUpdate::ToolMessage(appended)).await.is_err() {
                    return;
                }
                if is_interrupt {
                    interrupted = true;
                    break;
                }
            }

            if let Err(e) = self.persist(&thread).await {
                let _ = tx
                    .send(StreamUpdate::Error(format!("Failed to save thread: {e}")))
                    .await;
                return;
            }
            if interrupted {
                let _ = tx.send(StreamUpdate::Complete).await;
                return;
            }
            depth += 1;
        }
    }

}

/// Assembles the tool calls of a streamed completion.
///
/// Entries are keyed by the tool-call index within the response. An
/// entry carrying an id opens a slot; later fragments at the same
/// position append their argument text, so the composed arguments equal
/// the lexical concatenation across all chunks. A fragment whose slot
/// was never opened (no id on first appearance) is ignored.
#[derive(Default)]
pub(crate) struct ToolCallAccumulator {
    calls: Vec<PartialToolCall>,
}

struct PartialToolCall {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub(crate) fn apply(&mut self, deltas: &[ToolCallDelta]) {
        for delta in deltas {
            let position = delta.index.unwrap_or_else(|| {
                if delta.id.is_some() {
                    self.calls.len()
                } else {
                    self.calls.len().saturating_sub(1)
                }
            });

            if let Some(id) = &delta.id {
                let call = PartialToolCall {
                    id: id.clone(),
                    kind: delta.kind.clone().unwrap_or_else(|| "function".into()),
                    name: delta
                        .function
                        .as_ref()
                        .and_then(|f| f.name.clone())
                        .unwrap_or_default(),
                    arguments: delta
                        .function
                        .as_ref()
                        .and_then(|f| f.arguments.clone())
                        .unwrap_or_default(),
                };
                if position < self.calls.len() {
                    self.calls[position] = call;
                } else {
                    self.calls.push(call);
                }
            } else if let Some(existing) = self.calls.get_mut(position) {
                if let Some(function) = &delta.function {
                    if let Some(name) = &function.name {
                        existing.name.push_str(name);
                    }
                    if let Some(arguments) = &function.arguments {
                        existing.arguments.push_str(arguments);
                    }
                }
            }
            // Fragments for a slot that never opened are dropped.
        }
    }

    pub(crate) fn into_tool_calls(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                kind: call.kind,
                function: tyler_types::FunctionCall {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect()
    }
}
