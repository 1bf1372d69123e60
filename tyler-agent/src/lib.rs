//! The agent loop: a configured persona driving iterative completion
//! and tool-call cycles against a thread.
//!
//! [`Agent::go`] runs a turn to completion and returns the mutated
//! thread plus the newly produced non-user messages;
//! [`Agent::go_stream`] yields incremental
//! [`StreamUpdate`](tyler_types::StreamUpdate) events instead. Within a
//! turn the loop is strictly sequential: the model call for iteration
//! *n+1* starts only after every tool message from iteration *n* has
//! been appended and persisted.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use tyler_store_memory::MemoryThreadStore;
use tyler_tool::{ToolRuntime, ToolOutput};
use tyler_types::{
    AgentError, Attachment, ChatCompletionRequest, ChatCompletionResponse, FileBackend,
    FunctionSpec, Message, MessageContent, MessageMetrics, Provider, ProviderError, Role, Thread,
    ThreadStore, Timing, ToolCall, ToolError, WeaveCall, time::now_utc,
};

mod pipeline;
mod prompt;
mod stream;

pub use pipeline::{FileProcessor, ProcessingError, TextFileProcessor, process_message_files};
pub use prompt::render_system_prompt;

/// Appended when a turn hits its recursion ceiling.
pub const MAX_RECURSION_MESSAGE: &str =
    "Maximum tool recursion depth reached. Stopping further tool calls.";

/// Default bound on model→tools cycles within one turn.
pub const DEFAULT_MAX_TOOL_RECURSION: usize = 10;

/// Default per-call completion timeout.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

/// The input to a turn: a thread value, or an id to load from the
/// configured thread store.
pub enum ThreadInput {
    /// A thread id; requires a thread store.
    Id(String),
    /// An in-memory thread.
    Thread(Box<Thread>),
}

impl From<Thread> for ThreadInput {
    fn from(thread: Thread) -> Self {
        Self::Thread(Box::new(thread))
    }
}

impl From<&str> for ThreadInput {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for ThreadInput {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

/// A configured persona that drives the completion/tool loop.
#[derive(Clone)]
pub struct Agent {
    model_name: String,
    temperature: f32,
    name: String,
    purpose: String,
    notes: String,
    max_tool_recursion: usize,
    completion_timeout: Duration,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRuntime>,
    thread_store: Option<Arc<dyn ThreadStore>>,
    file_store: Option<Arc<dyn FileBackend>>,
    processor: Arc<dyn FileProcessor>,
}

impl Agent {
    /// Create a builder. All options except the provider have defaults:
    /// model `gpt-4o`, temperature 0.7, name `Tyler`, an in-memory
    /// thread store, no tools, and the text file processor.
    #[must_use]
    pub fn builder(provider: Arc<dyn Provider>) -> AgentBuilder {
        AgentBuilder::new(provider)
    }

    /// The agent's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The agent's purpose, used by the router's classifier.
    #[must_use]
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// The model this agent completes with.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// The configured thread store, if any.
    #[must_use]
    pub fn thread_store(&self) -> Option<&Arc<dyn ThreadStore>> {
        self.thread_store.as_ref()
    }

    /// Run one turn to completion.
    ///
    /// Ensures the system prompt, runs the attachment pipeline on the
    /// last user message, then iterates model calls and tool executions
    /// until the model stops emitting tool calls, an interrupt tool
    /// runs, or the recursion ceiling is hit. The thread is persisted
    /// after every iteration.
    ///
    /// Returns the thread and the newly produced non-user messages in
    /// order.
    ///
    /// # Errors
    ///
    /// Fails when a thread id cannot be resolved, the provider fails or
    /// times out, or persistence fails (the in-memory thread then
    /// remains the latest copy).
    pub async fn go(
        &self,
        input: impl Into<ThreadInput>,
    ) -> Result<(Thread, Vec<Message>), AgentError> {
        let mut thread = self.resolve_thread(input.into()).await?;
        let mut new_messages: Vec<Message> = Vec::new();

        self.prepare_turn(&mut thread).await;
        self.persist(&thread).await?;

        let mut depth = 0usize;
        loop {
            if depth >= self.max_tool_recursion {
                let appended = thread
                    .add_message(Message::new(Role::Assistant, MAX_RECURSION_MESSAGE))
                    .clone();
                new_messages.push(appended);
                self.persist(&thread).await?;
                break;
            }

            let response = self.complete(&thread).await?;
            let (assistant, tool_calls) = self.assistant_message(&response);
            let appended = thread.add_message(assistant).clone();
            new_messages.push(appended);

            if tool_calls.is_empty() {
                self.persist(&thread).await?;
                break;
            }

            let mut interrupted = false;
            for call in &tool_calls {
                let (message, is_interrupt) = self.run_tool(call).await;
                let appended = thread.add_message(message).clone();
                new_messages.push(appended);
                if is_interrupt {
                    interrupted = true;
                    break;
                }
            }

            self.persist(&thread).await?;
            if interrupted {
                break;
            }
            depth += 1;
        }

        new_messages.retain(|m| m.role != Role::User);
        Ok((thread, new_messages))
    }

    /// Resolve the turn's thread from a value or a stored id.
    async fn resolve_thread(&self, input: ThreadInput) -> Result<Thread, AgentError> {
        match input {
            ThreadInput::Thread(thread) => Ok(*thread),
            ThreadInput::Id(id) => {
                let store = self
                    .thread_store
                    .as_ref()
                    .ok_or(AgentError::MissingThreadStore)?;
                store
                    .get(&id)
                    .await?
                    .ok_or(AgentError::ThreadNotFound(id))
            }
        }
    }

    /// First-iteration setup: system prompt and attachment pipeline.
    pub(crate) async fn prepare_turn(&self, thread: &mut Thread) {
        let system_prompt = render_system_prompt(&self.name, &self.purpose, &self.notes);
        thread.ensure_system_prompt(&system_prompt);

        if let Some(message) = thread.get_last_message_by_role_mut(Role::User)
            && !message.attachments.is_empty()
        {
            process_message_files(
                message,
                self.processor.as_ref(),
                self.file_store.as_deref(),
            )
            .await;
        }
    }

    pub(crate) fn request_for(&self, thread: &Thread, stream: bool) -> ChatCompletionRequest {
        let tools = self.tools.get_tools_for_chat_completion();
        ChatCompletionRequest {
            model: self.model_name.clone(),
            messages: thread.get_messages_for_chat_completion(),
            temperature: self.temperature,
            tools: if tools.is_empty() { None } else { Some(tools) },
            stream,
        }
    }

    /// One timed model call.
    async fn complete(&self, thread: &Thread) -> Result<TimedResponse, AgentError> {
        let request = self.request_for(thread, false);
        let started_at = now_utc();
        let response = tokio::time::timeout(self.completion_timeout, self.provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout(self.completion_timeout))??;
        let ended_at = now_utc();
        debug!(model = %response.model, "completed model call");
        Ok(TimedResponse {
            response,
            timing: Timing::between(started_at, ended_at),
        })
    }

    /// Build the assistant message (with metrics and serialized tool
    /// calls) from a completion response.
    fn assistant_message(&self, timed: &TimedResponse) -> (Message, Vec<ToolCall>) {
        let response = &timed.response;
        let metrics = MessageMetrics {
            model: Some(self.effective_model(&response.model)),
            timing: timed.timing.clone(),
            usage: response.usage.clone().unwrap_or_default(),
            weave_call: WeaveCall::default(),
        };

        let (content, tool_calls) = match response.first_message() {
            Some(message) => (
                message.content.clone(),
                message.tool_calls.clone().unwrap_or_default(),
            ),
            None => (None, Vec::new()),
        };

        let mut assistant = Message::new(Role::Assistant, "");
        assistant.content = content.map(MessageContent::Text);
        let assistant = assistant
            .with_tool_calls(tool_calls.clone())
            .with_metrics(metrics);
        (assistant, tool_calls)
    }

    /// Execute one tool call and format its tool message. Returns the
    /// message plus whether the tool's attributes mark it an interrupt.
    pub(crate) async fn run_tool(&self, call: &ToolCall) -> (Message, bool) {
        let tool_attributes = self.tools.get_tool_attributes(&call.function.name).cloned();

        let started_at = now_utc();
        let result = self.tools.execute_tool_call(call).await;
        let ended_at = now_utc();

        let mut attributes = Map::new();
        attributes.insert(
            "tool_attributes".into(),
            Value::Object(tool_attributes.clone().unwrap_or_default()),
        );

        let mut message = Message::new(Role::Tool, result.content)
            .with_name(result.name)
            .with_tool_call_id(result.tool_call_id)
            .with_metrics(MessageMetrics {
                timing: Timing::between(started_at, ended_at),
                ..Default::default()
            })
            .with_attributes(attributes);

        if !result.artifacts.is_empty() {
            let mut attachments = Vec::with_capacity(result.artifacts.len());
            for artifact in result.artifacts {
                let mut attachment = Attachment::new(artifact.filename, artifact.content);
                attachment.mime_type = artifact.mime_type;
                if let Some(backend) = self.file_store.as_deref()
                    && let Err(e) = attachment.ensure_stored(backend).await
                {
                    warn!(
                        filename = %attachment.filename,
                        error = %e,
                        "failed to store tool artifact"
                    );
                }
                attachments.push(attachment);
            }
            message = message.with_attachments(attachments);
        }

        let is_interrupt = tool_attributes
            .as_ref()
            .and_then(|a| a.get("type"))
            .and_then(Value::as_str)
            == Some("interrupt");
        (message, is_interrupt)
    }

    pub(crate) fn effective_model(&self, reported: &str) -> String {
        if reported.is_empty() {
            self.model_name.clone()
        } else {
            reported.to_string()
        }
    }

    pub(crate) async fn persist(&self, thread: &Thread) -> Result<(), AgentError> {
        if let Some(store) = &self.thread_store {
            store.save(thread).await?;
        }
        Ok(())
    }

    pub(crate) fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub(crate) fn completion_timeout(&self) -> Duration {
        self.completion_timeout
    }

    pub(crate) fn max_tool_recursion(&self) -> usize {
        self.max_tool_recursion
    }

    pub(crate) fn model_name_owned(&self) -> String {
        self.model_name.clone()
    }
}

struct TimedResponse {
    response: ChatCompletionResponse,
    timing: Timing,
}

/// Builder for [`Agent`].
pub struct AgentBuilder {
    model_name: String,
    temperature: f32,
    name: String,
    purpose: String,
    notes: String,
    max_tool_recursion: usize,
    completion_timeout: Duration,
    provider: Arc<dyn Provider>,
    tools: ToolRuntime,
    thread_store: Option<Arc<dyn ThreadStore>>,
    file_store: Option<Arc<dyn FileBackend>>,
    processor: Arc<dyn FileProcessor>,
}

impl AgentBuilder {
    fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            model_name: "gpt-4o".into(),
            temperature: 0.7,
            name: "Tyler".into(),
            purpose: "To be a helpful assistant.".into(),
            notes: String::new(),
            max_tool_recursion: DEFAULT_MAX_TOOL_RECURSION,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            provider,
            tools: ToolRuntime::new(),
            thread_store: Some(Arc::new(MemoryThreadStore::new())),
            file_store: None,
            processor: Arc::new(TextFileProcessor),
        }
    }

    /// Set the model name.
    #[must_use]
    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the agent's name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the agent's purpose.
    #[must_use]
    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = purpose.into();
        self
    }

    /// Set free-form notes included in the system prompt.
    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Bound the number of model→tools cycles per turn.
    #[must_use]
    pub fn max_tool_recursion(mut self, max: usize) -> Self {
        self.max_tool_recursion = max;
        self
    }

    /// Set the per-call completion timeout.
    #[must_use]
    pub fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Load a built-in tool bundle by name. Unknown bundles are logged
    /// and skipped.
    #[must_use]
    pub fn tool_module(mut self, module: &str) -> Self {
        if let Err(e) = self.tools.load_tool_module(module) {
            warn!(module, error = %e, "failed to load tool module");
        }
        self
    }

    /// Register a custom tool from an async closure.
    #[must_use]
    pub fn tool<F, Fut>(mut self, definition: FunctionSpec, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        self.tools.register_fn(definition, f);
        self
    }

    /// Register a custom tool with declared attributes (e.g.
    /// `{"type": "interrupt"}`).
    #[must_use]
    pub fn tool_with_attributes<F, Fut>(
        mut self,
        definition: FunctionSpec,
        attributes: Map<String, Value>,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        let name = definition.name.clone();
        self.tools.register_fn(definition, f);
        self.tools.register_tool_attributes(&name, attributes);
        self
    }

    /// Replace the tool runtime wholesale, e.g. one pre-populated by
    /// the external tool bridge.
    #[must_use]
    pub fn tools(mut self, tools: ToolRuntime) -> Self {
        self.tools = tools;
        self
    }

    /// Set the thread store.
    #[must_use]
    pub fn thread_store(mut self, store: Arc<dyn ThreadStore>) -> Self {
        self.thread_store = Some(store);
        self
    }

    /// Disable persistence entirely.
    #[must_use]
    pub fn without_thread_store(mut self) -> Self {
        self.thread_store = None;
        self
    }

    /// Set the file store used for attachments and tool artifacts.
    #[must_use]
    pub fn file_store(mut self, store: Arc<dyn FileBackend>) -> Self {
        self.file_store = Some(store);
        self
    }

    /// Replace the attachment file processor.
    #[must_use]
    pub fn processor(mut self, processor: Arc<dyn FileProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Build the agent.
    #[must_use]
    pub fn build(self) -> Agent {
        Agent {
            model_name: self.model_name,
            temperature: self.temperature,
            name: self.name,
            purpose: self.purpose,
            notes: self.notes,
            max_tool_recursion: self.max_tool_recursion,
            completion_timeout: self.completion_timeout,
            provider: self.provider,
            tools: Arc::new(self.tools),
            thread_store: self.thread_store,
            file_store: self.file_store,
            processor: self.processor,
        }
    }
}
