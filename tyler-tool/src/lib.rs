//! Tool registry and executor for the Tyler agent runtime.
//!
//! [`ToolRuntime`] holds a name→entry map of callable tools — built-in
//! bundles, custom tools, and proxies registered by the external tool
//! bridge — and executes the tool calls emitted by the model. Tool
//! failures never crash the loop: every error is converted into an error
//! content string on the result.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use tyler_types::{FunctionSpec, ToolCall, ToolError, ToolSpec};

pub mod builtin;

/// Future returned by a tool implementation.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send>>;

/// A type-erased tool implementation.
pub type ToolImpl = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A file produced by an artifact-producing tool. The agent loop turns
/// artifacts into attachments on the tool message.
#[derive(Debug, Clone)]
pub struct ToolArtifact {
    /// Filename for the produced file.
    pub filename: String,
    /// Raw file bytes.
    pub content: Vec<u8>,
    /// MIME type, when the tool knows it.
    pub mime_type: Option<String>,
}

/// The outcome of a successful tool execution: a JSON content value plus
/// any produced files.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// The content handed back to the model (stringified into the tool
    /// message).
    pub content: Value,
    /// Files produced by the tool.
    pub artifacts: Vec<ToolArtifact>,
}

impl ToolOutput {
    /// Attach produced files to the output.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<ToolArtifact>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

impl From<Value> for ToolOutput {
    fn from(content: Value) -> Self {
        Self {
            content,
            artifacts: Vec::new(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(content: String) -> Self {
        Value::String(content).into()
    }
}

/// One tool within a built-in bundle.
pub struct ToolModuleEntry {
    /// The tool's callable surface.
    pub definition: FunctionSpec,
    /// The implementation.
    pub implementation: ToolImpl,
    /// Declared attributes, if any.
    pub attributes: Option<Map<String, Value>>,
}

/// The formatted result of a tool call, ready to become a tool message.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    /// Correlation id copied from the call.
    pub tool_call_id: String,
    /// Name of the invoked tool.
    pub name: String,
    /// Stringified result, or `"Error executing tool: …"` on failure.
    pub content: String,
    /// Files produced by the tool.
    pub artifacts: Vec<ToolArtifact>,
}

struct ToolEntry {
    definition: FunctionSpec,
    implementation: ToolImpl,
    attributes: Option<Map<String, Value>>,
}

/// Registry and executor of tool implementations.
///
/// Registrations happen at agent construction and bridge initialization;
/// execution reads are concurrent-safe once the runtime is shared.
#[derive(Default)]
pub struct ToolRuntime {
    tools: HashMap<String, ToolEntry>,
}

impl ToolRuntime {
    /// Create an empty runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. When an entry with the same name already exists,
    /// only the implementation is overwritten; the stored definition and
    /// attributes are kept.
    pub fn register_tool(
        &mut self,
        name: impl Into<String>,
        implementation: ToolImpl,
        definition: FunctionSpec,
    ) {
        let name = name.into();
        match self.tools.get_mut(&name) {
            Some(entry) => entry.implementation = implementation,
            None => {
                self.tools.insert(
                    name,
                    ToolEntry {
                        definition,
                        implementation,
                        attributes: None,
                    },
                );
            }
        }
    }

    /// Register an async closure as a tool.
    pub fn register_fn<F, Fut>(&mut self, definition: FunctionSpec, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
    {
        let name = definition.name.clone();
        let implementation: ToolImpl = Arc::new(move |input| Box::pin(f(input)));
        self.register_tool(name, implementation, definition);
    }

    /// Register a synchronous closure as a tool. Execution is offloaded
    /// to a blocking worker thread so the scheduler is never blocked.
    pub fn register_sync_fn<F>(&mut self, definition: FunctionSpec, f: F)
    where
        F: Fn(Value) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let name = definition.name.clone();
        let implementation: ToolImpl = Arc::new(move |input| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                tokio::task::spawn_blocking(move || f(input))
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
            })
        });
        self.register_tool(name, implementation, definition);
    }

    /// Attach a metadata map to a tool. Reserved keys (`type`, `source`,
    /// `server`) drive loop behaviors such as interrupt tools.
    pub fn register_tool_attributes(
        &mut self,
        name: &str,
        attributes: Map<String, Value>,
    ) {
        if let Some(entry) = self.tools.get_mut(name) {
            entry.attributes = Some(attributes);
        } else {
            warn!(tool = name, "attributes registered for unknown tool");
        }
    }

    /// The declared attributes of a tool, if any.
    #[must_use]
    pub fn get_tool_attributes(&self, name: &str) -> Option<&Map<String, Value>> {
        self.tools.get(name).and_then(|e| e.attributes.as_ref())
    }

    /// Resolve a built-in bundle and register each tool therein,
    /// returning the loaded definitions.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ModuleNotFound`] for an unknown bundle name.
    pub fn load_tool_module(&mut self, module: &str) -> Result<Vec<ToolSpec>, ToolError> {
        let entries =
            builtin::module(module).ok_or_else(|| ToolError::ModuleNotFound(module.into()))?;
        debug!(module, count = entries.len(), "loading tool module");

        let mut loaded = Vec::with_capacity(entries.len());
        for entry in entries {
            loaded.push(ToolSpec::function(entry.definition.clone()));
            let name = entry.definition.name.clone();
            self.register_tool(name.clone(), entry.implementation, entry.definition);
            if let Some(attributes) = entry.attributes {
                self.register_tool_attributes(&name, attributes);
            }
        }
        Ok(loaded)
    }

    /// Names of all registered tools.
    #[must_use]
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// The description of a tool, if registered.
    #[must_use]
    pub fn get_tool_description(&self, name: &str) -> Option<&str> {
        self.tools
            .get(name)
            .and_then(|e| e.definition.description.as_deref())
    }

    /// The parameter schema of a tool, if registered.
    #[must_use]
    pub fn get_tool_parameters(&self, name: &str) -> Option<&Value> {
        self.tools
            .get(name)
            .and_then(|e| e.definition.parameters.as_ref())
    }

    /// All tool definitions in the OpenAI chat-completion shape.
    #[must_use]
    pub fn get_tools_for_chat_completion(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|e| ToolSpec::function(e.definition.clone()))
            .collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the runtime has no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a model-emitted tool call.
    ///
    /// Arguments are decoded as JSON (an empty string counts as `{}`).
    /// Unknown tools, invalid arguments, and implementation failures are
    /// all captured into an error content string; the loop is never
    /// crashed by a tool.
    pub async fn execute_tool_call(&self, call: &ToolCall) -> ToolCallResult {
        let name = call.function.name.clone();
        let outcome = self.run_call(call).await;
        match outcome {
            Ok(output) => ToolCallResult {
                tool_call_id: call.id.clone(),
                name,
                content: stringify(&output.content),
                artifacts: output.artifacts,
            },
            Err(error) => {
                debug!(tool = %name, %error, "tool call failed");
                ToolCallResult {
                    tool_call_id: call.id.clone(),
                    name,
                    content: format!("Error executing tool: {error}"),
                    artifacts: Vec::new(),
                }
            }
        }
    }

    async fn run_call(&self, call: &ToolCall) -> Result<ToolOutput, ToolError> {
        let raw = call.function.arguments.trim();
        let raw = if raw.is_empty() { "{}" } else { raw };
        let input: Value = serde_json::from_str(raw)
            .map_err(|e| ToolError::InvalidInput(format!("arguments are not valid JSON: {e}")))?;

        let implementation = self
            .tools
            .get(&call.function.name)
            .map(|entry| Arc::clone(&entry.implementation))
            .ok_or_else(|| ToolError::NotFound(call.function.name.clone()))?;

        implementation(input).await
    }
}

/// Stringify a tool's content value: strings verbatim, everything else
/// as compact JSON.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
