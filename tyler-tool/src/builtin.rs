//! Built-in tool bundles.
//!
//! Each bundle is a static list of `{definition, implementation,
//! attributes}` entries resolved by name through
//! [`ToolRuntime::load_tool_module`](crate::ToolRuntime::load_tool_module).

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};

use tyler_types::{FunctionSpec, ToolError};

use crate::{ToolFuture, ToolModuleEntry, ToolOutput};

/// Resolve a bundle by name.
#[must_use]
pub fn module(name: &str) -> Option<Vec<ToolModuleEntry>> {
    match name {
        "files" => Some(files_tools()),
        "datetime" => Some(datetime_tools()),
        _ => None,
    }
}

fn required_str(input: &Value, key: &str) -> Result<String, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ToolError::InvalidInput(format!("missing required field: {key}")))
}

fn files_tools() -> Vec<ToolModuleEntry> {
    vec![
        ToolModuleEntry {
            definition: FunctionSpec {
                name: "read_file".into(),
                description: Some("Read a text file and return its contents".into()),
                parameters: Some(json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path of the file to read"}
                    },
                    "required": ["path"]
                })),
            },
            implementation: Arc::new(|input: Value| -> ToolFuture {
                Box::pin(async move {
                    let path = PathBuf::from(required_str(&input, "path")?);
                    let contents = tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                    Ok(ToolOutput::from(json!({
                        "path": path.display().to_string(),
                        "content": contents,
                    })))
                })
            }),
            attributes: None,
        },
        ToolModuleEntry {
            definition: FunctionSpec {
                name: "write_file".into(),
                description: Some("Write text content to a file, creating it if needed".into()),
                parameters: Some(json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Destination path"},
                        "content": {"type": "string", "description": "Text to write"}
                    },
                    "required": ["path", "content"]
                })),
            },
            implementation: Arc::new(|input: Value| -> ToolFuture {
                Box::pin(async move {
                    let path = PathBuf::from(required_str(&input, "path")?);
                    let content = required_str(&input, "content")?;
                    if let Some(parent) = path.parent() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                    }
                    tokio::fs::write(&path, content.as_bytes())
                        .await
                        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                    Ok(ToolOutput::from(json!({
                        "path": path.display().to_string(),
                        "bytes_written": content.len(),
                    })))
                })
            }),
            attributes: None,
        },
        ToolModuleEntry {
            definition: FunctionSpec {
                name: "list_directory".into(),
                description: Some("List the entries of a directory".into()),
                parameters: Some(json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Directory to list"}
                    },
                    "required": ["path"]
                })),
            },
            implementation: Arc::new(|input: Value| -> ToolFuture {
                Box::pin(async move {
                    let path = PathBuf::from(required_str(&input, "path")?);
                    let mut reader = tokio::fs::read_dir(&path)
                        .await
                        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                    let mut entries = Vec::new();
                    while let Some(entry) = reader
                        .next_entry()
                        .await
                        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
                    {
                        entries.push(entry.file_name().to_string_lossy().into_owned());
                    }
                    entries.sort();
                    Ok(ToolOutput::from(json!({
                        "path": path.display().to_string(),
                        "entries": entries,
                    })))
                })
            }),
            attributes: None,
        },
    ]
}

fn datetime_tools() -> Vec<ToolModuleEntry> {
    vec![ToolModuleEntry {
        definition: FunctionSpec {
            name: "current_time".into(),
            description: Some("Get the current UTC date and time".into()),
            parameters: Some(json!({"type": "object", "properties": {}})),
        },
        implementation: Arc::new(|_input: Value| -> ToolFuture {
            Box::pin(async move {
                let now = chrono::Utc::now();
                Ok(ToolOutput::from(json!({
                    "utc": now.to_rfc3339(),
                    "date": now.format("%Y-%m-%d %A").to_string(),
                })))
            })
        }),
        attributes: None,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolRuntime;
    use tyler_types::{FunctionCall, ToolCall};

    fn call(name: &str, arguments: String) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            kind: "function".into(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    #[test]
    fn unknown_module_resolves_to_none() {
        assert!(module("translation").is_none());
    }

    #[tokio::test]
    async fn files_roundtrip_through_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");

        let mut runtime = ToolRuntime::new();
        runtime.load_tool_module("files").unwrap();

        let write = runtime
            .execute_tool_call(&call(
                "write_file",
                serde_json::to_string(&json!({
                    "path": path.display().to_string(),
                    "content": "hello tools",
                }))
                .unwrap(),
            ))
            .await;
        assert!(write.content.contains("bytes_written"));

        let read = runtime
            .execute_tool_call(&call(
                "read_file",
                serde_json::to_string(&json!({"path": path.display().to_string()})).unwrap(),
            ))
            .await;
        assert!(read.content.contains("hello tools"));

        let listing = runtime
            .execute_tool_call(&call(
                "list_directory",
                serde_json::to_string(&json!({"path": dir.path().display().to_string()}))
                    .unwrap(),
            ))
            .await;
        assert!(listing.content.contains("notes.txt"));
    }

    #[tokio::test]
    async fn read_missing_file_reports_error_content() {
        let mut runtime = ToolRuntime::new();
        runtime.load_tool_module("files").unwrap();

        let result = runtime
            .execute_tool_call(&call(
                "read_file",
                r#"{"path": "/definitely/not/here.txt"}"#.into(),
            ))
            .await;
        assert!(result.content.starts_with("Error executing tool:"));
    }

    #[tokio::test]
    async fn current_time_reports_utc() {
        let mut runtime = ToolRuntime::new();
        runtime.load_tool_module("datetime").unwrap();

        let result = runtime.execute_tool_call(&call("current_time", "{}".into())).await;
        assert!(result.content.contains("utc"));
    }
}
