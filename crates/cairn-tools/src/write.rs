//! Write tool — creates or overwrites files.

use cairn_types::{Tool, ToolContext, ToolDefinition, ToolError, ToolFuture, ToolOutput};
use serde::Deserialize;

/// Tool for creating or overwriting files.
pub struct WriteTool;

#[derive(Deserialize)]
struct WriteInput {
    file_path: String,
    content: String,
}

impl Tool for WriteTool {
    fn name(&self) -> &str {
        "Write"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "Write".to_string(),
            description: "Write content to a file, creating parent directories as needed. \
                          Existing files are overwritten."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "required": ["file_path", "content"],
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file, absolute or relative to the working directory"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full file contents"
                    }
                }
            }),
        }
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let input: WriteInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
                    tool: "Write".into(),
                    message: e.to_string(),
                })?;

            let path = crate::resolve_path(&ctx.cwd, &input.file_path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ToolError::ExecutionFailed(format!("{}: {e}", parent.display()))
                })?;
            }

            tokio::fs::write(&path, &input.content)
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", path.display())))?;

            Ok(ToolOutput::text(format!(
                "Wrote {} bytes to {}",
                input.content.len(),
                path.display()
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext {
            cwd: dir.path().to_path_buf(),
        };

        let output = WriteTool
            .execute(
                serde_json::json!({"file_path": "a/b/out.txt", "content": "hello"}),
                ctx,
            )
            .await
            .unwrap();

        assert!(!output.is_error);
        assert!(output.content.starts_with("Wrote 5 bytes"));
        let written = std::fs::read_to_string(dir.path().join("a/b/out.txt")).unwrap();
        assert_eq!(written, "hello");
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.txt");
        std::fs::write(&path, "old").unwrap();

        WriteTool
            .execute(
                serde_json::json!({"file_path": path.to_str().unwrap(), "content": "new"}),
                ToolContext {
                    cwd: dir.path().to_path_buf(),
                },
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }
}
