//! Read tool — reads files with line numbers.

use cairn_types::{Tool, ToolContext, ToolDefinition, ToolError, ToolFuture, ToolOutput};
use serde::Deserialize;
use std::fmt::Write as _;

const DEFAULT_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

/// Tool for reading files with line numbers, offset, and limit support.
pub struct ReadTool;

#[derive(Deserialize)]
struct ReadInput {
    file_path: String,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    limit: Option<usize>,
}

impl Tool for ReadTool {
    fn name(&self) -> &str {
        "Read"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "Read".to_string(),
            description: "Read a text file. Returns the content with 1-based line numbers. \
                          Use offset and limit to page through large files."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "required": ["file_path"],
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path to the file, absolute or relative to the working directory"
                    },
                    "offset": {
                        "type": "integer",
                        "description": "First line to return (1-based)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of lines to return"
                    }
                }
            }),
        }
    }

    fn execute(&self, input: serde_json::Value, ctx: ToolContext) -> ToolFuture<'_> {
        Box::pin(async move {
            let input: ReadInput =
                serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
                    tool: "Read".into(),
                    message: e.to_string(),
                })?;

            let path = crate::resolve_path(&ctx.cwd, &input.file_path);
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ToolError::ExecutionFailed(format!("{}: {e}", path.display())))?;

            Ok(ToolOutput::text(number_lines(
                &content,
                input.offset.unwrap_or(1),
                input.limit.unwrap_or(DEFAULT_LIMIT),
            )))
        })
    }
}

/// Render `content` with right-aligned line numbers, starting at 1-based `offset`.
fn number_lines(content: &str, offset: usize, limit: usize) -> String {
    if content.is_empty() {
        return "(empty file)".to_string();
    }

    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    let start = offset.max(1) - 1;
    if start >= total {
        return format!("(offset {offset} is past the end of the file, {total} lines)");
    }
    let end = start.saturating_add(limit).min(total);
    let width = end.to_string().len();

    let mut out = String::new();
    for (i, line) in lines[start..end].iter().enumerate() {
        let shown = cairn_types::truncate_str(line, MAX_LINE_CHARS);
        let _ = writeln!(out, "{:>width$}\t{shown}", start + i + 1);
    }
    if end < total {
        let _ = write!(out, "\n(showing lines {}-{end} of {total})", start + 1);
    }
    out
}
