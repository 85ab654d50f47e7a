//! Tool registry and built-in tool implementations for Cairn.

mod bash;
mod read;
mod registry;
mod write;

pub use bash::BashTool;
pub use read::ReadTool;
pub use registry::ToolRegistry;
pub use write::WriteTool;

use std::path::{Path, PathBuf};

/// Resolve a tool-supplied path against the working directory.
pub(crate) fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        cwd.join(candidate)
    }
}
