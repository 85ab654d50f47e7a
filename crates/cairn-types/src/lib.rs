//! Shared types and error hierarchy for Cairn.

pub mod error;
pub mod message;
pub mod model;
pub mod tool;
pub mod util;

pub use error::{ApiError, CairnError, ConfigError, ToolError};
pub use message::*;
pub use model::{ModelClient, ModelFuture};
pub use tool::*;
pub use util::{truncate_for_display, truncate_str};
