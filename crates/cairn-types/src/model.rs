//! Model client trait for language-model services.

use crate::{ApiError, CreateMessageRequest, CreateMessageResponse};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`ModelClient::create_message`].
pub type ModelFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CreateMessageResponse, ApiError>> + Send + 'a>>;

/// A language-model service the agent loop talks to.
///
/// Accepts the ordered transcript plus tool definitions and returns the
/// assistant's content blocks with a stop reason. Dyn-compatible so the agent
/// can hold an `Arc<dyn ModelClient>`.
pub trait ModelClient: Send + Sync {
    /// Send one request and wait for the complete reply.
    fn create_message<'a>(&'a self, request: &'a CreateMessageRequest) -> ModelFuture<'a>;

    /// Client name for logging/display (e.g., "anthropic").
    fn name(&self) -> &str;
}
