//! Anthropic Messages API model client for Cairn.

mod client;
mod retry;

pub use client::{ANTHROPIC_VERSION, AnthropicClient, DEFAULT_BASE_URL};
pub use retry::{RetryConfig, calculate_delay, is_retryable};
