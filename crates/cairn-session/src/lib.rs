//! Conversation session storage for Cairn.

pub mod error;
pub mod store;
pub mod types;

pub use error::SessionError;
pub use store::{JsonFileSessionStore, MemorySessionStore, SessionStore, StoreFuture};
pub use types::Session;
