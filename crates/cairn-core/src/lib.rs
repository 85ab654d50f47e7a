//! Conversation orchestration for Cairn.

pub mod agent;

pub use agent::{Agent, AgentEvent, IterationBudget, RunOutcome, RunSummary};
