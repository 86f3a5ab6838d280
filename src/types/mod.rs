//! Core conversation types shared across the runtime.

pub mod message;

pub use message::{Message, Role, ToolCall, ToolDefinition};
