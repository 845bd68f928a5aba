//! # Orcha Core
//!
//! Domain types, traits, and error definitions for the Orcha tool-calling
//! orchestrator. This crate has **no I/O**; it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here (`ModelProvider`, `Tool`). Implementations live
//! in their respective crates, so backends can be swapped via configuration
//! and tests can drive the loop with scripted stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{History, Message, MessageToolCall, Role};
pub use provider::{
    ChunkReceiver, Completion, CompletionRequest, ModelConfig, ModelPricing, ModelProvider,
    StreamChunk, Usage,
};
pub use tool::{
    FnTool, ParameterKind, ParameterSpec, Tool, ToolDefinition, ToolParameters, ToolRegistry,
};
