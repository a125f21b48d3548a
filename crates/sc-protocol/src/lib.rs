//! sc-protocol: Shared types for streamchat.
//!
//! This crate defines the wire events streamed by the chat backend, the
//! per-turn request body, and the transcript model handed to frontends.

pub mod message;
pub mod request;
pub mod transcript;

pub use message::{Event, TokenNode, ToolInput, TurnEvent};
pub use request::ChatRequest;
pub use transcript::{
    parse_tool_output, AssistantSegment, Resolution, Segment, SegmentKind, ToolGroupSegment,
    ToolOutputResult, ToolStep, Transcript, UserSegment, TOOL_OUTPUT_PARSE_ERROR,
};
