//! sc-backend: Transport side of streamchat.
//!
//! This crate turns the backend's chunked `data:` byte stream into typed
//! events, and provides the HTTP client plus a scripted mock that both yield
//! the same per-turn event sequence.

pub mod client;
pub mod frame;
pub mod mock;

pub use client::{ChatBackend, ChatClient, ClientError, ClientOptions};
pub use frame::{decode_event, decode_events, parse_frame_stream, FrameDecoder, FrameStream};
pub use mock::{MockBackend, MockConfig, MockResponse};
