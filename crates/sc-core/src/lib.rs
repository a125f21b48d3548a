//! sc-core: Transcript reconstruction for streamchat.
//!
//! This crate folds the backend's event stream into the transcript, drives
//! turns, and hosts the CLI. Exposed as a library for integration testing.

pub mod config;
pub mod logging;
pub mod printer;
pub mod reducer;
pub mod session;
pub mod turn;

pub use reducer::{finalize, record_failure, reduce, Applied, IgnoreReason};
pub use session::ChatSession;
pub use turn::{drive_turn, NoopObserver, TranscriptObserver, TurnOutcome};
