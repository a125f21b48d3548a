//! Folds wire events into the transcript.
//!
//! `reduce` is the only place events change the transcript. It mutates the one
//! owned `Transcript` in place, one event at a time, and reports what it did
//! so callers can log and count without re-inspecting the transcript.

use sc_protocol::{
    parse_tool_output, Event, Resolution, TokenNode, ToolOutputResult, ToolStep, Transcript,
};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// Notice shown when the stream could not be opened or broke off.
pub const STREAM_ERROR_NOTICE: &str =
    "**Error:** Failed to connect to the stream. Is the server running?";

/// Why an event left the transcript unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Token from a node other than the model.
    NonModelToken,
    /// Tool call whose id is already in the open tool group.
    DuplicateToolCall,
    /// Tool output arrived while the tail is not a tool group.
    NoToolGroup,
    /// Tool output for an id the tail tool group does not contain.
    UnmatchedToolOutput,
    /// Tool output for a step that already has output.
    DuplicateToolOutput,
}

/// What `reduce` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Text was appended to the open assistant segment.
    MergedToken,
    /// A new assistant segment was started.
    StartedAssistant,
    /// A step was added to the open tool group.
    AddedToolStep,
    /// A new tool group was started.
    StartedToolGroup,
    /// A step received its output. `decoded` is false when the synthetic
    /// error record was stored instead.
    ResolvedToolStep { decoded: bool, group_complete: bool },
    Ignored(IgnoreReason),
}

impl Applied {
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Ignored(_))
    }
}

/// Apply one event to the transcript.
pub fn reduce(transcript: &mut Transcript, event: Event) -> Applied {
    match event {
        Event::Token { node, token } => match node {
            Some(TokenNode::Model) => apply_model_token(transcript, &token),
            Some(TokenNode::Tools) | Some(TokenNode::Other) | None => {
                trace!(?node, "ignoring token from non-model node");
                Applied::Ignored(IgnoreReason::NonModelToken)
            }
        },
        Event::ToolCall {
            tool_id,
            tool_name,
            tool_input,
        } => apply_tool_call(transcript, ToolStep::pending(tool_id, tool_name, tool_input.query)),
        Event::ToolOutput {
            tool_call_id,
            output,
            ..
        } => apply_tool_output(transcript, &tool_call_id, &output),
    }
}

fn apply_model_token(transcript: &mut Transcript, token: &str) -> Applied {
    if let Some(segment) = transcript.open_assistant_mut() {
        segment.append(token);
        return Applied::MergedToken;
    }
    transcript.push_assistant(token);
    Applied::StartedAssistant
}

fn apply_tool_call(transcript: &mut Transcript, step: ToolStep) -> Applied {
    if transcript.open_assistant_mut().is_some() {
        transcript.complete_tail();
    }

    if let Some(group) = transcript.open_tool_group_mut() {
        let tool_call_id = step.tool_call_id.clone();
        if group.push_step(step) {
            return Applied::AddedToolStep;
        }
        debug!(%tool_call_id, "ignoring repeated tool call");
        return Applied::Ignored(IgnoreReason::DuplicateToolCall);
    }

    transcript.push_tool_group(step);
    Applied::StartedToolGroup
}

fn apply_tool_output(transcript: &mut Transcript, tool_call_id: &str, output: &Value) -> Applied {
    let Some(group) = transcript.tail_tool_group_mut() else {
        debug!(tool_call_id, "tool output without a tool group at the tail");
        return Applied::Ignored(IgnoreReason::NoToolGroup);
    };
    if !group.contains(tool_call_id) {
        debug!(tool_call_id, "tool output for unknown call");
        return Applied::Ignored(IgnoreReason::UnmatchedToolOutput);
    }

    let parsed = match output {
        Value::String(raw) => parse_tool_output(raw).map_err(|e| e.to_string()),
        other => Err(format!("expected a JSON string, got {other}")),
    };
    let (results, decoded) = match parsed {
        Ok(results) => (results, true),
        Err(e) => {
            warn!(tool_call_id, error = %e, raw = %output, "could not parse tool output");
            (vec![ToolOutputResult::parse_error()], false)
        }
    };

    match group.resolve(tool_call_id, results) {
        Resolution::Resolved { group_complete } => Applied::ResolvedToolStep {
            decoded,
            group_complete,
        },
        Resolution::AlreadyResolved => {
            debug!(tool_call_id, "ignoring repeated tool output");
            Applied::Ignored(IgnoreReason::DuplicateToolOutput)
        }
        Resolution::Unknown => Applied::Ignored(IgnoreReason::UnmatchedToolOutput),
    }
}

/// Close the turn: force-complete whatever segment is still open.
pub fn finalize(transcript: &mut Transcript) -> bool {
    transcript.complete_tail()
}

/// Record a transport failure as visible assistant text.
pub fn record_failure(transcript: &mut Transcript) {
    if let Some(segment) = transcript.open_assistant_mut() {
        segment.append("\n\n");
        segment.append(STREAM_ERROR_NOTICE);
        return;
    }
    transcript.push_completed_assistant(STREAM_ERROR_NOTICE);
}
