//! Transcript model: an append-only sequence of display segments.
//!
//! The transcript never reorders or removes segments. At most one segment is
//! open (still receiving merges) and it is always the last one: every push
//! force-completes the previous tail first.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Content of the record substituted for tool output that does not decode.
pub const TOOL_OUTPUT_PARSE_ERROR: &str = "Error: Could not parse tool output.";

/// One result record returned by a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutputResult {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolOutputResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Map::new(),
        }
    }

    /// The synthetic record used when a tool's output cannot be decoded.
    pub fn parse_error() -> Self {
        Self::new(TOOL_OUTPUT_PARSE_ERROR)
    }
}

#[derive(Deserialize)]
struct ToolOutputPayload {
    results: Vec<ToolOutputResult>,
}

/// Decode a `tool_output` payload of the form `{"results": [...]}`.
pub fn parse_tool_output(raw: &str) -> Result<Vec<ToolOutputResult>, serde_json::Error> {
    serde_json::from_str::<ToolOutputPayload>(raw).map(|payload| payload.results)
}

/// One tool invocation and its result, once known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolStep {
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: String,
    pub output: Option<Vec<ToolOutputResult>>,
}

impl ToolStep {
    /// A step still waiting for its output.
    pub fn pending(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input: input.into(),
            output: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.output.is_some()
    }
}

/// Outcome of assigning output to a step of a tool group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The step took the output. `group_complete` is true when it was the last
    /// pending step.
    Resolved { group_complete: bool },
    /// The step already had output; nothing changed.
    AlreadyResolved,
    /// No step carries that id; nothing changed.
    Unknown,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserSegment {
    id: Uuid,
    content: String,
}

impl UserSegment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssistantSegment {
    id: Uuid,
    content: String,
    #[serde(rename = "isComplete")]
    is_complete: bool,
}

impl AssistantSegment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Append text. Returns false (and leaves the content alone) once the
    /// segment is complete.
    pub fn append(&mut self, text: &str) -> bool {
        if self.is_complete {
            return false;
        }
        self.content.push_str(text);
        true
    }

    pub fn complete(&mut self) {
        self.is_complete = true;
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolGroupSegment {
    id: Uuid,
    steps: Vec<ToolStep>,
    #[serde(rename = "isComplete")]
    is_complete: bool,
}

impl ToolGroupSegment {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn steps(&self) -> &[ToolStep] {
        &self.steps
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn contains(&self, tool_call_id: &str) -> bool {
        self.steps.iter().any(|s| s.tool_call_id == tool_call_id)
    }

    /// Add a step. Refused when the group is complete or already has a step
    /// with the same `tool_call_id`.
    pub fn push_step(&mut self, step: ToolStep) -> bool {
        if self.is_complete || self.contains(&step.tool_call_id) {
            return false;
        }
        self.steps.push(step);
        true
    }

    /// Assign output to the step with `tool_call_id`. Completes the group once
    /// every step has output.
    pub fn resolve(&mut self, tool_call_id: &str, output: Vec<ToolOutputResult>) -> Resolution {
        let Some(step) = self.steps.iter_mut().find(|s| s.tool_call_id == tool_call_id) else {
            return Resolution::Unknown;
        };
        if step.is_resolved() {
            return Resolution::AlreadyResolved;
        }
        step.output = Some(output);

        let group_complete = self.steps.iter().all(ToolStep::is_resolved);
        if group_complete {
            self.is_complete = true;
        }
        Resolution::Resolved { group_complete }
    }

    pub fn complete(&mut self) {
        self.is_complete = true;
    }
}

/// Discriminant of a [`Segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    User,
    Assistant,
    ToolGroup,
}

/// One entry of the transcript.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum Segment {
    #[serde(rename = "user")]
    User(UserSegment),
    #[serde(rename = "assistant")]
    Assistant(AssistantSegment),
    #[serde(rename = "tool_step")]
    ToolGroup(ToolGroupSegment),
}

impl Segment {
    pub fn id(&self) -> Uuid {
        match self {
            Segment::User(s) => s.id,
            Segment::Assistant(s) => s.id,
            Segment::ToolGroup(s) => s.id,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::User(_) => SegmentKind::User,
            Segment::Assistant(_) => SegmentKind::Assistant,
            Segment::ToolGroup(_) => SegmentKind::ToolGroup,
        }
    }

    /// User segments are never open.
    pub fn is_open(&self) -> bool {
        match self {
            Segment::User(_) => false,
            Segment::Assistant(s) => !s.is_complete,
            Segment::ToolGroup(s) => !s.is_complete,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantSegment> {
        match self {
            Segment::Assistant(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tool_group(&self) -> Option<&ToolGroupSegment> {
        match self {
            Segment::ToolGroup(s) => Some(s),
            _ => None,
        }
    }

    fn complete(&mut self) -> bool {
        match self {
            Segment::User(_) => false,
            Segment::Assistant(s) if !s.is_complete => {
                s.complete();
                true
            }
            Segment::ToolGroup(s) if !s.is_complete => {
                s.complete();
                true
            }
            _ => false,
        }
    }
}

/// Ordered, append-only conversation transcript.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct Transcript {
    segments: Vec<Segment>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// True when the tail segment is still open.
    pub fn has_open_tail(&self) -> bool {
        self.last().is_some_and(Segment::is_open)
    }

    /// The tail segment, if it is an open assistant segment.
    pub fn open_assistant_mut(&mut self) -> Option<&mut AssistantSegment> {
        match self.segments.last_mut() {
            Some(Segment::Assistant(s)) if !s.is_complete => Some(s),
            _ => None,
        }
    }

    /// The tail segment, if it is an open tool group.
    pub fn open_tool_group_mut(&mut self) -> Option<&mut ToolGroupSegment> {
        match self.segments.last_mut() {
            Some(Segment::ToolGroup(s)) if !s.is_complete => Some(s),
            _ => None,
        }
    }

    /// The tail segment, if it is a tool group, open or complete.
    pub fn tail_tool_group_mut(&mut self) -> Option<&mut ToolGroupSegment> {
        match self.segments.last_mut() {
            Some(Segment::ToolGroup(s)) => Some(s),
            _ => None,
        }
    }

    /// Force-complete the tail segment. Returns true if it was open.
    pub fn complete_tail(&mut self) -> bool {
        self.segments.last_mut().is_some_and(Segment::complete)
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Uuid {
        self.push(Segment::User(UserSegment {
            id: Uuid::new_v4(),
            content: content.into(),
        }))
    }

    /// Append an open assistant segment.
    pub fn push_assistant(&mut self, content: impl Into<String>) -> Uuid {
        self.push(Segment::Assistant(AssistantSegment {
            id: Uuid::new_v4(),
            content: content.into(),
            is_complete: false,
        }))
    }

    /// Append an assistant segment that is already complete.
    pub fn push_completed_assistant(&mut self, content: impl Into<String>) -> Uuid {
        self.push(Segment::Assistant(AssistantSegment {
            id: Uuid::new_v4(),
            content: content.into(),
            is_complete: true,
        }))
    }

    /// Append an open tool group holding only `step`.
    pub fn push_tool_group(&mut self, step: ToolStep) -> Uuid {
        self.push(Segment::ToolGroup(ToolGroupSegment {
            id: Uuid::new_v4(),
            steps: vec![step],
            is_complete: false,
        }))
    }

    fn push(&mut self, segment: Segment) -> Uuid {
        self.complete_tail();
        let id = segment.id();
        self.segments.push(segment);
        id
    }
}
