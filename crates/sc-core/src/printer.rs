//! Plain-text terminal output for the CLI.
//!
//! Prints each transcript update incrementally: only the new suffix of
//! assistant text, one line when a tool is called, one line when its output
//! arrives. No markdown rendering.

use std::io::Write;

use sc_protocol::{Segment, ToolStep, Transcript};

use crate::turn::TranscriptObserver;

/// How far each segment has already been printed.
#[derive(Debug, Default, Clone)]
struct Progress {
    text_len: usize,
    steps_called: usize,
    steps_resolved: Vec<bool>,
    closed: bool,
}

/// Writes transcript updates to `W` as they happen.
pub struct TranscriptPrinter<W: Write> {
    writer: W,
    show_user: bool,
    progress: Vec<Progress>,
}

impl<W: Write> TranscriptPrinter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            show_user: false,
            progress: Vec::new(),
        }
    }

    /// Echo user messages too (off by default: the user just typed them).
    pub fn with_user_echo(mut self) -> Self {
        self.show_user = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn print_segment(&mut self, index: usize, segment: &Segment) {
        let progress = &mut self.progress[index];
        match segment {
            Segment::User(user) => {
                if !progress.closed {
                    progress.closed = true;
                    if self.show_user {
                        let _ = writeln!(self.writer, "> {}", user.content());
                    }
                }
            }
            Segment::Assistant(assistant) => {
                let content = assistant.content();
                if content.len() > progress.text_len {
                    let _ = write!(self.writer, "{}", &content[progress.text_len..]);
                    progress.text_len = content.len();
                }
                if assistant.is_complete() && !progress.closed {
                    progress.closed = true;
                    let _ = writeln!(self.writer);
                }
            }
            Segment::ToolGroup(group) => {
                let steps = group.steps();
                for step in &steps[progress.steps_called..] {
                    let _ = writeln!(self.writer, "[{}] {}", tool_label(step), step.input);
                }
                progress.steps_called = steps.len();
                progress.steps_resolved.resize(steps.len(), false);

                for (i, step) in steps.iter().enumerate() {
                    if step.is_resolved() && !progress.steps_resolved[i] {
                        progress.steps_resolved[i] = true;
                        let _ = writeln!(self.writer, "{}", describe_output(step));
                    }
                }
                if group.is_complete() {
                    progress.closed = true;
                }
            }
        }
    }
}

fn tool_label(step: &ToolStep) -> &str {
    if step.tool_name.is_empty() {
        "tool"
    } else {
        &step.tool_name
    }
}

fn describe_output(step: &ToolStep) -> String {
    let count = step.output.as_ref().map_or(0, Vec::len);
    let noun = if count == 1 { "result" } else { "results" };
    format!("[{}] {count} {noun}", tool_label(step))
}

impl<W: Write> TranscriptObserver for TranscriptPrinter<W> {
    fn transcript_changed(&mut self, transcript: &Transcript) {
        let segments = transcript.segments();
        if self.progress.len() < segments.len() {
            self.progress.resize(segments.len(), Progress::default());
        }
        for (index, segment) in segments.iter().enumerate() {
            if !self.progress[index].closed {
                self.print_segment(index, segment);
            }
        }
        let _ = self.writer.flush();
    }
}
