//! Drives one turn: pulls events, reduces them, publishes snapshots.

use futures::{Stream, StreamExt};
use sc_protocol::{Transcript, TurnEvent};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::reducer::{finalize, record_failure, reduce, Applied};

/// Receives the transcript after every change.
///
/// Observers only ever see a shared borrow; anything that must outlive the
/// call has to be cloned.
pub trait TranscriptObserver {
    fn transcript_changed(&mut self, transcript: &Transcript);
}

impl<F> TranscriptObserver for F
where
    F: FnMut(&Transcript),
{
    fn transcript_changed(&mut self, transcript: &Transcript) {
        self(transcript)
    }
}

/// Publishes owned snapshots to any number of `watch` receivers.
impl TranscriptObserver for watch::Sender<Transcript> {
    fn transcript_changed(&mut self, transcript: &Transcript) {
        self.send_replace(transcript.clone());
    }
}

/// Observer that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TranscriptObserver for NoopObserver {
    fn transcript_changed(&mut self, _transcript: &Transcript) {}
}

/// Summary of a finished turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Events that changed the transcript.
    pub applied: usize,
    /// Events that were accepted but had no effect.
    pub ignored: usize,
    /// Transport failure message, if the turn ended in one.
    pub failure: Option<String>,
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    fn record(&mut self, applied: Applied) {
        if applied.changed() {
            self.applied += 1;
        } else {
            self.ignored += 1;
        }
    }
}

/// Run one turn to completion.
///
/// Each event is reduced and published before the next one is pulled. On a
/// transport error the failure notice is recorded and the stream is not polled
/// again. Whatever ends the turn, the open tail is force-completed and one
/// final snapshot is published.
pub async fn drive_turn<S, O>(transcript: &mut Transcript, events: S, observer: &mut O) -> TurnOutcome
where
    S: Stream<Item = TurnEvent>,
    O: TranscriptObserver + ?Sized,
{
    let mut events = std::pin::pin!(events);
    let mut outcome = TurnOutcome::default();

    while let Some(item) = events.next().await {
        match item {
            TurnEvent::Event(event) => {
                let kind = event.kind();
                let applied = reduce(transcript, event);
                debug!(kind, ?applied, "applied event");
                outcome.record(applied);
                if applied.changed() {
                    observer.transcript_changed(transcript);
                }
            }
            TurnEvent::Error(message) => {
                warn!(error = %message, "turn failed");
                record_failure(transcript);
                observer.transcript_changed(transcript);
                outcome.failure = Some(message);
                break;
            }
            TurnEvent::Done => break,
        }
    }

    finalize(transcript);
    observer.transcript_changed(transcript);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::STREAM_ERROR_NOTICE;
    use sc_backend::mock::{fixtures, mock_stream, MockConfig, MockResponse};
    use sc_protocol::Event;

    #[tokio::test]
    async fn streams_reply_and_finalizes() {
        let mut transcript = Transcript::new();
        let mut snapshots: Vec<Transcript> = Vec::new();
        let mut observer = |t: &Transcript| snapshots.push(t.clone());

        let outcome = drive_turn(
            &mut transcript,
            mock_stream(fixtures::streaming_text(&["Hel", "lo"])),
            &mut observer,
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.applied, 2);
        // one per event plus the final snapshot
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots[1].has_open_tail());

        let segment = transcript.segments()[0].as_assistant().unwrap();
        assert_eq!(segment.content(), "Hello");
        assert!(segment.is_complete());
        assert_eq!(snapshots.last(), Some(&transcript));
    }

    #[tokio::test]
    async fn truncated_stream_still_finalizes() {
        let mut transcript = Transcript::new();
        let events = futures::stream::iter(vec![TurnEvent::Event(Event::model_token("cut"))]);

        let outcome = drive_turn(&mut transcript, events, &mut NoopObserver).await;

        assert!(outcome.is_success());
        let segment = transcript.segments()[0].as_assistant().unwrap();
        assert_eq!(segment.content(), "cut");
        assert!(segment.is_complete());
    }

    #[tokio::test]
    async fn mid_stream_error_is_appended_to_reply() {
        let mut transcript = Transcript::new();
        let outcome = drive_turn(
            &mut transcript,
            mock_stream(fixtures::error_mid_stream("Searching", "connection reset")),
            &mut NoopObserver,
        )
        .await;

        assert_eq!(
            outcome.failure.as_deref(),
            Some("Stream error: connection reset")
        );
        assert_eq!(transcript.len(), 1);
        let segment = transcript.segments()[0].as_assistant().unwrap();
        assert_eq!(segment.content(), format!("Searching\n\n{STREAM_ERROR_NOTICE}"));
        assert!(segment.is_complete());
    }

    #[tokio::test]
    async fn connect_failure_adds_error_segment() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");

        let outcome = drive_turn(
            &mut transcript,
            mock_stream(fixtures::unreachable("connection refused")),
            &mut NoopObserver,
        )
        .await;

        assert!(!outcome.is_success());
        assert_eq!(transcript.len(), 2);
        let segment = transcript.segments()[1].as_assistant().unwrap();
        assert_eq!(segment.content(), STREAM_ERROR_NOTICE);
        assert!(segment.is_complete());
    }

    #[tokio::test]
    async fn nothing_is_pulled_after_an_error() {
        let mut transcript = Transcript::new();
        let events = futures::stream::iter(vec![
            TurnEvent::Error("boom".to_string()),
            TurnEvent::Event(Event::model_token("late")),
        ]);

        drive_turn(&mut transcript, events, &mut NoopObserver).await;

        assert_eq!(transcript.len(), 1);
        assert_eq!(
            transcript.segments()[0].as_assistant().unwrap().content(),
            STREAM_ERROR_NOTICE
        );
    }

    #[tokio::test]
    async fn ignored_events_are_counted_not_published() {
        let mut transcript = Transcript::new();
        let mut published = 0;
        let mut observer = |_: &Transcript| published += 1;
        let config = MockConfig::new().with_responses(vec![
            MockResponse::Event(Event::Token {
                node: Some(sc_protocol::TokenNode::Tools),
                token: "raw".to_string(),
            }),
            MockResponse::Event(Event::tool_output("nope", "{}")),
        ]);

        let outcome = drive_turn(&mut transcript, mock_stream(config), &mut observer).await;

        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.ignored, 2);
        assert_eq!(published, 1);
        assert!(transcript.is_empty());
    }

    #[tokio::test]
    async fn watch_sender_publishes_snapshots() {
        let (mut tx, rx) = watch::channel(Transcript::new());
        let mut transcript = Transcript::new();

        drive_turn(
            &mut transcript,
            mock_stream(fixtures::search_then_answer("Checking.", "visa", "r", "Yes.")),
            &mut tx,
        )
        .await;

        let latest = rx.borrow().clone();
        assert_eq!(latest, transcript);
        assert_eq!(latest.len(), 3);
        assert!(!latest.has_open_tail());
    }
}
