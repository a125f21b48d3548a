//! Mock backend for testing.
//!
//! Encodes scripted events as `data:` frames, cuts the bytes into chunks and
//! feeds them through the real frame decoder, so tests at every layer see the
//! same `TurnEvent` sequence the HTTP client would produce.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use sc_protocol::{ChatRequest, Event, TurnEvent};
use tokio::time::sleep;

use crate::client::ChatBackend;
use crate::frame::decode_events;

/// Configurable mock responses for testing.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Send a well-formed frame carrying this event.
    Event(Event),
    /// Send this text as a raw line, verbatim.
    Raw { line: String },
    /// Break the connection with this message.
    Disconnect { message: String },
    /// Delay before the next chunk.
    Delay { ms: u64 },
}

/// Configuration for a mock turn.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Sequence of responses to emit.
    pub responses: Vec<MockResponse>,
    /// Size of the byte chunks the body is cut into. `None` sends one chunk
    /// per frame.
    pub chunk_size: Option<usize>,
    /// Fail before any byte is sent, as a refused connection would.
    pub connect_error: Option<String>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.responses = events.into_iter().map(MockResponse::Event).collect();
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    pub fn with_connect_error(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }
}

/// Error carried by the mock byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDisconnect(pub String);

impl std::fmt::Display for MockDisconnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

enum Wire {
    Bytes(Vec<u8>),
    Fail(String),
    Delay(u64),
}

fn encode_frame(event: &Event) -> Vec<u8> {
    let json = serde_json::to_string(event).unwrap_or_default();
    format!("data: {json}\n\n").into_bytes()
}

fn wire_plan(config: &MockConfig) -> Vec<Wire> {
    let mut plan = Vec::new();
    let mut body = Vec::new();

    let flush = |body: &mut Vec<u8>, plan: &mut Vec<Wire>| {
        if body.is_empty() {
            return;
        }
        let bytes = std::mem::take(body);
        match config.chunk_size {
            Some(size) => plan.extend(bytes.chunks(size).map(|c| Wire::Bytes(c.to_vec()))),
            None => plan.push(Wire::Bytes(bytes)),
        }
    };

    for response in &config.responses {
        match response {
            MockResponse::Event(event) => {
                body.extend(encode_frame(event));
                if config.chunk_size.is_none() {
                    flush(&mut body, &mut plan);
                }
            }
            MockResponse::Raw { line } => {
                body.extend_from_slice(line.as_bytes());
                if config.chunk_size.is_none() {
                    flush(&mut body, &mut plan);
                }
            }
            MockResponse::Disconnect { message } => {
                flush(&mut body, &mut plan);
                plan.push(Wire::Fail(message.clone()));
            }
            MockResponse::Delay { ms } => {
                flush(&mut body, &mut plan);
                plan.push(Wire::Delay(*ms));
            }
        }
    }
    flush(&mut body, &mut plan);
    plan
}

/// The raw byte stream a server following `config` would send.
pub fn mock_body(config: &MockConfig) -> impl Stream<Item = Result<Bytes, MockDisconnect>> {
    let plan = wire_plan(config);
    stream! {
        for wire in plan {
            match wire {
                Wire::Bytes(bytes) => yield Ok(Bytes::from(bytes)),
                Wire::Fail(message) => {
                    yield Err(MockDisconnect(message));
                    return;
                }
                Wire::Delay(ms) => sleep(Duration::from_millis(ms)).await,
            }
        }
    }
}

/// Create a stream of TurnEvents from mock config.
pub fn mock_stream(config: MockConfig) -> impl Stream<Item = TurnEvent> + Send + 'static {
    stream! {
        if let Some(message) = config.connect_error {
            yield TurnEvent::Error(message);
            return;
        }

        let body = Box::pin(mock_body(&config));
        let mut events = Box::pin(decode_events(body));
        while let Some(result) = events.next().await {
            match result {
                Ok(event) => yield TurnEvent::Event(event),
                Err(e) => {
                    yield TurnEvent::Error(format!("Stream error: {e}"));
                    return;
                }
            }
        }

        yield TurnEvent::Done;
    }
}

/// Backend that replays scripted turns and records the requests it saw.
///
/// Each call to `open_turn` consumes the next queued script; once the queue is
/// empty the last script is replayed.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    scripts: Arc<Mutex<Vec<MockConfig>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        Self::with_turns(vec![config])
    }

    pub fn with_turns(turns: Vec<MockConfig>) -> Self {
        let mut scripts = turns;
        scripts.reverse();
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_script(&self) -> MockConfig {
        let Ok(mut scripts) = self.scripts.lock() else {
            return MockConfig::default();
        };
        if scripts.len() > 1 {
            scripts.pop().unwrap_or_default()
        } else {
            scripts.last().cloned().unwrap_or_default()
        }
    }
}

impl ChatBackend for MockBackend {
    fn open_turn(&self, request: &ChatRequest) -> BoxStream<'static, TurnEvent> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        mock_stream(self.next_script()).boxed()
    }
}

/// Built-in test fixtures for common scenarios.
pub mod fixtures {
    use super::*;

    /// The JSON string a search tool returns for `contents`.
    pub fn search_output(contents: &[&str]) -> String {
        let results: Vec<serde_json::Value> = contents
            .iter()
            .map(|c| serde_json::json!({"content": c, "metadata": {}}))
            .collect();
        serde_json::json!({ "results": results }).to_string()
    }

    /// The model streams a reply in chunks.
    pub fn streaming_text(chunks: &[&str]) -> MockConfig {
        MockConfig::new().with_events(chunks.iter().map(|c| Event::model_token(*c)).collect())
    }

    /// Preamble, one search call and its output, then an answer.
    pub fn search_then_answer(preamble: &str, query: &str, result: &str, answer: &str) -> MockConfig {
        MockConfig::new().with_events(vec![
            Event::model_token(preamble),
            Event::tool_call("call_1", "search", query),
            Event::tool_output("call_1", search_output(&[result])),
            Event::model_token(answer),
        ])
    }

    /// Some text, then the connection drops.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Event(Event::model_token(text_before)),
            MockResponse::Disconnect {
                message: error.to_string(),
            },
        ])
    }

    /// The server cannot be reached.
    pub fn unreachable(error: &str) -> MockConfig {
        MockConfig::new().with_connect_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_stream_emits_events() {
        let config = MockConfig::new().with_events(vec![
            Event::model_token("Hello"),
            Event::model_token(" world"),
        ]);

        let events: Vec<_> = mock_stream(config).collect().await;

        assert_eq!(events.len(), 3); // 2 tokens + Done
        assert_eq!(events[0], TurnEvent::Event(Event::model_token("Hello")));
        assert_eq!(events[1], TurnEvent::Event(Event::model_token(" world")));
        assert_eq!(events[2], TurnEvent::Done);
    }

    #[tokio::test]
    async fn chunking_does_not_change_events() {
        let script = fixtures::search_then_answer("Let me check.", "visa", "r", "Done.");
        let whole: Vec<_> = mock_stream(script.clone()).collect().await;

        for size in [1, 2, 3, 7, 64] {
            let chunked: Vec<_> = mock_stream(script.clone().with_chunk_size(size))
                .collect()
                .await;
            assert_eq!(chunked, whole, "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn raw_garbage_is_skipped() {
        let config = MockConfig::new().with_responses(vec![
            MockResponse::Raw {
                line: "data: {broken\n\n".to_string(),
            },
            MockResponse::Raw {
                line: ": comment\n".to_string(),
            },
            MockResponse::Event(Event::model_token("ok")),
        ]);

        let events: Vec<_> = mock_stream(config).collect().await;
        assert_eq!(
            events,
            vec![TurnEvent::Event(Event::model_token("ok")), TurnEvent::Done]
        );
    }

    #[tokio::test]
    async fn unterminated_tail_is_dropped() {
        let config = MockConfig::new().with_responses(vec![
            MockResponse::Event(Event::model_token("a")),
            MockResponse::Raw {
                line: r#"data: {"type":"llm_token","node":"model","token":"b"}"#.to_string(),
            },
        ]);

        let events: Vec<_> = mock_stream(config).collect().await;
        assert_eq!(
            events,
            vec![TurnEvent::Event(Event::model_token("a")), TurnEvent::Done]
        );
    }

    #[tokio::test]
    async fn fixture_error_mid_stream() {
        let events: Vec<_> = mock_stream(fixtures::error_mid_stream("Processing...", "reset"))
            .collect()
            .await;

        assert_eq!(events.len(), 2); // token + error, no Done
        assert_eq!(events[0], TurnEvent::Event(Event::model_token("Processing...")));
        assert_eq!(events[1], TurnEvent::Error("Stream error: reset".to_string()));
    }

    #[tokio::test]
    async fn fixture_unreachable() {
        let events: Vec<_> = mock_stream(fixtures::unreachable("connection refused"))
            .collect()
            .await;
        assert_eq!(events, vec![TurnEvent::Error("connection refused".to_string())]);
    }

    #[tokio::test]
    async fn delay_still_delivers_everything() {
        let config = MockConfig::new().with_responses(vec![
            MockResponse::Event(Event::model_token("a")),
            MockResponse::Delay { ms: 5 },
            MockResponse::Event(Event::model_token("b")),
        ]);
        let events: Vec<_> = mock_stream(config).collect().await;
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn backend_records_requests_and_replays_turns() {
        let backend = MockBackend::with_turns(vec![
            fixtures::streaming_text(&["one"]),
            fixtures::streaming_text(&["two"]),
        ]);

        let first: Vec<_> = backend
            .open_turn(&ChatRequest::new("a", "t1"))
            .collect()
            .await;
        let second: Vec<_> = backend
            .open_turn(&ChatRequest::new("b", "t2"))
            .collect()
            .await;
        let third: Vec<_> = backend
            .open_turn(&ChatRequest::new("c", "t3"))
            .collect()
            .await;

        assert_eq!(first[0], TurnEvent::Event(Event::model_token("one")));
        assert_eq!(second[0], TurnEvent::Event(Event::model_token("two")));
        assert_eq!(third[0], TurnEvent::Event(Event::model_token("two")));

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], ChatRequest::new("a", "t1"));
        assert_eq!(requests[2].thread_id, "t3");
    }

    #[test]
    fn search_output_matches_tool_payload() {
        let output = fixtures::search_output(&["r1", "r2"]);
        let results = sc_protocol::parse_tool_output(&output).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].content, "r2");
    }
}
