//! `data:` frame decoder.
//!
//! Turns a chunked byte stream into one payload per `data: ` line. Lines are
//! resolved only once their terminating `\n` arrives; whatever is left in the
//! buffer when the stream ends is dropped, never emitted as a frame.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use sc_protocol::Event;
use tracing::{debug, warn};

/// Prefix that marks a line as a frame.
pub const FRAME_PREFIX: &str = "data: ";

/// Synchronous line splitter with a carry-over buffer.
///
/// Buffers raw bytes, so a multi-byte character split across two chunks is
/// reassembled before it is decoded.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns the payloads of every frame it completed, in
    /// arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(payload) = frame_payload(&self.buf[start..end]) {
                frames.push(payload);
            }
            start = end + 1;
        }
        self.buf.drain(..start);
        frames
    }

    /// Bytes held back waiting for a line break.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// End of stream. Drops the unterminated tail and returns its length.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        dropped
    }
}

fn frame_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let payload = line.strip_prefix(FRAME_PREFIX.as_bytes())?;
    if payload.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(payload).into_owned())
}

/// Stream of frame payloads read from a byte stream.
pub struct FrameStream<S> {
    inner: S,
    decoder: FrameDecoder,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> FrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for FrameStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<String, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if let Some(frame) = this.pending.pop_front() {
            return Poll::Ready(Some(Ok(frame)));
        }
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend(this.decoder.push(&bytes));
                    if let Some(frame) = this.pending.pop_front() {
                        return Poll::Ready(Some(Ok(frame)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    this.decoder.finish();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    let dropped = this.decoder.finish();
                    if dropped > 0 {
                        debug!(bytes = dropped, "discarding unterminated trailing line");
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Create a frame stream from a byte stream.
pub fn parse_frame_stream<S, E>(stream: S) -> FrameStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    FrameStream::new(stream)
}

/// Decode one frame payload into a typed event.
pub fn decode_event(payload: &str) -> Result<Event, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Typed events from a byte stream.
///
/// A payload that does not decode is logged and skipped; the frames after it
/// are still delivered. Transport errors pass through unchanged.
pub fn decode_events<S, E>(stream: S) -> impl Stream<Item = Result<Event, E>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    parse_frame_stream(stream).filter_map(|item| async move {
        match item {
            Ok(payload) => match decode_event(&payload) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    warn!(error = %e, payload = %payload, "skipping malformed frame");
                    None
                }
            },
            Err(e) => Some(Err(e)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from(s))))
    }

    #[test]
    fn decoder_splits_lines() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"data: one\n\ndata: two\n\n");
        assert_eq!(frames, vec!["one", "two"]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn decoder_carries_partial_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: hel").is_empty());
        assert_eq!(decoder.pending(), 9);
        assert_eq!(decoder.push(b"lo\n"), vec!["hello"]);
    }

    #[test]
    fn decoder_ignores_unprefixed_lines() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b": ping\nevent: message\ndata:tight\ndata: kept\nid: 7\n");
        assert_eq!(frames, vec!["kept"]);
    }

    #[test]
    fn decoder_strips_carriage_return() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(b"data: x\r\n\r\n"), vec!["x"]);
    }

    #[test]
    fn decoder_skips_empty_payload() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: \n").is_empty());
    }

    #[test]
    fn decoder_reassembles_split_utf8() {
        let bytes = "data: こんにちは\n".as_bytes();
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&bytes[..8]).is_empty());
        assert_eq!(decoder.push(&bytes[8..]), vec!["こんにちは"]);
    }

    #[test]
    fn finish_drops_trailing_partial_line() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.push(b"data: a\ndata: b"), vec!["a"]);
        assert_eq!(decoder.finish(), 7);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn any_chunking_yields_the_same_frames() {
        let body = concat!(
            "data: {\"type\":\"llm_token\",\"node\":\"model\",\"token\":\"Hi\"}\n\n",
            ": keepalive\n",
            "data: {\"type\":\"tool_call\",\"tool_name\":\"search\",\"tool_input\":{\"query\":\"東京\"},\"tool_id\":\"1\"}\r\n\r\n",
            "data: {\"type\":\"tool_output\",\"output\":\"{}\",\"tool_call_id\":\"1\"}\n\n",
            "data: trailing",
        )
        .as_bytes();

        let mut whole = FrameDecoder::new();
        let expected = whole.push(body);
        assert_eq!(expected.len(), 3);

        for first in 0..=body.len() {
            for second in first..=body.len() {
                let mut decoder = FrameDecoder::new();
                let mut frames = decoder.push(&body[..first]);
                frames.extend(decoder.push(&body[first..second]));
                frames.extend(decoder.push(&body[second..]));
                assert_eq!(frames, expected, "split at {first}/{second}");
            }
        }

        let mut bytewise = FrameDecoder::new();
        let frames: Vec<String> = body.iter().flat_map(|b| bytewise.push(&[*b])).collect();
        assert_eq!(frames, expected);
    }

    #[tokio::test]
    async fn stream_yields_frames_in_order() {
        let stream = bytes_stream(vec!["data: one\n\nda", "ta: two\n", "\ndata: three\n\n"]);
        let frames: Vec<String> = parse_frame_stream(stream)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(frames, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn stream_drops_unterminated_tail() {
        let stream = bytes_stream(vec!["data: first\n", "data: final"]);
        let frames: Vec<String> = parse_frame_stream(stream)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(frames, vec!["first"]);
    }

    #[tokio::test]
    async fn stream_of_nothing_is_empty() {
        let mut frames = parse_frame_stream(bytes_stream(vec![]));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: a\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"data: b\n")),
        ];
        let mut frames = parse_frame_stream(futures::stream::iter(chunks));

        assert_eq!(frames.next().await.unwrap().unwrap(), "a");
        assert!(frames.next().await.unwrap().is_err());
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn malformed_frame_does_not_stop_decoding() {
        let stream = bytes_stream(vec![
            "data: {\"type\":\"llm_token\",\"node\":\"model\",\"token\":\"a\"}\n",
            "data: {not json\n",
            "data: {\"type\":\"mystery\"}\n",
            "data: {\"type\":\"llm_token\",\"node\":\"model\",\"token\":\"b\"}\n",
        ]);
        let events: Vec<Event> = decode_events(stream).map(|r| r.unwrap()).collect().await;
        assert_eq!(events, vec![Event::model_token("a"), Event::model_token("b")]);
    }
}
