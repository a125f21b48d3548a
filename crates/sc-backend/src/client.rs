//! HTTP client for the streaming chat endpoint.

use std::time::Duration;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use sc_protocol::{ChatRequest, TurnEvent};
use thiserror::Error;
use tracing::{debug, warn};

use crate::frame::decode_events;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5500";
pub const DEFAULT_ENDPOINT: &str = "/chat/stream";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Source of per-turn event streams.
///
/// Implemented by the HTTP [`ChatClient`] and by
/// [`MockBackend`](crate::mock::MockBackend).
pub trait ChatBackend {
    /// Start a turn. The stream ends with [`TurnEvent::Done`] or
    /// [`TurnEvent::Error`].
    fn open_turn(&self, request: &ChatRequest) -> BoxStream<'static, TurnEvent>;
}

/// Transport settings for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl ClientOptions {
    /// Full URL of the streaming endpoint.
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.endpoint.starts_with('/') {
            format!("{base}{}", self.endpoint)
        } else {
            format!("{base}/{}", self.endpoint)
        }
    }
}

/// Streaming chat client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    url: String,
    http: Client,
}

/// Build an HTTP client with the configured timeouts.
fn build_http_client(options: &ClientOptions) -> Result<Client, ClientError> {
    let client = Client::builder()
        .timeout(options.request_timeout)
        .connect_timeout(options.connect_timeout)
        .pool_max_idle_per_host(2)
        .build()?;
    Ok(client)
}

impl ChatClient {
    pub fn new(options: &ClientOptions) -> Result<Self, ClientError> {
        Ok(Self {
            url: options.url(),
            http: build_http_client(options)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one turn and return its events.
    pub fn send(&self, request: &ChatRequest) -> impl Stream<Item = TurnEvent> + Send + 'static {
        let http = self.http.clone();
        let url = self.url.clone();
        let request = request.clone();

        stream! {
            match send_request(&http, &url, &request).await {
                Ok(response) => {
                    let byte_stream = Box::pin(response.bytes_stream());
                    let mut events = Box::pin(decode_events(byte_stream));

                    while let Some(result) = events.next().await {
                        match result {
                            Ok(event) => yield TurnEvent::Event(event),
                            Err(e) => {
                                warn!(error = %e, thread_id = %request.thread_id, "stream interrupted");
                                yield TurnEvent::Error(format!("Stream error: {e}"));
                                return;
                            }
                        }
                    }

                    debug!(thread_id = %request.thread_id, "stream finished");
                    yield TurnEvent::Done;
                }
                Err(e) => {
                    warn!(error = %e, url = %url, "chat request failed");
                    yield TurnEvent::Error(e.to_string());
                }
            }
        }
    }
}

impl ChatBackend for ChatClient {
    fn open_turn(&self, request: &ChatRequest) -> BoxStream<'static, TurnEvent> {
        self.send(request).boxed()
    }
}

async fn send_request(
    http: &Client,
    url: &str,
    request: &ChatRequest,
) -> Result<reqwest::Response, ClientError> {
    debug!(url, thread_id = %request.thread_id, "opening chat stream");

    let response = http
        .post(url)
        .header("content-type", "application/json")
        .header("accept", "text/event-stream")
        .json(request)
        .send()
        .await?;

    check_status(response).await
}

/// Turn a non-success response into [`ClientError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status { status, body });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static str) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    #[test]
    fn options_url_joins_base_and_endpoint() {
        let options = ClientOptions::default();
        assert_eq!(options.url(), "http://localhost:5500/chat/stream");

        let options = ClientOptions {
            base_url: "https://bot.example.com/".to_string(),
            endpoint: "chat/stream".to_string(),
            ..Default::default()
        };
        assert_eq!(options.url(), "https://bot.example.com/chat/stream");
    }

    #[test]
    fn new_client_does_not_panic() {
        let client = ChatClient::new(&ClientOptions::default()).unwrap();
        assert_eq!(client.url(), "http://localhost:5500/chat/stream");
    }

    #[tokio::test]
    async fn check_status_passes_success() {
        let checked = check_status(response(200, "data: x\n")).await.unwrap();
        assert_eq!(checked.text().await.unwrap(), "data: x\n");
    }

    #[tokio::test]
    async fn check_status_reports_failure_body() {
        let err = check_status(response(503, "overloaded")).await.unwrap_err();
        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_yields_single_error() {
        let options = ClientOptions {
            base_url: "http://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let client = ChatClient::new(&options).unwrap();
        let events: Vec<TurnEvent> = client
            .send(&ChatRequest::new("hi", "t"))
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TurnEvent::Error(_)));
    }
}
