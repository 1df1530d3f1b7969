//! Client for the local model endpoint.
//!
//! Streaming replies arrive as newline-delimited JSON fragments over a live
//! connection. They are exposed as an ordered, cancellable [`TokenStream`]:
//! dropping the stream closes the channel, which stops the reader task and
//! aborts the upstream request.

use crate::{DatachatError, Result};
use datachat_types::{ChatRequest, ChatResponse, ChatStreamFragment, ModelMessage};
use futures::StreamExt;
use tokio::sync::mpsc;

/// Channel capacity between the reader task and the consumer; bounded so a
/// slow consumer applies backpressure to the socket read.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// One event from a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One incremental content fragment, in emission order.
    Delta(String),
    /// The model signalled completion; no further content follows.
    Done,
    /// The stream broke: connection error or malformed fragment.
    Failed(String),
}

/// Ordered stream of model output fragments.
pub struct TokenStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl TokenStream {
    /// Next event, or `None` if the producer went away without a verdict.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

/// HTTP client for an Ollama-style completion endpoint.
#[derive(Clone)]
pub struct ModelClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl ModelClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, stream: bool, messages: Vec<ModelMessage>) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: self.model.clone(),
            stream,
            messages,
        };
        let response = self
            .http
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| DatachatError::ModelEndpoint(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatachatError::ModelEndpoint(format!(
                "HTTP {}: {}",
                status,
                body.trim()
            )));
        }
        Ok(response)
    }

    /// Single non-streamed prompt-completion request.
    pub async fn complete(&self, messages: Vec<ModelMessage>) -> Result<String> {
        let response = self.send(false, messages).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| DatachatError::ModelEndpoint(format!("bad response body: {}", e)))?;
        Ok(body.message.content)
    }

    /// Streaming completion request. Fragments are forwarded in arrival
    /// order; a fragment with `done=true` ends the stream.
    pub async fn stream(&self, messages: Vec<ModelMessage>) -> Result<TokenStream> {
        let response = self.send(true, messages).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent::Failed(format!("stream read failed: {}", e)))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                for line in drain_complete_lines(&mut buffer) {
                    match parse_fragment(&line) {
                        Ok(Some(delta)) => {
                            if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                                // Consumer dropped the stream: abort upstream
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(FragmentVerdict::Done) => {
                            let _ = tx.send(StreamEvent::Done).await;
                            return;
                        }
                        Err(FragmentVerdict::Malformed(msg)) => {
                            let _ = tx.send(StreamEvent::Failed(msg)).await;
                            return;
                        }
                    }
                }
            }

            let _ = tx
                .send(StreamEvent::Failed(
                    "model stream ended without completion signal".to_string(),
                ))
                .await;
        });

        Ok(TokenStream { rx })
    }
}

#[derive(Debug)]
enum FragmentVerdict {
    Done,
    Malformed(String),
}

/// Parse one NDJSON line. `Ok(Some)` carries content, `Ok(None)` is an
/// empty keepalive fragment, `Err` is terminal for the stream.
fn parse_fragment(line: &str) -> std::result::Result<Option<String>, FragmentVerdict> {
    let fragment: ChatStreamFragment = serde_json::from_str(line)
        .map_err(|e| FragmentVerdict::Malformed(format!("malformed stream fragment: {}", e)))?;
    if fragment.done {
        // A final fragment carries no further content
        return Err(FragmentVerdict::Done);
    }
    match fragment.message {
        Some(message) if !message.content.is_empty() => Ok(Some(message.content)),
        _ => Ok(None),
    }
}

/// Split off every complete line, leaving a partial trailing line (split
/// across chunk boundaries) in the buffer for the next read.
fn drain_complete_lines(buffer: &mut String) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}
