//! Streaming response handling for server-sent chat completions

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;

use crate::errors::GrantScoutError;
use crate::errors::Result;

/// Streaming response from the language model
pub struct StreamingResponse {
    stream: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl StreamingResponse {
    pub fn new(stream: Pin<Box<dyn Stream<Item = Result<String>> + Send>>) -> Self {
        Self { stream }
    }

    /// A stream yielding one fixed text chunk
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    /// Collect all chunks into a single string
    pub async fn collect_all(mut self) -> Result<String> {
        let mut result = String::new();
        while let Some(chunk) = self.stream.next().await {
            result.push_str(&chunk?);
        }
        Ok(result)
    }

    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = Result<String>> + Send>> {
        self.stream
    }
}

/// One meaningful line of an SSE body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Token(String),
    Done,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a `data:` line of a chat-completions stream. Comments, blank lines,
/// role-only deltas and unparseable payloads yield `None`.
pub fn parse_sse_line(line: &str) -> Option<SseLine> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload == "[DONE]" {
        return Some(SseLine::Done);
    }
    let chunk: ChunkPayload = serde_json::from_str(payload).ok()?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(SseLine::Token(text))
    }
}

struct SseState<S> {
    body: Pin<Box<S>>,
    buffer: String,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> SseState<S> {
    fn drain_lines(&mut self, flush: bool) {
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            self.take_line(&line);
        }
        if flush && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.take_line(&rest);
        }
    }

    fn take_line(&mut self, line: &str) {
        if self.finished {
            return;
        }
        match parse_sse_line(line) {
            Some(SseLine::Token(text)) => self.pending.push_back(text),
            Some(SseLine::Done) => self.finished = true,
            None => {}
        }
    }
}

/// Turn a raw byte stream of SSE frames into text chunks. Chunk boundaries
/// need not align with line boundaries.
pub fn sse_text_stream<S, B, E>(body: S) -> StreamingResponse
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        buffer: String::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state
                        .buffer
                        .push_str(&String::from_utf8_lossy(bytes.as_ref()));
                    state.drain_lines(false);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(GrantScoutError::Llm(format!("stream interrupted: {e}"))),
                        state,
                    ));
                }
                None => {
                    state.drain_lines(true);
                    state.finished = true;
                }
            }
        }
    });

    StreamingResponse::new(Box::pin(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            Some(SseLine::Token("Hi".to_string()))
        );
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseLine::Done));
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
        assert_eq!(parse_sse_line(": keep-alive"), None);
    }

    #[tokio::test]
    async fn test_split_frames_are_reassembled() {
        let frames: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Smart \"}}]}\n\nda".to_vec()),
            Ok(b"ta: {\"choices\":[{\"delta\":{\"content\":\"Grants\"}}]}\n\n".to_vec()),
            Ok(b"data: [DONE]\n\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n".to_vec()),
        ];
        let text = sse_text_stream(futures::stream::iter(frames))
            .collect_all()
            .await
            .unwrap();
        assert_eq!(text, "Smart Grants");
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_after_partial_text() {
        let frames: Vec<std::result::Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Partial\"}}]}\n".to_vec()),
            Err("connection reset".to_string()),
        ];
        let mut stream = sse_text_stream(futures::stream::iter(frames)).into_stream();
        assert_eq!(stream.next().await.unwrap().unwrap(), "Partial");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
