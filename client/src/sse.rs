//! `text/event-stream` decoding and the chat stream built on it.

use std::collections::VecDeque;

use futures::stream::BoxStream;
use futures::StreamExt;

use modelshop_common::chat::{ChatMessage, StreamEnvelope};

use crate::error::StreamError;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental decoder: feed it chunks as they arrive, collect whole events.
///
/// Lines may end in LF or CRLF. `data:` lines accumulate and are joined with
/// newlines; a blank line dispatches; lines starting with `:` are comments. An
/// event left unterminated when the stream ends is discarded.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event,
            data,
            id: self.id.clone(),
        })
    }
}

/// Chat messages arriving on one session's event stream.
pub struct ChatStream {
    chunks: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: EventStreamDecoder,
    ready: VecDeque<SseEvent>,
}

impl ChatStream {
    pub fn from_response(resp: reqwest::Response) -> Self {
        Self::from_chunks(resp.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed())
    }

    pub fn from_chunks(chunks: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> Self {
        Self {
            chunks,
            decoder: EventStreamDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next chat message. Events of other types are skipped. `None` once the
    /// server closes the stream.
    pub async fn next_message(&mut self) -> Option<Result<ChatMessage, StreamError>> {
        loop {
            while let Some(event) = self.ready.pop_front() {
                match StreamEnvelope::decode(&event.data) {
                    Ok(Some(message)) => return Some(Ok(message)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(StreamError::Payload(e))),
                }
            }
            match self.chunks.next().await? {
                Ok(chunk) => self.ready.extend(self.decoder.feed(&chunk)),
                Err(e) => return Some(Err(StreamError::Transport(e))),
            }
        }
    }
}
