//! Server-sent event decoding for the Realtime Database streaming API
//!
//! The stream is a sequence of `event:`/`data:` line groups separated by a
//! blank line. `put` and `patch` carry `{"path": ..., "data": ...}` relative
//! to the subscribed location (`/rooms/{room}/messages`).

use std::collections::VecDeque;
use std::fmt::Display;

use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::{BackendEvent, EventStream};
use crate::models::WireMessage;
use crate::sync::FeedEvent;

/// Longest partial line kept while waiting for its newline. A room snapshot
/// arrives as a single `data:` line, so this bounds the initial load too.
const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// One complete server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental line parser. Chunks may split lines (and UTF-8 sequences)
/// anywhere.
#[derive(Debug)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Option<String>,
    max_line: usize,
    overflowed: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            event: None,
            data: None,
            max_line,
            overflowed: false,
        }
    }

    /// True once an unterminated line grew past the limit. The partial line
    /// is discarded and the decoder produces nothing further.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Feed a chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.overflowed {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(nl) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=nl).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line: &str = &text;
            let line = line.strip_suffix('\r').unwrap_or(line);

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => match self.data {
                    Some(ref mut data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => self.data = Some(value.to_string()),
                },
                _ => tracing::trace!("Ignoring SSE field {}", field),
            }
        }

        if self.pending.len() > self.max_line {
            tracing::warn!(
                "SSE line exceeds {} bytes without a newline, giving up",
                self.max_line
            );
            self.pending = Vec::new();
            self.overflowed = true;
        }
        frames
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = self.data.take();
        if event.is_none() && data.is_none() {
            return None;
        }
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: data.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PathData {
    path: String,
    data: serde_json::Value,
}

/// Translate one frame into backend events.
pub fn decode_frame(frame: &SseFrame) -> Vec<BackendEvent> {
    match frame.event.as_str() {
        "put" | "patch" => decode_change(frame.event == "patch", &frame.data),
        "keep-alive" => Vec::new(),
        "cancel" => vec![BackendEvent::Failed(format!(
            "subscription cancelled by server: {}",
            frame.data
        ))],
        "auth_revoked" => vec![BackendEvent::Failed(
            "credential expired or revoked".to_string(),
        )],
        other => {
            tracing::debug!("Ignoring SSE event '{}'", other);
            Vec::new()
        }
    }
}

fn decode_change(is_patch: bool, data: &str) -> Vec<BackendEvent> {
    let body: PathData = match serde_json::from_str(data) {
        Ok(body) => body,
        Err(e) => return vec![BackendEvent::Malformed(format!("unreadable change: {}", e))],
    };

    let segments: Vec<&str> = body.path.split('/').filter(|s| !s.is_empty()).collect();
    let mut events = Vec::new();
    let mut malformed = Vec::new();

    match segments.as_slice() {
        [] => match body.data {
            // Root put replaces the whole location; on a fresh subscription
            // the feed is empty, so upserting every child is equivalent.
            serde_json::Value::Null => {}
            serde_json::Value::Object(children) => {
                for (id, value) in children {
                    match child_event(id, value) {
                        Ok(event) => events.push(event),
                        Err(reason) => malformed.push(BackendEvent::Malformed(reason)),
                    }
                }
            }
            other => malformed.push(BackendEvent::Malformed(format!(
                "unexpected root value {}",
                other
            ))),
        },
        [id] if !is_patch => match child_event(id.to_string(), body.data) {
            Ok(event) => events.push(event),
            Err(reason) => malformed.push(BackendEvent::Malformed(reason)),
        },
        [id, ..] => malformed.push(BackendEvent::Malformed(format!(
            "partial update of message {} ignored",
            id
        ))),
    }

    let mut out = Vec::with_capacity(malformed.len() + 1);
    // A root change always yields a batch, even an empty one: it marks the
    // initial load of the room.
    if !events.is_empty() || segments.is_empty() {
        out.push(BackendEvent::Changes(events));
    }
    out.extend(malformed);
    out
}

fn child_event(id: String, value: serde_json::Value) -> Result<FeedEvent, String> {
    if value.is_null() {
        return Ok(FeedEvent::Remove(id));
    }
    WireMessage::decode(&id, value)
        .map(FeedEvent::Upsert)
        .map_err(|e| format!("{:#}", e))
}

struct StreamState<S> {
    bytes: S,
    decoder: SseDecoder,
    queued: VecDeque<BackendEvent>,
    finished: bool,
}

/// Turn a raw byte stream into a room event stream.
///
/// The stream ends right after its first `Failed` item; transport errors and
/// end of input are both reported as `Failed`.
pub fn event_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    decoded_stream(bytes, SseDecoder::new())
}

fn decoded_stream<S, B, E>(bytes: S, decoder: SseDecoder) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = StreamState {
        bytes,
        decoder,
        queued: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queued.pop_front() {
                if matches!(event, BackendEvent::Failed(_)) {
                    state.queued.clear();
                    state.finished = true;
                }
                return Some((event, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for frame in state.decoder.feed(chunk.as_ref()) {
                        state.queued.extend(decode_frame(&frame));
                    }
                    if state.decoder.overflowed() {
                        state
                            .queued
                            .push_back(BackendEvent::Failed("event line too long".to_string()));
                    }
                }
                Some(Err(e)) => {
                    state
                        .queued
                        .push_back(BackendEvent::Failed(format!("stream error: {}", e)));
                }
                None => {
                    state
                        .queued
                        .push_back(BackendEvent::Failed("stream closed by server".to_string()));
                }
            }
        }
    })
    .boxed()
}
