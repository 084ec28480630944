//! Streaming Support
//!
//! Decodes Server-Sent Events from the Responses API into typed events and
//! exposes them as a finite, lazy stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_stream::stream;
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::response::{FunctionCall, OutputItem, Response, Usage};
use crate::error::{Error, Result};

/// Data payload that ends a stream
const DONE_SENTINEL: &str = "[DONE]";

/// An incremental event from a streamed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "response.created")]
    Created { response: Response },

    #[serde(rename = "response.in_progress")]
    InProgress { response: Response },

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default)]
        output_index: u32,
        item: OutputItem,
    },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default)]
        output_index: u32,
        item: OutputItem,
    },

    #[serde(rename = "response.output_text.delta")]
    TextDelta {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        delta: String,
    },

    #[serde(rename = "response.output_text.done")]
    TextDone {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        text: String,
    },

    #[serde(rename = "response.refusal.delta")]
    RefusalDelta {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        delta: String,
    },

    #[serde(rename = "response.refusal.done")]
    RefusalDone {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        output_index: u32,
        #[serde(default)]
        content_index: u32,
        refusal: String,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        output_index: u32,
        delta: String,
    },

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        #[serde(default)]
        item_id: String,
        #[serde(default)]
        output_index: u32,
        arguments: String,
    },

    #[serde(rename = "response.completed")]
    Completed { response: Response },

    #[serde(rename = "response.incomplete")]
    Incomplete { response: Response },

    #[serde(rename = "response.failed")]
    Failed { response: Response },

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: String,
        #[serde(default)]
        param: Option<String>,
    },

    /// Event types this crate does not model, kept verbatim
    #[serde(untagged)]
    Other(Value),
}

impl StreamEvent {
    /// The wire `type` of this event
    pub fn event_type(&self) -> &str {
        match self {
            StreamEvent::Created { .. } => "response.created",
            StreamEvent::InProgress { .. } => "response.in_progress",
            StreamEvent::OutputItemAdded { .. } => "response.output_item.added",
            StreamEvent::OutputItemDone { .. } => "response.output_item.done",
            StreamEvent::TextDelta { .. } => "response.output_text.delta",
            StreamEvent::TextDone { .. } => "response.output_text.done",
            StreamEvent::RefusalDelta { .. } => "response.refusal.delta",
            StreamEvent::RefusalDone { .. } => "response.refusal.done",
            StreamEvent::FunctionCallArgumentsDelta { .. } => {
                "response.function_call_arguments.delta"
            }
            StreamEvent::FunctionCallArgumentsDone { .. } => {
                "response.function_call_arguments.done"
            }
            StreamEvent::Completed { .. } => "response.completed",
            StreamEvent::Incomplete { .. } => "response.incomplete",
            StreamEvent::Failed { .. } => "response.failed",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Other(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    /// True for events after which the API sends nothing more
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Completed { .. }
                | StreamEvent::Incomplete { .. }
                | StreamEvent::Failed { .. }
                | StreamEvent::Error { .. }
        )
    }

    /// The full response carried by lifecycle events
    pub fn response(&self) -> Option<&Response> {
        match self {
            StreamEvent::Created { response }
            | StreamEvent::InProgress { response }
            | StreamEvent::Completed { response }
            | StreamEvent::Incomplete { response }
            | StreamEvent::Failed { response } => Some(response),
            _ => None,
        }
    }
}

/// One decoded SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if any
    pub event: Option<String>,

    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental SSE decoder
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence; only
/// the incomplete trailing line is buffered between calls.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    event: Option<String>,
    data: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            if let Some(frame) = self.process_line(&line)? {
                frames.push(frame);
            }
        }
        self.scanned = self.buffer.len();

        Ok(frames)
    }

    /// Flush at end of input
    ///
    /// A trailing line without a newline still counts, and a pending frame
    /// without the closing blank line is dispatched.
    pub fn finish(&mut self) -> Result<Option<SseFrame>> {
        self.scanned = 0;
        if self.buffer.has_remaining() {
            let line = self.buffer.split();
            if let Some(frame) = self.process_line(&line)? {
                return Ok(Some(frame));
            }
        }
        Ok(self.dispatch())
    }

    fn process_line(&mut self, line: &[u8]) -> Result<Option<SseFrame>> {
        let line = std::str::from_utf8(line)
            .map_err(|e| Error::Stream(format!("invalid UTF-8 in event stream: {}", e)))?;

        if line.is_empty() {
            return Ok(self.dispatch());
        }

        // Comments / keep-alives
        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "event" => self.event = Some(value.to_string()),
            // id and retry only matter for reconnection, which we never do
            "id" | "retry" => {}
            other => debug!(field = %other, "Ignoring unknown SSE field"),
        }

        Ok(None)
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        self.data.take().map(|data| SseFrame { event, data })
    }
}

/// Parse a frame into an event; `Ok(None)` marks the end sentinel
pub fn parse_frame(frame: &SseFrame) -> Result<Option<StreamEvent>> {
    let data = frame.data.trim();
    if data == DONE_SENTINEL {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_str(data).map_err(|e| {
        Error::Stream(format!(
            "malformed event data: {}. Data: {}",
            e,
            &data[..floor_char_boundary(data, 200)]
        ))
    })?;

    // Fall back to the SSE event name when the payload carries no type
    if let (Some(obj), Some(event)) = (value.as_object_mut(), &frame.event) {
        obj.entry("type")
            .or_insert_with(|| Value::String(event.clone()));
    }

    let event = serde_json::from_value(value)
        .map_err(|e| Error::Stream(format!("malformed event payload: {}", e)))?;
    Ok(Some(event))
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Turn a body byte stream into events
///
/// Ends after a terminal event or the `[DONE]` sentinel. A transport error,
/// malformed frame, or a body that ends before either yields one `Err` and
/// then ends.
pub fn decode_events<S>(bytes: S) -> impl Stream<Item = Result<StreamEvent>> + Send
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::new();
        let mut count = 0usize;

        loop {
            let (frames, at_eof) = match bytes.next().await {
                Some(Ok(chunk)) => (decoder.feed(&chunk), false),
                Some(Err(e)) => {
                    warn!(error = %e, "Event stream transport failed");
                    yield Err(e);
                    return;
                }
                None => (decoder.finish().map(|f| f.into_iter().collect::<Vec<_>>()), true),
            };

            let frames = match frames {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(error = %e, "Malformed event stream framing");
                    yield Err(e);
                    return;
                }
            };

            for frame in frames {
                match parse_frame(&frame) {
                    Ok(Some(event)) => {
                        count += 1;
                        let terminal = event.is_terminal();
                        if terminal {
                            debug!(events = count, kind = event.event_type(), "Event stream finished");
                        }
                        yield Ok(event);
                        if terminal {
                            return;
                        }
                    }
                    Ok(None) => {
                        debug!(events = count, "Event stream received end sentinel");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "Malformed event in stream");
                        yield Err(e);
                        return;
                    }
                }
            }

            if at_eof {
                yield Err(Error::Stream(
                    "connection closed before the response completed".to_string(),
                ));
                return;
            }
        }
    }
}

/// A streamed response: a finite sequence of events
///
/// Dropping it closes the underlying connection.
pub struct ResponseStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>,
}

impl ResponseStream {
    pub fn new(inner: impl Stream<Item = Result<StreamEvent>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }

    /// Decode an SSE body
    pub fn from_bytes<S>(bytes: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self::new(decode_events(bytes))
    }

    /// Only the text deltas, in order
    pub fn text_deltas(self) -> TextDeltas<Self> {
        TextDeltas { inner: self }
    }

    /// Drain the stream and return the concatenated text
    pub async fn collect_text(self) -> Result<String> {
        let mut deltas = self.text_deltas();
        let mut text = String::new();
        while let Some(delta) = deltas.next().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }

    /// Drain the stream into an accumulator
    pub async fn accumulate(mut self) -> Result<StreamAccumulator> {
        let mut acc = StreamAccumulator::new();
        while let Some(event) = self.next().await {
            acc.process_event(&event?);
        }
        Ok(acc)
    }
}

impl Stream for ResponseStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream").finish_non_exhaustive()
    }
}

pin_project! {
    /// Adapter yielding only text deltas
    ///
    /// API `error` events and failed responses surface as `Err`.
    pub struct TextDeltas<S> {
        #[pin]
        inner: S,
    }
}

impl<S> Stream for TextDeltas<S>
where
    S: Stream<Item = Result<StreamEvent>>,
{
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            let event = match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => event,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            };

            match event {
                StreamEvent::TextDelta { delta, .. } => return Poll::Ready(Some(Ok(delta))),
                StreamEvent::Error { code, message, .. } => {
                    return Poll::Ready(Some(Err(Error::Stream(error_text(code, message)))))
                }
                StreamEvent::Failed { response } => {
                    let message = response
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "response failed".to_string());
                    return Poll::Ready(Some(Err(Error::Stream(message))));
                }
                _ => continue,
            }
        }
    }
}

/// Message of an `error` event, falling back to its code
fn error_text(code: Option<String>, message: String) -> String {
    if !message.is_empty() {
        return message;
    }
    match code {
        Some(code) => format!("stream error: {}", code),
        None => "stream error".to_string(),
    }
}

/// Accumulator for streamed events
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    /// Accumulated output text
    pub text: String,

    /// Accumulated refusal text
    pub refusal: String,

    /// Function calls, in the order they were announced
    pub function_calls: Vec<FunctionCall>,

    /// Final response from the terminal event
    pub response: Option<Response>,

    /// Error reported by an `error` event
    pub error: Option<String>,

    /// Item ids matching `function_calls`
    call_item_ids: Vec<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a single event
    pub fn process_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta { delta, .. } => self.text.push_str(delta),
            StreamEvent::RefusalDelta { delta, .. } => self.refusal.push_str(delta),
            StreamEvent::OutputItemAdded {
                item: OutputItem::FunctionCall(call),
                ..
            } => {
                self.call_item_ids
                    .push(call.id.clone().unwrap_or_default());
                self.function_calls.push(call.clone());
            }
            StreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                if let Some(call) = self.call_mut(item_id) {
                    call.arguments.push_str(delta);
                }
            }
            StreamEvent::FunctionCallArgumentsDone {
                item_id, arguments, ..
            } => {
                if let Some(call) = self.call_mut(item_id) {
                    call.arguments = arguments.clone();
                }
            }
            StreamEvent::OutputItemDone {
                item: OutputItem::FunctionCall(call),
                ..
            } => {
                let item_id = call.id.clone().unwrap_or_default();
                match self.call_mut(&item_id) {
                    Some(existing) => *existing = call.clone(),
                    None => {
                        self.call_item_ids.push(item_id);
                        self.function_calls.push(call.clone());
                    }
                }
            }
            StreamEvent::Completed { response }
            | StreamEvent::Incomplete { response }
            | StreamEvent::Failed { response } => {
                self.response = Some(response.clone());
            }
            StreamEvent::Error { code, message, .. } => {
                self.error = Some(error_text(code.clone(), message.clone()))
            }
            _ => {}
        }
    }

    /// Usage from the final response
    pub fn usage(&self) -> Option<&Usage> {
        self.response.as_ref().and_then(|r| r.usage.as_ref())
    }

    fn call_mut(&mut self, item_id: &str) -> Option<&mut FunctionCall> {
        let index = self.call_item_ids.iter().rposition(|id| id == item_id)?;
        self.function_calls.get_mut(index)
    }
}
