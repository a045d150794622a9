//! Streaming response handling.
//!
//! A streamed body arrives as arbitrary byte chunks. [`FrameStream`] cuts
//! them into newline-delimited frames and [`EventStream`] decodes each frame
//! into one typed event. Both are pull-based: nothing is read from the
//! connection until the caller polls, and no more than one partial frame is
//! buffered.

use bytes::{Bytes, BytesMut};
use futures::Stream;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::TransportError;
use crate::errors::InferraError;

/// Boxed stream of raw body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Payload that marks the end of an event sequence.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// Longest frame [`FrameStream`] buffers by default.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Streaming HTTP response.
pub struct StreamingResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Byte stream.
    pub stream: ByteStream,
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

pin_project! {
    /// Splits a byte stream into newline-delimited frames.
    ///
    /// A trailing `\r` is stripped from every frame. Bytes left over when the
    /// upstream ends are emitted as a final frame. A frame longer than the
    /// limit yields [`TransportError::FrameTooLong`] and ends the stream.
    pub struct FrameStream<S> {
        #[pin]
        inner: S,
        buffer: BytesMut,
        // Prefix of `buffer` already known to hold no newline.
        scanned: usize,
        max_frame: usize,
        finished: bool,
    }
}

impl<S> FrameStream<S>
where
    S: Stream<Item = Result<Bytes, TransportError>>,
{
    /// Wraps a chunk stream.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::new(),
            scanned: 0,
            max_frame: MAX_FRAME_LEN,
            finished: false,
        }
    }

    /// Sets the frame length limit.
    pub fn with_max_frame_len(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }
}

fn take_line(buffer: &mut BytesMut, scanned: &mut usize) -> Option<Bytes> {
    let Some(offset) = buffer[*scanned..].iter().position(|b| *b == b'\n') else {
        *scanned = buffer.len();
        return None;
    };
    let newline = *scanned + offset;
    *scanned = 0;
    let mut line = buffer.split_to(newline + 1);
    line.truncate(newline);
    if line.last() == Some(&b'\r') {
        line.truncate(newline - 1);
    }
    Some(line.freeze())
}

impl<S> Stream for FrameStream<S>
where
    S: Stream<Item = Result<Bytes, TransportError>>,
{
    type Item = Result<Bytes, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            let line = take_line(this.buffer, this.scanned);
            let pending = line.as_ref().map_or(this.buffer.len(), Bytes::len);
            if pending > *this.max_frame {
                this.buffer.clear();
                *this.scanned = 0;
                *this.finished = true;
                return Poll::Ready(Some(Err(TransportError::FrameTooLong {
                    limit: *this.max_frame,
                })));
            }
            if let Some(line) = line {
                return Poll::Ready(Some(Ok(line)));
            }

            if *this.finished {
                if this.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                *this.scanned = 0;
                let mut rest = this.buffer.split();
                if rest.last() == Some(&b'\r') {
                    rest.truncate(rest.len() - 1);
                }
                return Poll::Ready(Some(Ok(rest.freeze())));
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.buffer.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => *this.finished = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// What a single frame decodes to.
#[derive(Debug)]
enum Frame<T> {
    KeepAlive,
    Done,
    Event(T),
}

fn decode_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<Frame<T>, InferraError> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| InferraError::decode(format!("invalid UTF-8 in stream: {e}")))?;
    let text = text.trim();

    // Blank lines and SSE comments are keep-alives.
    if text.is_empty() || text.starts_with(':') {
        return Ok(Frame::KeepAlive);
    }

    let payload = text.strip_prefix(DATA_PREFIX).map_or(text, str::trim_start);
    if payload.is_empty() {
        return Ok(Frame::KeepAlive);
    }
    if payload == DONE_SENTINEL {
        return Ok(Frame::Done);
    }

    serde_json::from_str(payload)
        .map(Frame::Event)
        .map_err(|e| InferraError::decode(format!("{e}: {payload}")))
}

pin_project! {
    /// Lazy, single-pass sequence of typed events decoded from frames.
    ///
    /// Empty frames are skipped, a leading `data:` marker is stripped, and a
    /// `[DONE]` payload ends the sequence. A frame that is not valid JSON for
    /// `T` yields one [`InferraError::Decode`] and ends the sequence; a
    /// transport failure mid-stream does the same with
    /// [`InferraError::Transport`].
    pub struct EventStream<T> {
        #[pin]
        frames: ByteStream,
        done: bool,
        _event: PhantomData<fn() -> T>,
    }
}

impl<T: DeserializeOwned> EventStream<T> {
    /// Decodes an already framed stream.
    pub fn decode<S>(frames: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            frames: Box::pin(frames),
            done: false,
            _event: PhantomData,
        }
    }

    /// Frames and decodes a raw chunk stream.
    pub fn from_bytes(stream: ByteStream) -> Self {
        Self::decode(FrameStream::new(stream))
    }

    /// Returns true once the sequence has ended.
    pub fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T: DeserializeOwned> Stream for EventStream<T> {
    type Item = Result<T, InferraError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            let frame = match this.frames.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => frame,
                Poll::Ready(Some(Err(e @ TransportError::FrameTooLong { .. }))) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(InferraError::decode(e.to_string()))));
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(InferraError::transport(e))));
                }
                Poll::Ready(None) => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            };

            match decode_frame::<T>(&frame) {
                Ok(Frame::KeepAlive) => {}
                Ok(Frame::Done) => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
                Ok(Frame::Event(event)) => return Poll::Ready(Some(Ok(event))),
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to decode stream frame");
                    *this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
