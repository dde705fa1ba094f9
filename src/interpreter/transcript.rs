//! Transcript reader: turns an unframed output stream into reply blocks.
//!
//! The interpreter never says "I am done". It prints, then goes quiet while
//! waiting for input. A reply therefore ends when the stream has been silent
//! for the idle window, when the stream closes, or when the overall reply
//! timeout elapses, whichever comes first.
//!
//! Raw output is moved off the pipes by [`spawn_output_pump`] tasks driving a
//! [`FramedRead`] with [`BytesCodec`]; the reader only ever sees chunks on a
//! bounded channel. When every pump has finished, the channel closes and the
//! reader reports [`CompletionReason::ProcessExited`].

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, trace, warn, Instrument};

use crate::models::key::SessionKey;
use crate::models::reply::{CompletionReason, Reply};

/// Capacity of the chunk channel between the pumps and the reader.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Receiving half of an interpreter's output chunk channel.
pub type OutputChunks = mpsc::Receiver<Bytes>;

/// Spawn a task that copies `stream` into `tx` chunk by chunk.
///
/// The task ends on EOF, on a read error, when the receiver is dropped, or
/// when `cancel` fires. Dropping its sender is how the reader learns that
/// the stream has closed.
pub fn spawn_output_pump<R>(
    session_key: SessionKey,
    label: &'static str,
    stream: R,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let span = info_span!("output_pump", session_key = %session_key, stream = label);
    tokio::spawn(
        async move {
            let mut framed = FramedRead::new(stream, BytesCodec::new());

            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        debug!("output pump: cancellation received, stopping");
                        break;
                    }

                    item = framed.next() => {
                        match item {
                            None => {
                                debug!("output pump: EOF detected");
                                break;
                            }
                            Some(Ok(chunk)) => {
                                trace!(bytes = chunk.len(), "output pump: chunk");
                                if tx.send(chunk.freeze()).await.is_err() {
                                    debug!("output pump: reader dropped, stopping");
                                    break;
                                }
                            }
                            Some(Err(err)) => {
                                warn!(%err, "output pump: read error, stopping");
                                break;
                            }
                        }
                    }
                }
            }
        }
        .instrument(span),
    )
}

/// Quiescence-based reply reader over an output chunk channel.
#[derive(Debug)]
pub struct TranscriptReader {
    chunks: OutputChunks,
    idle_window: Duration,
    max_reply_bytes: usize,
    closed: bool,
}

impl TranscriptReader {
    /// Wrap a chunk channel.
    ///
    /// `idle_window` is the silence that ends a reply; `max_reply_bytes`
    /// caps how much of one reply is retained.
    #[must_use]
    pub fn new(chunks: OutputChunks, idle_window: Duration, max_reply_bytes: usize) -> Self {
        Self {
            chunks,
            idle_window,
            max_reply_bytes: max_reply_bytes.max(1),
            closed: false,
        }
    }

    /// Whether the output stream has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Discard output already buffered on the channel without waiting.
    ///
    /// Returns the number of bytes dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        loop {
            match self.chunks.try_recv() {
                Ok(chunk) => dropped += chunk.len(),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        if dropped > 0 {
            debug!(bytes = dropped, "transcript: drained stale output");
        }
        dropped
    }

    /// Block until the next reply boundary and return the accumulated text.
    ///
    /// - Until the first byte arrives only the overall `timeout` applies; an
    ///   interpreter always answers a line with at least its prompt.
    /// - After that, every chunk restarts the idle window; a full window of
    ///   silence completes the reply.
    /// - `timeout` dominates: a stream that never goes quiet returns
    ///   [`CompletionReason::TimedOut`] with whatever arrived.
    /// - A closed stream returns [`CompletionReason::ProcessExited`],
    ///   including any output received before the close.
    ///
    /// Bytes past `max_reply_bytes` are dropped but still count as activity.
    pub async fn read_reply(&mut self, timeout: Duration) -> Reply {
        let deadline = Instant::now() + timeout;
        let mut buf = BytesMut::new();
        let mut truncated = false;
        let mut received_any = false;

        let reason = loop {
            if self.closed {
                break CompletionReason::ProcessExited;
            }

            let wake = if received_any {
                (Instant::now() + self.idle_window).min(deadline)
            } else {
                deadline
            };

            match tokio::time::timeout_at(wake, self.chunks.recv()).await {
                Ok(Some(chunk)) => {
                    received_any = true;
                    let room = self.max_reply_bytes.saturating_sub(buf.len());
                    if chunk.len() > room {
                        if !truncated {
                            warn!(
                                max_reply_bytes = self.max_reply_bytes,
                                "reply exceeds size cap, discarding the remainder"
                            );
                        }
                        truncated = true;
                        buf.extend_from_slice(&chunk[..room]);
                    } else {
                        buf.extend_from_slice(&chunk);
                    }
                }
                Ok(None) => {
                    debug!("transcript: output stream closed");
                    self.closed = true;
                }
                Err(_elapsed) if Instant::now() >= deadline => break CompletionReason::TimedOut,
                Err(_elapsed) => break CompletionReason::Complete,
            }
        };

        let text = String::from_utf8_lossy(&buf).replace('\r', "");
        debug!(bytes = buf.len(), ?reason, truncated, "transcript: reply boundary");

        Reply {
            text,
            reason,
            truncated,
        }
    }
}
