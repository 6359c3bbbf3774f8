//! Incremental consumption of chunked text responses.
//!
//! A [`FragmentStream`] turns the byte chunks of a streaming response body into decoded
//! text fragments.  It is lazy, finite and non-restartable: each pull waits for the next
//! chunk, the sequence ends when the transport reports completion, and once ended (or
//! closed, or cancelled) it never yields again.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::error::{Error, Result};
use crate::observability::{
    STREAM_BYTES, STREAM_CANCELLED, STREAM_ERRORS, STREAM_FRAGMENTS,
};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Stateful UTF-8 decoder for text split at arbitrary byte boundaries.
///
/// A multi-byte character cut in half by a chunk boundary is held back until the rest
/// of it arrives.  Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk` together with any bytes held back from the previous call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut text = String::with_capacity(bytes.len());
        let mut start = 0;
        while start < bytes.len() {
            match std::str::from_utf8(&bytes[start..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = bytes.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&bytes[start..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.pending = bytes[valid_end..].to_vec();
                            return text;
                        }
                    }
                }
            }
        }
        text
    }

    /// Flushes the decoder at end of input.
    ///
    /// A truncated trailing sequence becomes a single U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Returns true if bytes are being held back.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// A pull-based sequence of text fragments read from a streaming response.
///
/// Use [`FragmentStream::next`] to pull one fragment at a time:
///
/// ```rust,ignore
/// let mut fragments = client.open_stream(&url, &body).await?;
/// while let Some(fragment) = fragments.next().await {
///     print!("{}", fragment?);
/// }
/// ```
///
/// The type also implements [`futures::Stream`], so stream combinators work too.
pub struct FragmentStream {
    inner: Option<ByteStream>,
    decoder: Utf8Decoder,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
}

impl FragmentStream {
    /// Wraps a byte stream.
    pub fn new<S, E>(byte_stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let stream = byte_stream.map(|result| {
            result
                .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
        });
        Self {
            inner: Some(Box::pin(stream)),
            decoder: Utf8Decoder::new(),
            cancelled: None,
        }
    }

    /// Ends the stream as soon as `token` is cancelled.
    ///
    /// A pull that is waiting on the transport resolves to end-of-stream and the
    /// response body is dropped, releasing the connection.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancelled = Some(Box::pin(token.cancelled_owned()));
        self
    }

    /// Pulls the next fragment.
    ///
    /// Returns `None` once the transport reports completion or the stream was closed.
    /// A transport failure is yielded once as `Some(Err(_))` and ends the stream.
    pub async fn next(&mut self) -> Option<Result<String>> {
        StreamExt::next(self).await
    }

    /// Releases the underlying response body.
    ///
    /// Subsequent pulls return `None`.  Bytes of an incomplete character are discarded.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!("fragment stream closed");
        }
        self.decoder = Utf8Decoder::new();
        self.cancelled = None;
    }

    /// Returns true once the stream has ended, failed, or been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for FragmentStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(cancelled) = this.cancelled.as_mut()
                && cancelled.as_mut().poll(cx).is_ready()
            {
                STREAM_CANCELLED.click();
                this.close();
                return Poll::Ready(None);
            }
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };
            match inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(bytes))) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    let fragment = this.decoder.decode(&bytes);
                    if fragment.is_empty() {
                        continue;
                    }
                    STREAM_FRAGMENTS.click();
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Poll::Ready(Some(Err(err))) => {
                    STREAM_ERRORS.click();
                    tracing::warn!(error = %err, "stream transport failed");
                    this.close();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    this.cancelled = None;
                    let tail = this.decoder.finish();
                    if tail.is_empty() {
                        return Poll::Ready(None);
                    }
                    STREAM_FRAGMENTS.click();
                    return Poll::Ready(Some(Ok(tail)));
                }
            }
        }
    }
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("closed", &self.is_closed())
            .field("decoder", &self.decoder)
            .finish()
    }
}
