//! The header-envelope transport layer over a pair of byte streams (§4.1).
//!
//! ```text
//! Content-Length: <decimal N>\r\n
//! Content-Type: application/vscode-jsonrpc; charset=utf8\r\n
//! \r\n
//! <N bytes of UTF-8 message body, no BOM>
//! ```
//!
//! Grounded in this workspace's existing stdio JSON-RPC transports (which
//! frame line-delimited JSON rather than `Content-Length`-prefixed JSON);
//! the header parsing loop below follows the same `AsyncBufReadExt::read_line`
//! shape, generalized to the envelope this crate's spec requires.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::trace;

use crate::codec;
use crate::error::FramingError;
use crate::message::Message;

const DEFAULT_CONTENT_TYPE: &str = "Content-Type: application/vscode-jsonrpc; charset=utf8\r\n";

/// Receives the serialized body of every outbound message before the bytes
/// hit the stream. Implementations must not retain the borrowed body past
/// the call.
pub trait MessageObserver: Send + Sync {
    fn on_write(&self, body: &str);
}

/// Frames outbound [`Message`]s onto an [`AsyncWrite`] half.
///
/// Concurrent callers are serialized through an internal mutex so frames
/// are never interleaved; header and body are combined into a single
/// buffer and written with one `write_all` call, so there is exactly one
/// write syscall per frame regardless of how the runtime schedules tasks.
pub struct FramedWriter<W> {
    inner: Mutex<W>,
    observer: Option<Arc<dyn MessageObserver>>,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    pub fn new(inner: W) -> Self {
        FramedWriter {
            inner: Mutex::new(inner),
            observer: None,
        }
    }

    pub fn with_observer(inner: W, observer: Arc<dyn MessageObserver>) -> Self {
        FramedWriter {
            inner: Mutex::new(inner),
            observer: Some(observer),
        }
    }

    /// Serializes `message`, frames it, and writes it in full before
    /// returning. Callers observe a completion signal only once the bytes
    /// have been flushed.
    pub async fn write(&self, message: &Message) -> Result<(), FramingError> {
        let body = codec::to_string(message)?;

        if let Some(observer) = &self.observer {
            observer.on_write(&body);
        }

        let mut framed = Vec::with_capacity(body.len() + 96);
        framed.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        framed.extend_from_slice(DEFAULT_CONTENT_TYPE.as_bytes());
        framed.extend_from_slice(b"\r\n");
        framed.extend_from_slice(body.as_bytes());

        let mut guard = self.inner.lock().await;
        guard.write_all(&framed).await?;
        guard.flush().await?;
        Ok(())
    }
}

/// Reads framed [`Message`]s off an [`AsyncRead`] half.
pub struct FramedReader<R> {
    inner: BufReader<R>,
    max_message_bytes: Option<usize>,
    mirror_stdio: bool,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(inner: R) -> Self {
        FramedReader {
            inner: BufReader::new(inner),
            max_message_bytes: None,
            mirror_stdio: false,
        }
    }

    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = Some(max);
        self
    }

    /// When set, the raw body of every frame that fails to decode is also
    /// emitted via `tracing::trace!`, matching the "watch the wire"
    /// ergonomics of this workspace's stdio transports.
    pub fn with_mirror_stdio(mut self, mirror: bool) -> Self {
        self.mirror_stdio = mirror;
        self
    }

    /// Reads exactly one framed message, or fails with a [`FramingError`]
    /// describing why. On a length-related error the declared byte range
    /// is still consumed so the stream resynchronizes at the next frame.
    pub async fn read(&mut self) -> Result<Message, FramingError> {
        let content_length = match self.read_headers().await? {
            Some(len) => len,
            None => return Err(FramingError::EndOfStream),
        };

        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            self.inner
                .read_exact(&mut body)
                .await
                .map_err(|err| match err.kind() {
                    std::io::ErrorKind::UnexpectedEof => FramingError::UnexpectedEof,
                    _ => FramingError::Io(err),
                })?;
        }

        if let Some(max) = self.max_message_bytes {
            if content_length > max {
                return Err(FramingError::InvalidFrame(format!(
                    "frame of {content_length} bytes exceeds max_message_bytes of {max}"
                )));
            }
        }

        let text = String::from_utf8(body).map_err(|err| {
            if self.mirror_stdio {
                trace!("rejected frame: invalid UTF-8");
            }
            FramingError::Decode(err.into())
        })?;

        codec::from_str(&text).map_err(|err| {
            if self.mirror_stdio {
                trace!(body = %text, "rejected frame: {err}");
            }
            FramingError::Decode(err)
        })
    }

    /// Reads header lines up to and including the blank terminator.
    /// Returns `Ok(None)` for a clean EOF before any header line.
    async fn read_headers(&mut self) -> Result<Option<usize>, FramingError> {
        let mut content_length: Option<usize> = None;
        let mut saw_any_header = false;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = self
                .inner
                .read_line(&mut line)
                .await
                .map_err(FramingError::Io)?;

            if bytes_read == 0 {
                return if saw_any_header {
                    Err(FramingError::UnexpectedEof)
                } else {
                    Ok(None)
                };
            }
            saw_any_header = true;

            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }

            let Some((name, value)) = trimmed.split_once(':') else {
                return Err(FramingError::InvalidFrame(format!("malformed header line: {trimmed:?}")));
            };
            let value = value.trim_matches(|c: char| c.is_ascii_whitespace());

            if name.eq_ignore_ascii_case("content-length") {
                content_length = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| FramingError::InvalidFrame(format!("invalid Content-Length: {value:?}")))?,
                );
            }
            // Content-Type and any other header are accepted and ignored.
        }

        match content_length {
            Some(len) => Ok(Some(len)),
            None => Err(FramingError::InvalidFrame("missing Content-Length header".into())),
        }
    }
}
