//! The Client Invoker (§4.7): emits outbound messages, correlates
//! replies through the [`CorrelationRegister`], and exposes
//! `send_request`/`send_notification`.
//!
//! The reader task's split between "this is a reply to one of ours" and
//! "this is unsolicited" mirrors `JsonRpcTransport::reader_task`'s split
//! between `Incoming::Response` and `Incoming::Notification`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::correlation::CorrelationRegister;
use crate::framing::{FramedReader, FramedWriter};
use crate::message::{Message, ResponsePayload};
use crate::error::ClientError;

/// Tuning knobs for a [`Client`], analogous to `HostOptions` on the
/// server side (§6, supplemented).
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub default_call_timeout: Option<Duration>,
    pub max_message_bytes: Option<usize>,
    pub mirror_stdio: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            default_call_timeout: Some(Duration::from_secs(30)),
            max_message_bytes: None,
            mirror_stdio: false,
        }
    }
}

/// A connected JSON-RPC client: one [`FramedWriter`] half, one background
/// reader task pumping the other half, and a correlation register tying
/// the two together.
pub struct Client {
    writer: Arc<FramedWriter<Box<dyn AsyncWrite + Send + Unpin>>>,
    correlation: Arc<CorrelationRegister>,
    default_timeout: Option<Duration>,
    reader_task: tokio::task::JoinHandle<()>,
    /// Requests and notifications sent by the peer that are not replies
    /// to one of our own calls (server-initiated traffic).
    pub unsolicited: mpsc::UnboundedReceiver<Message>,
}

impl Client {
    /// Connects over an already-split pair of streams.
    pub fn connect<R, W>(in_stream: R, out_stream: W, options: ClientOptions) -> Client
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: Arc<FramedWriter<Box<dyn AsyncWrite + Send + Unpin>>> =
            Arc::new(FramedWriter::new(Box::new(out_stream)));
        let correlation = Arc::new(CorrelationRegister::new());
        let (unsolicited_tx, unsolicited_rx) = mpsc::unbounded_channel();

        let mut reader = FramedReader::new(in_stream).with_mirror_stdio(options.mirror_stdio);
        if let Some(max) = options.max_message_bytes {
            reader = reader.with_max_message_bytes(max);
        }

        let reader_correlation = correlation.clone();
        let reader_task = tokio::spawn(async move {
            loop {
                match reader.read().await {
                    Ok(Message::Response(response)) => {
                        let Some(id) = response.id else {
                            debug!("dropping response with no id");
                            continue;
                        };
                        let payload = match response.payload {
                            ResponsePayload::Result(value) => Ok(value),
                            ResponsePayload::Error(error) => Err(error),
                        };
                        reader_correlation.complete(&id, payload).await;
                    }
                    Ok(other) => {
                        if unsolicited_tx.send(other).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("client transport closed: {err}");
                        reader_correlation.fail_all().await;
                        break;
                    }
                }
            }
        });

        Client {
            writer,
            correlation,
            default_timeout: options.default_call_timeout,
            reader_task,
            unsolicited: unsolicited_rx,
        }
    }

    /// Sends a request and awaits its correlated response, honoring
    /// `timeout` if given, else the client's configured default.
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        let id = self.correlation.allocate_id();
        let rx = self.correlation.register(id.clone()).await;

        self.writer
            .write(&Message::request(id.clone(), method, params))
            .await
            .map_err(ClientError::Transport)?;

        let effective_timeout = timeout.or(self.default_timeout);
        let outcome = match effective_timeout {
            Some(duration) => match tokio::time::timeout(duration, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.correlation.cancel(&id).await;
                    return Err(ClientError::Timeout(duration));
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(error.into()),
            Err(_) => Err(ClientError::ChannelClosed),
        }
    }

    /// Writes a notification; returns once the bytes are flushed, with
    /// no correlated reply expected.
    pub async fn send_notification(&self, method: impl Into<String>, params: Option<Value>) -> Result<(), ClientError> {
        self.writer
            .write(&Message::notification(method, params))
            .await
            .map_err(ClientError::Transport)
    }

    /// Cancels a call still awaiting its reply. A response that arrives
    /// afterward is discarded silently by the correlation register.
    pub async fn cancel(&self, id: &crate::message::RequestId) {
        self.correlation.cancel(id).await;
    }

    /// Sugar over `send_request`, matching the "initialize, then hand
    /// back a ready client" shape of this workspace's MCP clients. Pure
    /// convenience: it issues exactly the request `send_request` would.
    pub async fn handshake(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        self.send_request(method, params, timeout).await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}
