//! The server embedding surface (§6): `HostBuilder::register` /
//! `intercept` / `build`, and a running [`Host`] bound to one pair of
//! byte streams.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::catalog::{CatalogBuilder, MethodEntry};
use crate::config::{HostOptions, ShutdownGrace};
use crate::error::{CatalogError, CodecError, FramingError, INVALID_REQUEST, PARSE_ERROR};
use crate::framing::{FramedReader, FramedWriter};
use crate::message::{ErrorObject, Message, Response};
use crate::pipeline::{CancellationToken, Interceptor, Pipeline, SyncInterceptor, SyncInterceptorAdapter};
use crate::session::Session;

/// Accumulates method registrations, interceptors, and options, then
/// builds a running [`Host`] bound to a pair of streams.
#[derive(Default)]
pub struct HostBuilder {
    catalog: CatalogBuilder,
    interceptors: Vec<Arc<dyn Interceptor>>,
    options: HostOptions,
}

impl HostBuilder {
    pub fn new() -> Self {
        HostBuilder {
            catalog: CatalogBuilder::new(),
            interceptors: Vec::new(),
            options: HostOptions::default(),
        }
    }

    pub fn register(&mut self, entry: MethodEntry) -> Result<&mut Self, CatalogError> {
        self.catalog.register(entry)?;
        Ok(self)
    }

    pub fn intercept(&mut self, interceptor: Arc<dyn Interceptor>) -> &mut Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn intercept_sync<T: SyncInterceptor + 'static>(&mut self, interceptor: T) -> &mut Self {
        self.interceptors.push(Arc::new(SyncInterceptorAdapter(interceptor)));
        self
    }

    pub fn options(&mut self, options: HostOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Finalizes the catalog and starts the host's background read/
    /// dispatch/write loop over `in_stream`/`out_stream`.
    pub fn build<R, W>(self, in_stream: R, out_stream: W, session: Session) -> Result<Host, CatalogError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let catalog = Arc::new(self.catalog.build()?);
        let pipeline = Arc::new(
            Pipeline::new(catalog, self.interceptors)
                .with_propagate_handler_exception_detail(self.options.propagate_handler_exception_detail),
        );
        let session = Arc::new(session);

        let mut reader = FramedReader::new(in_stream).with_mirror_stdio(self.options.mirror_stdio);
        if let Some(max) = self.options.max_message_bytes {
            reader = reader.with_max_message_bytes(max);
        }
        let writer = Arc::new(FramedWriter::new(out_stream));

        let shutdown = Arc::new(Notify::new());
        let sequential = self.options.preserve_foreign_method_order;

        let run_shutdown = shutdown.clone();
        let run_task = tokio::spawn(run_loop(reader, writer, pipeline, session, sequential, run_shutdown));

        Ok(Host {
            shutdown,
            run_task,
            grace: ShutdownGrace::default(),
        })
    }
}

async fn run_loop<R, W>(
    mut reader: FramedReader<R>,
    writer: Arc<FramedWriter<W>>,
    pipeline: Arc<Pipeline>,
    session: Arc<Session>,
    sequential: bool,
    shutdown: Arc<Notify>,
) where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut inflight: Vec<JoinHandle<()>> = Vec::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            frame = reader.read() => {
                match frame {
                    Ok(message) => {
                        let pipeline = pipeline.clone();
                        let writer = writer.clone();
                        let session = session.clone();
                        let task = async move {
                            if let Some(response) = pipeline.dispatch(message, session, CancellationToken::new()).await {
                                if let Err(err) = writer.write(&Message::Response(response)).await {
                                    warn!("host failed to write response: {err}");
                                }
                            }
                        };

                        if sequential {
                            task.await;
                        } else {
                            inflight.retain(|handle| !handle.is_finished());
                            inflight.push(tokio::spawn(task));
                        }
                    }
                    Err(FramingError::EndOfStream) => break,
                    Err(FramingError::Decode(CodecError::InvalidJson(_) | CodecError::InvalidUtf8(_))) => {
                        warn!("host rejected an unparsable frame");
                        let response = Response::err(None, ErrorObject::new(PARSE_ERROR, "Parse error"));
                        if let Err(err) = writer.write(&Message::Response(response)).await {
                            warn!("host failed to write parse-error response: {err}");
                            break;
                        }
                    }
                    Err(FramingError::Decode(CodecError::InvalidMessage(detail))) => {
                        warn!("host rejected an invalid message: {detail}");
                        let response = Response::err(None, ErrorObject::new(INVALID_REQUEST, "Invalid Request"));
                        if let Err(err) = writer.write(&Message::Response(response)).await {
                            warn!("host failed to write invalid-request response: {err}");
                            break;
                        }
                    }
                    Err(err) => {
                        warn!("host transport closed: {err}");
                        break;
                    }
                }
            }
        }
    }

    for handle in inflight {
        let _ = handle.await;
    }
}

/// A running host. Dropping it without calling [`Host::stop`] detaches
/// the background loop; it keeps running until the transport closes.
pub struct Host {
    shutdown: Arc<Notify>,
    run_task: JoinHandle<()>,
    grace: ShutdownGrace,
}

impl Host {
    pub fn with_shutdown_grace(mut self, grace: ShutdownGrace) -> Self {
        self.grace = grace;
        self
    }

    /// Signals the accept loop to stop reading new frames, waits up to
    /// the configured grace for in-flight requests to finish, then
    /// aborts whatever is still outstanding.
    pub async fn stop(mut self) {
        self.shutdown.notify_one();
        if tokio::time::timeout(self.grace.0, &mut self.run_task).await.is_err() {
            self.run_task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ParamKind, Parameter, ReturnShape};
    use crate::framing::{FramedReader as TestReader, FramedWriter as TestWriter};
    use crate::message::{Message as Msg, Response, ResponsePayload};
    use crate::service::{DefaultServiceFactory, ServiceInstance};
    use serde_json::json;

    fn echo_host(in_stream: tokio::io::DuplexStream, out_stream: tokio::io::DuplexStream) -> Host {
        let mut builder = HostBuilder::new();
        builder
            .register(MethodEntry {
                name: "echo".into(),
                parameters: vec![Parameter::required("value", ParamKind::Any)],
                return_shape: ReturnShape::Sync,
                allow_extra_params: false,
                handler: Arc::new(|_instance, _session, mut args| Box::pin(async move { Ok(args.remove(0)) })),
                factory: Arc::new(DefaultServiceFactory::new(|| Arc::new(()) as ServiceInstance)),
            })
            .unwrap();
        builder.build(in_stream, out_stream, Session::empty()).unwrap()
    }

    #[tokio::test]
    async fn echo_request_round_trips() {
        let (host_side, peer_side) = tokio::io::duplex(8192);
        let (host_read, host_write) = tokio::io::split(host_side);
        let (peer_read, peer_write) = tokio::io::split(peer_side);

        let _host = echo_host(host_read, host_write);
        let mut peer_reader = TestReader::new(peer_read);
        let peer_writer = TestWriter::new(peer_write);

        peer_writer.write(&Msg::request(1u64, "echo", Some(json!(["hi"])))).await.unwrap();
        let response = peer_reader.read().await.unwrap();
        match response {
            Msg::Response(Response {
                payload: ResponsePayload::Result(value),
                ..
            }) => assert_eq!(value, json!("hi")),
            other => panic!("expected a result response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_method_yields_a_method_not_found_error() {
        let (host_side, peer_side) = tokio::io::duplex(8192);
        let (host_read, host_write) = tokio::io::split(host_side);
        let (peer_read, peer_write) = tokio::io::split(peer_side);

        let _host = echo_host(host_read, host_write);
        let mut peer_reader = TestReader::new(peer_read);
        let peer_writer = TestWriter::new(peer_write);

        peer_writer.write(&Msg::request(1u64, "missing", None)).await.unwrap();
        let response = peer_reader.read().await.unwrap();
        match response {
            Msg::Response(Response {
                payload: ResponsePayload::Error(error),
                ..
            }) => assert_eq!(error.code, crate::error::METHOD_NOT_FOUND),
            other => panic!("expected an error response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_yields_a_parse_error_and_leaves_the_connection_open() {
        use tokio::io::AsyncWriteExt;

        let (host_side, peer_side) = tokio::io::duplex(8192);
        let (host_read, host_write) = tokio::io::split(host_side);
        let (peer_read, mut peer_write) = tokio::io::split(peer_side);

        let _host = echo_host(host_read, host_write);
        let mut peer_reader = TestReader::new(peer_read);

        let body = b"{not json}";
        let frame = format!("Content-Length: {}\r\n\r\n", body.len());
        peer_write.write_all(frame.as_bytes()).await.unwrap();
        peer_write.write_all(body).await.unwrap();
        peer_write.flush().await.unwrap();

        let response = peer_reader.read().await.unwrap();
        match response {
            Msg::Response(Response { id, payload: ResponsePayload::Error(error) }) => {
                assert!(id.is_none());
                assert_eq!(error.code, crate::error::PARSE_ERROR);
            }
            other => panic!("expected a parse-error response, got {other:?}"),
        }

        // The connection is still alive: a well-formed request afterward
        // still gets dispatched and answered.
        let peer_writer = TestWriter::new(peer_write);
        peer_writer.write(&Msg::request(1u64, "echo", Some(json!(["still alive"])))).await.unwrap();
        let response = peer_reader.read().await.unwrap();
        match response {
            Msg::Response(Response {
                payload: ResponsePayload::Result(value),
                ..
            }) => assert_eq!(value, json!("still alive")),
            other => panic!("expected a result response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn valid_json_but_not_a_message_yields_an_invalid_request_error() {
        use tokio::io::AsyncWriteExt;

        let (host_side, peer_side) = tokio::io::duplex(8192);
        let (host_read, host_write) = tokio::io::split(host_side);
        let (peer_read, mut peer_write) = tokio::io::split(peer_side);

        let _host = echo_host(host_read, host_write);
        let mut peer_reader = TestReader::new(peer_read);

        let body = serde_json::to_string(&json!({"jsonrpc": "2.0", "neither": "method nor id"})).unwrap();
        let frame = format!("Content-Length: {}\r\n\r\n", body.len());
        peer_write.write_all(frame.as_bytes()).await.unwrap();
        peer_write.write_all(body.as_bytes()).await.unwrap();
        peer_write.flush().await.unwrap();

        let response = peer_reader.read().await.unwrap();
        match response {
            Msg::Response(Response { id, payload: ResponsePayload::Error(error) }) => {
                assert!(id.is_none());
                assert_eq!(error.code, crate::error::INVALID_REQUEST);
            }
            other => panic!("expected an invalid-request response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn notification_produces_no_outbound_bytes() {
        let (host_side, peer_side) = tokio::io::duplex(8192);
        let (host_read, host_write) = tokio::io::split(host_side);
        let (peer_read, peer_write) = tokio::io::split(peer_side);

        let _host = echo_host(host_read, host_write);
        let mut peer_reader = TestReader::new(peer_read);
        let peer_writer = TestWriter::new(peer_write);

        peer_writer
            .write(&Msg::notification("echo", Some(json!(["ignored"]))))
            .await
            .unwrap();
        // Follow with a real request; if the notification had produced a
        // reply it would arrive first and this assertion would see it
        // instead of the echo's result.
        peer_writer.write(&Msg::request(1u64, "echo", Some(json!(["second"])))).await.unwrap();

        let response = peer_reader.read().await.unwrap();
        match response {
            Msg::Response(Response {
                payload: ResponsePayload::Result(value),
                ..
            }) => assert_eq!(value, json!("second")),
            other => panic!("expected a result response, got {other:?}"),
        }
    }
}
