//! A transport-agnostic JSON-RPC 2.0 runtime: `Content-Length`-framed
//! message exchange over a pair of byte streams, a server-side dispatch
//! pipeline built from a method catalog and an interceptor chain, and a
//! client-side invoker with request/response correlation and a
//! method-table-driven proxy surface.
//!
//! Module map:
//! - [`message`] / [`codec`]: the in-memory message model and its wire
//!   JSON encoding.
//! - [`framing`]: the `Content-Length` header envelope over an
//!   `AsyncRead`/`AsyncWrite` pair.
//! - [`catalog`] / [`binder`]: the static method catalog and the runtime
//!   overload resolution algorithm.
//! - [`service`] / [`session`]: per-request service instances and the
//!   ambient session reference.
//! - [`pipeline`]: the interceptor chain wrapped around the terminal
//!   dispatch handler.
//! - [`correlation`] / [`client`]: the client-side request/response
//!   correlation register and invoker.
//! - [`proxy`]: the method-table-driven call surface built on top of
//!   [`client::Client`].
//! - [`host`] / [`config`]: the server embedding surface and its options.

pub mod binder;
pub mod catalog;
pub mod client;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod error;
pub mod framing;
pub mod host;
pub mod message;
pub mod pipeline;
pub mod proxy;
pub mod service;
pub mod session;

pub use catalog::{MethodCatalog, MethodDescriptor, MethodEntry, ParamKind, Parameter, ReturnShape};
pub use client::{Client, ClientOptions};
pub use config::HostOptions;
pub use error::{CatalogError, ClientError, CodecError, DispatchError, FramingError};
pub use framing::{FramedReader, FramedWriter};
pub use host::{Host, HostBuilder};
pub use message::{ErrorObject, Message, Notification, Request, RequestId, Response, ResponsePayload};
pub use pipeline::{CancellationToken, Interceptor, Pipeline, RequestContext, SyncInterceptor};
pub use proxy::{ProxyEntry, ProxyTable};
pub use service::{DefaultServiceFactory, ServiceFactory, ServiceInstance, SharedServiceFactory};
pub use session::Session;
