//! The dispatch pipeline: an ordered chain of [`Interceptor`]s wrapped
//! around a terminal handler that binds and invokes the resolved method
//! (§4.5).
//!
//! The "continuation runs at most once" contract is enforced by the type
//! system rather than a runtime flag: [`Next::call`] consumes `self`, so
//! an interceptor that already invoked its continuation has no value left
//! to invoke it with a second time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::binder;
use crate::catalog::MethodCatalog;
use crate::error::DispatchError;
use crate::message::{Message, Response};
use crate::service::ServiceInstance;
use crate::session::Session;

/// Fires once, cooperatively. Checked by the terminal handler before
/// resolving a service instance; interceptors that run long-lived work
/// are expected to check it themselves.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The ephemeral per-request value threaded through the pipeline (§4.1
/// of the design's RequestContext definition).
pub struct RequestContext {
    pub message: Message,
    pub cancellation: CancellationToken,
    pub service_instance: Option<ServiceInstance>,
    pub session: Arc<Session>,
    pub response: Option<Response>,
}

impl RequestContext {
    pub fn new(message: Message, session: Arc<Session>, cancellation: CancellationToken) -> Self {
        RequestContext {
            message,
            cancellation,
            service_instance: None,
            session,
            response: None,
        }
    }
}

/// One element of the dispatch chain.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn invoke(&self, ctx: &mut RequestContext, next: Next<'_>);
}

/// A synchronous interceptor, adapted onto the async [`Interceptor`]
/// contract by running on the current worker thread via
/// `tokio::task::block_in_place`; the continuation it calls blocks that
/// worker until the downstream chain completes (§4.5).
pub trait SyncInterceptor: Send + Sync {
    fn invoke(&self, ctx: &mut RequestContext, next: SyncNext<'_>);
}

/// Wraps a [`SyncInterceptor`] so it can be registered alongside async
/// interceptors.
pub struct SyncInterceptorAdapter<T>(pub T);

#[async_trait]
impl<T: SyncInterceptor> Interceptor for SyncInterceptorAdapter<T> {
    async fn invoke(&self, ctx: &mut RequestContext, next: Next<'_>) {
        tokio::task::block_in_place(|| self.0.invoke(ctx, SyncNext { inner: next }));
    }
}

/// The blocking counterpart of [`Next`], handed to a [`SyncInterceptor`].
pub struct SyncNext<'a> {
    inner: Next<'a>,
}

impl<'a> SyncNext<'a> {
    pub fn call(self, ctx: &mut RequestContext) {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(self.inner.call(ctx)));
    }
}

/// The remainder of the interceptor chain (plus the terminal handler),
/// handed to the currently-running interceptor. Consuming `call` takes
/// `self` by value, so a chain element can advance the pipeline at most
/// once.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    terminal: &'a Terminal,
}

impl<'a> Next<'a> {
    pub async fn call(self, ctx: &mut RequestContext) {
        match self.chain.split_first() {
            Some((interceptor, rest)) => {
                let next = Next {
                    chain: rest,
                    terminal: self.terminal,
                };
                interceptor.invoke(ctx, next).await;
            }
            None => self.terminal.invoke(ctx).await,
        }
    }
}

/// Resolves a service instance via the descriptor's factory, binds and
/// invokes the method, and writes the outbound `Response` (or, for
/// notifications, nothing).
struct Terminal {
    catalog: Arc<MethodCatalog>,
    propagate_handler_exception_detail: bool,
}

impl Terminal {
    async fn invoke(&self, ctx: &mut RequestContext) {
        trace!("pipeline: executing");
        if ctx.cancellation.is_cancelled() {
            return;
        }

        let (id, method, params) = match &ctx.message {
            Message::Request(r) => (Some(r.id.clone()), r.method.clone(), r.params.clone()),
            Message::Notification(n) => (None, n.method.clone(), n.params.clone()),
            Message::Response(_) => return,
        };

        let bound = match binder::bind(&self.catalog, &method, params.as_ref()) {
            Ok(bound) => bound,
            Err(err) => {
                if let Some(id) = id {
                    ctx.response = Some(Response::err(Some(id), err.into_error_object(None)));
                }
                return;
            }
        };

        let instance = bound.descriptor.factory.create().await;
        ctx.service_instance = Some(instance.clone());

        let handler = bound.descriptor.handler.clone();
        let session = ctx.session.clone();
        let call_instance = instance.clone();
        let args = bound.args;
        let join = tokio::spawn(async move { handler(call_instance, session, args).await });

        let result = match join.await {
            Ok(result) => result,
            Err(join_err) => {
                let data = self
                    .propagate_handler_exception_detail
                    .then(|| Value::String(join_err.to_string()));
                if let Some(id) = id {
                    ctx.response = Some(Response::err(
                        Some(id),
                        DispatchError::Internal("handler panicked".into()).into_error_object(data),
                    ));
                }
                bound.descriptor.factory.release(instance).await;
                return;
            }
        };

        bound.descriptor.factory.release(instance).await;

        if let Some(id) = id {
            ctx.response = Some(match result {
                Ok(value) => Response::ok(id, value),
                Err(err) => Response::err(Some(id), err.into_error_object(None)),
            });
        }
    }
}

/// The built, ready-to-run dispatch pipeline.
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
    catalog: Arc<MethodCatalog>,
    propagate_handler_exception_detail: bool,
}

impl Pipeline {
    pub fn new(catalog: Arc<MethodCatalog>, interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Pipeline {
            interceptors,
            catalog,
            propagate_handler_exception_detail: false,
        }
    }

    pub fn with_propagate_handler_exception_detail(mut self, propagate: bool) -> Self {
        self.propagate_handler_exception_detail = propagate;
        self
    }

    /// Runs one message through the chain. Returns the outbound
    /// `Response` for a request (synthesizing a `result: null` response
    /// if nothing set one), or `None` for a notification, a request an
    /// interceptor consumed without producing a response, or a request
    /// that was cancelled before anything set `ctx.response` — a
    /// cancelled request is `Dropped`, never `Responded`, unless an
    /// interceptor substituted a response before the cancellation fired.
    pub async fn dispatch(
        &self,
        message: Message,
        session: Arc<Session>,
        cancellation: CancellationToken,
    ) -> Option<Response> {
        trace!(method = message.method(), "pipeline: received");
        let is_request = matches!(message, Message::Request(_));
        let mut ctx = RequestContext::new(message, session, cancellation);

        let terminal = Terminal {
            catalog: self.catalog.clone(),
            propagate_handler_exception_detail: self.propagate_handler_exception_detail,
        };
        let next = Next {
            chain: &self.interceptors,
            terminal: &terminal,
        };
        next.call(&mut ctx).await;

        if !is_request {
            return None;
        }

        if ctx.response.is_none() && ctx.cancellation.is_cancelled() {
            trace!("pipeline: dropped (cancelled)");
            return None;
        }

        trace!("pipeline: responded");
        Some(ctx.response.unwrap_or_else(|| {
            let id = match &ctx.message {
                Message::Request(r) => r.id.clone(),
                _ => unreachable!("is_request was checked above"),
            };
            Response::ok(id, Value::Null)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogBuilder, MethodEntry, ParamKind, Parameter, ReturnShape};
    use crate::service::DefaultServiceFactory;
    use serde_json::json;

    fn echo_catalog() -> Arc<MethodCatalog> {
        let mut builder = CatalogBuilder::new();
        builder
            .register(MethodEntry {
                name: "echo".into(),
                parameters: vec![Parameter::required("value", ParamKind::Any)],
                return_shape: ReturnShape::Sync,
                allow_extra_params: false,
                handler: Arc::new(|_instance, _session, mut args| {
                    Box::pin(async move { Ok(args.remove(0)) })
                }),
                factory: Arc::new(DefaultServiceFactory::new(|| Arc::new(()) as ServiceInstance)),
            })
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    #[tokio::test]
    async fn request_is_bound_and_echoed() {
        let pipeline = Pipeline::new(echo_catalog(), vec![]);
        let message = Message::request(1u64, "echo", Some(json!(["hi"])));
        let response = pipeline
            .dispatch(message, Arc::new(Session::empty()), CancellationToken::new())
            .await
            .unwrap();
        assert!(!response.is_error());
    }

    #[tokio::test]
    async fn notification_never_produces_a_response() {
        let pipeline = Pipeline::new(echo_catalog(), vec![]);
        let message = Message::notification("echo", Some(json!(["hi"])));
        let response = pipeline
            .dispatch(message, Arc::new(Session::empty()), CancellationToken::new())
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn unknown_method_yields_method_not_found_response() {
        let pipeline = Pipeline::new(echo_catalog(), vec![]);
        let message = Message::request(1u64, "nope", None);
        let response = pipeline
            .dispatch(message, Arc::new(Session::empty()), CancellationToken::new())
            .await
            .unwrap();
        assert!(response.is_error());
    }

    struct ShortCircuit;

    #[async_trait]
    impl Interceptor for ShortCircuit {
        async fn invoke(&self, ctx: &mut RequestContext, _next: Next<'_>) {
            if let Message::Request(r) = &ctx.message {
                ctx.response = Some(Response::ok(r.id.clone(), json!({"ok": true})));
            }
        }
    }

    #[tokio::test]
    async fn interceptor_can_short_circuit_without_reaching_the_handler() {
        let pipeline = Pipeline::new(echo_catalog(), vec![Arc::new(ShortCircuit)]);
        let message = Message::request(1u64, "echo", Some(json!(["hi"])));
        let response = pipeline
            .dispatch(message, Arc::new(Session::empty()), CancellationToken::new())
            .await
            .unwrap();
        match response.payload {
            crate::message::ResponsePayload::Result(value) => assert_eq!(value, json!({"ok": true})),
            other => panic!("expected a result payload, got {other:?}"),
        }
    }

    struct PassThrough;

    #[async_trait]
    impl Interceptor for PassThrough {
        async fn invoke(&self, ctx: &mut RequestContext, next: Next<'_>) {
            next.call(ctx).await;
        }
    }

    #[tokio::test]
    async fn pass_through_interceptor_still_reaches_the_handler() {
        let pipeline = Pipeline::new(echo_catalog(), vec![Arc::new(PassThrough)]);
        let message = Message::request(1u64, "echo", Some(json!(["hi"])));
        let response = pipeline
            .dispatch(message, Arc::new(Session::empty()), CancellationToken::new())
            .await
            .unwrap();
        match response.payload {
            crate::message::ResponsePayload::Result(value) => assert_eq!(value, json!("hi")),
            other => panic!("expected a result payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_request_yields_no_response_at_all() {
        let pipeline = Pipeline::new(echo_catalog(), vec![]);
        let message = Message::request(1u64, "echo", Some(json!(["hi"])));
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let response = pipeline
            .dispatch(message, Arc::new(Session::empty()), cancellation)
            .await;
        assert!(response.is_none());
    }

    struct SubstituteThenIgnoreCancellation;

    #[async_trait]
    impl Interceptor for SubstituteThenIgnoreCancellation {
        async fn invoke(&self, ctx: &mut RequestContext, _next: Next<'_>) {
            if let Message::Request(r) = &ctx.message {
                ctx.response = Some(Response::ok(r.id.clone(), json!({"substituted": true})));
            }
        }
    }

    #[tokio::test]
    async fn cancelled_request_still_honors_a_response_an_interceptor_substituted() {
        let pipeline = Pipeline::new(echo_catalog(), vec![Arc::new(SubstituteThenIgnoreCancellation)]);
        let message = Message::request(1u64, "echo", Some(json!(["hi"])));
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let response = pipeline
            .dispatch(message, Arc::new(Session::empty()), cancellation)
            .await
            .unwrap();
        match response.payload {
            crate::message::ResponsePayload::Result(value) => assert_eq!(value, json!({"substituted": true})),
            other => panic!("expected a result payload, got {other:?}"),
        }
    }
}
