//! The Service Factory (§4.6): produces a per-request instance handle for a
//! registered service type.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

/// A type-erased handle to a service instance, held exclusively by one
/// request for the duration of its pipeline traversal.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Produces (and optionally releases) instances of a registered service
/// type. The default factory instantiates a fresh instance per
/// invocation; a custom factory may cache instances, pool them, or inject
/// dependencies.
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    async fn create(&self) -> ServiceInstance;

    /// Called after the bound method completes. The default no-op is
    /// correct for factories that hand out fresh, disposable instances.
    async fn release(&self, _instance: ServiceInstance) {}
}

/// The default factory: calls a constructor closure fresh for every
/// request.
pub struct DefaultServiceFactory<F> {
    ctor: F,
}

impl<F> DefaultServiceFactory<F>
where
    F: Fn() -> ServiceInstance + Send + Sync,
{
    pub fn new(ctor: F) -> Self {
        DefaultServiceFactory { ctor }
    }
}

#[async_trait]
impl<F> ServiceFactory for DefaultServiceFactory<F>
where
    F: Fn() -> ServiceInstance + Send + Sync,
{
    async fn create(&self) -> ServiceInstance {
        (self.ctor)()
    }
}

/// A factory that hands out a single shared instance to every request,
/// for handlers that are cheap to share (e.g. stateless or internally
/// synchronized).
pub struct SharedServiceFactory {
    instance: ServiceInstance,
}

impl SharedServiceFactory {
    pub fn new(instance: ServiceInstance) -> Self {
        SharedServiceFactory { instance }
    }
}

#[async_trait]
impl ServiceFactory for SharedServiceFactory {
    async fn create(&self) -> ServiceInstance {
        self.instance.clone()
    }
}
