//! The ambient [`Session`] reference (§4.6, design note "Session as
//! ambient reference"): a single, user-opaque value handed to every
//! [`crate::pipeline::RequestContext`] as an explicit field, never stored
//! thread-locally.

use std::any::Any;

/// A user-supplied value carried alongside every request. Lifetime spans
/// the host: it is constructed once at build time and shared (via `Arc`)
/// with every subsequent request.
pub struct Session {
    value: Box<dyn Any + Send + Sync>,
}

impl Session {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Session { value: Box::new(value) }
    }

    /// A session carrying no application state, for hosts that don't need
    /// one.
    pub fn empty() -> Self {
        Session::new(())
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}
