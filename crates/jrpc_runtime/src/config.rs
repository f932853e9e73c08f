//! Plain-data configuration for [`crate::host::Host`] and [`crate::client::Client`]
//! (§6, supplemented). Constructed with `Default` plus builder setters,
//! the same shape this workspace's `StdioServerConfig` uses — no external
//! config-file format is read by the core itself.

use std::time::Duration;

/// Options governing one [`crate::host::Host`].
#[derive(Clone, Copy, Debug)]
pub struct HostOptions {
    /// Frames whose declared `Content-Length` exceeds this are rejected
    /// with `InvalidFrame`; the stream still resynchronizes.
    pub max_message_bytes: Option<usize>,
    /// When `true`, the host drains and dispatches one message at a time
    /// instead of letting the pipeline run requests concurrently; named
    /// for the common case of needing replies to preserve the order
    /// their requests arrived in from a single peer.
    pub preserve_foreign_method_order: bool,
    /// When `true`, a handler panic's message is attached to the
    /// `InternalError` response's `data` field; when `false`, `data` is
    /// omitted so internal exception text never reaches the wire.
    pub propagate_handler_exception_detail: bool,
    /// Mirrors rejected/malformed frame bodies to `tracing::trace!`.
    /// Diagnostics only; never changes protocol behavior.
    pub mirror_stdio: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        HostOptions {
            max_message_bytes: None,
            preserve_foreign_method_order: false,
            propagate_handler_exception_detail: false,
            mirror_stdio: false,
        }
    }
}

impl HostOptions {
    pub fn with_max_message_bytes(mut self, max: usize) -> Self {
        self.max_message_bytes = Some(max);
        self
    }

    pub fn with_preserve_foreign_method_order(mut self, preserve: bool) -> Self {
        self.preserve_foreign_method_order = preserve;
        self
    }

    pub fn with_propagate_handler_exception_detail(mut self, propagate: bool) -> Self {
        self.propagate_handler_exception_detail = propagate;
        self
    }

    pub fn with_mirror_stdio(mut self, mirror: bool) -> Self {
        self.mirror_stdio = mirror;
        self
    }
}

/// The grace period [`crate::host::Host::stop`] waits for in-flight
/// requests to finish before the transport is closed regardless.
#[derive(Clone, Copy, Debug)]
pub struct ShutdownGrace(pub Duration);

impl Default for ShutdownGrace {
    fn default() -> Self {
        ShutdownGrace(Duration::from_secs(5))
    }
}
