//! Infrastructure layer for the kernel server.
//!
//! Contains the socket-facing transport adapters and on-disk configuration.
//!
//! **Dependency rule**: this layer may depend on `nbkernel_core`, but MUST NOT
//! import the `application` layer.

pub mod config;
pub mod transport;
