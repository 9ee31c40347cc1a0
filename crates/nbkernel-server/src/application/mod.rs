//! Application layer of the kernel server.
//!
//! This layer owns the protocol behaviour of a running kernel: which channel
//! serves which request, when status is broadcast, how replies are labelled
//! and parented.  It depends on the transport only through the
//! [`FrameSocket`](crate::infrastructure::transport::FrameSocket) trait, so the
//! same loop runs over ZeroMQ in production and over in-memory queues in tests.
//!
//! # Sub-modules
//!
//! - **`dispatch`**  – The five channel tasks and the request → reply state
//!   machine ([`KernelServer`](dispatch::KernelServer)).
//!
//! - **`handler`**   – The [`KernelHandler`](handler::KernelHandler) trait a
//!   language backend implements, one method per request kind.
//!
//! - **`output`**    – [`OutputHandle`](output::OutputHandle), the side-channel
//!   surface handlers use to publish output and read input.
//!
//! - **`execution`** – The atomic execution counter.
//!
//! - **`echo`**      – A demonstration backend that evaluates each cell to its
//!   own source.

pub mod dispatch;
pub mod echo;
pub mod execution;
pub mod handler;
pub mod output;
