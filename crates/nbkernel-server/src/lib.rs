//! nbkernel-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `echo-kernel` binary share the same module tree.

pub mod application;
pub mod infrastructure;

pub use application::dispatch::{KernelError, KernelServer, ShutdownSignal};
pub use application::execution::ExecutionCounter;
pub use application::handler::{ExecuteOutcome, KernelHandler};
pub use application::output::OutputHandle;
