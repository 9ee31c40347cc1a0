//! Wire layer: signed multipart envelopes.

pub mod framing;
pub mod signing;

pub use framing::{iopub_topic, Envelope, FrameError, DELIMITER};
pub use signing::Signer;
