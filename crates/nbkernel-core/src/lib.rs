//! # nbkernel-core
//!
//! Protocol engine for the kernel side of the notebook messaging protocol.
//!
//! This crate has no socket or runtime dependencies.  It defines:
//!
//! - **`protocol`** – The typed message catalogue, the in-memory header, the
//!   MIME/display-data model, and the JSON codec that maps each message to its
//!   header/parent/metadata/content wire parts.
//!
//! - **`wire`** – The signed multipart envelope:
//!   `[identities…] <IDS|MSG> [hmac] [header] [parent] [metadata] [content]`.
//!
//! - **`profile`** – The connection profile a launcher hands to the kernel:
//!   channel ports, bind address and the signing key.
//!
//! - **`kernelspec`** – The `kernel.json` descriptor launchers use to find and
//!   start a kernel.
//!
//! The transport and dispatch loop live in `nbkernel-server`.

pub mod channel;
pub mod kernelspec;
pub mod profile;
pub mod protocol;
pub mod wire;

pub use channel::Channel;
pub use kernelspec::{KernelSpec, KernelSpecError};
pub use profile::{Profile, ProfileError, SignatureKey};
pub use protocol::codec::{decode, encode, try_decode, DecodeError, EncodeError, EncodedParts};
pub use protocol::header::{MessageHeader, MessageType};
pub use protocol::ids::{new_id, Session};
pub use protocol::messages::{Content, Message};
pub use protocol::mime::{extract_plain, DisplayData, MimeType};
pub use wire::{Envelope, FrameError, Signer};
