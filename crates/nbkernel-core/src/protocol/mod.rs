//! Protocol model: identities, message types, content bodies, and the JSON codec.

pub mod codec;
pub mod header;
pub mod ids;
pub mod messages;
pub mod mime;

pub use codec::{decode, encode, try_decode, DecodeError, EncodeError, EncodedParts};
pub use header::{MessageHeader, MessageType, PROTOCOL_VERSION};
pub use ids::{new_id, Session};
pub use messages::*;
pub use mime::{extract_plain, DisplayData, ImageSize, MimeType};
