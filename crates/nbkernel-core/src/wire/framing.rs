//! Multipart envelope framing.
//!
//! A message on a socket is a list of frames:
//!
//! ```text
//! [identity…] <IDS|MSG> [signature] [header] [parent] [metadata] [content] [buffer…]
//! ```
//!
//! Identities are opaque routing frames supplied by ROUTER sockets (or a
//! single topic frame on iopub).  The signature is the hex HMAC of the four
//! JSON parts that follow it.  Trailing binary buffers are carried but not
//! interpreted.

use bytes::Bytes;
use thiserror::Error;

use crate::protocol::codec::{self, DecodeError, EncodeError, EncodedParts};
use crate::protocol::header::MessageType;
use crate::protocol::messages::Message;
use crate::wire::signing::Signer;

/// Separates routing identities from the signed body.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// Frames that must follow the delimiter: signature plus four JSON parts.
const BODY_FRAMES: usize = 5;

/// Errors produced while framing, verifying or unframing a message.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("envelope delimiter not found")]
    MissingDelimiter,

    #[error("truncated envelope: expected 5 frames after the delimiter, found {found}")]
    Truncated { found: usize },

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("signing key rejected by the MAC")]
    InvalidKey,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// A framed but not yet decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub identities: Vec<Bytes>,
    pub signature: Bytes,
    pub header: Bytes,
    pub parent_header: Bytes,
    pub metadata: Bytes,
    pub content: Bytes,
    pub buffers: Vec<Bytes>,
}

impl Envelope {
    /// Splits raw socket frames into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::MissingDelimiter`] when no frame equals
    /// [`DELIMITER`], or [`FrameError::Truncated`] when fewer than five frames
    /// follow it.
    pub fn parse(frames: Vec<Bytes>) -> Result<Self, FrameError> {
        let delim = frames
            .iter()
            .position(|f| f.as_ref() == DELIMITER)
            .ok_or(FrameError::MissingDelimiter)?;

        let found = frames.len() - delim - 1;
        if found < BODY_FRAMES {
            return Err(FrameError::Truncated { found });
        }

        let mut frames = frames.into_iter();
        let identities: Vec<Bytes> = frames.by_ref().take(delim).collect();
        let mut body = frames.skip(1);
        // Length was checked above; the defaults are unreachable.
        let mut next = || body.next().unwrap_or_default();
        let signature = next();
        let header = next();
        let parent_header = next();
        let metadata = next();
        let content = next();
        let buffers = body.collect();

        Ok(Self {
            identities,
            signature,
            header,
            parent_header,
            metadata,
            content,
            buffers,
        })
    }

    /// Signs encoded parts and wraps them with routing identities.
    pub fn seal(identities: Vec<Bytes>, parts: EncodedParts, signer: &Signer) -> Self {
        let signature = signer.sign(&parts.as_slices());
        Self {
            identities,
            signature: Bytes::from(signature),
            header: Bytes::from(parts.header),
            parent_header: Bytes::from(parts.parent_header),
            metadata: Bytes::from(parts.metadata),
            content: Bytes::from(parts.content),
            buffers: Vec::new(),
        }
    }

    /// Encodes and signs `msg`, routing it to the identities in its header.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Encode`] for receive-only message kinds.
    pub fn from_message(msg: &Message, signer: &Signer) -> Result<Self, FrameError> {
        let parts = codec::encode(msg)?;
        let identities = msg
            .header
            .identities
            .iter()
            .cloned()
            .map(Bytes::from)
            .collect();
        Ok(Self::seal(identities, parts, signer))
    }

    /// Replaces the routing identities with a single iopub topic frame.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.identities = vec![Bytes::from(topic.into())];
        self
    }

    /// Checks the signature against the four JSON parts.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::SignatureMismatch`] when the signature is wrong.
    pub fn verify(&self, signer: &Signer) -> Result<(), FrameError> {
        signer.verify(
            &self.signature,
            &[
                &self.header,
                &self.parent_header,
                &self.metadata,
                &self.content,
            ],
        )
    }

    /// Decodes the JSON parts into a typed message.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Decode`] when the parts do not form a valid message.
    pub fn decode(&self) -> Result<Message, FrameError> {
        let identities = self.identities.iter().map(|b| b.to_vec()).collect();
        Ok(codec::decode(
            identities,
            &self.header,
            &self.parent_header,
            &self.metadata,
            &self.content,
        )?)
    }

    /// Parses, verifies and decodes raw frames in one step.
    ///
    /// # Errors
    ///
    /// Any [`FrameError`] from the three stages.
    pub fn open(frames: Vec<Bytes>, signer: &Signer) -> Result<Message, FrameError> {
        let envelope = Self::parse(frames)?;
        envelope.verify(signer)?;
        envelope.decode()
    }

    /// Flattens the envelope back into socket frames.
    pub fn into_frames(self) -> Vec<Bytes> {
        let mut frames = self.identities;
        frames.reserve(BODY_FRAMES + 1 + self.buffers.len());
        frames.push(Bytes::from_static(DELIMITER));
        frames.push(self.signature);
        frames.push(self.header);
        frames.push(self.parent_header);
        frames.push(self.metadata);
        frames.push(self.content);
        frames.extend(self.buffers);
        frames
    }
}

/// The iopub topic for a published message: `kernel.<session>.<msg_type>`.
pub fn iopub_topic(session_id: &str, msg_type: MessageType) -> String {
    format!("kernel.{session_id}.{msg_type}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ids::Session;
    use crate::protocol::messages::{Content, ExecutionState, Status, Stream, StreamName};

    fn status_message() -> Message {
        Message::new(
            Content::Status(Status {
                execution_state: ExecutionState::Idle,
            }),
            &Session::new("kernel"),
        )
    }

    fn frames(parts: &[&'static [u8]]) -> Vec<Bytes> {
        parts.iter().copied().map(Bytes::from_static).collect()
    }

    #[test]
    fn test_parse_splits_identities_body_and_buffers() {
        // Arrange
        let raw = frames(&[
            b"id-1", b"id-2", DELIMITER, b"sig", b"h", b"p", b"m", b"c", b"buf-1",
        ]);

        // Act
        let env = Envelope::parse(raw).unwrap();

        // Assert
        assert_eq!(env.identities, frames(&[b"id-1", b"id-2"]));
        assert_eq!(env.signature, "sig");
        assert_eq!(env.header, "h");
        assert_eq!(env.parent_header, "p");
        assert_eq!(env.metadata, "m");
        assert_eq!(env.content, "c");
        assert_eq!(env.buffers, frames(&[b"buf-1"]));
    }

    #[test]
    fn test_parse_without_delimiter_fails() {
        let raw = frames(&[b"sig", b"h", b"p", b"m", b"c"]);
        assert!(matches!(
            Envelope::parse(raw),
            Err(FrameError::MissingDelimiter)
        ));
    }

    #[test]
    fn test_parse_truncated_body_fails() {
        let raw = frames(&[DELIMITER, b"sig", b"h", b"p"]);
        assert!(matches!(
            Envelope::parse(raw),
            Err(FrameError::Truncated { found: 3 })
        ));
    }

    #[test]
    fn test_into_frames_inverts_parse() {
        let raw = frames(&[b"peer", DELIMITER, b"sig", b"h", b"p", b"m", b"c"]);

        let env = Envelope::parse(raw.clone()).unwrap();

        assert_eq!(env.into_frames(), raw);
    }

    #[test]
    fn test_sealed_message_opens_with_same_key() {
        let signer = Signer::new(b"key").unwrap();
        let msg = status_message();

        let frames = Envelope::from_message(&msg, &signer).unwrap().into_frames();
        let opened = Envelope::open(frames, &signer).unwrap();

        assert_eq!(opened.content, msg.content);
        assert_eq!(opened.header.message_id, msg.header.message_id);
    }

    #[test]
    fn test_open_with_wrong_key_is_rejected() {
        let msg = status_message();
        let frames = Envelope::from_message(&msg, &Signer::new(b"key-a").unwrap())
            .unwrap()
            .into_frames();

        let result = Envelope::open(frames, &Signer::new(b"key-b").unwrap());

        assert!(matches!(result, Err(FrameError::SignatureMismatch)));
    }

    #[test]
    fn test_reply_carries_request_identities() {
        // Arrange
        let session = Session::new("kernel");
        let mut request = status_message();
        request.header.identities = vec![b"frontend-7".to_vec()];
        let reply = Message::child_of(
            &request.header,
            Content::Stream(Stream {
                name: StreamName::Stdout,
                text: "x".to_string(),
            }),
            &session,
        );

        // Act
        let env = Envelope::from_message(&reply, &Signer::unsigned()).unwrap();

        // Assert
        assert_eq!(env.identities, vec![Bytes::from_static(b"frontend-7")]);
        assert_eq!(env.signature, "");
    }

    #[test]
    fn test_iopub_topic_format() {
        assert_eq!(
            iopub_topic("abc", MessageType::ExecuteResult),
            "kernel.abc.execute_result"
        );
    }
}
