//! Connection profile: where the five channels bind and how frames are signed.
//!
//! A launcher writes the profile as a JSON connection file:
//!
//! ```json
//! {
//!   "ip": "127.0.0.1",
//!   "transport": "tcp",
//!   "shell_port": 50001,
//!   "iopub_port": 50002,
//!   "stdin_port": 50003,
//!   "control_port": 50004,
//!   "hb_port": 50005,
//!   "signature_scheme": "hmac-sha256",
//!   "key": "a0436f6c-1916-498b-8eb9-e81ab9368e84"
//! }
//! ```
//!
//! Only `tcp` and `hmac-sha256` are supported.  Anything else fails at load
//! time rather than at the first message.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::channel::Channel;
use crate::wire::framing::FrameError;
use crate::wire::signing::Signer;

pub const SUPPORTED_TRANSPORT: &str = "tcp";
pub const SUPPORTED_SIGNATURE_SCHEME: &str = "hmac-sha256";

/// Error type for loading a connection profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("I/O error reading connection file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed connection profile: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported transport {0:?} (only \"tcp\" is supported)")]
    UnsupportedTransport(String),

    #[error("unsupported signature scheme {0:?} (only \"hmac-sha256\" is supported)")]
    UnsupportedSignatureScheme(String),

    #[error("invalid signing key: {0}")]
    Key(#[from] FrameError),
}

/// The shared signing secret.  Never printed.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SignatureKey(String);

impl SignatureKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SignatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("SignatureKey(<empty>)")
        } else {
            f.write_str("SignatureKey(<redacted>)")
        }
    }
}

/// Connection file as written by launchers; validated into [`Profile`].
#[derive(Deserialize)]
struct RawProfile {
    ip: String,
    transport: String,
    stdin_port: u16,
    control_port: u16,
    hb_port: u16,
    shell_port: u16,
    iopub_port: u16,
    #[serde(default = "default_signature_scheme")]
    signature_scheme: String,
    #[serde(default)]
    key: String,
}

fn default_signature_scheme() -> String {
    SUPPORTED_SIGNATURE_SCHEME.to_string()
}

/// A validated connection profile.  Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub ip: String,
    pub stdin_port: u16,
    pub control_port: u16,
    pub hb_port: u16,
    pub shell_port: u16,
    pub iopub_port: u16,
    pub key: SignatureKey,
}

impl Profile {
    /// Parses and validates a connection profile.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Json`] for malformed JSON or missing ports, and
    /// [`ProfileError::UnsupportedTransport`] /
    /// [`ProfileError::UnsupportedSignatureScheme`] for anything other than
    /// `tcp` with `hmac-sha256`.
    pub fn from_json_str(json: &str) -> Result<Self, ProfileError> {
        let raw: RawProfile = serde_json::from_str(json)?;

        if raw.transport != SUPPORTED_TRANSPORT {
            return Err(ProfileError::UnsupportedTransport(raw.transport));
        }
        if raw.signature_scheme != SUPPORTED_SIGNATURE_SCHEME {
            return Err(ProfileError::UnsupportedSignatureScheme(
                raw.signature_scheme,
            ));
        }

        Ok(Self {
            ip: raw.ip,
            stdin_port: raw.stdin_port,
            control_port: raw.control_port,
            hb_port: raw.hb_port,
            shell_port: raw.shell_port,
            iopub_port: raw.iopub_port,
            key: SignatureKey::new(raw.key),
        })
    }

    /// Reads and validates a connection file.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Io`] when the file cannot be read, plus any
    /// error from [`Profile::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn port(&self, channel: Channel) -> u16 {
        match channel {
            Channel::Shell => self.shell_port,
            Channel::Control => self.control_port,
            Channel::Stdin => self.stdin_port,
            Channel::IoPub => self.iopub_port,
            Channel::Heartbeat => self.hb_port,
        }
    }

    /// Socket endpoint for `channel`, e.g. `tcp://127.0.0.1:50001`.
    pub fn endpoint(&self, channel: Channel) -> String {
        format!("{SUPPORTED_TRANSPORT}://{}:{}", self.ip, self.port(channel))
    }

    /// Builds the signer for this profile's key.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Key`] if the MAC rejects the key.
    pub fn signer(&self) -> Result<Signer, ProfileError> {
        Ok(Signer::new(self.key.as_bytes())?)
    }
}
