//! HMAC-SHA256 signing of the four JSON parts of a message.
//!
//! The signature covers header, parent header, metadata and content, in that
//! order, and travels as a lowercase hex string.  An empty key disables
//! signing: outgoing signatures are empty and incoming ones are not checked.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::wire::framing::FrameError;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies message parts with a shared key.
///
/// The key itself is never exposed; `Debug` only reports whether signing is
/// enabled.
#[derive(Clone)]
pub struct Signer {
    mac: Option<HmacSha256>,
}

impl Signer {
    /// Creates a signer for `key`.  An empty key yields an unsigned signer.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidKey`] if the MAC rejects the key.
    pub fn new(key: &[u8]) -> Result<Self, FrameError> {
        if key.is_empty() {
            return Ok(Self::unsigned());
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|_| FrameError::InvalidKey)?;
        Ok(Self { mac: Some(mac) })
    }

    /// A signer that produces empty signatures and accepts any signature.
    pub fn unsigned() -> Self {
        Self { mac: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.mac.is_some()
    }

    /// Returns the hex signature of `parts`, or an empty string when unsigned.
    pub fn sign(&self, parts: &[&[u8]]) -> String {
        match &self.mac {
            Some(mac) => {
                let mut mac = mac.clone();
                for part in parts {
                    mac.update(part);
                }
                hex::encode(mac.finalize().into_bytes())
            }
            None => String::new(),
        }
    }

    /// Checks `signature` against `parts` in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::SignatureMismatch`] if the signature is not valid
    /// hex or does not match.  Always succeeds when unsigned.
    pub fn verify(&self, signature: &[u8], parts: &[&[u8]]) -> Result<(), FrameError> {
        let Some(mac) = &self.mac else {
            return Ok(());
        };
        let expected = hex::decode(signature).map_err(|_| FrameError::SignatureMismatch)?;
        let mut mac = mac.clone();
        for part in parts {
            mac.update(part);
        }
        mac.verify_slice(&expected)
            .map_err(|_| FrameError::SignatureMismatch)
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTS: [&[u8]; 4] = [
        br#"{"msg_id":"1"}"#,
        b"{}",
        b"{}",
        br#"{"code":"1+1"}"#,
    ];

    #[test]
    fn test_signature_is_lowercase_hex_sha256() {
        let signer = Signer::new(b"secret").unwrap();

        let sig = signer.sign(&PARTS);

        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_known_vector_matches_rfc_4231_case_2() {
        // HMAC-SHA256("Jefe", "what do ya want for nothing?"), split across parts.
        let signer = Signer::new(b"Jefe").unwrap();

        let sig = signer.sign(&[b"what do ya ", b"want ", b"for nothing", b"?"]);

        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let signer = Signer::new(b"secret").unwrap();
        let sig = signer.sign(&PARTS);

        assert!(signer.verify(sig.as_bytes(), &PARTS).is_ok());
    }

    #[test]
    fn test_verify_rejects_flipped_content_byte() {
        // Arrange
        let signer = Signer::new(b"secret").unwrap();
        let sig = signer.sign(&PARTS);
        let tampered = br#"{"code":"1+2"}"#;

        // Act
        let result = signer.verify(sig.as_bytes(), &[PARTS[0], PARTS[1], PARTS[2], tampered]);

        // Assert
        assert!(matches!(result, Err(FrameError::SignatureMismatch)));
    }

    #[test]
    fn test_verify_rejects_non_hex_signature() {
        let signer = Signer::new(b"secret").unwrap();
        assert!(signer.verify(b"zz-not-hex", &PARTS).is_err());
    }

    #[test]
    fn test_unsigned_signer_emits_empty_and_accepts_anything() {
        let signer = Signer::new(b"").unwrap();

        assert!(!signer.is_enabled());
        assert_eq!(signer.sign(&PARTS), "");
        assert!(signer.verify(b"whatever", &PARTS).is_ok());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let signer = Signer::new(b"super-secret-key").unwrap();

        let shown = format!("{signer:?}");

        assert!(!shown.contains("super-secret-key"));
        assert!(shown.contains("enabled: true"));
    }
}
