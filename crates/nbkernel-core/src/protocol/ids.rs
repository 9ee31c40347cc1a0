//! Globally unique identifiers for sessions and messages.
//!
//! Every outgoing header carries a fresh message id and the session id of the
//! kernel process that produced it.  Frontends use the message id to match a
//! reply (via its parent header) to the request that caused it, and the
//! session id to tell kernel restarts apart.
//!
//! Both identifiers are UUID v4 strings in the canonical hyphenated form.
//! Incoming identifiers are never validated against this shape: frontends are
//! free to use any string, so headers store them as plain `String`s.

use uuid::Uuid;

/// Returns a new random identifier in hyphenated lowercase form.
///
/// # Examples
///
/// ```rust
/// use nbkernel_core::protocol::ids::new_id;
///
/// let a = new_id();
/// let b = new_id();
/// assert_eq!(a.len(), 36);
/// assert_ne!(a, b);
/// ```
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// The identity a kernel process stamps onto every message it emits.
///
/// A `Session` is minted once at startup and shared read-only by every
/// channel task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Unique per kernel process.
    pub id: String,
    /// Username written into outgoing headers.
    pub username: String,
}

impl Session {
    /// Creates a session with a freshly generated id.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            username: username.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_id_is_hyphenated_uuid() {
        let id = new_id();

        assert_eq!(id.len(), 36);
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn test_new_id_does_not_repeat() {
        // Arrange / Act
        let ids: HashSet<String> = (0..1000).map(|_| new_id()).collect();

        // Assert
        assert_eq!(ids.len(), 1000, "every generated id must be unique");
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        let a = Session::new("kernel");
        let b = Session::new("kernel");

        assert_ne!(a.id, b.id);
        assert_eq!(a.username, "kernel");
    }
}
