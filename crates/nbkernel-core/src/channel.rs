//! The five logical channels a kernel serves.

use std::fmt;

/// One of the kernel's communication paths, each bound to its own port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Request/reply for execution and introspection.
    Shell,
    /// Out-of-band request/reply (interrupt, shutdown).
    Control,
    /// Kernel-initiated input requests.
    Stdin,
    /// Broadcast of status and output.
    IoPub,
    /// Raw echo for liveness checks.
    Heartbeat,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Shell,
        Channel::Control,
        Channel::Stdin,
        Channel::IoPub,
        Channel::Heartbeat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Shell => "shell",
            Channel::Control => "control",
            Channel::Stdin => "stdin",
            Channel::IoPub => "iopub",
            Channel::Heartbeat => "hb",
        }
    }

    /// Whether replies on this channel are routed back by identity frames.
    pub fn is_routed(self) -> bool {
        matches!(self, Channel::Shell | Channel::Control | Channel::Stdin)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
