// Error taxonomy for the Kangaroo x2 controller
//
// Two layers: the controller's own status codes (ControllerErrorKind) and
// everything that can go wrong between us and the controller (KangarooError).

use std::fmt;

/// Name reported for a channel whose last query succeeded
pub const NO_ERROR_NAME: &str = "KANGAROO_NO_ERROR";

/// Fault kinds a channel can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerErrorKind {
    NotStarted,
    NotHomed,
    ControlError,
    WrongMode,
    SerialTimeout,
    TimedOut,
    Unknown,
}

impl ControllerErrorKind {
    /// Map a controller error code (the digit after `E` in a reply)
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::NotStarted,
            2 => Self::NotHomed,
            3 => Self::ControlError,
            4 => Self::WrongMode,
            6 => Self::SerialTimeout,
            // 5 is "unrecognized code", which we have no use for
            _ => Self::Unknown,
        }
    }

    /// Stable name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            Self::NotStarted => "KANGAROO_NOT_STARTED",
            Self::NotHomed => "KANGAROO_NOT_HOMED",
            Self::ControlError => "KANGAROO_CONTROL_ERROR",
            Self::WrongMode => "KANGAROO_WRONG_MODE",
            Self::SerialTimeout => "KANGAROO_SERIAL_TIMEOUT",
            Self::TimedOut => "KANGAROO_TIMED_OUT",
            Self::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ControllerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error types for Kangaroo communication
#[derive(Debug, thiserror::Error)]
pub enum KangarooError {
    #[error("Channel {channel} reported {kind}")]
    Controller {
        channel: char,
        kind: ControllerErrorKind,
    },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for reply from channel {channel}")]
    Timeout { channel: char },

    #[error("Invalid reply from channel {channel}: {reason}")]
    InvalidReply { channel: char, reason: String },

    #[error("Reply addressed to channel {got}, expected {expected}")]
    ChannelMismatch { expected: char, got: char },
}

impl KangarooError {
    /// Collapse any failure into the controller taxonomy
    pub fn kind(&self) -> ControllerErrorKind {
        match self {
            Self::Controller { kind, .. } => *kind,
            Self::Timeout { .. } => ControllerErrorKind::TimedOut,
            Self::Serial(_)
            | Self::Io(_)
            | Self::InvalidReply { .. }
            | Self::ChannelMismatch { .. } => ControllerErrorKind::Unknown,
        }
    }
}

/// Outcome of a single channel operation
pub type ChannelResult<T> = std::result::Result<T, KangarooError>;

/// Diagnostic name for the outcome of a channel operation
pub fn outcome_name<T>(result: &ChannelResult<T>) -> &'static str {
    match result {
        Ok(_) => NO_ERROR_NAME,
        Err(e) => e.kind().name(),
    }
}
