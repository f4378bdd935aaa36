//! Universal outcome codes for every read/write in the system
//!
//! Every collaborator (socket, file, memory pipe, protocol stream) maps
//! its native error model onto this set.

use core::fmt;

/// Outcome of a single read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Bytes moved (possibly zero for an empty request)
    Ok,
    /// Nothing available right now; wait for the next readiness event
    Wait,
    /// Orderly end of input (peer finished)
    End,
    /// Orderly close requested by the application or a stream
    Close,
    /// Hard failure (reset, broken pipe, OS error)
    Error,
}

impl Condition {
    /// End, Close and Error all tear the descriptor down
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Condition::End | Condition::Close | Condition::Error)
    }

    #[inline]
    pub const fn is_error(&self) -> bool {
        matches!(self, Condition::Error)
    }

    /// Ordering used when several terminal conditions are observed in one
    /// dispatch: the most severe one is reported.
    #[inline]
    pub const fn severity(&self) -> u8 {
        match self {
            Condition::Ok => 0,
            Condition::Wait => 1,
            Condition::End => 2,
            Condition::Close => 3,
            Condition::Error => 4,
        }
    }

    /// The more severe of two conditions
    #[inline]
    pub fn worst(self, other: Condition) -> Condition {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Ok => write!(f, "ok"),
            Condition::Wait => write!(f, "wait"),
            Condition::End => write!(f, "end"),
            Condition::Close => write!(f, "close"),
            Condition::Error => write!(f, "error"),
        }
    }
}
