use std::fmt;

use thiserror::Error;

/// Finer-grained classification of a network failure, mirrored from the
/// download primitive's status classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    DnsFail,
    Refused,
    Timeout,
    UnknownScheme,
    Disconnect,
    Http(u16),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsFail => write!(f, "DNS resolution failed"),
            Self::Refused => write!(f, "connection refused"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::UnknownScheme => write!(f, "unknown URL scheme"),
            Self::Disconnect => write!(f, "connection dropped during transfer"),
            Self::Http(code) => write!(f, "HTTP status {}", code),
        }
    }
}

/// Integrity failures detected while verifying a downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    CrcMismatch { expected: u32, actual: u32 },
    ZeroByte,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CrcMismatch { expected, actual } => write!(
                f,
                "CRC32 mismatch: expected {:#010x}, got {:#010x}",
                expected, actual
            ),
            Self::ZeroByte => write!(f, "0-byte response"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl Error {
    pub fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound(path.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// True for errors that should disable a mirror and trigger round-robin
    /// fallback, per the mirror pool's error propagation policy.
    pub fn disables_mirror(&self) -> bool {
        matches!(
            self,
            Error::Net(_) | Error::Integrity(_) | Error::ResourceExhausted(_) | Error::Cancelled
        )
    }
}
