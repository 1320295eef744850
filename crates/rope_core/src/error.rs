//! Error types for rope setup, lookups and persistence.
//!
//! The numerical core never fails. Errors only come from the boundary:
//! unknown segment models at spawn, bad segment references from callers,
//! and save files that cannot be read back.

use std::fmt;

/// Errors raised while building or addressing a rope.
#[derive(Debug, Clone, PartialEq)]
pub enum RopeError {
    /// A segment model name has no registered body length
    UnknownModel(String),
    /// Gravity must be finite and non-zero to orient the rope at spawn
    InvalidGravity,
    /// Segment index outside `[0, count)`
    SegmentOutOfRange { index: usize, count: usize },
    /// A snapshot whose buffers disagree with its declared counts
    InvalidSnapshot(String),
}

impl fmt::Display for RopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RopeError::UnknownModel(name) => write!(f, "Unknown segment model: {}", name),
            RopeError::InvalidGravity => write!(f, "Gravity must be finite and non-zero"),
            RopeError::SegmentOutOfRange { index, count } => {
                write!(f, "Segment {} out of range (rope has {} segments)", index, count)
            }
            RopeError::InvalidSnapshot(msg) => write!(f, "Invalid rope snapshot: {}", msg),
        }
    }
}

impl std::error::Error for RopeError {}

/// Result type for rope operations.
pub type RopeResult<T> = Result<T, RopeError>;

/// Errors that can occur while saving or loading ropes and rope configs.
#[derive(Debug)]
pub enum RopeIoError {
    /// File system error
    Io(std::io::Error),
    /// Binary serialization error
    Bincode(bincode::Error),
    /// JSON serialization error
    Json(String),
    /// Invalid file format
    InvalidFormat(String),
    /// Unsupported version
    UnsupportedVersion(u32),
    /// The file parsed but does not describe a valid rope
    Rope(RopeError),
}

impl fmt::Display for RopeIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RopeIoError::Io(e) => write!(f, "IO error: {}", e),
            RopeIoError::Bincode(e) => write!(f, "Bincode error: {}", e),
            RopeIoError::Json(e) => write!(f, "JSON error: {}", e),
            RopeIoError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            RopeIoError::UnsupportedVersion(v) => write!(f, "Unsupported version: {}", v),
            RopeIoError::Rope(e) => write!(f, "Rope error: {}", e),
        }
    }
}

impl std::error::Error for RopeIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RopeIoError::Io(e) => Some(e),
            RopeIoError::Bincode(e) => Some(e),
            RopeIoError::Rope(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RopeIoError {
    fn from(e: std::io::Error) -> Self {
        RopeIoError::Io(e)
    }
}

impl From<bincode::Error> for RopeIoError {
    fn from(e: bincode::Error) -> Self {
        RopeIoError::Bincode(e)
    }
}

impl From<serde_json::Error> for RopeIoError {
    fn from(e: serde_json::Error) -> Self {
        RopeIoError::Json(e.to_string())
    }
}

impl From<RopeError> for RopeIoError {
    fn from(e: RopeError) -> Self {
        RopeIoError::Rope(e)
    }
}

/// Result type for rope I/O operations.
pub type RopeIoResult<T> = Result<T, RopeIoError>;
