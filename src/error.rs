//! Engine error type.
//!
//! Mirrors the hand-rolled error style used throughout this codebase: a plain
//! enum with a manual `Display` impl rather than a derive-macro crate, since
//! the set of variants is small and stable.

/// Errors the interpolation engine itself can raise.
///
/// Per-metric failures (absent metric, unsupported type for interpolation)
/// are *not* represented here — they are encoded directly in a
/// [`crate::interp::FetchResult`]'s `numval` field, since they don't abort
/// the fetch.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Requested time is outside the archive (chain)'s coverage.
    Eol,
    /// A record or encoding-consistency violation was found while scanning.
    LogRecCorrupt(String),
    /// I/O failure surfaced by the archive reader.
    Io(String),
    /// `set_instance_profile` was called with an indom the archive doesn't have.
    UnknownIndom(u32),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Eol => write!(f, "end of log"),
            EngineError::LogRecCorrupt(msg) => write!(f, "corrupt archive record: {}", msg),
            EngineError::Io(msg) => write!(f, "I/O error: {}", msg),
            EngineError::UnknownIndom(id) => write!(f, "unknown instance domain: {}", id),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
