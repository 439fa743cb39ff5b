use ulid::Ulid;

use crate::model::ConflictEntry;

#[derive(Debug)]
pub enum EngineError {
    /// Span is empty or inverted (start >= end). Rejected before any state access.
    InvalidSpan,
    /// Structurally bad proposal (empty venue, empty owner).
    InvalidRequest(&'static str),
    /// One or more overlapping reservations exist. Carries the complete
    /// conflict set, never just the first match.
    Conflict(Vec<ConflictEntry>),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidSpan => write!(f, "invalid span: start must be before end"),
            EngineError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            EngineError::Conflict(entries) => {
                write!(f, "conflict with {} reservation(s):", entries.len())?;
                for e in entries {
                    match &e.excerpt {
                        Some(title) => {
                            write!(f, " {} '{}' [{}, {});", e.id, title, e.start, e.end)?
                        }
                        None => write!(f, " {} [{}, {});", e.id, e.start, e.end)?,
                    }
                }
                Ok(())
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
