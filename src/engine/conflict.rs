use std::collections::HashMap;

use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.start >= span.end {
        return Err(EngineError::InvalidSpan);
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

pub(crate) fn validate_proposal(
    venue: &str,
    owner: &str,
    metadata: &HashMap<String, String>,
    idempotency_key: Option<&str>,
) -> Result<(), EngineError> {
    use crate::limits::*;
    if venue.is_empty() {
        return Err(EngineError::InvalidRequest("empty venue"));
    }
    if owner.is_empty() {
        return Err(EngineError::InvalidRequest("empty owner"));
    }
    if venue.len() > MAX_VENUE_NAME_LEN {
        return Err(EngineError::LimitExceeded("venue name too long"));
    }
    if owner.len() > MAX_OWNER_LEN {
        return Err(EngineError::LimitExceeded("owner too long"));
    }
    if metadata.len() > MAX_METADATA_ENTRIES {
        return Err(EngineError::LimitExceeded("too many metadata entries"));
    }
    for (k, v) in metadata {
        if k.len() > MAX_METADATA_KEY_LEN {
            return Err(EngineError::LimitExceeded("metadata key too long"));
        }
        if v.len() > MAX_METADATA_VALUE_LEN {
            return Err(EngineError::LimitExceeded("metadata value too long"));
        }
    }
    if let Some(key) = idempotency_key
        && key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(EngineError::LimitExceeded("idempotency key too long"));
        }
    Ok(())
}

/// Collect the COMPLETE set of non-cancelled reservations overlapping `span`.
/// An empty result is the expected "no conflict" answer, not an error.
pub(crate) fn find_conflicts(vs: &VenueState, span: &Span) -> Vec<ConflictEntry> {
    vs.overlapping(span)
        .filter(|r| r.status.occupies())
        .map(|r| ConflictEntry {
            id: r.id,
            excerpt: r.title().map(str::to_string),
            start: r.span.start,
            end: r.span.end,
        })
        .collect()
}

/// Conflict check as a pass/fail admission gate.
pub(crate) fn check_no_conflict(vs: &VenueState, span: &Span) -> Result<(), EngineError> {
    let conflicts = find_conflicts(vs, span);
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Conflict(conflicts))
    }
}
