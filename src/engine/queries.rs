use crate::limits::*;
use crate::model::*;

use super::conflict::{self, validate_span};
use super::windows;
use super::{Engine, EngineError};

impl Engine {
    /// Reservations on a venue, sorted by start ascending. `window` narrows
    /// the result to reservations overlapping it. Cancelled reservations are
    /// included — callers see the status.
    pub async fn list_reservations(
        &self,
        venue: &str,
        window: Option<Span>,
    ) -> Result<Vec<ReservationInfo>, EngineError> {
        if let Some(w) = &window {
            validate_query_window(w)?;
        }
        let vs = match self.get_venue(venue) {
            Some(vs) => vs,
            None => return Ok(vec![]),
        };
        let guard = vs.read().await;
        let infos = match window {
            Some(w) => guard
                .overlapping(&w)
                .map(|r| ReservationInfo::from_reservation(venue, r))
                .collect(),
            None => guard
                .reservations
                .iter()
                .map(|r| ReservationInfo::from_reservation(venue, r))
                .collect(),
        };
        Ok(infos)
    }

    /// Read-only conflict probe: the complete set of non-cancelled
    /// reservations a proposal for `span` would clash with. Admits nothing.
    pub async fn find_conflicts(
        &self,
        venue: &str,
        span: Span,
    ) -> Result<Vec<ConflictEntry>, EngineError> {
        validate_span(&span)?;
        validate_query_window(&span)?;
        let vs = match self.get_venue(venue) {
            Some(vs) => vs,
            None => return Ok(vec![]),
        };
        let guard = vs.read().await;
        Ok(conflict::find_conflicts(&guard, &span))
    }

    /// Free gaps on a venue within `window`. A venue with no reservations
    /// (including one never booked) is free for the whole window.
    pub async fn free_windows(
        &self,
        venue: &str,
        window: Span,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        validate_span(&window)?;
        validate_query_window(&window)?;
        let mut free = match self.get_venue(venue) {
            Some(vs) => {
                let guard = vs.read().await;
                windows::free_windows(&guard, &window)
            }
            None => vec![window],
        };

        if let Some(min_dur) = min_duration_ms {
            free.retain(|span| span.duration_ms() >= min_dur);
        }

        Ok(free)
    }
}

fn validate_query_window(window: &Span) -> Result<(), EngineError> {
    if window.end - window.start > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}
