use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Strict half-open overlap: spans that exactly abut do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Lifecycle of a reservation. `Scheduled -> Ongoing -> Completed` is
/// time-driven (the sweeper); `Cancelled` is explicit and terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    /// Whether the reservation still counts toward venue conflicts.
    pub fn occupies(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Scheduled => "scheduled",
            ReservationStatus::Ongoing => "ongoing",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

/// A reservation on one venue. `metadata` is an uninterpreted bag; the
/// `"title"` key, when present, is used as the excerpt in conflict reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub span: Span,
    pub owner: String,
    pub status: ReservationStatus,
    pub metadata: HashMap<String, String>,
}

impl Reservation {
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").map(String::as_str)
    }
}

/// All reservations on one venue, sorted by `span.start`.
///
/// Cancelled reservations stay in the list (they remain visible to list
/// queries and make re-cancellation a no-op) but are skipped by every
/// conflict and free-window computation.
#[derive(Debug, Clone)]
pub struct VenueState {
    pub name: String,
    pub reservations: Vec<Reservation>,
}

impl VenueState {
    pub fn new(name: String) -> Self {
        Self {
            name,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    /// Remove a reservation by id.
    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        if let Some(pos) = self.reservations.iter().position(|r| r.id == id) {
            Some(self.reservations.remove(pos))
        } else {
            None
        }
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Return only reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationAdmitted {
        id: Ulid,
        venue: String,
        span: Span,
        owner: String,
        metadata: HashMap<String, String>,
        idempotency_key: Option<String>,
    },
    ReservationStarted {
        id: Ulid,
        venue: String,
    },
    ReservationCompleted {
        id: Ulid,
        venue: String,
    },
    ReservationCancelled {
        id: Ulid,
        venue: String,
    },
    ReservationPurged {
        id: Ulid,
        venue: String,
    },
}

impl Event {
    pub fn venue(&self) -> &str {
        match self {
            Event::ReservationAdmitted { venue, .. }
            | Event::ReservationStarted { venue, .. }
            | Event::ReservationCompleted { venue, .. }
            | Event::ReservationCancelled { venue, .. }
            | Event::ReservationPurged { venue, .. } => venue,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub venue: String,
    pub start: Ms,
    pub end: Ms,
    pub owner: String,
    pub status: ReservationStatus,
    pub title: Option<String>,
}

impl ReservationInfo {
    pub fn from_reservation(venue: &str, r: &Reservation) -> Self {
        Self {
            id: r.id,
            venue: venue.to_string(),
            start: r.span.start,
            end: r.span.end,
            owner: r.owner.clone(),
            status: r.status,
            title: r.title().map(str::to_string),
        }
    }
}

/// One member of a rejection's conflict set: enough detail for the caller
/// to name the clash (id, title excerpt, original span).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub id: Ulid,
    pub excerpt: Option<String>,
    pub start: Ms,
    pub end: Ms,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(start: Ms, end: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            span: Span::new(start, end),
            owner: "registrar".into(),
            status: ReservationStatus::Scheduled,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn identical_spans_overlap() {
        let a = Span::new(100, 200);
        assert!(a.overlaps(&a));
    }

    #[test]
    fn status_occupies() {
        assert!(ReservationStatus::Scheduled.occupies());
        assert!(ReservationStatus::Ongoing.occupies());
        assert!(ReservationStatus::Completed.occupies());
        assert!(!ReservationStatus::Cancelled.occupies());
    }

    #[test]
    fn reservation_ordering() {
        let mut vs = VenueState::new("Main Hall".into());
        vs.insert_reservation(reservation(300, 400));
        vs.insert_reservation(reservation(100, 200));
        vs.insert_reservation(reservation(200, 300));
        assert_eq!(vs.reservations[0].span.start, 100);
        assert_eq!(vs.reservations[1].span.start, 200);
        assert_eq!(vs.reservations[2].span.start, 300);
    }

    #[test]
    fn reservation_remove() {
        let mut vs = VenueState::new("Main Hall".into());
        let r = reservation(100, 200);
        let id = r.id;
        vs.insert_reservation(r);
        assert_eq!(vs.reservations.len(), 1);
        vs.remove_reservation(id);
        assert!(vs.reservations.is_empty());
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut vs = VenueState::new("Main Hall".into());
        vs.insert_reservation(reservation(100, 200));
        assert!(vs.remove_reservation(Ulid::new()).is_none());
        assert_eq!(vs.reservations.len(), 1); // original still there
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut vs = VenueState::new("Main Hall".into());
        let rs: Vec<Reservation> = (0..3)
            .map(|i| reservation((i as Ms) * 100, (i as Ms) * 100 + 50))
            .collect();
        let ids: Vec<Ulid> = rs.iter().map(|r| r.id).collect();
        for r in rs {
            vs.insert_reservation(r);
        }
        vs.remove_reservation(ids[1]); // remove middle
        assert_eq!(vs.reservations.len(), 2);
        assert_eq!(vs.reservations[0].id, ids[0]);
        assert_eq!(vs.reservations[1].id, ids[2]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut vs = VenueState::new("Main Hall".into());
        vs.insert_reservation(reservation(100, 200)); // past
        vs.insert_reservation(reservation(450, 600)); // overlapping
        vs.insert_reservation(reservation(1000, 1100)); // starts after query end

        let query = Span::new(500, 800);
        let hits: Vec<_> = vs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // Reservation ending exactly at query.start is NOT overlapping (half-open)
        let mut vs = VenueState::new("Main Hall".into());
        vs.insert_reservation(reservation(100, 200));
        let query = Span::new(200, 300);
        assert!(vs.overlapping(&query).next().is_none());
    }

    #[test]
    fn overlapping_empty_venue() {
        let vs = VenueState::new("Main Hall".into());
        let query = Span::new(0, 1000);
        assert!(vs.overlapping(&query).next().is_none());
    }

    #[test]
    fn overlapping_single_ms_overlap() {
        // Reservation [100, 201) overlaps query [200, 300) by exactly 1ms
        let mut vs = VenueState::new("Main Hall".into());
        vs.insert_reservation(reservation(100, 201));
        let query = Span::new(200, 300);
        assert_eq!(vs.overlapping(&query).count(), 1);
    }

    #[test]
    fn overlapping_large_reservation_spanning_query() {
        let mut vs = VenueState::new("Main Hall".into());
        vs.insert_reservation(reservation(0, 10000));
        let query = Span::new(500, 600);
        assert_eq!(vs.overlapping(&query).count(), 1);
    }

    #[test]
    fn title_reads_metadata() {
        let mut r = reservation(0, 100);
        assert_eq!(r.title(), None);
        r.metadata.insert("title".into(), "Seminar".into());
        assert_eq!(r.title(), Some("Seminar"));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let mut metadata = HashMap::new();
        metadata.insert("title".to_string(), "Orientation".to_string());
        let event = Event::ReservationAdmitted {
            id: Ulid::new(),
            venue: "Auditorium".into(),
            span: Span::new(1000, 2000),
            owner: "dean".into(),
            metadata,
            idempotency_key: Some("req-1".into()),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
