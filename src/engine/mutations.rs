use std::collections::HashMap;

use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_proposal, validate_span};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Propose a reservation: validate, conflict-check, and admit atomically.
    ///
    /// The venue's write lock is held across the conflict query, the WAL
    /// append, and the index apply, so two racing proposals on one venue
    /// serialize: exactly one admits, the loser observes the winner in its
    /// conflict set. Nothing is persisted on any failure path.
    pub async fn propose_reservation(
        &self,
        id: Ulid,
        venue: &str,
        span: Span,
        owner: &str,
        metadata: HashMap<String, String>,
        idempotency_key: Option<String>,
    ) -> Result<ReservationInfo, EngineError> {
        validate_span(&span)?;
        validate_proposal(venue, owner, &metadata, idempotency_key.as_deref())?;
        if !self.venues.contains_key(venue) && self.venues.len() >= MAX_VENUES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many venues"));
        }

        let vs = self.get_or_create_venue(venue);
        let mut guard = vs.write().await;

        // Retried proposal: a known key returns the original admission
        // instead of double-booking or conflicting with itself.
        if let Some(key) = &idempotency_key
            && let Some(prev) = self.idempotency.get(key).map(|e| *e.value())
            && let Some(existing) = guard.get(prev) {
                return Ok(ReservationInfo::from_reservation(venue, existing));
            }

        if self.reservation_to_venue.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many reservations on venue"));
        }

        check_no_conflict(&guard, &span)?;

        let event = Event::ReservationAdmitted {
            id,
            venue: venue.to_string(),
            span,
            owner: owner.to_string(),
            metadata,
            idempotency_key,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        let admitted = guard
            .get(id)
            .expect("admitted reservation present under write guard");
        Ok(ReservationInfo::from_reservation(venue, admitted))
    }

    /// Cancel a reservation. Idempotent: cancelling an already-cancelled
    /// reservation is a no-op success. Unknown ids are `NotFound`.
    /// Returns the venue the reservation was on.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<String, EngineError> {
        let (venue, mut guard) = self.resolve_reservation_write(&id).await?;
        let status = guard.get(id).ok_or(EngineError::NotFound(id))?.status;
        if status == ReservationStatus::Cancelled {
            return Ok(venue);
        }

        let event = Event::ReservationCancelled {
            id,
            venue: venue.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(venue)
    }

    /// Time-driven transition `Scheduled -> Ongoing`. No-op for any other
    /// current status (the sweep may race with a cancellation).
    pub async fn mark_started(&self, id: Ulid) -> Result<(), EngineError> {
        let (venue, mut guard) = self.resolve_reservation_write(&id).await?;
        let status = guard.get(id).ok_or(EngineError::NotFound(id))?.status;
        if status != ReservationStatus::Scheduled {
            return Ok(());
        }

        let event = Event::ReservationStarted { id, venue };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Time-driven transition to `Completed`, from either `Scheduled` (a
    /// sweep that missed the whole window) or `Ongoing`. No-op otherwise:
    /// `Cancelled` and `Completed` are terminal.
    pub async fn mark_completed(&self, id: Ulid) -> Result<(), EngineError> {
        let (venue, mut guard) = self.resolve_reservation_write(&id).await?;
        let status = guard.get(id).ok_or(EngineError::NotFound(id))?.status;
        if !matches!(
            status,
            ReservationStatus::Scheduled | ReservationStatus::Ongoing
        ) {
            return Ok(());
        }

        let event = Event::ReservationCompleted { id, venue };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Drop a terminal (cancelled/completed) reservation from the venue
    /// entirely. Skips anything still live.
    pub async fn purge_reservation(&self, id: Ulid) -> Result<(), EngineError> {
        let (venue, mut guard) = self.resolve_reservation_write(&id).await?;
        let status = guard.get(id).ok_or(EngineError::NotFound(id))?.status;
        if !matches!(
            status,
            ReservationStatus::Cancelled | ReservationStatus::Completed
        ) {
            return Ok(());
        }

        let event = Event::ReservationPurged { id, venue };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Reservations whose status lags the clock: scheduled ones whose span
    /// has started (or fully passed), and ongoing ones whose span has ended.
    pub fn collect_due_rollovers(&self, now: Ms) -> Vec<(Ulid, ReservationStatus)> {
        let mut due = Vec::new();
        for entry in self.venues.iter() {
            let vs = entry.value().clone();
            if let Ok(guard) = vs.try_read() {
                for r in &guard.reservations {
                    match r.status {
                        ReservationStatus::Scheduled if now >= r.span.end => {
                            due.push((r.id, ReservationStatus::Completed));
                        }
                        ReservationStatus::Scheduled if r.span.contains_instant(now) => {
                            due.push((r.id, ReservationStatus::Ongoing));
                        }
                        ReservationStatus::Ongoing if now >= r.span.end => {
                            due.push((r.id, ReservationStatus::Completed));
                        }
                        _ => {}
                    }
                }
            }
        }
        due
    }

    /// Terminal reservations old enough to purge: span ended at least
    /// `retention_ms` ago.
    pub fn collect_expired_retention(&self, now: Ms, retention_ms: Ms) -> Vec<Ulid> {
        let mut expired = Vec::new();
        for entry in self.venues.iter() {
            let vs = entry.value().clone();
            if let Ok(guard) = vs.try_read() {
                for r in &guard.reservations {
                    if matches!(
                        r.status,
                        ReservationStatus::Cancelled | ReservationStatus::Completed
                    ) && r.span.end.saturating_add(retention_ms) <= now
                    {
                        expired.push(r.id);
                    }
                }
            }
        }
        expired
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state: one admission per live reservation plus a status
    /// patch where the lifecycle has moved on.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for entry in self.venues.iter() {
            let vs = entry.value().clone();
            let guard = vs.try_read().expect("compact: uncontended read");

            for r in &guard.reservations {
                let key = self
                    .idempotency
                    .iter()
                    .find(|e| *e.value() == r.id)
                    .map(|e| e.key().clone());
                events.push(Event::ReservationAdmitted {
                    id: r.id,
                    venue: guard.name.clone(),
                    span: r.span,
                    owner: r.owner.clone(),
                    metadata: r.metadata.clone(),
                    idempotency_key: key,
                });
                match r.status {
                    ReservationStatus::Scheduled => {}
                    ReservationStatus::Ongoing => events.push(Event::ReservationStarted {
                        id: r.id,
                        venue: guard.name.clone(),
                    }),
                    ReservationStatus::Completed => events.push(Event::ReservationCompleted {
                        id: r.id,
                        venue: guard.name.clone(),
                    }),
                    ReservationStatus::Cancelled => events.push(Event::ReservationCancelled {
                        id: r.id,
                        venue: guard.name.clone(),
                    }),
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
