mod conflict;
mod error;
mod mutations;
mod queries;
mod windows;

pub use error::EngineError;
pub use windows::{free_windows, merge_overlapping, subtract_intervals};

pub(crate) use conflict::now_ms;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedVenueState = Arc<RwLock<VenueState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub venues: DashMap<String, SharedVenueState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → venue name
    pub(super) reservation_to_venue: DashMap<Ulid, String>,
    /// Client-supplied idempotency key → admitted reservation id
    pub(super) idempotency: DashMap<String, Ulid>,
}

/// Apply an event directly to a VenueState (no locking — caller holds the lock).
fn apply_to_venue(
    vs: &mut VenueState,
    event: &Event,
    reservation_map: &DashMap<Ulid, String>,
    idempotency_map: &DashMap<String, Ulid>,
) {
    match event {
        Event::ReservationAdmitted {
            id,
            venue,
            span,
            owner,
            metadata,
            idempotency_key,
        } => {
            vs.insert_reservation(Reservation {
                id: *id,
                span: *span,
                owner: owner.clone(),
                status: ReservationStatus::Scheduled,
                metadata: metadata.clone(),
            });
            reservation_map.insert(*id, venue.clone());
            if let Some(key) = idempotency_key {
                idempotency_map.insert(key.clone(), *id);
            }
        }
        Event::ReservationStarted { id, .. } => {
            if let Some(r) = vs.get_mut(*id) {
                r.status = ReservationStatus::Ongoing;
            }
        }
        Event::ReservationCompleted { id, .. } => {
            if let Some(r) = vs.get_mut(*id) {
                r.status = ReservationStatus::Completed;
            }
        }
        Event::ReservationCancelled { id, .. } => {
            if let Some(r) = vs.get_mut(*id) {
                r.status = ReservationStatus::Cancelled;
            }
        }
        Event::ReservationPurged { id, .. } => {
            if let Some(r) = vs.remove_reservation(*id) {
                // Drop the retry-dedup entry with the record it pointed at.
                // Resolve the key first so no map guard is held across remove.
                let key = idempotency_map
                    .iter()
                    .find(|e| *e.value() == r.id)
                    .map(|e| e.key().clone());
                if let Some(key) = key {
                    idempotency_map.remove(&key);
                }
            }
            reservation_map.remove(id);
        }
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            venues: DashMap::new(),
            wal_tx,
            notify,
            reservation_to_venue: DashMap::new(),
            idempotency: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy tenant creation).
        for event in &events {
            let venue = event.venue().to_string();
            let vs_arc = engine
                .venues
                .entry(venue.clone())
                .or_insert_with(|| Arc::new(RwLock::new(VenueState::new(venue))))
                .clone();
            let mut guard = vs_arc.try_write().expect("replay: uncontended write");
            apply_to_venue(
                &mut guard,
                event,
                &engine.reservation_to_venue,
                &engine.idempotency,
            );
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_venue(&self, name: &str) -> Option<SharedVenueState> {
        self.venues.get(name).map(|e| e.value().clone())
    }

    pub(super) fn get_or_create_venue(&self, name: &str) -> SharedVenueState {
        self.venues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(VenueState::new(name.to_string()))))
            .clone()
    }

    pub fn get_venue_for_reservation(&self, id: &Ulid) -> Option<String> {
        self.reservation_to_venue.get(id).map(|e| e.value().clone())
    }

    /// WAL-append + apply + notify in one call, under the caller's write guard.
    /// The notify send happens strictly after the event is durable and applied.
    pub(super) async fn persist_and_apply(
        &self,
        vs: &mut VenueState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_venue(vs, event, &self.reservation_to_venue, &self.idempotency);
        self.notify.send(event.venue(), event);
        Ok(())
    }

    /// Lookup reservation → venue, get venue state, acquire write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: &Ulid,
    ) -> Result<(String, tokio::sync::OwnedRwLockWriteGuard<VenueState>), EngineError> {
        let venue = self
            .get_venue_for_reservation(id)
            .ok_or(EngineError::NotFound(*id))?;
        let vs = self
            .get_venue(&venue)
            .ok_or(EngineError::NotFound(*id))?;
        let guard = vs.write_owned().await;
        Ok((venue, guard))
    }
}
