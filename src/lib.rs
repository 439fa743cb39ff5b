//! aula — a venue reservation engine speaking the Postgres wire protocol.
//!
//! Reservations are half-open time spans on named venues. Admission is
//! conflict-checked under a per-venue lock and made durable through a
//! write-ahead log before it becomes visible.

pub mod auth;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod sql;
pub mod tenant;
pub mod tls;
pub mod wal;
pub mod wire;
