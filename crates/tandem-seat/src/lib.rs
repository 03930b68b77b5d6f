//! Seats and connections for Tandem.
//!
//! This crate owns the answer to "who is sitting in seat X":
//!
//! 1. **Seats** ([`Seat`], [`Connection`], [`ConnectionState`]): a fixed
//!    number of numbered slots, seat 0 being the host's own
//! 2. **Reconciliation** ([`SeatRegistry`]): turns raw, possibly
//!    out-of-order join/exit notifications into an ordered
//!    [`SeatEvent`] stream with at most one occupant per seat
//! 3. **Async access** ([`SharedSeats`]): the registry behind a lock, with
//!    a broadcast of its events and waits for seats to fill or empty
//!
//! # How it fits in the stack
//!
//! ```text
//! Room layer (above)       ← kicks and ends guests it finds here
//!     ↕
//! Seat layer (this crate)  ← reconciles transport presence into seats
//!     ↕
//! Transport layer (below)  ← delivers join/exit notifications
//! ```

mod error;
mod registry;
mod seat;
mod shared;

pub use error::SeatError;
pub use registry::{SeatEvent, SeatRegistry, UnbindReason};
pub use seat::{Connection, ConnectionState, Seat, SeatConfig};
pub use shared::SharedSeats;
