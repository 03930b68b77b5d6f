//! Host rooms and switching for Tandem.
//!
//! This crate decides which instance is host and moves guests on and off
//! it:
//!
//! - [`SwitchState`]: `None → Host | Switching → Switched → None`
//! - [`PlatformSession`]: the platform primitives (become host, switch to,
//!   switch back), with [`MockPlatform`] standing in for tests
//! - [`HostRoom`]: an active hosting session and its switch token cache
//! - [`SwitchCoordinator`]: begin-host, switch-to, and the two-phase
//!   kick/end handshake fanned out over guests
//!
//! # How it fits in the stack
//!
//! ```text
//! Match orchestrator (above)  ← decides when to host, switch, or end
//!     ↕
//! Switch layer (this crate)   ← runs the handshakes
//!     ↕
//! Seat layer + call engine    ← who is connected; reliable messages
//! ```

mod config;
mod coordinator;
mod error;
mod host_room;
mod mock;
mod platform;

pub use config::{SwitchConfig, SwitchState};
pub use coordinator::{ActiveSwitch, EndResult, SeatEndOutcome, SwitchCoordinator};
pub use error::{PlatformError, SwitchError, SwitchToError};
pub use host_room::HostRoom;
pub use mock::{MockPlatform, PlatformCall};
pub use platform::{EndTarget, HostHandle, PlatformResponse, PlatformSession};
