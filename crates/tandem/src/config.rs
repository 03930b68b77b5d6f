//! Aggregate configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tandem_call::CallConfig;
use tandem_room::SwitchConfig;
use tandem_seat::SeatConfig;
use tandem_tick::TickConfig;
use tracing::warn;

use crate::TandemError;

/// Configuration for one [`Tandem`](crate::Tandem) instance.
///
/// Every field has a default, so a config document only needs to name
/// what it changes:
///
/// ```
/// let config = tandem::TandemConfig::from_json(r#"{ "seat": { "capacity": 2 } }"#).unwrap();
/// assert_eq!(config.seat.capacity, 2);
/// assert_eq!(config.tick.tick_rate_hz, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    pub seat: SeatConfig,
    pub tick: TickConfig,
    pub call: CallConfig,
    pub switch: SwitchConfig,
    /// Bound on identity resolution and on waiting for the backend to form
    /// a group. Default: 60s.
    pub match_timeout: Duration,
    /// Buffered events per subscriber before it starts lagging. Default: 256.
    pub event_capacity: usize,
}

impl Default for TandemConfig {
    fn default() -> Self {
        Self {
            seat: SeatConfig::default(),
            tick: TickConfig::default(),
            call: CallConfig::default(),
            switch: SwitchConfig::default(),
            match_timeout: Duration::from_secs(60),
            event_capacity: 256,
        }
    }
}

impl TandemConfig {
    /// Parses a JSON config document. Values are not clamped until
    /// [`validated`](Self::validated).
    ///
    /// # Errors
    /// [`TandemError::Config`] if the document is not valid JSON or a field
    /// has the wrong shape.
    pub fn from_json(json: &str) -> Result<Self, TandemError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Clamps every layer's values into range, logging what changed.
    pub fn validated(mut self) -> Self {
        self.seat = self.seat.validated();
        self.tick = self.tick.validated();
        if self.event_capacity == 0 {
            warn!("event capacity of 0, using 1");
            self.event_capacity = 1;
        }
        if self.call.timeout.is_zero() {
            let fallback = CallConfig::default().timeout;
            warn!(
                fallback_ms = fallback.as_millis() as u64,
                "call timeout of 0 would expire every call, using default"
            );
            self.call.timeout = fallback;
        }
        self
    }
}
