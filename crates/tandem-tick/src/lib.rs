//! Fixed-rate heartbeat for the Tandem session core.
//!
//! The session core is single-writer and cooperative: once per tick the
//! driver drains the transport hand-off queue, applies seat changes, and
//! advances the reliable call engine. Call timeouts and retries are only
//! evaluated on tick boundaries, so the core can never run without a
//! heartbeat and a configured rate of 0 is clamped to 1 Hz.
//!
//! The scheduler wraps a [`tokio::time::Interval`]; the only thing it adds
//! is bookkeeping about late ticks and slow tick work.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.cancelled() => break,
//!         tick = scheduler.wait_for_tick() => {
//!             core.on_tick(tick.tick);
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

pub const DEFAULT_TICK_RATE_HZ: u32 = 30;
pub const MAX_TICK_RATE_HZ: u32 = 120;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What the heartbeat does after the driver stalled past one or more
/// deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// Missed ticks are dropped and the heartbeat rejoins its original grid.
    #[default]
    Skip,
    /// Missed ticks are dropped and the grid restarts one period from the
    /// late tick.
    Delay,
    /// Missed ticks fire back to back until the heartbeat has caught up.
    Burst,
}

impl From<TickPolicy> for MissedTickBehavior {
    fn from(policy: TickPolicy) -> Self {
        match policy {
            TickPolicy::Skip => MissedTickBehavior::Skip,
            TickPolicy::Delay => MissedTickBehavior::Delay,
            TickPolicy::Burst => MissedTickBehavior::Burst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Heartbeats per second, `1..=MAX_TICK_RATE_HZ`.
    pub tick_rate_hz: u32,
    pub policy: TickPolicy,
    /// Tick work taking more than this share of the period is logged as
    /// slow.
    pub slow_tick_ratio: f64,
    /// Upper bound, in microseconds, of a random delay before the first
    /// tick. Keeps instances started together from ticking in lockstep.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            policy: TickPolicy::Skip,
            slow_tick_ratio: 0.8,
            initial_jitter_us: 1_000,
        }
    }
}

impl TickConfig {
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Self::default()
        }
    }

    /// Brings out-of-range values back into range, with a warning for each.
    pub fn validated(mut self) -> Self {
        let rate = self.tick_rate_hz.clamp(1, MAX_TICK_RATE_HZ);
        if rate != self.tick_rate_hz {
            warn!(configured = self.tick_rate_hz, using = rate, "tick rate out of range");
            self.tick_rate_hz = rate;
        }
        if !(self.slow_tick_ratio > 0.0 && self.slow_tick_ratio <= 1.0) {
            warn!(configured = self.slow_tick_ratio, "slow tick ratio out of range, using 1.0");
            self.slow_tick_ratio = 1.0;
        }
        self
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.clamp(1, MAX_TICK_RATE_HZ)
    }

    fn first_tick_jitter(&self) -> Duration {
        if self.initial_jitter_us == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::rng().random_range(0..self.initial_jitter_us))
    }
}

// ---------------------------------------------------------------------------
// Tick reports
// ---------------------------------------------------------------------------

/// One heartbeat, as returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Heartbeat number, starting at 1.
    pub tick: u64,
    /// How long after its deadline the heartbeat fired.
    pub late_by: Duration,
    /// Deadlines dropped because of the stall (`Skip` and `Delay` only).
    pub missed: u64,
}

impl TickInfo {
    /// Fired more than a tenth of a period late.
    pub fn is_late(&self, period: Duration) -> bool {
        self.late_by > period / 10
    }
}

/// Running totals since the scheduler was created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    pub ticks: u64,
    pub late_ticks: u64,
    pub missed: u64,
    pub slow_ticks: u64,
    /// Longest work time reported through `record_tick_end`.
    pub slowest: Duration,
    /// Work time of the last tick as a share of the period.
    pub last_load: f64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The driver's heartbeat. Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct TickScheduler {
    config: TickConfig,
    period: Duration,
    interval: Interval,
    ticks: u64,
    /// Set when a tick fires, taken by `record_tick_end`.
    work_started: Option<Instant>,
    paused: bool,
    stats: TickStats,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.period();
        let first = Instant::now() + period + config.first_tick_jitter();
        let mut interval = tokio::time::interval_at(first, period);
        interval.set_missed_tick_behavior(config.policy.into());

        debug!(
            rate_hz = config.tick_rate_hz,
            period_ms = period.as_secs_f64() * 1000.0,
            policy = ?config.policy,
            "heartbeat created"
        );

        Self {
            config,
            period,
            interval,
            ticks: 0,
            work_started: None,
            paused: false,
            stats: TickStats::default(),
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Waits for the next heartbeat.
    ///
    /// Never resolves while paused, so a surrounding `tokio::select!` keeps
    /// serving its other branches.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        if self.paused {
            std::future::pending::<()>().await;
        }

        let deadline = self.interval.tick().await;
        let now = Instant::now();
        self.ticks += 1;
        self.work_started = Some(now);

        let late_by = now.saturating_duration_since(deadline);
        let missed = match self.config.policy {
            TickPolicy::Burst => 0,
            TickPolicy::Skip | TickPolicy::Delay => {
                (late_by.as_nanos() / self.period.as_nanos().max(1)) as u64
            }
        };
        let info = TickInfo {
            tick: self.ticks,
            late_by,
            missed,
        };

        self.stats.ticks += 1;
        self.stats.missed += missed;
        if info.is_late(self.period) {
            self.stats.late_ticks += 1;
            if missed > 0 {
                warn!(
                    tick = self.ticks,
                    missed,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "driver stalled, heartbeats dropped"
                );
            }
        }
        trace!(tick = self.ticks, "heartbeat");
        info
    }

    /// Marks the work for the current heartbeat as done.
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.work_started.take() else {
            return;
        };
        let worked = started.elapsed();
        let load = worked.as_secs_f64() / self.period.as_secs_f64();
        self.stats.last_load = load;
        self.stats.slowest = self.stats.slowest.max(worked);

        if load >= self.config.slow_tick_ratio {
            self.stats.slow_ticks += 1;
            warn!(
                tick = self.ticks,
                worked_ms = worked.as_secs_f64() * 1000.0,
                period_ms = self.period.as_secs_f64() * 1000.0,
                "slow tick"
            );
        }
    }

    /// Stops the heartbeat until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.ticks, "heartbeat paused");
        }
    }

    /// Restarts the heartbeat one full period from now.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.interval.reset();
            debug!(tick = self.ticks, "heartbeat resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }
}
