//! Wall-clock driver that advances the engine at a fixed polling interval.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{
    sync::watch,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::engine::{Engine, TickReport};

/// Default wake-up interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(120);

/// Default longest gap handled as an ordinary tick.
pub const DEFAULT_MAX_TICK_SECONDS: f64 = 5.0;

/// Scheduler knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerOptions {
    /// Time between wake-ups.
    pub interval: Duration,
    /// Longest gap treated as an ordinary tick; longer gaps are caught up.
    pub max_tick_seconds: f64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TICK_INTERVAL,
            max_tick_seconds: DEFAULT_MAX_TICK_SECONDS,
        }
    }
}

/// Single-threaded tick loop over a shared [`Engine`].
pub struct TickScheduler {
    engine: Arc<Engine>,
    options: SchedulerOptions,
    last_wake: Option<Instant>,
    last_wall: Option<DateTime<Utc>>,
    ticks: u64,
}

impl TickScheduler {
    /// Create a scheduler for `engine`.
    pub fn new(engine: Arc<Engine>, options: SchedulerOptions) -> Self {
        Self {
            engine,
            options,
            last_wake: None,
            last_wall: None,
            ticks: 0,
        }
    }

    /// Number of ticks processed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one tick as if woken at `now`, then persist.
    ///
    /// The first call only records the clock.
    pub fn step(&mut self, now: Instant) -> TickReport {
        self.step_at(now, Utc::now())
    }

    /// [`TickScheduler::step`] with an explicit wall-clock reading.
    ///
    /// The monotonic clock stops while the host is suspended, so the gap is
    /// the larger of the monotonic and wall-clock deltas. Gaps longer than
    /// `max_tick_seconds` are applied through [`Engine::catch_up`].
    pub fn step_at(&mut self, now: Instant, wall: DateTime<Utc>) -> TickReport {
        let monotonic = self
            .last_wake
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        let wall_clock = self
            .last_wall
            .map(|last| ((wall - last).num_milliseconds() as f64 / 1_000.0).max(0.0))
            .unwrap_or(0.0);
        self.last_wake = Some(now);
        self.last_wall = Some(wall);

        let elapsed = monotonic.max(wall_clock);
        let report = if elapsed > self.options.max_tick_seconds {
            debug!(elapsed, monotonic, wall_clock, "long gap between ticks, catching up");
            self.engine.catch_up(elapsed)
        } else {
            self.engine.advance(elapsed)
        };

        self.ticks += 1;
        if let Err(err) = self.engine.persist() {
            error!(tick = self.ticks, %err, "tick persist failed; retrying next tick");
        }
        report
    }

    /// Tick until `shutdown` turns `true` (or its sender is dropped), then
    /// write any pending state.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut interval = time::interval(self.options.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.options.interval.as_millis() as u64,
            max_tick_seconds = self.options.max_tick_seconds,
            "tick scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.step(Instant::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Err(err) = self.engine.persist() {
            error!(%err, "final persist failed");
        }
        info!(ticks = self.ticks, "tick scheduler stopped");
        Ok(())
    }
}
