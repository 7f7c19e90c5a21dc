//! Simulation clock: advances simulated time and drives the hardware.
//!
//! The clock runs on its own thread and owns the actuator and the display
//! for as long as it runs. On every tick it:
//!
//! 1. fires any feeder action whose time of day was reached,
//! 2. finds the moon's altitude and phase angle for the current instant,
//! 3. moves the positioner,
//! 4. paints the sky color,
//!
//! then sleeps for the real-time equivalent of one tick and moves simulated
//! time forward. It stops when the cycle is over, when the shared `running`
//! flag is cleared, or on the first hardware error.
//!
//! ## Rust concepts
//! - `Box<dyn Trait>` to own an adapter chosen at runtime
//! - Returning `self` from a thread so the owner can reuse it
//! - Sleeping in short slices to stay responsive to a stop flag

use crate::actuator::{Actuator, LightDisplay};
use crate::compositor::{Lighting, compose, is_daylight};
use crate::error::TickError;
use crate::feeder::{FeederAction, FeederMotion, FeederState, FeederTrigger, feeder_state};
use crate::model::{altitude, find_entry};
use crate::state::{SharedState, SimSettings, SimulationState};
use crate::{Color, is_running};
use chrono::{NaiveDateTime, TimeDelta, Timelike};
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Longest uninterrupted sleep between stop-flag checks.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Positioner angle when no moon is up during the day.
const DAYLIGHT_ALTITUDE: f64 = 90.0;

// ── Status ───────────────────────────────────────────────────────────

/// Lifecycle of the clock thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClockPhase {
    #[default]
    NotStarted,
    Running,
    Stopped,
}

/// What the clock did last. Written only by the clock thread.
#[derive(Clone, Debug, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ClockStatus {
    pub phase: ClockPhase,
    /// Simulated instant of the last tick
    #[schema(value_type = Option<String>, example = "2025-06-01T18:00:00")]
    pub sim_time: Option<NaiveDateTime>,
    /// Schedule day whose moon was up, if any
    pub day: Option<u32>,
    pub altitude: Option<f64>,
    pub phase_angle: Option<f64>,
    #[schema(value_type = Option<String>, example = "FF0000")]
    pub color: Option<Color>,
    pub feeder: Option<FeederState>,
    /// Ticks completed since the last start
    pub ticks: u64,
}

impl ClockStatus {
    fn record(&mut self, report: &TickReport) {
        self.sim_time = Some(report.sim_time);
        self.day = report.day;
        self.altitude = Some(report.altitude);
        self.phase_angle = Some(report.phase_angle);
        self.color = Some(report.lighting.color);
        self.feeder = Some(report.feeder);
        self.ticks += 1;
    }
}

/// Outcome of a single tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub sim_time: NaiveDateTime,
    pub day: Option<u32>,
    pub altitude: f64,
    pub phase_angle: f64,
    pub lighting: Lighting,
    pub feeder: FeederState,
    pub actions: Vec<FeederAction>,
}

/// Real time one tick lasts for `settings`.
///
/// A pause too long for `Duration` saturates; the clock then just waits
/// in slices until it is stopped or the settings change.
pub fn tick_sleep(settings: &SimSettings, tick_minutes: u32) -> Duration {
    let secs = f64::from(tick_minutes) * settings.real_secs_per_sim_minute();
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

// ── Clock ────────────────────────────────────────────────────────────

/// The tick loop and the hardware it drives.
pub struct SimulationClock {
    actuator: Box<dyn Actuator>,
    display: Box<dyn LightDisplay>,
    motion: FeederMotion,
    trigger: FeederTrigger,
    tick_minutes: u32,
    sim_time: Option<NaiveDateTime>,
    generation: Option<u64>,
}

impl SimulationClock {
    pub fn new(
        actuator: Box<dyn Actuator>,
        display: Box<dyn LightDisplay>,
        motion: FeederMotion,
        tick_minutes: u32,
    ) -> Self {
        Self {
            actuator,
            display,
            motion,
            trigger: FeederTrigger::new(),
            tick_minutes: tick_minutes.max(1),
            sim_time: None,
            generation: None,
        }
    }

    pub fn sim_time(&self) -> Option<NaiveDateTime> {
        self.sim_time
    }

    /// Forget progress so the next tick starts at the cycle start.
    pub fn rewind(&mut self) {
        self.sim_time = None;
        self.generation = None;
        self.trigger.reset();
    }

    /// Follow `state` to a new cycle if it was rebuilt since the last tick.
    fn sync(&mut self, state: &SimulationState) -> NaiveDateTime {
        match self.sim_time {
            Some(t) if self.generation == Some(state.generation) => t,
            _ => {
                if self.generation.is_some() {
                    tracing::info!("Schedule rebuilt, restarting cycle at {}", state.cycle_start);
                }
                self.generation = Some(state.generation);
                self.trigger.reset();
                self.sim_time = Some(state.cycle_start);
                state.cycle_start
            }
        }
    }

    /// Whether simulated time has run past the end of the cycle.
    pub fn is_finished(&mut self, state: &SimulationState) -> bool {
        self.sync(state) >= state.cycle_end()
    }

    /// Run one tick against `state` and advance simulated time.
    pub fn tick(&mut self, state: &SimulationState) -> Result<TickReport, TickError> {
        let now = self.sync(state);
        let settings = &state.settings;

        let feeder = feeder_state(now.time(), settings.feed_drop, settings.feed_reset);
        tracing::debug!(?feeder, "feeder state at {}", now);
        let actions = self
            .trigger
            .observe(now, settings.feed_drop, settings.feed_reset);
        for action in &actions {
            self.motion.perform(*action, self.actuator.as_mut())?;
        }

        let (day, altitude, phase_angle) =
            match find_entry(state.schedule(), state.cycle_start, now) {
                Some(entry) => (
                    Some(entry.day),
                    altitude(entry, now, state.cycle_start),
                    entry.phase_angle,
                ),
                None if is_daylight(now.hour()) => (None, DAYLIGHT_ALTITUDE, 0.0),
                None => (None, 0.0, 0.0),
            };

        self.actuator.set_position(altitude)?;

        let lighting = compose(now.hour(), phase_angle, settings.moon_color);
        self.display.render(lighting.color)?;

        self.sim_time = Some(now + TimeDelta::minutes(i64::from(self.tick_minutes)));

        Ok(TickReport {
            sim_time: now,
            day,
            altitude,
            phase_angle,
            lighting,
            feeder,
            actions,
        })
    }

    /// Tick until the cycle ends, `running` is cleared, or a tick fails.
    ///
    /// Returns the clock so a later `start` can run it again.
    pub fn run(
        mut self,
        shared: SharedState,
        status: Arc<Mutex<ClockStatus>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        self.rewind();
        {
            let mut s = status.lock().unwrap_or_else(PoisonError::into_inner);
            *s = ClockStatus {
                phase: ClockPhase::Running,
                ..ClockStatus::default()
            };
        }
        tracing::info!("Simulation started");

        while is_running(&running) {
            let state = shared.snapshot();
            if self.is_finished(&state) {
                tracing::info!("Lunar cycle complete");
                break;
            }

            match self.tick(&state) {
                Ok(report) => {
                    tracing::info!(
                        "{} | day {} | altitude {:.1} | phase angle {:.1} | color #{}",
                        report.sim_time.format("%Y-%m-%d %H:%M"),
                        report.day.map_or_else(|| "-".to_string(), |d| d.to_string()),
                        report.altitude,
                        report.phase_angle,
                        report.lighting.color,
                    );
                    status
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .record(&report);
                }
                Err(e) => {
                    tracing::error!("Tick failed, stopping simulation: {}", e);
                    break;
                }
            }

            let pause = tick_sleep(&state.settings, self.tick_minutes);
            sleep_sliced(pause, &running, || {
                shared.snapshot().generation != state.generation
            });
        }

        status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phase = ClockPhase::Stopped;
        tracing::info!("Simulation stopped");
        self
    }
}

/// Sleep for `total`, waking early if `running` is cleared or
/// `interrupted` returns true.
fn sleep_sliced(total: Duration, running: &AtomicBool, interrupted: impl Fn() -> bool) {
    let mut remaining = total;
    while !remaining.is_zero() && is_running(running) && !interrupted() {
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}
