//! Simulation state: operator settings plus the schedule built from them.
//!
//! The dispatcher is the only writer. It never edits a state in place;
//! it builds a new [`SimulationState`] and swaps it into [`SharedState`]
//! whole. Readers (the clock thread, HTTP handlers, the input prompts)
//! take an `Arc` snapshot and keep using it for as long as they need, so
//! no reader ever sees half of an update.
//!
//! ## Rust concepts
//! - `Arc<Mutex<Arc<T>>>`: the mutex only guards the pointer swap
//! - `Option` fields for "keep the current value"

use crate::Color;
use crate::calendar::{MAX_CYCLE_DAYS, scale_phases};
use crate::error::{CalendarError, ParamError};
use crate::schedule::{ScheduleEntry, build_schedule};
use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

// ── Settings ─────────────────────────────────────────────────────────

/// Everything an operator can change at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, utoipa::ToSchema)]
pub struct SimSettings {
    /// Simulated days per lunar cycle
    pub cycle_length: u32,
    /// Simulated time rate relative to the configured day length
    pub speed_factor: f64,
    /// Real seconds one simulated 24-hour day lasts at speed 1.0
    pub day_length_secs: f64,
    /// Moonlight color at full illumination
    #[schema(value_type = String, example = "FF0000")]
    pub moon_color: Color,
    /// Time of day the feeder drops food
    #[schema(value_type = String, example = "18:00:00")]
    pub feed_drop: NaiveTime,
    /// Time of day the feeder shakes and resets
    #[schema(value_type = String, example = "20:00:00")]
    pub feed_reset: NaiveTime,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            cycle_length: 28,
            speed_factor: 0.1,
            day_length_secs: 86_400.0,
            moon_color: Color::new(255, 0, 0),
            feed_drop: NaiveTime::MIN + TimeDelta::hours(18),
            feed_reset: NaiveTime::MIN + TimeDelta::hours(20),
        }
    }
}

impl SimSettings {
    pub fn validate(&self) -> Result<(), ParamError> {
        validate_cycle_length(self.cycle_length)?;
        validate_speed_factor(self.speed_factor)?;
        validate_day_length(self.day_length_secs)?;
        Ok(())
    }

    /// Real seconds one simulated minute lasts at the current speed.
    pub fn real_secs_per_sim_minute(&self) -> f64 {
        self.day_length_secs / (24.0 * 60.0) / self.speed_factor
    }
}

pub fn validate_cycle_length(value: u32) -> Result<u32, ParamError> {
    if !(1..=MAX_CYCLE_DAYS).contains(&value) {
        return Err(ParamError::CycleLength(value));
    }
    Ok(value)
}

pub fn validate_speed_factor(value: f64) -> Result<f64, ParamError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ParamError::SpeedFactor(value));
    }
    Ok(value)
}

pub fn validate_day_length(value: f64) -> Result<f64, ParamError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ParamError::DayLength(value));
    }
    Ok(value)
}

/// Parse `HH:MM` (24-hour).
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, ParamError> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|_| ParamError::TimeOfDay(input.to_string()))
}

// ── Partial updates ──────────────────────────────────────────────────

/// A `change` request. `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, utoipa::ToSchema)]
pub struct ParamUpdate {
    pub cycle_length: Option<u32>,
    pub speed_factor: Option<f64>,
    pub day_length_secs: Option<f64>,
    #[schema(value_type = Option<String>, example = "F8F7F4")]
    pub moon_color: Option<Color>,
    #[serde(default, deserialize_with = "time_of_day_opt")]
    #[schema(value_type = Option<String>, example = "18:00")]
    pub feed_drop: Option<NaiveTime>,
    #[serde(default, deserialize_with = "time_of_day_opt")]
    #[schema(value_type = Option<String>, example = "20:00")]
    pub feed_reset: Option<NaiveTime>,
}

/// Accepts `HH:MM` as typed at the prompt, or `HH:MM:SS` as serialized.
fn time_of_day_opt<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| {
            parse_time_of_day(&s).or_else(|e| {
                NaiveTime::parse_from_str(s.trim(), "%H:%M:%S").map_err(|_| e)
            })
        })
        .transpose()
        .map_err(serde::de::Error::custom)
}

impl ParamUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<(), ParamError> {
        if let Some(v) = self.cycle_length {
            validate_cycle_length(v)?;
        }
        if let Some(v) = self.speed_factor {
            validate_speed_factor(v)?;
        }
        if let Some(v) = self.day_length_secs {
            validate_day_length(v)?;
        }
        Ok(())
    }

    /// `current` with every supplied field overwritten.
    pub fn merged_into(&self, current: &SimSettings) -> SimSettings {
        SimSettings {
            cycle_length: self.cycle_length.unwrap_or(current.cycle_length),
            speed_factor: self.speed_factor.unwrap_or(current.speed_factor),
            day_length_secs: self.day_length_secs.unwrap_or(current.day_length_secs),
            moon_color: self.moon_color.unwrap_or(current.moon_color),
            feed_drop: self.feed_drop.unwrap_or(current.feed_drop),
            feed_reset: self.feed_reset.unwrap_or(current.feed_reset),
        }
    }
}

/// When a `change` command rebuilds the schedule and restarts the cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RebuildPolicy {
    /// Every `change` rebuilds, even if nothing changed.
    #[default]
    Always,
    /// Only a `change` that alters at least one setting rebuilds.
    OnChange,
}

// ── State ────────────────────────────────────────────────────────────

/// One immutable version of the simulation's configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationState {
    pub settings: SimSettings,
    schedule: Vec<ScheduleEntry>,
    /// Calendar instant of day 0, 00:00 is `cycle_start.date()`
    pub cycle_start: NaiveDateTime,
    /// Bumped on every rebuild so the clock can notice a restart
    pub generation: u64,
}

impl SimulationState {
    /// Build the schedule for `settings`, starting the cycle at `now`
    /// truncated to the minute.
    pub fn new(settings: SimSettings, now: NaiveDateTime) -> Result<Self, CalendarError> {
        Self::build(settings, now, 0)
    }

    fn build(
        settings: SimSettings,
        now: NaiveDateTime,
        generation: u64,
    ) -> Result<Self, CalendarError> {
        let counts = scale_phases(settings.cycle_length)?;
        let schedule = build_schedule(&counts);
        Ok(Self {
            settings,
            schedule,
            cycle_start: truncate_to_minute(now),
            generation,
        })
    }

    pub fn schedule(&self) -> &[ScheduleEntry] {
        &self.schedule
    }

    /// First simulated instant past the cycle.
    pub fn cycle_end(&self) -> NaiveDateTime {
        self.cycle_start + TimeDelta::days(i64::from(self.settings.cycle_length))
    }

    /// Apply `update`, returning the replacement state.
    ///
    /// Returns `Ok(None)` when the policy says nothing needs to happen.
    /// A rebuild always restarts the cycle at `now`.
    pub fn apply(
        &self,
        update: &ParamUpdate,
        policy: RebuildPolicy,
        now: NaiveDateTime,
    ) -> Result<Option<Self>, CalendarError> {
        let settings = update.merged_into(&self.settings);
        if policy == RebuildPolicy::OnChange && settings == self.settings {
            return Ok(None);
        }
        Self::build(settings, now, self.generation + 1).map(Some)
    }
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

// ── Sharing ──────────────────────────────────────────────────────────

/// Handle to the current [`SimulationState`].
///
/// # Rust concept: cheap snapshots
/// `snapshot()` clones the inner `Arc`, not the state. The lock is held
/// only for that clone, so readers never wait on a schedule rebuild.
#[derive(Clone, Debug)]
pub struct SharedState {
    inner: Arc<Mutex<Arc<SimulationState>>>,
}

impl SharedState {
    pub fn new(state: SimulationState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Arc::new(state))),
        }
    }

    pub fn snapshot(&self) -> Arc<SimulationState> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new state. Only the dispatcher calls this.
    pub fn replace(&self, state: SimulationState) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_milli_opt(21, 14, 37, 250)
            .unwrap()
    }

    fn state() -> SimulationState {
        SimulationState::new(SimSettings::default(), now()).unwrap()
    }

    #[test]
    fn new_state_builds_schedule_and_truncates_start() {
        let s = state();
        assert_eq!(s.schedule().len(), 28);
        assert_eq!(s.cycle_start.time(), NaiveTime::from_hms_opt(21, 14, 0).unwrap());
        assert_eq!(s.generation, 0);
        assert_eq!(s.cycle_end() - s.cycle_start, TimeDelta::days(28));
    }

    #[test]
    fn default_settings_are_valid() {
        assert_eq!(SimSettings::default().validate(), Ok(()));
    }

    #[test]
    fn real_secs_per_sim_minute_scales_with_speed() {
        let mut settings = SimSettings::default();
        assert_eq!(settings.real_secs_per_sim_minute(), 600.0);
        settings.speed_factor = 60.0;
        assert_eq!(settings.real_secs_per_sim_minute(), 1.0);
    }

    #[test]
    fn blank_update_keeps_every_field() {
        let current = SimSettings::default();
        let update = ParamUpdate::default();
        assert!(update.is_empty());
        assert_eq!(update.merged_into(&current), current);
    }

    #[test]
    fn partial_update_overwrites_only_given_fields() {
        let update = ParamUpdate {
            cycle_length: Some(40),
            moon_color: Some(Color::new(1, 2, 3)),
            ..ParamUpdate::default()
        };
        let merged = update.merged_into(&SimSettings::default());
        assert_eq!(merged.cycle_length, 40);
        assert_eq!(merged.moon_color, Color::new(1, 2, 3));
        assert_eq!(merged.speed_factor, 0.1);
        assert_eq!(merged.feed_drop, SimSettings::default().feed_drop);
    }

    #[test]
    fn blank_change_under_on_change_is_a_no_op() {
        let s = state();
        let later = now() + TimeDelta::hours(3);
        let result = s
            .apply(&ParamUpdate::default(), RebuildPolicy::OnChange, later)
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn blank_change_under_always_restarts_cycle() {
        let s = state();
        let later = now() + TimeDelta::hours(3);
        let next = s
            .apply(&ParamUpdate::default(), RebuildPolicy::Always, later)
            .unwrap()
            .unwrap();
        assert_eq!(next.settings, s.settings);
        assert_eq!(next.generation, 1);
        assert_eq!(next.cycle_start, truncate_to_minute(later));
    }

    #[rstest]
    #[case(RebuildPolicy::Always)]
    #[case(RebuildPolicy::OnChange)]
    fn cycle_length_change_rebuilds_schedule(#[case] policy: RebuildPolicy) {
        let s = state();
        let update = ParamUpdate {
            cycle_length: Some(45),
            ..ParamUpdate::default()
        };
        let next = s.apply(&update, policy, now()).unwrap().unwrap();
        assert_eq!(next.schedule().len(), 45);
        assert_eq!(next.generation, s.generation + 1);
    }

    #[test]
    fn same_value_counts_as_unchanged() {
        let s = state();
        let update = ParamUpdate {
            cycle_length: Some(28),
            ..ParamUpdate::default()
        };
        assert_eq!(s.apply(&update, RebuildPolicy::OnChange, now()).unwrap(), None);
    }

    #[rstest]
    #[case(ParamUpdate { cycle_length: Some(0), ..ParamUpdate::default() }, ParamError::CycleLength(0))]
    #[case(ParamUpdate { cycle_length: Some(MAX_CYCLE_DAYS + 1), ..ParamUpdate::default() }, ParamError::CycleLength(MAX_CYCLE_DAYS + 1))]
    #[case(ParamUpdate { cycle_length: Some(800_000_000), ..ParamUpdate::default() }, ParamError::CycleLength(800_000_000))]
    #[case(ParamUpdate { speed_factor: Some(0.0), ..ParamUpdate::default() }, ParamError::SpeedFactor(0.0))]
    #[case(ParamUpdate { day_length_secs: Some(-5.0), ..ParamUpdate::default() }, ParamError::DayLength(-5.0))]
    fn invalid_updates_are_rejected(#[case] update: ParamUpdate, #[case] expected: ParamError) {
        assert_eq!(update.validate(), Err(expected));
    }

    #[rstest]
    #[case("18:00", Some((18, 0)))]
    #[case("07:05", Some((7, 5)))]
    #[case(" 23:59 ", Some((23, 59)))]
    #[case("24:00", None)]
    #[case("12:60", None)]
    #[case("noon", None)]
    #[case("", None)]
    fn time_of_day_parsing(#[case] input: &str, #[case] expected: Option<(u32, u32)>) {
        let expected = expected.map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap());
        assert_eq!(parse_time_of_day(input).ok(), expected);
    }

    #[test]
    fn snapshot_survives_replace() {
        let shared = SharedState::new(state());
        let before = shared.snapshot();
        let next = before
            .apply(&ParamUpdate::default(), RebuildPolicy::Always, now())
            .unwrap()
            .unwrap();
        shared.replace(next);

        assert_eq!(before.generation, 0);
        assert_eq!(shared.snapshot().generation, 1);
    }

    #[test]
    fn update_from_json() {
        let update: ParamUpdate = serde_json::from_str(
            r##"{"cycle_length": 30, "moon_color": "#f8f7f4", "feed_drop": "07:30", "feed_reset": "09:00:00"}"##,
        )
        .unwrap();
        assert_eq!(
            update,
            ParamUpdate {
                cycle_length: Some(30),
                moon_color: Some(Color::new(0xF8, 0xF7, 0xF4)),
                feed_drop: NaiveTime::from_hms_opt(7, 30, 0),
                feed_reset: NaiveTime::from_hms_opt(9, 0, 0),
                ..ParamUpdate::default()
            }
        );
        assert_eq!(
            serde_json::from_str::<ParamUpdate>("{}").unwrap(),
            ParamUpdate::default()
        );
        assert!(serde_json::from_str::<ParamUpdate>(r#"{"feed_drop": "25:00"}"#).is_err());
        assert!(serde_json::from_str::<ParamUpdate>(r#"{"moon_color": "blue"}"#).is_err());
    }
}
