//! Feeder schedule: a once-a-day drop and reset driven by the simulated
//! time of day.
//!
//! ```text
//!   Idle ──▶ DropImminent ──▶ Feeding ──▶ ResetImminent ──▶ Idle
//!               (drop−1m)      (drop)       (reset−1m)
//! ```
//!
//! The state is a pure function of the time of day and the two setpoints,
//! so it works the same whichever lunar day is active. The actions (drop,
//! shake-and-reset) are edge triggered by [`FeederTrigger`], which
//! remembers what it has already fired so that coarse ticks neither skip
//! nor repeat an action.

use crate::actuator::Actuator;
use crate::error::ActuatorError;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::Serialize;
use std::thread;
use std::time::Duration;

const SECONDS_PER_DAY: u32 = 86_400;
const IMMINENT_WINDOW_SECS: u32 = 60;

/// Where the feeder is in its daily routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FeederState {
    Idle,
    DropImminent,
    Feeding,
    ResetImminent,
}

/// One-shot feeder actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeederAction {
    /// Tip the arm to release food.
    Drop,
    /// Shake loose what is left, then bring the arm home.
    ShakeAndReset,
}

/// Feeder state at time of day `now`.
///
/// Windows are inclusive and wrap around midnight. Where they overlap the
/// reset warning wins over the drop warning, which wins over feeding.
pub fn feeder_state(now: NaiveTime, drop: NaiveTime, reset: NaiveTime) -> FeederState {
    let t = now.num_seconds_from_midnight();
    let d = drop.num_seconds_from_midnight();
    let r = reset.num_seconds_from_midnight();

    if in_window(t, minus_minute(r), r) {
        FeederState::ResetImminent
    } else if in_window(t, minus_minute(d), d) {
        FeederState::DropImminent
    } else if is_feeding(t, d, r) {
        FeederState::Feeding
    } else {
        FeederState::Idle
    }
}

fn minus_minute(secs: u32) -> u32 {
    (secs + SECONDS_PER_DAY - IMMINENT_WINDOW_SECS) % SECONDS_PER_DAY
}

/// `t ∈ [start, end]` on a 24-hour circle.
fn in_window(t: u32, start: u32, end: u32) -> bool {
    if start <= end {
        start <= t && t <= end
    } else {
        t >= start || t <= end
    }
}

fn is_feeding(t: u32, drop: u32, reset: u32) -> bool {
    if reset > drop {
        drop <= t && t < reset
    } else {
        // Feeding runs through midnight.
        t >= drop || t < reset
    }
}

// ── Edge trigger ─────────────────────────────────────────────────────

/// Fires each feeder action once per occurrence of its setpoint.
///
/// An occurrence fires when the simulated clock reaches it or steps over
/// it between two observations. The very first observation only fires on
/// an exact match, so starting a cycle in the middle of the evening does
/// not replay the drop that "already happened".
#[derive(Clone, Debug, Default)]
pub struct FeederTrigger {
    last_seen: Option<NaiveDateTime>,
    drop_fired: Option<NaiveDateTime>,
    reset_fired: Option<NaiveDateTime>,
}

impl FeederTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all history, e.g. after the cycle restarted.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Observe simulated time `now` and return the actions due, drop first.
    pub fn observe(
        &mut self,
        now: NaiveDateTime,
        drop: NaiveTime,
        reset: NaiveTime,
    ) -> Vec<FeederAction> {
        if self.last_seen.is_some_and(|prev| now < prev) {
            // Time went backwards: a new cycle.
            self.reset();
        }

        let mut due = Vec::new();
        if let Some(occurrence) = self.due(now, drop, self.drop_fired) {
            self.drop_fired = Some(occurrence);
            due.push(FeederAction::Drop);
        }
        if let Some(occurrence) = self.due(now, reset, self.reset_fired) {
            self.reset_fired = Some(occurrence);
            due.push(FeederAction::ShakeAndReset);
        }

        self.last_seen = Some(now);
        due
    }

    fn due(
        &self,
        now: NaiveDateTime,
        setpoint: NaiveTime,
        fired: Option<NaiveDateTime>,
    ) -> Option<NaiveDateTime> {
        let occurrence = latest_occurrence(now, setpoint);
        if fired == Some(occurrence) {
            return None;
        }
        let reached = match self.last_seen {
            Some(prev) => prev < occurrence,
            None => occurrence == now,
        };
        reached.then_some(occurrence)
    }
}

/// The most recent instant at or before `now` whose time of day is
/// `setpoint`.
fn latest_occurrence(now: NaiveDateTime, setpoint: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(setpoint);
    if today > now {
        today - TimeDelta::days(1)
    } else {
        today
    }
}

// ── Motion ───────────────────────────────────────────────────────────

/// Angle the arm tips to when dropping food.
pub const DROP_ANGLE: f64 = 120.0;
/// Lowest point of a shake stroke.
pub const SHAKE_LOW_ANGLE: f64 = 80.0;
/// Shake strokes before the reset sweep.
pub const SHAKE_COUNT: u32 = 5;

const SWEEP_STEP: f64 = 1.0;
const SHAKE_STEP: f64 = 5.0;

/// Turns feeder actions into servo sweeps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeederMotion {
    /// Pause between 1° steps of the drop and reset sweeps
    pub sweep_delay: Duration,
    /// Pause between 5° steps of a shake stroke
    pub shake_delay: Duration,
    pub shake_count: u32,
}

impl Default for FeederMotion {
    fn default() -> Self {
        Self {
            sweep_delay: Duration::from_millis(50),
            shake_delay: Duration::from_millis(100),
            shake_count: SHAKE_COUNT,
        }
    }
}

impl FeederMotion {
    /// Motion with no pauses, for tests and dry runs.
    pub fn instant() -> Self {
        Self {
            sweep_delay: Duration::ZERO,
            shake_delay: Duration::ZERO,
            shake_count: SHAKE_COUNT,
        }
    }

    pub fn perform(
        &self,
        action: FeederAction,
        actuator: &mut dyn Actuator,
    ) -> Result<(), ActuatorError> {
        match action {
            FeederAction::Drop => {
                tracing::info!("Feeder dropping");
                self.drop(actuator)
            }
            FeederAction::ShakeAndReset => {
                tracing::info!("Done feeding, shaking and resetting feeder");
                self.shake(actuator)?;
                self.reset(actuator)?;
                tracing::info!("Feeder reset");
                Ok(())
            }
        }
    }

    pub fn drop(&self, actuator: &mut dyn Actuator) -> Result<(), ActuatorError> {
        sweep(actuator, 0.0, DROP_ANGLE, SWEEP_STEP, self.sweep_delay)
    }

    pub fn reset(&self, actuator: &mut dyn Actuator) -> Result<(), ActuatorError> {
        sweep(actuator, DROP_ANGLE, 0.0, SWEEP_STEP, self.sweep_delay)
    }

    /// Rock the arm between the drop angle and the shake low point, then
    /// sweep it home.
    pub fn shake(&self, actuator: &mut dyn Actuator) -> Result<(), ActuatorError> {
        for _ in 0..self.shake_count {
            sweep(actuator, DROP_ANGLE, SHAKE_LOW_ANGLE, SHAKE_STEP, self.shake_delay)?;
            sweep(actuator, SHAKE_LOW_ANGLE, DROP_ANGLE, SHAKE_STEP, self.shake_delay)?;
        }
        self.reset(actuator)
    }
}

/// Step the feeder from `from` to `to` inclusive.
fn sweep(
    actuator: &mut dyn Actuator,
    from: f64,
    to: f64,
    step: f64,
    delay: Duration,
) -> Result<(), ActuatorError> {
    let steps = ((to - from).abs() / step).round() as u32;
    let direction = if to >= from { step } else { -step };

    for i in 0..=steps {
        let angle = from + direction * f64::from(i);
        actuator.set_feeder_position(angle)?;
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::LoggingActuator;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_time(hm(h, m))
    }

    #[rstest]
    #[case(hm(19, 0), FeederState::Feeding)]
    #[case(hm(17, 59), FeederState::DropImminent)]
    #[case(hm(18, 0), FeederState::DropImminent)]
    #[case(hm(18, 1), FeederState::Feeding)]
    #[case(hm(17, 0), FeederState::Idle)]
    #[case(hm(19, 59), FeederState::ResetImminent)]
    #[case(hm(20, 0), FeederState::ResetImminent)]
    #[case(hm(20, 1), FeederState::Idle)]
    #[case(hm(3, 0), FeederState::Idle)]
    fn same_day_window(#[case] now: NaiveTime, #[case] expected: FeederState) {
        assert_eq!(feeder_state(now, hm(18, 0), hm(20, 0)), expected);
    }

    #[rstest]
    #[case(hm(0, 30), FeederState::Feeding)]
    #[case(hm(23, 30), FeederState::Feeding)]
    #[case(hm(22, 59), FeederState::DropImminent)]
    #[case(hm(0, 59), FeederState::ResetImminent)]
    #[case(hm(1, 30), FeederState::Idle)]
    #[case(hm(12, 0), FeederState::Idle)]
    fn window_across_midnight(#[case] now: NaiveTime, #[case] expected: FeederState) {
        assert_eq!(feeder_state(now, hm(23, 0), hm(1, 0)), expected);
    }

    #[test]
    fn drop_warning_wraps_midnight() {
        assert_eq!(
            feeder_state(hm(23, 59), hm(0, 0), hm(2, 0)),
            FeederState::DropImminent
        );
    }

    #[test]
    fn trigger_fires_on_exact_tick() {
        let mut trigger = FeederTrigger::new();
        assert!(trigger.observe(at(1, 17, 59), hm(18, 0), hm(20, 0)).is_empty());
        assert_eq!(
            trigger.observe(at(1, 18, 0), hm(18, 0), hm(20, 0)),
            vec![FeederAction::Drop]
        );
        assert!(trigger.observe(at(1, 18, 1), hm(18, 0), hm(20, 0)).is_empty());
        assert!(trigger.observe(at(1, 19, 59), hm(18, 0), hm(20, 0)).is_empty());
        assert_eq!(
            trigger.observe(at(1, 20, 0), hm(18, 0), hm(20, 0)),
            vec![FeederAction::ShakeAndReset]
        );
    }

    #[test]
    fn trigger_does_not_refire_on_repeated_observation() {
        let mut trigger = FeederTrigger::new();
        trigger.observe(at(1, 17, 59), hm(18, 0), hm(20, 0));
        assert_eq!(trigger.observe(at(1, 18, 0), hm(18, 0), hm(20, 0)).len(), 1);
        assert!(trigger.observe(at(1, 18, 0), hm(18, 0), hm(20, 0)).is_empty());
    }

    #[test]
    fn coarse_ticks_still_fire_once() {
        let mut trigger = FeederTrigger::new();
        trigger.observe(at(1, 17, 45), hm(18, 0), hm(20, 0));
        // 15-minute ticks step straight over 18:00.
        assert_eq!(
            trigger.observe(at(1, 18, 7), hm(18, 0), hm(20, 0)),
            vec![FeederAction::Drop]
        );
        assert!(trigger.observe(at(1, 18, 22), hm(18, 0), hm(20, 0)).is_empty());
    }

    #[test]
    fn trigger_fires_again_next_day() {
        let mut trigger = FeederTrigger::new();
        trigger.observe(at(1, 17, 59), hm(18, 0), hm(20, 0));
        trigger.observe(at(1, 18, 0), hm(18, 0), hm(20, 0));
        trigger.observe(at(2, 17, 59), hm(18, 0), hm(20, 0));
        assert_eq!(
            trigger.observe(at(2, 18, 0), hm(18, 0), hm(20, 0)),
            vec![FeederAction::Drop]
        );
    }

    #[test]
    fn first_observation_inside_feeding_does_not_replay_drop() {
        let mut trigger = FeederTrigger::new();
        assert!(trigger.observe(at(1, 19, 0), hm(18, 0), hm(20, 0)).is_empty());
    }

    #[test]
    fn reset_after_midnight_fires_on_next_date() {
        let mut trigger = FeederTrigger::new();
        trigger.observe(at(1, 22, 59), hm(23, 0), hm(1, 0));
        assert_eq!(
            trigger.observe(at(1, 23, 0), hm(23, 0), hm(1, 0)),
            vec![FeederAction::Drop]
        );
        trigger.observe(at(2, 0, 59), hm(23, 0), hm(1, 0));
        assert_eq!(
            trigger.observe(at(2, 1, 0), hm(23, 0), hm(1, 0)),
            vec![FeederAction::ShakeAndReset]
        );
    }

    #[test]
    fn time_going_backwards_starts_fresh() {
        let mut trigger = FeederTrigger::new();
        trigger.observe(at(5, 17, 59), hm(18, 0), hm(20, 0));
        trigger.observe(at(5, 18, 0), hm(18, 0), hm(20, 0));
        assert_eq!(
            trigger.observe(at(1, 18, 0), hm(18, 0), hm(20, 0)),
            vec![FeederAction::Drop]
        );
    }

    #[test]
    fn drop_sweeps_zero_to_drop_angle() {
        let mut act = LoggingActuator::new();
        FeederMotion::instant().drop(&mut act).unwrap();
        assert_eq!(act.feeder_history.len(), 121);
        assert_eq!(act.feeder_history.first(), Some(&0.0));
        assert_eq!(act.feeder_history.last(), Some(&DROP_ANGLE));
    }

    #[test]
    fn shake_and_reset_ends_home() {
        let mut act = LoggingActuator::new();
        FeederMotion::instant()
            .perform(FeederAction::ShakeAndReset, &mut act)
            .unwrap();

        // Five strokes of 9 + 9 positions, then two 121-step reset sweeps.
        assert_eq!(act.feeder_history.len(), 5 * 18 + 2 * 121);
        assert_eq!(act.feeder_position, Some(0.0));
        let lowest_shake = act.feeder_history[..90]
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(lowest_shake, SHAKE_LOW_ANGLE);
    }
}
