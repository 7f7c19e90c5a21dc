//! Altitude model: where the moon is on a given simulated instant.
//!
//! Every schedule entry is anchored to a calendar date by the cycle start:
//! entry `d` rises on `cycle_start.date() + d` and sets either later that
//! day or, when the set time is not after the rise time, the next morning.

use crate::calendar::Phase;
use crate::schedule::ScheduleEntry;
use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use std::f64::consts::PI;

/// Altitude reported for a new-moon day.
pub const NEW_MOON_ALTITUDE: f64 = -1.0;

/// Rise and set of one entry as absolute timestamps.
pub fn visibility_window(
    entry: &ScheduleEntry,
    cycle_start: NaiveDateTime,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let (rise, set) = (entry.moonrise?, entry.moonset?);
    let date = cycle_start.date() + TimeDelta::days(i64::from(entry.day));
    let rise_at = date.and_time(rise);
    let mut set_at = date.and_time(set);
    if set_at <= rise_at {
        set_at += TimeDelta::days(1);
    }
    Some((rise_at, set_at))
}

/// First entry whose `[moonrise, moonset)` window contains `t`.
///
/// Returns `None` during new moons and in the daytime gaps between
/// windows.
pub fn find_entry(
    schedule: &[ScheduleEntry],
    cycle_start: NaiveDateTime,
    t: NaiveDateTime,
) -> Option<&ScheduleEntry> {
    schedule.iter().find(|entry| {
        visibility_window(entry, cycle_start).is_some_and(|(rise, set)| rise <= t && t < set)
    })
}

/// Moon altitude in degrees at `t`.
///
/// The arc follows `90 × (1 − cos(π × progress))`: it leaves the horizon
/// slowly, passes 90 at the midpoint of the window and reaches the
/// opposite horizon (180 on the positioner) at moonset.
pub fn altitude(entry: &ScheduleEntry, t: NaiveDateTime, cycle_start: NaiveDateTime) -> f64 {
    if entry.phase == Phase::NewMoon {
        return NEW_MOON_ALTITUDE;
    }
    let Some((rise, set)) = visibility_window(entry, cycle_start) else {
        return 0.0;
    };
    if t < rise || t > set {
        return 0.0;
    }

    let elapsed = (t - rise).num_milliseconds() as f64;
    let visible = (set - rise).num_milliseconds() as f64;
    altitude_at_progress(elapsed / visible)
}

/// The altitude arc for a progress value in `[0, 1]`.
pub fn altitude_at_progress(progress: f64) -> f64 {
    90.0 * (1.0 - (PI * progress).cos())
}

/// One point of an altitude curve.
#[derive(Clone, Debug, PartialEq, Serialize, utoipa::ToSchema)]
pub struct AltitudeSample {
    #[schema(value_type = String, example = "2025-06-01T18:30:00")]
    pub time: NaiveDateTime,
    pub altitude: f64,
}

/// Altitudes from moonrise to moonset inclusive, every `interval`.
///
/// Empty when the entry has no visibility window.
pub fn altitude_samples(
    entry: &ScheduleEntry,
    cycle_start: NaiveDateTime,
    interval: TimeDelta,
) -> Vec<AltitudeSample> {
    let Some((rise, set)) = visibility_window(entry, cycle_start) else {
        return Vec::new();
    };
    if interval <= TimeDelta::zero() {
        return Vec::new();
    }

    let mut samples = Vec::new();
    let mut t = rise;
    while t <= set {
        samples.push(AltitudeSample {
            time: t,
            altitude: altitude(entry, t, cycle_start),
        });
        t += interval;
    }
    samples
}
