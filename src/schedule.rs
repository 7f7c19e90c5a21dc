//! Schedule building: one entry per simulated day with moonrise, moonset,
//! visibility and phase angle.
//!
//! The model is a deliberate simplification. Before the new moon the moon
//! sets at sunrise and rises a little later every evening; after the new
//! moon it rises at sunset and sets a little later every night. The daily
//! drift ("kickback") is the real ~50 minutes, rescaled so that a
//! compressed cycle still sweeps the whole night.

use crate::calendar::{Phase, ScaledPhaseCounts};
use chrono::{NaiveTime, TimeDelta, Timelike};
use serde::Serialize;

/// Hour the sun sets and the post-new-moon moon rises.
pub const SUNSET_HOUR: u32 = 18;
/// Hour the sun rises and the pre-new-moon moon sets.
pub const SUNRISE_HOUR: u32 = 6;

const MINUTES_PER_DAY: i64 = 24 * 60;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Real-world lunar drift in minutes per day, expressed on the 28-day
/// reference month.
pub const DAILY_DRIFT_MINUTES: f64 = 50.0 * 28.0 / 29.0;

/// Synodic month the drift is measured against.
pub const SYNODIC_MONTH_DAYS: f64 = 29.5;

/// One simulated day of the lunar cycle.
#[derive(Clone, Debug, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ScheduleEntry {
    /// Day index within the cycle, starting at 0
    pub day: u32,
    /// Lunar phase occupying this day
    pub phase: Phase,
    /// Time of day the moon rises, absent on a new moon
    #[schema(value_type = Option<String>, example = "18:51:00")]
    pub moonrise: Option<NaiveTime>,
    /// Time of day the moon sets, absent on a new moon
    #[schema(value_type = Option<String>, example = "06:00:00")]
    pub moonset: Option<NaiveTime>,
    /// Seconds between moonrise and moonset
    pub visibility_seconds: f64,
    /// Illumination angle in degrees, 180 = fully lit
    pub phase_angle: f64,
}

/// Minutes the moonrise (or moonset) slips per simulated day for a cycle of
/// `cycle_length` days.
pub fn kickback_minutes(cycle_length: u32) -> f64 {
    DAILY_DRIFT_MINUTES / (f64::from(cycle_length) / SYNODIC_MONTH_DAYS)
}

/// Triangular illumination wave over the cycle.
///
/// `day` is clamped to `[0, cycle_length]`. The wave is 180 at both cycle
/// edges (day 0 is a full moon) and 0 at the midpoint, where the new moon
/// sits in the reference table.
pub fn phase_angle(day: u32, cycle_length: u32) -> f64 {
    let n = f64::from(cycle_length);
    let day = f64::from(day.min(cycle_length));
    let y = (day + n / 2.0) % n;
    180.0 * (1.0 - (1.0 - 2.0 * y / n).abs())
}

/// Expand scaled phase counts into a full day-by-day schedule.
///
/// The schedule has exactly `counts.total()` entries, ordered by day.
pub fn build_schedule(counts: &ScaledPhaseCounts) -> Vec<ScheduleEntry> {
    let cycle_length = counts.total();
    let kickback = kickback_minutes(cycle_length);

    let phases = counts
        .iter()
        .flat_map(|(phase, days)| std::iter::repeat_n(phase, days as usize));

    let mut last_new_moon: Option<u32> = None;
    let mut schedule = Vec::with_capacity(cycle_length as usize);

    for (day, phase) in (0..cycle_length).zip(phases) {
        let (moonrise, moonset) = if phase == Phase::NewMoon {
            last_new_moon = Some(day);
            (None, None)
        } else {
            match last_new_moon {
                None => (
                    Some(after_sunset(drift_minutes(day, kickback))),
                    Some(at_hour(SUNRISE_HOUR)),
                ),
                Some(new_moon_day) => (
                    Some(at_hour(SUNSET_HOUR)),
                    Some(after_sunset(drift_minutes(day - new_moon_day, kickback))),
                ),
            }
        };

        schedule.push(ScheduleEntry {
            day,
            phase,
            moonrise,
            moonset,
            visibility_seconds: visibility_seconds(moonrise, moonset),
            phase_angle: phase_angle(day, cycle_length),
        });
    }

    schedule
}

/// Seconds from `rise` to `set`, wrapping past midnight when `set` is
/// earlier in the day than `rise`.
pub fn visibility_seconds(rise: Option<NaiveTime>, set: Option<NaiveTime>) -> f64 {
    let (Some(rise), Some(set)) = (rise, set) else {
        return 0.0;
    };
    let rise = f64::from(rise.num_seconds_from_midnight());
    let mut set = f64::from(set.num_seconds_from_midnight());
    if set < rise {
        set += SECONDS_PER_DAY;
    }
    set - rise
}

// Round half to even.
fn drift_minutes(days: u32, kickback: f64) -> i64 {
    (f64::from(days) * kickback).round_ties_even() as i64
}

fn after_sunset(offset_minutes: i64) -> NaiveTime {
    let minutes = (i64::from(SUNSET_HOUR) * 60 + offset_minutes).rem_euclid(MINUTES_PER_DAY);
    NaiveTime::MIN + TimeDelta::minutes(minutes)
}

fn at_hour(hour: u32) -> NaiveTime {
    NaiveTime::MIN + TimeDelta::hours(i64::from(hour))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::scale_phases;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn schedule_for(n: u32) -> Vec<ScheduleEntry> {
        build_schedule(&scale_phases(n).unwrap())
    }

    #[rstest]
    #[case(8)]
    #[case(14)]
    #[case(28)]
    #[case(29)]
    #[case(60)]
    #[case(100)]
    fn one_entry_per_day_in_order(#[case] n: u32) {
        let schedule = schedule_for(n);
        let days: Vec<u32> = schedule.iter().map(|e| e.day).collect();
        assert_eq!(days, (0..n).collect::<Vec<_>>());
    }

    #[rstest]
    #[case(28)]
    #[case(45)]
    #[case(90)]
    fn new_moon_days_are_dark(#[case] n: u32) {
        let schedule = schedule_for(n);
        let new_moons: Vec<_> = schedule
            .iter()
            .filter(|e| e.phase == Phase::NewMoon)
            .collect();
        assert!(!new_moons.is_empty());
        for entry in new_moons {
            assert_eq!(entry.moonrise, None);
            assert_eq!(entry.moonset, None);
            assert_eq!(entry.visibility_seconds, 0.0);
        }
    }

    #[test]
    fn reference_cycle_rise_and_set_times() {
        let schedule = schedule_for(28);
        // kickback for 28 days is ~50.86 minutes.
        assert_eq!(schedule[0].moonrise, Some(hm(18, 0)));
        assert_eq!(schedule[0].moonset, Some(hm(6, 0)));
        assert_eq!(schedule[1].moonrise, Some(hm(18, 51)));
        assert_eq!(schedule[13].moonrise, Some(hm(5, 1)));

        // Day 14 is the new moon, day 15 the first day after it.
        assert_eq!(schedule[14].phase, Phase::NewMoon);
        assert_eq!(schedule[15].moonrise, Some(hm(18, 0)));
        assert_eq!(schedule[15].moonset, Some(hm(18, 51)));
        assert_eq!(schedule[27].moonset, Some(hm(5, 1)));
    }

    #[test]
    fn first_day_visibility_wraps_midnight() {
        let schedule = schedule_for(28);
        assert_eq!(schedule[0].visibility_seconds, 12.0 * 3600.0);
    }

    #[test]
    fn visibility_is_never_negative() {
        for n in [8, 28, 29, 50, 200] {
            assert!(schedule_for(n).iter().all(|e| e.visibility_seconds >= 0.0));
        }
    }

    #[test]
    fn visibility_missing_time_is_zero() {
        assert_eq!(visibility_seconds(None, Some(hm(6, 0))), 0.0);
        assert_eq!(visibility_seconds(Some(hm(18, 0)), None), 0.0);
    }

    #[test]
    fn visibility_same_day() {
        assert_eq!(visibility_seconds(Some(hm(18, 0)), Some(hm(20, 30))), 9000.0);
    }

    #[rstest]
    #[case(28)]
    #[case(30)]
    #[case(64)]
    fn phase_angle_edges_and_midpoint(#[case] n: u32) {
        assert_eq!(phase_angle(0, n), 180.0);
        assert_eq!(phase_angle(n, n), phase_angle(0, n));
        assert_eq!(phase_angle(n / 2, n), 0.0);
    }

    #[test]
    fn phase_angle_is_symmetric_and_bounded() {
        let n = 28;
        for day in 0..=n {
            let angle = phase_angle(day, n);
            assert!((0.0..=180.0).contains(&angle));
            assert!((angle - phase_angle(n - day, n)).abs() < 1e-9);
        }
    }

    #[test]
    fn phase_angle_clamps_past_cycle_end() {
        assert_eq!(phase_angle(40, 28), phase_angle(28, 28));
    }

    #[test]
    fn full_moon_is_brightest_new_moon_darkest() {
        let schedule = schedule_for(28);
        assert_eq!(schedule[0].phase, Phase::FullMoon);
        assert_eq!(schedule[0].phase_angle, 180.0);
        assert_eq!(schedule[14].phase_angle, 0.0);
    }

    #[test]
    fn kickback_shrinks_as_cycle_grows() {
        assert!(kickback_minutes(56) < kickback_minutes(28));
        assert!((kickback_minutes(28) - 50.862).abs() < 1e-3);
    }
}
