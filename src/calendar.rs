//! Calendar scaling: stretch or squeeze the 28-day reference lunar month
//! to an arbitrary cycle length.
//!
//! The reference month alternates one-day "event" phases (full moon,
//! quarters, new moon) with six-day transitional phases. When the cycle is
//! scaled, the event phases round toward staying short and the
//! transitional phases absorb the slack, so the long/short rhythm survives.
//!
//! ## Rust concepts
//! - Fieldless `enum` with an associated `ALL` constant for iteration
//! - Fixed-size arrays indexed by `enum as usize`
//! - Integer arithmetic instead of floats where exactness matters

use crate::error::CalendarError;
use serde::Serialize;
use std::fmt;

/// Length of the reference lunar month the phase table is written for.
pub const REFERENCE_CYCLE_DAYS: u32 = 28;

// ── Phases ───────────────────────────────────────────────────────────

/// The eight named lunar phases, in canonical cycle order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    FullMoon,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
    NewMoon,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
}

/// Which way a phase rounds when the cycle is scaled up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// Rounds down when growing the cycle, up when shrinking it.
    ShrinkOnScaleUp,
    /// Rounds up when growing the cycle, down when shrinking it. These
    /// phases also take the post-rounding adjustment.
    GrowOnScaleUp,
}

impl Phase {
    /// Canonical order. Day 0 of every cycle is a full moon.
    pub const ALL: [Phase; 8] = [
        Phase::FullMoon,
        Phase::WaningGibbous,
        Phase::LastQuarter,
        Phase::WaningCrescent,
        Phase::NewMoon,
        Phase::WaxingCrescent,
        Phase::FirstQuarter,
        Phase::WaxingGibbous,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::FullMoon => "Full Moon",
            Phase::WaningGibbous => "Waning Gibbous",
            Phase::LastQuarter => "Last Quarter",
            Phase::WaningCrescent => "Waning Crescent",
            Phase::NewMoon => "New Moon",
            Phase::WaxingCrescent => "Waxing Crescent",
            Phase::FirstQuarter => "First Quarter",
            Phase::WaxingGibbous => "Waxing Gibbous",
        }
    }

    /// Length of this phase in the 28-day reference month.
    pub fn reference_days(self) -> u32 {
        match self.rounding() {
            Rounding::ShrinkOnScaleUp => 1,
            Rounding::GrowOnScaleUp => 6,
        }
    }

    pub fn rounding(self) -> Rounding {
        match self {
            Phase::FullMoon | Phase::LastQuarter | Phase::NewMoon | Phase::FirstQuarter => {
                Rounding::ShrinkOnScaleUp
            }
            Phase::WaningGibbous
            | Phase::WaningCrescent
            | Phase::WaxingCrescent
            | Phase::WaxingGibbous => Rounding::GrowOnScaleUp,
        }
    }

    /// Position in [`Phase::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Scaled counts ────────────────────────────────────────────────────

/// Day count per phase for one target cycle length.
///
/// Always sums to the cycle length it was built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaledPhaseCounts {
    counts: [u32; 8],
}

impl ScaledPhaseCounts {
    pub fn get(&self, phase: Phase) -> u32 {
        self.counts[phase.index()]
    }

    /// Total number of days across all phases.
    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// `(phase, days)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, u32)> + '_ {
        Phase::ALL.iter().map(|&p| (p, self.counts[p.index()]))
    }
}

/// Longest cycle an operator may ask for, about 27 years of sim-days.
pub const MAX_CYCLE_DAYS: u32 = 10_000;

/// Scale the reference phase table to a cycle of `cycle_length` days.
///
/// Rounding happens in integer arithmetic so that, for example, a 56-day
/// cycle gives exactly twice the reference table. A cycle shorter than
/// four days cannot hold every event phase; the surplus is taken from the
/// event phases in canonical order and some phases end up with zero days.
pub fn scale_phases(cycle_length: u32) -> Result<ScaledPhaseCounts, CalendarError> {
    if cycle_length == 0 {
        return Err(CalendarError::EmptyCycle);
    }
    if cycle_length > MAX_CYCLE_DAYS {
        return Err(CalendarError::TooLong {
            length: cycle_length,
            max: MAX_CYCLE_DAYS,
        });
    }

    let scaling_up = cycle_length >= REFERENCE_CYCLE_DAYS;
    let mut counts = [0u32; 8];

    for phase in Phase::ALL {
        // Bounded by MAX_CYCLE_DAYS, so this cannot overflow.
        let scaled = cycle_length * phase.reference_days();
        let floor = scaled / REFERENCE_CYCLE_DAYS;
        let ceil = scaled.div_ceil(REFERENCE_CYCLE_DAYS);

        let round_down = match phase.rounding() {
            Rounding::ShrinkOnScaleUp => scaling_up,
            Rounding::GrowOnScaleUp => !scaling_up,
        };
        counts[phase.index()] = if round_down { floor } else { ceil };
    }

    let mut total: u32 = counts.iter().sum();

    while total < cycle_length {
        for phase in grow_phases() {
            counts[phase.index()] += 1;
            total += 1;
            if total == cycle_length {
                break;
            }
        }
    }

    while total > cycle_length {
        let before = total;
        shave(&mut counts, &mut total, cycle_length, grow_phases());
        if total == before {
            // Every transitional phase is already empty.
            shave(&mut counts, &mut total, cycle_length, shrink_phases());
        }
    }

    Ok(ScaledPhaseCounts { counts })
}

fn grow_phases() -> impl Iterator<Item = Phase> {
    Phase::ALL
        .into_iter()
        .filter(|p| p.rounding() == Rounding::GrowOnScaleUp)
}

fn shrink_phases() -> impl Iterator<Item = Phase> {
    Phase::ALL
        .into_iter()
        .filter(|p| p.rounding() == Rounding::ShrinkOnScaleUp)
}

/// One decrementing pass over `phases`, skipping empty ones.
fn shave(
    counts: &mut [u32; 8],
    total: &mut u32,
    target: u32,
    phases: impl Iterator<Item = Phase>,
) {
    for phase in phases {
        if *total == target {
            return;
        }
        let count = &mut counts[phase.index()];
        if *count > 0 {
            *count -= 1;
            *total -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn counts_of(n: u32) -> Vec<u32> {
        let scaled = scale_phases(n).unwrap();
        Phase::ALL.iter().map(|&p| scaled.get(p)).collect()
    }

    #[test]
    fn reference_table_sums_to_28() {
        let sum: u32 = Phase::ALL.iter().map(|p| p.reference_days()).sum();
        assert_eq!(sum, REFERENCE_CYCLE_DAYS);
    }

    #[test]
    fn reference_length_is_identity() {
        assert_eq!(counts_of(28), vec![1, 6, 1, 6, 1, 6, 1, 6]);
    }

    #[test]
    fn every_length_sums_exactly() {
        for n in 1..=400 {
            assert_eq!(scale_phases(n).unwrap().total(), n, "cycle length {n}");
        }
    }

    #[rstest]
    #[case(56, vec![2, 12, 2, 12, 2, 12, 2, 12])]
    // 1.0357 × 6 rounds up to 7 each (32 days), the first three
    // transitional phases give one back.
    #[case(29, vec![1, 6, 1, 6, 1, 6, 1, 7])]
    // 1.25 × 6 = 7.5 → 8 each (36 days), one day shaved off.
    #[case(35, vec![1, 7, 1, 8, 1, 8, 1, 8])]
    // 0.5: event phases ceil to 1, transitional phases floor to 3 (16
    // days), the first two give one back.
    #[case(14, vec![1, 2, 1, 2, 1, 3, 1, 3])]
    // 27/28 × 6 floors to 5 (24 days), the first three take one more.
    #[case(27, vec![1, 6, 1, 6, 1, 6, 1, 5])]
    fn scaled_tables(#[case] n: u32, #[case] expected: Vec<u32>) {
        let counts = counts_of(n);
        assert_eq!(counts.iter().sum::<u32>(), n);
        assert_eq!(counts, expected);
    }

    #[test]
    fn shrinking_keeps_event_phases_short() {
        let scaled = scale_phases(20).unwrap();
        for phase in shrink_phases() {
            assert_eq!(scaled.get(phase), 1, "{phase}");
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    fn tiny_cycles_collapse_phases(#[case] n: u32) {
        let scaled = scale_phases(n).unwrap();
        assert_eq!(scaled.total(), n);
        assert!(scaled.iter().any(|(_, days)| days == 0));
    }

    #[test]
    fn zero_length_is_rejected() {
        assert_eq!(scale_phases(0), Err(CalendarError::EmptyCycle));
    }

    #[rstest]
    #[case(MAX_CYCLE_DAYS + 1)]
    #[case(800_000_000)]
    #[case(u32::MAX)]
    fn overlong_cycles_are_rejected(#[case] n: u32) {
        assert_eq!(
            scale_phases(n),
            Err(CalendarError::TooLong {
                length: n,
                max: MAX_CYCLE_DAYS
            })
        );
    }

    #[test]
    fn longest_cycle_sums_exactly() {
        assert_eq!(scale_phases(MAX_CYCLE_DAYS).unwrap().total(), MAX_CYCLE_DAYS);
    }

    #[test]
    fn iter_follows_canonical_order() {
        let scaled = scale_phases(28).unwrap();
        let phases: Vec<Phase> = scaled.iter().map(|(p, _)| p).collect();
        assert_eq!(phases, Phase::ALL.to_vec());
    }
}
