//! Text reports for the operator and the JSON schedule export.
//!
//! Every report takes the schedule read-only and writes to any
//! `io::Write`, so the dispatcher can point them at stdout and tests at a
//! `Vec<u8>`.

use crate::clock::{ClockPhase, ClockStatus};
use crate::error::ExportError;
use crate::model::altitude_samples;
use crate::schedule::ScheduleEntry;
use crate::state::SimulationState;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Spacing of the `pa` altitude samples.
pub const ALTITUDE_SAMPLE_MINUTES: i64 = 30;

fn hhmm(t: Option<NaiveTime>) -> String {
    t.map_or_else(|| "--:--".to_string(), |t| t.format("%H:%M").to_string())
}

/// Moonrise and moonset for every day (`pt`).
pub fn write_times(out: &mut impl Write, schedule: &[ScheduleEntry]) -> io::Result<()> {
    writeln!(out, "Moonrise / moonset over {} days", schedule.len())?;
    writeln!(out, "{:>4}  {:>8}  {:>8}  {:>10}", "day", "rise", "set", "visible")?;
    for entry in schedule {
        let visible = TimeDelta::seconds(entry.visibility_seconds as i64);
        writeln!(
            out,
            "{:>4}  {:>8}  {:>8}  {:>7}:{:02}",
            entry.day,
            hhmm(entry.moonrise),
            hhmm(entry.moonset),
            visible.num_hours(),
            visible.num_minutes() % 60,
        )?;
    }
    Ok(())
}

/// Phase of every day (`pp`).
pub fn write_phases(out: &mut impl Write, schedule: &[ScheduleEntry]) -> io::Result<()> {
    writeln!(out, "Moon phase over {} days", schedule.len())?;
    for entry in schedule {
        writeln!(out, "{:>4}  {}", entry.day, entry.phase)?;
    }
    Ok(())
}

/// Phase angle of every day (`pang`).
pub fn write_angles(out: &mut impl Write, schedule: &[ScheduleEntry]) -> io::Result<()> {
    writeln!(out, "Moon phase angle over {} days", schedule.len())?;
    for entry in schedule {
        writeln!(out, "{:>4}  {:>6.1}°", entry.day, entry.phase_angle)?;
    }
    Ok(())
}

/// Altitude every 30 minutes while the moon of `entry` is up (`pa`).
pub fn write_altitude(
    out: &mut impl Write,
    entry: &ScheduleEntry,
    cycle_start: NaiveDateTime,
) -> io::Result<()> {
    let samples = altitude_samples(
        entry,
        cycle_start,
        TimeDelta::minutes(ALTITUDE_SAMPLE_MINUTES),
    );
    if samples.is_empty() {
        writeln!(out, "No moon visibility for this day.")?;
        return Ok(());
    }

    writeln!(out, "Altitude for day {} ({})", entry.day, entry.phase)?;
    for sample in samples {
        writeln!(
            out,
            "{}  {:>6.1}°",
            sample.time.format("%Y-%m-%d %H:%M"),
            sample.altitude
        )?;
    }
    Ok(())
}

/// Current settings and what the clock is doing (`status`).
pub fn write_status(
    out: &mut impl Write,
    state: &SimulationState,
    clock: &ClockStatus,
) -> io::Result<()> {
    let s = &state.settings;
    writeln!(out, "Lunar cycle length:   {} days", s.cycle_length)?;
    writeln!(out, "Speed factor:         {}", s.speed_factor)?;
    writeln!(out, "Seconds per sim-day:  {}", s.day_length_secs)?;
    writeln!(out, "Moon color:           #{}", s.moon_color)?;
    writeln!(out, "Feeder drop time:     {}", s.feed_drop.format("%H:%M"))?;
    writeln!(out, "Feeder reset time:    {}", s.feed_reset.format("%H:%M"))?;
    writeln!(
        out,
        "Cycle start:          {}",
        state.cycle_start.format("%Y-%m-%d %H:%M")
    )?;

    let phase = match clock.phase {
        ClockPhase::NotStarted => "not started",
        ClockPhase::Running => "running",
        ClockPhase::Stopped => "stopped",
    };
    writeln!(out, "Simulation:           {phase}")?;
    if let Some(t) = clock.sim_time {
        writeln!(out, "Simulated time:       {}", t.format("%Y-%m-%d %H:%M"))?;
    }
    Ok(())
}

/// Write `schedule` to `path` as pretty-printed JSON.
pub fn export_json(schedule: &[ScheduleEntry], path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, schedule)?;
    writer.flush()?;
    tracing::info!("Schedule written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SimSettings;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn state() -> SimulationState {
        let now = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        SimulationState::new(SimSettings::default(), now).unwrap()
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn times_report_lists_every_day() {
        let state = state();
        let text = render(|out| write_times(out, state.schedule()));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2 + 28);
        assert_eq!(lines[2], "   0     18:00     06:00       12:00");
        assert!(lines[16].contains("--:--"));
    }

    #[test]
    fn phases_and_angles_reports() {
        let state = state();
        let phases = render(|out| write_phases(out, state.schedule()));
        assert!(phases.contains("   0  Full Moon"));
        assert!(phases.contains("  14  New Moon"));

        let angles = render(|out| write_angles(out, state.schedule()));
        assert!(angles.contains("   0   180.0°"));
        assert!(angles.contains("  14     0.0°"));
    }

    #[test]
    fn altitude_report_samples_every_half_hour() {
        let state = state();
        let text = render(|out| write_altitude(out, &state.schedule()[0], state.cycle_start));
        let lines: Vec<&str> = text.lines().collect();
        // 18:00 to 06:00 inclusive is 25 samples.
        assert_eq!(lines.len(), 1 + 25);
        assert_eq!(lines[1], "2025-06-01 18:00     0.0°");
        assert_eq!(lines[13], "2025-06-02 00:00    90.0°");
    }

    #[test]
    fn altitude_report_for_new_moon() {
        let state = state();
        let text = render(|out| write_altitude(out, &state.schedule()[14], state.cycle_start));
        assert_eq!(text, "No moon visibility for this day.\n");
    }

    #[test]
    fn status_report() {
        let state = state();
        let text = render(|out| write_status(out, &state, &ClockStatus::default()));
        assert!(text.contains("Lunar cycle length:   28 days"));
        assert!(text.contains("Moon color:           #FF0000"));
        assert!(text.contains("Feeder reset time:    20:00"));
        assert!(text.contains("Cycle start:          2025-06-01 09:30"));
        assert!(text.contains("Simulation:           not started"));
        assert!(!text.contains("Simulated time"));
    }

    #[test]
    fn export_writes_readable_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("schedule.json");
        let state = state();

        export_json(state.schedule(), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let days = value.as_array().unwrap();
        assert_eq!(days.len(), 28);
        assert_eq!(days[0]["phase"], "full_moon");
        assert_eq!(days[0]["moonrise"], "18:00:00");
        assert_eq!(days[14]["moonrise"], serde_json::Value::Null);
    }

    #[test]
    fn export_to_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope").join("schedule.json");
        let err = export_json(state().schedule(), &path).unwrap_err();
        assert!(matches!(err, ExportError::Io(_)));
    }
}
