//! Operator commands and the console reader that produces them.
//!
//! The reader runs on its own thread and is allowed to block on stdin for
//! as long as it likes. Every complete command goes into an
//! `mpsc::Sender<Command>`; the dispatcher on the main thread drains the
//! other end between idle polls.
//!
//! ```text
//!   stdin ──▶ CommandReader ──┐
//!                             ├──▶ mpsc ──▶ Dispatcher
//!   HTTP  ──▶ handlers ───────┘
//! ```

use crate::Color;
use crate::state::{
    ParamUpdate, SharedState, parse_time_of_day, validate_cycle_length, validate_day_length,
    validate_speed_factor,
};
use chrono::NaiveTime;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::mpsc::Sender;

// ── Commands ─────────────────────────────────────────────────────────

/// Which schedule report to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlotKind {
    /// Moonrise and moonset per day (`pt`)
    Times,
    /// Phase per day (`pp`)
    Phases,
    /// Phase angle per day (`pang`)
    Angles,
    /// Altitude curve of one day (`pa`)
    Altitude(usize),
}

/// Everything the dispatcher can be asked to do.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Plot(PlotKind),
    ChangeParams(ParamUpdate),
    Status,
    Start,
    Quit,
}

pub const HELP: &str = "Commands:\n  \
    pt       -> moonrise/moonset times\n  \
    pp       -> moon phase per day\n  \
    pang     -> moon phase angle per day\n  \
    pa [day] -> altitude curve for one day\n  \
    change   -> change any of the options\n  \
    status   -> display current parameters\n  \
    start    -> start the simulation\n  \
    q        -> quit the program";

// ── Reader ───────────────────────────────────────────────────────────

/// Result of reading one console line.
#[derive(Clone, Debug, PartialEq)]
pub enum ReadOutcome {
    Command(Command),
    /// Blank line, unknown token or aborted prompt
    Ignored,
    /// Input closed
    Eof,
}

/// Line-oriented console parser with interactive prompts.
///
/// Generic over the input and output so it can be driven by a `Cursor` in
/// tests and by locked stdin/stdout in the binary.
pub struct CommandReader<R, W> {
    input: R,
    output: W,
    state: SharedState,
}

impl<R: BufRead, W: Write> CommandReader<R, W> {
    pub fn new(input: R, output: W, state: SharedState) -> Self {
        Self {
            input,
            output,
            state,
        }
    }

    /// Read commands and send them until `q`, end of input, or the
    /// dispatcher hanging up.
    pub fn run(mut self, tx: Sender<Command>) {
        loop {
            let outcome = match self.read_command() {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Console read failed: {}", e);
                    return;
                }
            };

            match outcome {
                ReadOutcome::Command(cmd) => {
                    let quit = cmd == Command::Quit;
                    if tx.send(cmd).is_err() || quit {
                        return;
                    }
                }
                ReadOutcome::Ignored => {}
                ReadOutcome::Eof => {
                    tracing::info!("Console input closed");
                    return;
                }
            }
        }
    }

    /// Read one line and, for `pa` and `change`, whatever prompts follow.
    pub fn read_command(&mut self) -> io::Result<ReadOutcome> {
        let Some(line) = self.read_line()? else {
            return Ok(ReadOutcome::Eof);
        };
        let line = line.to_lowercase();
        let mut tokens = line.split_whitespace();
        let Some(token) = tokens.next() else {
            return Ok(ReadOutcome::Ignored);
        };

        let cmd = match token {
            "pt" => Command::Plot(PlotKind::Times),
            "pp" => Command::Plot(PlotKind::Phases),
            "pang" => Command::Plot(PlotKind::Angles),
            "pa" => match self.read_day(tokens.next())? {
                Some(day) => Command::Plot(PlotKind::Altitude(day)),
                None => return Ok(ReadOutcome::Ignored),
            },
            "change" => Command::ChangeParams(self.prompt_update()?),
            "status" => Command::Status,
            "start" => Command::Start,
            "q" => Command::Quit,
            _ => {
                writeln!(self.output, "Unknown command. {HELP}")?;
                return Ok(ReadOutcome::Ignored);
            }
        };
        Ok(ReadOutcome::Command(cmd))
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn read_day(&mut self, inline: Option<&str>) -> io::Result<Option<usize>> {
        let raw = match inline {
            Some(day) => day.to_string(),
            None => {
                let last = self.state.snapshot().schedule().len().saturating_sub(1);
                write!(
                    self.output,
                    "Enter a day index [0, {last}] to plot the altitude: "
                )?;
                self.output.flush()?;
                self.read_line()?.unwrap_or_default()
            }
        };

        match raw.parse::<usize>() {
            Ok(day) => Ok(Some(day)),
            Err(_) => {
                writeln!(self.output, "Invalid day index. Command aborted.")?;
                Ok(None)
            }
        }
    }

    fn prompt_update(&mut self) -> io::Result<ParamUpdate> {
        let current = self.state.snapshot().settings.clone();
        writeln!(self.output, "Changing options (blank keeps the current value)")?;

        let cycle_length = self.prompt("Enter new lunar cycle length", current.cycle_length, |s| {
            u32::from_str(s)
                .map_err(|e| e.to_string())
                .and_then(|v| validate_cycle_length(v).map_err(|e| e.to_string()))
        })?;
        let speed_factor = self.prompt("Enter new speed factor", current.speed_factor, |s| {
            f64::from_str(s)
                .map_err(|e| e.to_string())
                .and_then(|v| validate_speed_factor(v).map_err(|e| e.to_string()))
        })?;
        let day_length_secs = self.prompt(
            "Enter new real-time seconds for 24-hour sim-day",
            current.day_length_secs,
            |s| {
                f64::from_str(s)
                    .map_err(|e| e.to_string())
                    .and_then(|v| validate_day_length(v).map_err(|e| e.to_string()))
            },
        )?;
        let moon_color = self.prompt("Enter new hex color", current.moon_color, |s| {
            Color::from_hex(s).map_err(|e| e.to_string())
        })?;
        let feed_drop = self.prompt(
            "Enter new feeder drop time",
            HourMinute(current.feed_drop),
            |s| parse_time_of_day(s).map_err(|e| e.to_string()),
        )?;
        let feed_reset = self.prompt(
            "Enter new feeder reset time",
            HourMinute(current.feed_reset),
            |s| parse_time_of_day(s).map_err(|e| e.to_string()),
        )?;

        let update = ParamUpdate {
            cycle_length,
            speed_factor,
            day_length_secs,
            moon_color,
            feed_drop,
            feed_reset,
        };
        if update.is_empty() {
            writeln!(self.output, "All options kept.")?;
        }
        Ok(update)
    }

    /// Ask until the answer parses. Blank (or end of input) keeps.
    fn prompt<T>(
        &mut self,
        label: &str,
        current: impl Display,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> io::Result<Option<T>> {
        loop {
            write!(self.output, "{label} (current={current}): ")?;
            self.output.flush()?;

            let line = self.read_line()?.unwrap_or_default();
            if line.is_empty() {
                return Ok(None);
            }
            match parse(&line) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => writeln!(
                    self.output,
                    "Invalid input ({e}). Try again or press Enter to keep the current value."
                )?,
            }
        }
    }
}

/// Shows a time of day as `HH:MM`.
struct HourMinute(NaiveTime);

impl Display for HourMinute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}
