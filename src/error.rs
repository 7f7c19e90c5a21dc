//! Error types shared across the simulator.
//!
//! Each subsystem gets its own enum so callers can tell a bad operator
//! input apart from a dead servo. The tick loop funnels the hardware
//! side into [`TickError`], which is fatal for the running cycle.

use std::io;

/// The calendar cannot be scaled to the requested cycle length.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("cycle length must be at least 1 day")]
    EmptyCycle,

    #[error("cycle length {length} exceeds the {max}-day limit")]
    TooLong { length: u32, max: u32 },
}

/// A parameter supplied by the operator (prompt, CLI flag or HTTP body)
/// was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("invalid cycle length {0}: must be between 1 and {max} days", max = crate::calendar::MAX_CYCLE_DAYS)]
    CycleLength(u32),

    #[error("invalid speed factor {0}: must be a positive number")]
    SpeedFactor(f64),

    #[error("invalid day length {0}: must be a positive number of seconds")]
    DayLength(f64),

    #[error("invalid hex color {0:?}: expected up to 6 hex digits, e.g. FF0000")]
    Color(String),

    #[error("invalid time {0:?}: expected HH:MM in 24-hour format")]
    TimeOfDay(String),
}

/// A positioning or feeder servo command failed.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("PWM channel {channel} I/O failed: {source}")]
    Pwm {
        channel: u8,
        #[source]
        source: io::Error,
    },
}

/// The colored light could not be updated.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("display thread is gone")]
    Disconnected,

    #[error("display initialization failed: {0}")]
    Init(String),
}

/// Anything that aborts a simulation tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("actuator: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("display: {0}")]
    Display(#[from] DisplayError),
}

/// Writing the schedule to disk failed.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}
