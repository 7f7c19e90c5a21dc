//! Lunar cycle simulator for a moon-and-feeder enclosure.
//!
//! A compressed lunar month is computed up front (phase lengths, moonrise
//! and moonset per day, illumination) and then played back by a
//! simulation clock that runs faster or slower than real time. Each tick
//! drives three pieces of hardware:
//! - a positioning servo that carries the moon across the sky
//! - a feeder servo that drops and resets food at configured times
//! - a colored light that shows sunlight or moonlight
//!
//! Operators talk to the running process through a line-oriented console
//! and, optionally, an HTTP API. Both feed one command channel that the
//! dispatcher drains between ticks.
//!
//! This module holds the small shared types (panel dimensions, colors)
//! and the shutdown flag helpers used by the binary.

pub mod actuator;
pub mod calendar;
pub mod clock;
pub mod command;
pub mod compositor;
pub mod dispatch;
pub mod error;
pub mod feeder;
pub mod model;
#[cfg(feature = "hardware")]
pub mod render;
pub mod report;
pub mod schedule;
pub mod server;
pub mod state;

use crate::error::ParamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Panel configuration ────────────────────────────────────────────

/// Dimensions of the LED panel used as the sky light.
///
/// # Rust concept: derive macros
/// `Clone, Copy` make this cheaply copyable (it's just two u32s).
/// `Debug` gives us `{:?}` formatting. `PartialEq, Eq` let us compare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    pub rows: u32,
    pub cols: u32,
}

impl PanelConfig {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// A 24-bit RGB color, decoupled from any hardware crate.
///
/// Serialized as a six-digit uppercase hex string (`"E56020"`), which is
/// also how operators type it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse up to six hex digits, with or without a leading `#`.
    ///
    /// Short values are zero-padded on the left, so `"FF"` is blue.
    pub fn from_hex(input: &str) -> Result<Self, ParamError> {
        let digits = input.trim();
        let digits = digits.strip_prefix('#').unwrap_or(digits);
        if digits.is_empty() || digits.len() > 6 {
            return Err(ParamError::Color(input.to_string()));
        }
        let value =
            u32::from_str_radix(digits, 16).map_err(|_| ParamError::Color(input.to_string()))?;
        Ok(Self::from_rgb24(value))
    }

    pub fn from_rgb24(value: u32) -> Self {
        let [_, r, g, b] = value.to_be_bytes();
        Self { r, g, b }
    }

    pub fn to_rgb24(self) -> u32 {
        u32::from_be_bytes([0, self.r, self.g, self.b])
    }

    /// Scale every channel by `factor`, flooring and clamping to 0-255.
    pub fn scale(self, factor: f64) -> Self {
        let channel = |c: u8| (f64::from(c) * factor).floor().clamp(0.0, 255.0) as u8;
        Self {
            r: channel(self.r),
            g: channel(self.g),
            b: channel(self.b),
        }
    }

    /// Apply a panel brightness percentage (0-100) to this color.
    pub fn apply_brightness(self, brightness: u8) -> Self {
        if brightness >= 100 {
            return self;
        }
        Self {
            r: ((self.r as u16 * brightness as u16) / 100) as u8,
            g: ((self.g as u16 * brightness as u16) / 100) as u8,
            b: ((self.b as u16 * brightness as u16) / 100) as u8,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.to_rgb24())
    }
}

impl TryFrom<String> for Color {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_string()
    }
}

/// Convert our Color to the hardware crate's LedColor at the boundary.
#[cfg(feature = "hardware")]
impl From<Color> for rpi_led_matrix::LedColor {
    fn from(c: Color) -> Self {
        rpi_led_matrix::LedColor {
            red: c.r,
            green: c.g,
            blue: c.b,
        }
    }
}

// ── Shutdown flag ──────────────────────────────────────────────────

/// Set up a Ctrl+C handler that clears the shared `running` flag.
///
/// The same flag is the simulator's only stop signal: the `q` command
/// clears it too, and the clock checks it between sleep slices.
///
/// # Rust concept: Arc and AtomicBool
/// `Arc` lets the handler, the dispatcher and the clock thread share one
/// flag. `AtomicBool` makes it safe to flip from any thread without a
/// mutex.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Check if the simulator should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

/// Ask every loop watching `running` to wind down.
pub fn request_stop(running: &AtomicBool) {
    running.store(false, Ordering::SeqCst);
}

// ── Tests ──────────────────────────────────────────────────────────
