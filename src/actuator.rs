//! Hardware boundary: the positioning and feeder servos, and the light.
//!
//! The simulation core only sees the [`Actuator`] and [`LightDisplay`]
//! traits. Adapters decide whether a command turns into a PWM pulse, an
//! LED panel fill, or just a log line.
//!
//! ## Servo calibration
//! Both servos run at 50 Hz. The duty cycle for an angle is
//! `2.6 % + span × angle / 180`, with a 6.5 % span for the positioner and
//! a 10.1 % span for the feeder.
//!
//! ## Dual-target design
//! On a Raspberry Pi the servos are driven through the kernel's sysfs PWM
//! interface ([`SysfsPwmActuator`]). Anywhere else [`LoggingActuator`]
//! tracks positions in memory so the simulation can run dry.

use crate::Color;
use crate::error::{ActuatorError, DisplayError};
use std::fs;
use std::path::{Path, PathBuf};

/// PWM frequency both servos expect.
pub const SERVO_HZ: u64 = 50;

const MIN_DUTY_PERCENT: f64 = 2.6;
const POSITIONER_SPAN_PERCENT: f64 = 6.5;
const FEEDER_SPAN_PERCENT: f64 = 10.1;

/// PWM channel of the moon positioner.
pub const POSITIONER_CHANNEL: u8 = 0;
/// PWM channel of the feeder arm.
pub const FEEDER_CHANNEL: u8 = 1;

/// Duty cycle (percent) that holds the positioner at `angle` degrees.
pub fn positioner_duty(angle: f64) -> f64 {
    MIN_DUTY_PERCENT + POSITIONER_SPAN_PERCENT * (clamp_angle(angle) / 180.0)
}

/// Duty cycle (percent) that holds the feeder arm at `angle` degrees.
pub fn feeder_duty(angle: f64) -> f64 {
    MIN_DUTY_PERCENT + FEEDER_SPAN_PERCENT * (clamp_angle(angle) / 180.0)
}

fn clamp_angle(angle: f64) -> f64 {
    angle.clamp(0.0, 180.0)
}

// ── Ports ────────────────────────────────────────────────────────────

/// Write-side port for the two servos.
///
/// Both calls are idempotent. The returned duty cycle is informational.
pub trait Actuator: Send {
    /// Move the moon positioner to `angle` degrees (0-180).
    fn set_position(&mut self, angle: f64) -> Result<f64, ActuatorError>;

    /// Move the feeder arm to `angle` degrees (0-180).
    fn set_feeder_position(&mut self, angle: f64) -> Result<f64, ActuatorError>;
}

/// Write-side port for the sky light.
pub trait LightDisplay: Send {
    fn render(&mut self, color: Color) -> Result<(), DisplayError>;
}

// ── Dry-run adapters ─────────────────────────────────────────────────

/// Actuator that only remembers and logs what it was told.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoggingActuator {
    pub position: Option<f64>,
    pub feeder_position: Option<f64>,
    /// Every feeder angle commanded, oldest first
    pub feeder_history: Vec<f64>,
}

impl LoggingActuator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actuator for LoggingActuator {
    fn set_position(&mut self, angle: f64) -> Result<f64, ActuatorError> {
        let angle = clamp_angle(angle);
        let duty = positioner_duty(angle);
        self.position = Some(angle);
        tracing::debug!(angle, duty, "positioner");
        Ok(duty)
    }

    fn set_feeder_position(&mut self, angle: f64) -> Result<f64, ActuatorError> {
        let angle = clamp_angle(angle);
        let duty = feeder_duty(angle);
        self.feeder_position = Some(angle);
        self.feeder_history.push(angle);
        tracing::debug!(angle, duty, "feeder");
        Ok(duty)
    }
}

/// Display that logs every color change.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last: Option<Color>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Color> {
        self.last
    }
}

impl LightDisplay for LogDisplay {
    fn render(&mut self, color: Color) -> Result<(), DisplayError> {
        if self.last != Some(color) {
            tracing::info!("Screen color = #{}", color);
        }
        self.last = Some(color);
        Ok(())
    }
}

// ── Sysfs PWM ────────────────────────────────────────────────────────

/// Servo driver on top of `/sys/class/pwm/pwmchipN`.
///
/// Channels are exported on open if the kernel has not exported them yet,
/// then configured for a 50 Hz period and enabled.
#[derive(Debug)]
pub struct SysfsPwmActuator {
    chip: PathBuf,
    period_ns: u64,
}

impl SysfsPwmActuator {
    /// Export and enable the positioner and feeder channels of `chip`.
    pub fn open(chip: impl Into<PathBuf>) -> Result<Self, ActuatorError> {
        let actuator = Self {
            chip: chip.into(),
            period_ns: 1_000_000_000 / SERVO_HZ,
        };

        for channel in [POSITIONER_CHANNEL, FEEDER_CHANNEL] {
            actuator.export(channel)?;
            actuator.write(channel, "period", actuator.period_ns)?;
            actuator.write(channel, "enable", 1)?;
        }

        tracing::info!("PWM chip {} ready", actuator.chip.display());
        Ok(actuator)
    }

    fn channel_dir(&self, channel: u8) -> PathBuf {
        self.chip.join(format!("pwm{channel}"))
    }

    fn export(&self, channel: u8) -> Result<(), ActuatorError> {
        if self.channel_dir(channel).is_dir() {
            return Ok(());
        }
        write_value(&self.chip.join("export"), channel)
            .map_err(|source| ActuatorError::Pwm { channel, source })
    }

    fn write(
        &self,
        channel: u8,
        attribute: &str,
        value: impl ToString,
    ) -> Result<(), ActuatorError> {
        write_value(&self.channel_dir(channel).join(attribute), value)
            .map_err(|source| ActuatorError::Pwm { channel, source })
    }

    fn set_duty(&mut self, channel: u8, duty_percent: f64) -> Result<(), ActuatorError> {
        let duty_ns = (self.period_ns as f64 * duty_percent / 100.0).round() as u64;
        self.write(channel, "duty_cycle", duty_ns)
    }
}

fn write_value(path: &Path, value: impl ToString) -> std::io::Result<()> {
    fs::write(path, value.to_string())
}

impl Actuator for SysfsPwmActuator {
    fn set_position(&mut self, angle: f64) -> Result<f64, ActuatorError> {
        let duty = positioner_duty(angle);
        self.set_duty(POSITIONER_CHANNEL, duty)?;
        tracing::debug!(angle, duty, "positioner");
        Ok(duty)
    }

    fn set_feeder_position(&mut self, angle: f64) -> Result<f64, ActuatorError> {
        let duty = feeder_duty(angle);
        self.set_duty(FEEDER_CHANNEL, duty)?;
        tracing::debug!(angle, duty, "feeder");
        Ok(duty)
    }
}
