//! Sky color: warm sunlight by day, moonlight dimmed by illumination at
//! night.

use crate::Color;
use crate::schedule::{SUNRISE_HOUR, SUNSET_HOUR};
use serde::Serialize;

/// Fixed daylight color.
pub const SUN_COLOR: Color = Color::new(0xE5, 0x60, 0x20);

/// What the light should show for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, utoipa::ToSchema)]
pub struct Lighting {
    #[schema(value_type = String, example = "E56020")]
    pub color: Color,
    /// 0.0 (dark) to 1.0 (full)
    pub brightness: f64,
}

/// Whether `hour` (0-23) falls between sunrise and sunset.
pub fn is_daylight(hour: u32) -> bool {
    (SUNRISE_HOUR..SUNSET_HOUR).contains(&hour)
}

/// Compose the light for the given hour and lunar phase angle.
///
/// Daylight ignores the moon entirely. At night the configured moon color
/// is scaled by `phase_angle / 180`.
pub fn compose(hour: u32, phase_angle: f64, moon_color: Color) -> Lighting {
    if is_daylight(hour) {
        return Lighting {
            color: SUN_COLOR,
            brightness: 1.0,
        };
    }

    let brightness = phase_angle / 180.0;
    Lighting {
        color: moon_color.scale(brightness),
        brightness,
    }
}
