//! LED matrix light: a render thread owns the panel and paints it one
//! solid color at a time.
//!
//! The `rpi-led-matrix` C library is not thread-safe, so the matrix is
//! created and used on a single dedicated thread. [`MatrixDisplay`] is the
//! clock's handle to it: `render()` only sends a [`Color`] down an `mpsc`
//! channel.
//!
//! ## Rust concepts
//! - `std::sync::mpsc` channels for thread communication
//! - A one-shot "ready" channel to report initialization errors
//! - `for x in rx` to block until the sender is dropped

use crate::actuator::LightDisplay;
use crate::error::DisplayError;
use crate::{Color, PanelConfig};
use rpi_led_matrix::{LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Open the panel with our hardware defaults.
fn create_matrix(panel: PanelConfig) -> Result<LedMatrix, String> {
    let mut options = LedMatrixOptions::new();
    options.set_rows(panel.rows);
    options.set_cols(panel.cols);
    options.set_hardware_mapping("adafruit-hat");
    options.set_pwm_bits(8).map_err(str::to_string)?;
    options.set_pwm_lsb_nanoseconds(130);

    let mut rt_options = LedRuntimeOptions::new();
    rt_options.set_gpio_slowdown(2); // Pi Zero 2 W requires slowdown=2

    LedMatrix::new(Some(options), Some(rt_options)).map_err(str::to_string)
}

/// Sky light backed by an RGB LED matrix.
pub struct MatrixDisplay {
    tx: Sender<Color>,
    _handle: JoinHandle<()>,
}

impl MatrixDisplay {
    /// Start the render thread and wait until the matrix is initialized.
    ///
    /// `brightness` (0-100) is applied to every color before it is drawn.
    pub fn spawn(panel: PanelConfig, brightness: u8) -> Result<Self, DisplayError> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let brightness = brightness.min(100);

        let handle = thread::spawn(move || render_loop(rx, ready_tx, panel, brightness));

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!(
                    "LED matrix ready: {}x{} at {}% brightness",
                    panel.cols,
                    panel.rows,
                    brightness
                );
                Ok(Self {
                    tx,
                    _handle: handle,
                })
            }
            Ok(Err(e)) => Err(DisplayError::Init(e)),
            Err(_) => Err(DisplayError::Init("render thread exited".to_string())),
        }
    }
}

impl LightDisplay for MatrixDisplay {
    fn render(&mut self, color: Color) -> Result<(), DisplayError> {
        self.tx.send(color).map_err(|_| DisplayError::Disconnected)
    }
}

/// Owns the matrix. Runs until every `MatrixDisplay` sender is dropped,
/// then blanks the panel.
fn render_loop(
    rx: Receiver<Color>,
    ready: Sender<Result<(), String>>,
    panel: PanelConfig,
    brightness: u8,
) {
    let matrix = match create_matrix(panel) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("Failed to initialize LED matrix: {}", e);
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut canvas = matrix.offscreen_canvas();
    let mut last = None;

    for color in rx {
        if last == Some(color) {
            continue;
        }
        last = Some(color);

        canvas.fill(&color.apply_brightness(brightness).into());
        canvas = matrix.swap(canvas);
    }

    tracing::info!("Render thread: channel closed, blanking panel");
    canvas.clear();
    matrix.swap(canvas);
}
