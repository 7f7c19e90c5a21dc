//! Lunar cycle simulator
//!
//! Plays a compressed lunar month on the enclosure hardware: the moon
//! positioner follows the moon's altitude, the feeder drops and resets on
//! schedule, and the light shows sunlight by day and phase-dimmed
//! moonlight by night.
//!
//! ## Architecture
//! - **Console reader** (std::thread): blocks on stdin, queues commands
//! - **HTTP server** (optional, tokio on its own thread): queues commands
//! - **Dispatcher** (main thread): drains the queue, owns the settings
//! - **Simulation clock** (std::thread): ticks and drives the hardware
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/gibbous-rs --pwm-chip /sys/class/pwm/pwmchip0 \
//!     --display matrix --speed-factor 60 --start --port 8080
//! ```

use chrono::NaiveTime;
use clap::Parser;
use gibbous_rs::actuator::{Actuator, LightDisplay, LogDisplay, LoggingActuator, SysfsPwmActuator};
use gibbous_rs::clock::{ClockStatus, SimulationClock};
use gibbous_rs::command::{Command, CommandReader, HELP};
use gibbous_rs::dispatch::Dispatcher;
use gibbous_rs::error::DisplayError;
use gibbous_rs::feeder::{FeederMotion, SHAKE_COUNT};
use gibbous_rs::report;
use gibbous_rs::server::{self, AppState};
use gibbous_rs::state::{
    RebuildPolicy, SharedState, SimSettings, SimulationState, parse_time_of_day,
    validate_cycle_length, validate_day_length, validate_speed_factor,
};
use gibbous_rs::{Color, PanelConfig, setup_signal_handler};
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Which light to drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum DisplayKind {
    /// Log color changes only
    Log,
    /// RGB LED matrix (needs the `hardware` feature)
    Matrix,
}

/// Lunar cycle simulator
#[derive(Parser)]
#[command(name = "gibbous-rs")]
#[command(about = "Compressed lunar cycle simulator for a moon positioner, feeder and light")]
#[command(version)]
struct Args {
    /// Simulated days per lunar cycle
    #[arg(long, default_value = "28", value_parser = cycle_length)]
    cycle_length: u32,

    /// Simulated time rate; 2.0 runs a sim-day in half the day length
    #[arg(long, default_value = "0.1", value_parser = speed_factor)]
    speed_factor: f64,

    /// Real seconds one simulated 24-hour day lasts at speed 1.0
    #[arg(long, default_value = "86400", value_parser = day_length)]
    day_length: f64,

    /// Moonlight color at full illumination, up to 6 hex digits
    #[arg(long, default_value = "FF0000", value_parser = Color::from_hex)]
    moon_color: Color,

    /// Time of day the feeder drops food (HH:MM)
    #[arg(long, default_value = "18:00", value_parser = parse_time_of_day)]
    feed_drop: NaiveTime,

    /// Time of day the feeder shakes and resets (HH:MM)
    #[arg(long, default_value = "20:00", value_parser = parse_time_of_day)]
    feed_reset: NaiveTime,

    /// Simulated minutes per tick
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    tick_minutes: u32,

    /// When `change` rebuilds the schedule
    #[arg(long, value_enum, default_value_t = RebuildPolicy::Always)]
    rebuild_policy: RebuildPolicy,

    /// Start the simulation right away
    #[arg(long)]
    start: bool,

    /// Serve the HTTP API on this port
    #[arg(long)]
    port: Option<u16>,

    /// Sysfs PWM chip driving the servos; servos are simulated without it
    #[arg(long)]
    pwm_chip: Option<PathBuf>,

    /// Light to drive
    #[arg(long, value_enum, default_value_t = DisplayKind::Log)]
    display: DisplayKind,

    /// Number of rows on the LED panel
    #[arg(long, default_value = "64")]
    rows: u32,

    /// Number of columns on the LED panel
    #[arg(long, default_value = "64")]
    cols: u32,

    /// LED panel brightness (0-100)
    #[arg(long, default_value = "75", value_parser = clap::value_parser!(u8).range(0..=100))]
    brightness: u8,

    /// Write the initial schedule to this file as JSON
    #[arg(long)]
    schedule_out: Option<PathBuf>,

    /// Pause between 1° feeder steps when dropping and resetting (ms)
    #[arg(long, default_value = "50")]
    feeder_step_ms: u64,

    /// Pause between 5° feeder steps when shaking (ms)
    #[arg(long, default_value = "100")]
    shake_step_ms: u64,

    /// Dispatcher idle poll interval (ms)
    #[arg(long, default_value = "100")]
    poll_ms: u64,
}

fn cycle_length(s: &str) -> Result<u32, String> {
    let value = s.parse::<u32>().map_err(|e| e.to_string())?;
    validate_cycle_length(value).map_err(|e| e.to_string())
}

fn speed_factor(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    validate_speed_factor(value).map_err(|e| e.to_string())
}

fn day_length(s: &str) -> Result<f64, String> {
    let value = s.parse::<f64>().map_err(|e| e.to_string())?;
    validate_day_length(value).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let settings = SimSettings {
        cycle_length: args.cycle_length,
        speed_factor: args.speed_factor,
        day_length_secs: args.day_length,
        moon_color: args.moon_color,
        feed_drop: args.feed_drop,
        feed_reset: args.feed_reset,
    };

    tracing::info!("Lunar cycle simulator v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Cycle: {} days, speed {}, {} s per sim-day",
        settings.cycle_length,
        settings.speed_factor,
        settings.day_length_secs
    );

    let state = SimulationState::new(settings, chrono::Local::now().naive_local())?;
    if let Some(path) = &args.schedule_out {
        report::export_json(state.schedule(), path)?;
    }

    let shared = SharedState::new(state);
    let status = Arc::new(Mutex::new(ClockStatus::default()));
    let running = setup_signal_handler()?;

    let actuator: Box<dyn Actuator> = match &args.pwm_chip {
        Some(chip) => Box::new(SysfsPwmActuator::open(chip)?),
        None => {
            tracing::info!("No PWM chip given, servos are simulated");
            Box::new(LoggingActuator::new())
        }
    };
    let display = open_display(&args)?;
    let motion = FeederMotion {
        sweep_delay: Duration::from_millis(args.feeder_step_ms),
        shake_delay: Duration::from_millis(args.shake_step_ms),
        shake_count: SHAKE_COUNT,
    };
    let clock = SimulationClock::new(actuator, display, motion, args.tick_minutes);

    // Every producer holds a Sender clone; the dispatcher owns the Receiver.
    let (tx, rx) = mpsc::channel();

    if let Some(port) = args.port {
        spawn_server(
            port,
            AppState {
                command_tx: tx.clone(),
                shared: shared.clone(),
                status: status.clone(),
            },
        )?;
    }

    // The reader is never joined: it may be blocked on stdin at exit.
    let reader_shared = shared.clone();
    thread::spawn(move || {
        CommandReader::new(io::stdin().lock(), io::stdout(), reader_shared).run(tx);
    });

    println!("{HELP}");

    let mut dispatcher = Dispatcher::new(shared, status, running, clock, io::stdout())
        .with_policy(args.rebuild_policy)
        .with_poll_interval(Duration::from_millis(args.poll_ms));
    if args.start {
        dispatcher.handle(Command::Start);
    }
    dispatcher.run(rx);

    tracing::info!("Shut down cleanly");
    Ok(())
}

fn open_display(args: &Args) -> Result<Box<dyn LightDisplay>, DisplayError> {
    let panel = PanelConfig::new(args.rows, args.cols);
    match args.display {
        DisplayKind::Log => Ok(Box::new(LogDisplay::new())),
        #[cfg(feature = "hardware")]
        DisplayKind::Matrix => Ok(Box::new(gibbous_rs::render::MatrixDisplay::spawn(
            panel,
            args.brightness,
        )?)),
        #[cfg(not(feature = "hardware"))]
        DisplayKind::Matrix => Err(DisplayError::Init(format!(
            "{}x{} matrix at {}% requested, but this build lacks the 'hardware' feature",
            panel.cols, panel.rows, args.brightness
        ))),
    }
}

/// Bind the HTTP API and serve it from a dedicated thread.
fn spawn_server(port: u16, state: AppState) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let addr = format!("0.0.0.0:{port}");
    let listener = runtime.block_on(tokio::net::TcpListener::bind(&addr))?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", port);

    thread::spawn(move || {
        let app = server::create_router(state);
        if let Err(e) = runtime.block_on(async { axum::serve(listener, app).await }) {
            tracing::error!("HTTP server stopped: {}", e);
        }
    });
    Ok(())
}
