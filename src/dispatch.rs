//! Main-thread dispatcher: applies operator commands between idle polls.
//!
//! The dispatcher is the only writer of the [`SharedState`]. It never
//! blocks on input: each poll drains whatever the console reader and the
//! HTTP handlers queued, applies it, and goes back to sleep for a short
//! interval.
//!
//! ## Rust concepts
//! - `try_recv()` to drain a channel without blocking
//! - `JoinHandle<T>` to get a value back from a finished thread
//! - `Option::take()` to move ownership out of a struct field

use crate::clock::{ClockStatus, SimulationClock};
use crate::command::{Command, PlotKind};
use crate::report;
use crate::state::{ParamUpdate, RebuildPolicy, SharedState};
use crate::{is_running, request_stop};
use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Dispatcher<W> {
    shared: SharedState,
    status: Arc<Mutex<ClockStatus>>,
    running: Arc<AtomicBool>,
    policy: RebuildPolicy,
    out: W,
    poll_interval: Duration,
    /// Present while the clock is idle
    clock: Option<SimulationClock>,
    /// Present while the clock thread exists
    handle: Option<JoinHandle<SimulationClock>>,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(
        shared: SharedState,
        status: Arc<Mutex<ClockStatus>>,
        running: Arc<AtomicBool>,
        clock: SimulationClock,
        out: W,
    ) -> Self {
        Self {
            shared,
            status,
            running,
            policy: RebuildPolicy::default(),
            out,
            poll_interval: Duration::from_millis(100),
            clock: Some(clock),
            handle: None,
        }
    }

    pub fn with_policy(mut self, policy: RebuildPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Whether the clock thread is still ticking.
    pub fn clock_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Poll `rx` until quit, Ctrl+C, or every producer is gone while the
    /// clock is idle.
    pub fn run(mut self, rx: Receiver<Command>) {
        while is_running(&self.running) {
            if !self.poll(&rx) {
                break;
            }
            thread::sleep(self.poll_interval);
        }
        self.shutdown();
    }

    /// Drain every queued command. Returns `false` once the dispatcher
    /// should exit.
    pub fn poll(&mut self, rx: &Receiver<Command>) -> bool {
        loop {
            match rx.try_recv() {
                Ok(cmd) => {
                    if !self.handle(cmd) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return self.clock_active(),
            }
        }
    }

    /// Apply one command. Returns `false` for `Quit`.
    pub fn handle(&mut self, cmd: Command) -> bool {
        let result = match cmd {
            Command::Plot(kind) => self.plot(kind),
            Command::ChangeParams(update) => self.change(&update),
            Command::Status => {
                let clock = self
                    .status
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                report::write_status(&mut self.out, &self.shared.snapshot(), &clock)
            }
            Command::Start => {
                self.start();
                Ok(())
            }
            Command::Quit => {
                tracing::info!("Quit requested");
                self.shutdown();
                return false;
            }
        };

        if let Err(e) = result.and_then(|()| self.out.flush()) {
            tracing::warn!("Could not write report: {}", e);
        }
        true
    }

    fn plot(&mut self, kind: PlotKind) -> io::Result<()> {
        let state = self.shared.snapshot();
        let schedule = state.schedule();
        match kind {
            PlotKind::Times => report::write_times(&mut self.out, schedule),
            PlotKind::Phases => report::write_phases(&mut self.out, schedule),
            PlotKind::Angles => report::write_angles(&mut self.out, schedule),
            PlotKind::Altitude(day) => match schedule.get(day) {
                Some(entry) => report::write_altitude(&mut self.out, entry, state.cycle_start),
                None => {
                    tracing::warn!("Altitude plot for day {} dropped: out of range", day);
                    writeln!(
                        self.out,
                        "Day index {day} is out of range [0, {}].",
                        schedule.len().saturating_sub(1)
                    )
                }
            },
        }
    }

    fn change(&mut self, update: &ParamUpdate) -> io::Result<()> {
        if let Err(e) = update.validate() {
            return writeln!(self.out, "Options not changed: {e}");
        }

        let current = self.shared.snapshot();
        let now = chrono::Local::now().naive_local();
        match current.apply(update, self.policy, now) {
            Ok(Some(next)) => {
                tracing::info!(
                    "Schedule rebuilt for {} days, cycle restarts at {}",
                    next.settings.cycle_length,
                    next.cycle_start.format("%Y-%m-%d %H:%M")
                );
                self.shared.replace(next);
                writeln!(self.out, "Options updated.")
            }
            Ok(None) => writeln!(self.out, "Nothing changed."),
            Err(e) => writeln!(self.out, "Options not changed: {e}"),
        }
    }

    fn start(&mut self) {
        if self.clock_active() {
            tracing::info!("Simulation already running");
            return;
        }
        self.reclaim_clock();

        let Some(clock) = self.clock.take() else {
            tracing::error!("Simulation clock was lost, cannot start");
            return;
        };
        let shared = self.shared.clone();
        let status = self.status.clone();
        let running = self.running.clone();
        self.handle = Some(thread::spawn(move || clock.run(shared, status, running)));
    }

    /// Take the clock back from a finished thread.
    fn reclaim_clock(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(clock) => self.clock = Some(clock),
                Err(_) => tracing::error!("Simulation thread panicked"),
            }
        }
    }

    /// Stop the clock and wait for its thread.
    fn shutdown(&mut self) {
        request_stop(&self.running);
        self.reclaim_clock();
    }
}
