//! Sleep Session Timer
//!
//! Stopwatch that measures a sleep session from start to stop and refreshes
//! an `HH:MM:SS` readout once per tick.
//!
//! The timer does not own a thread. Whoever runs the event loop asks
//! [`SessionTimer::next_deadline`] how long it may sleep and calls
//! [`SessionTimer::poll`] when it wakes; due ticks render, others are no-ops.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, info};

/// Status line shown while a session is being tracked
pub const STATUS_STARTED: &str = "Tracking started... Sleep well 🌙";

/// Status line shown after a session ends
pub const STATUS_STOPPED: &str =
    "Tracking stopped ✅ Press \"Start Tracking Sleep\" when ready again.";

/// Readout shown at the start of every session
pub const ZERO_ELAPSED: &str = "00:00:00";

/// Default refresh period of the readout (1 Hz)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// Formatting
// ============================================================================

/// Format elapsed milliseconds as zero-padded `HH:MM:SS`
///
/// The hour field grows past two digits instead of wrapping, so a 100-hour
/// session reads `100:00:00`.
///
/// # Example
/// ```
/// use somnus::tracker::format_elapsed;
/// assert_eq!(format_elapsed(3_661_000), "01:01:01");
/// assert_eq!(format_elapsed(999), "00:00:00");
/// ```
pub fn format_elapsed(ms: u64) -> String {
    let s = ms / 1000;
    let h = s / 3600;
    let m = (s % 3600) / 60;
    let sec = s % 60;
    format!("{:02}:{:02}:{:02}", h, m, sec)
}

/// Format a [`Duration`] as `HH:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    format_elapsed(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

// ============================================================================
// Clock
// ============================================================================

/// Source of the current instant
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock for deterministic tests and replays
///
/// Clones share the same time, so a test can keep one handle and move the
/// other into a timer.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

// ============================================================================
// Display Sink
// ============================================================================

/// Where the timer renders its output
///
/// Every method defaults to a no-op; `()` is a headless display.
pub trait TimerDisplay {
    /// Replace the `HH:MM:SS` readout
    fn show_elapsed(&mut self, _text: &str) {}

    /// Replace the status line
    fn show_status(&mut self, _text: &str) {}

    /// Enable or disable the start and stop controls
    fn set_controls(&mut self, _start_enabled: bool, _stop_enabled: bool) {}
}

impl TimerDisplay for () {}

// ============================================================================
// Session Timer
// ============================================================================

/// Running flag plus the instant the session began
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerState {
    pub running: bool,
    pub start_instant: Option<Instant>,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.running {
            write!(f, "Running")
        } else {
            write!(f, "Stopped")
        }
    }
}

/// Stopwatch for one sleep session at a time
pub struct SessionTimer<D: TimerDisplay, C: Clock = SystemClock> {
    display: D,
    clock: C,
    state: TimerState,
    interval: Duration,
    /// Next due tick; `Some` only while running
    next_tick: Option<Instant>,
    last_session: Option<Duration>,
}

impl<D: TimerDisplay> SessionTimer<D, SystemClock> {
    /// Create a 1 Hz timer on the wall clock
    pub fn new(display: D) -> Self {
        Self::with_clock(display, SystemClock, DEFAULT_TICK_INTERVAL)
    }
}

impl<D: TimerDisplay, C: Clock> SessionTimer<D, C> {
    /// Create a timer with an explicit clock and tick period
    ///
    /// Sub-millisecond periods are raised to one millisecond.
    pub fn with_clock(mut display: D, clock: C, interval: Duration) -> Self {
        display.set_controls(true, false);
        Self {
            display,
            clock,
            state: TimerState::default(),
            interval: interval.max(Duration::from_millis(1)),
            next_tick: None,
            last_session: None,
        }
    }

    /// Begin a session; no-op if one is already running
    pub fn start(&mut self) {
        if self.state.running {
            debug!("[TIMER] Already running");
            return;
        }

        let now = self.clock.now();
        self.state = TimerState {
            running: true,
            start_instant: Some(now),
        };
        self.next_tick = Some(now + self.interval);

        self.display.show_status(STATUS_STARTED);
        self.display.set_controls(false, true);
        self.display.show_elapsed(ZERO_ELAPSED);
        info!("Sleep session started");
    }

    /// End the session; no-op if none is running
    pub fn stop(&mut self) {
        if !self.state.running {
            debug!("[TIMER] Not running");
            return;
        }

        let elapsed = self.elapsed().unwrap_or_default();
        self.next_tick = None;
        self.state = TimerState::default();
        self.last_session = Some(elapsed);

        self.display.set_controls(true, false);
        self.display.show_status(STATUS_STOPPED);
        info!("Sleep session stopped after {}", format_duration(elapsed));
    }

    /// Render the readout if a tick is due
    ///
    /// Ticks missed while the caller was busy are coalesced into one render.
    /// Returns true if the readout was refreshed.
    pub fn poll(&mut self) -> bool {
        let Some(due) = self.next_tick else {
            return false;
        };
        let now = self.clock.now();
        if now < due {
            return false;
        }

        let text = self.elapsed().map(format_duration).unwrap_or_default();
        self.display.show_elapsed(&text);

        let mut next = due + self.interval;
        while next <= now {
            next += self.interval;
        }
        self.next_tick = Some(next);
        true
    }

    /// When the next tick is due, if running
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Time since the session started, if running
    pub fn elapsed(&self) -> Option<Duration> {
        self.state
            .start_instant
            .map(|start| self.clock.now().saturating_duration_since(start))
    }

    /// Length of the most recently stopped session
    pub fn last_session(&self) -> Option<Duration> {
        self.last_session
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }
}

// ============================================================================
// Tests
// ============================================================================
