//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use log::{info, warn};

use crate::cli::MAX_RENDER_SECONDS;
use crate::cli::session::{ConsoleDisplay, Flow, Session, SessionCommand, HELP_TEXT};
use crate::config::SomnusConfig;
use crate::engine::buffer::{calculate_peak, calculate_rms};
use crate::engine::{export_wav, ExportFormat, SoundKind, SoundscapeEngine};
use crate::error::{Result, SomnusError};
use crate::tracker::{
    format_duration, render_lines, Clock, FileStore, SessionTimer, SleepHistory, SystemClock,
    TimerDisplay,
};

/// Forward stdin lines over a channel so the caller can wait with a timeout.
///
/// The reader thread ends when stdin closes or the receiver is dropped.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Wait for the next input line, waking to poll the timer when a tick is due.
///
/// Returns `None` once stdin is closed.
fn next_line<D: TimerDisplay, C: Clock>(
    rx: &Receiver<String>,
    timer: &mut SessionTimer<D, C>,
) -> Option<String> {
    loop {
        let received = match timer.next_deadline() {
            Some(deadline) => rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(line) => return Some(line),
            Err(RecvTimeoutError::Timeout) => {
                timer.poll();
            }
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

fn open_history(store_path: &Path) -> SleepHistory<FileStore> {
    SleepHistory::new(FileStore::new(store_path))
}

fn timer_interval(config: &SomnusConfig) -> Duration {
    Duration::from_millis(config.tick_interval_ms)
}

/// Time one session in the terminal until Enter is pressed.
pub fn run_timer(config: &SomnusConfig, store_path: &Path, log_session: bool) -> Result<()> {
    let mut timer =
        SessionTimer::with_clock(ConsoleDisplay::new(true), SystemClock, timer_interval(config));
    let rx = spawn_stdin_reader();

    println!("Press Enter to stop tracking.");
    timer.start();
    if next_line(&rx, &mut timer).is_none() {
        warn!("Input closed; stopping the timer");
    }
    timer.stop();

    let Some(duration) = timer.last_session() else {
        return Ok(());
    };
    println!("You slept for {}", format_duration(duration));

    if log_session {
        let mut history = open_history(store_path);
        let entry = history.add_session(Local::now().date_naive(), duration)?;
        println!("Logged {}", entry.line());
    }
    Ok(())
}

/// Print the sleep history, newest first.
pub fn history_list(store_path: &Path) -> Result<()> {
    info!("Reading history from: {}", store_path.display());

    let history = open_history(store_path);
    for line in render_lines(&history.load()?) {
        println!("{}", line);
    }
    Ok(())
}

/// Log one night.
pub fn history_add(store_path: &Path, date: &str, hours: &str) -> Result<()> {
    let mut history = open_history(store_path);
    let entry = history.add(date, hours)?;
    println!("Logged {}", entry.line());
    Ok(())
}

/// Delete the whole history.
pub fn history_clear(store_path: &Path) -> Result<()> {
    let mut history = open_history(store_path);
    history.clear()?;
    println!("Sleep history cleared");
    Ok(())
}

/// Render a soundscape offline and write it to a WAV file.
pub fn render(
    config: &SomnusConfig,
    kind: &str,
    seconds: f32,
    volume: Option<u32>,
    output: &Path,
    bit_depth: u16,
) -> Result<()> {
    let kind: SoundKind = kind.parse()?;
    if !(seconds.is_finite() && seconds > 0.0 && seconds <= MAX_RENDER_SECONDS) {
        return Err(SomnusError::InvalidField {
            field: "seconds",
            value: seconds.to_string(),
            reason: format!("must be within (0, {}]", MAX_RENDER_SECONDS),
        });
    }
    let format = ExportFormat::new(bit_depth)?;

    let mut engine = SoundscapeEngine::new(config);
    if let Some(percent) = volume {
        engine.set_volume(percent);
    }
    engine.play(kind)?;

    info!(
        "Rendering {}s of {} at {}",
        seconds,
        kind,
        engine.volume_label()
    );
    let buffer = engine.render_seconds(seconds);
    engine.stop();

    export_wav(&buffer, output, format)?;
    println!(
        "Rendered {:.1}s of {} noise to {} (peak {:.1} dB, RMS {:.1} dB)",
        buffer.duration_secs(),
        kind,
        output.display(),
        calculate_peak(&buffer),
        calculate_rms(&buffer)
    );
    Ok(())
}

/// Run the interactive session until `quit` or end of input.
pub fn run_session(config: &SomnusConfig, store_path: &Path) -> Result<()> {
    let timer =
        SessionTimer::with_clock(ConsoleDisplay::new(false), SystemClock, timer_interval(config));
    let mut session = Session::new(
        timer,
        SoundscapeEngine::new(config),
        open_history(store_path),
    );
    let rx = spawn_stdin_reader();
    let mut stdout = io::stdout();

    println!("Somnus v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", HELP_TEXT);

    while let Some(line) = next_line(&rx, session.timer_mut()) {
        let command = match SessionCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{}", message);
                continue;
            }
        };

        match session.execute(command, &mut stdout) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => print_error(&e),
        }
        stdout.flush()?;
    }

    session.shutdown();
    Ok(())
}

/// Print a recoverable error with its suggestion.
pub fn print_error(err: &SomnusError) {
    println!("{}", err.friendly_message());
    if let Some(suggestion) = err.recovery_suggestion() {
        println!("  {}", suggestion);
    }
}
