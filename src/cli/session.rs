//! Interactive session
//!
//! A line-oriented control surface over one timer, one soundscape engine and
//! one sleep history. Lines are parsed into [`SessionCommand`]s and applied by
//! [`Session::execute`]; the event loop that feeds them lives in
//! [`crate::cli::commands::run_session`].

use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Local;
use log::{debug, info};

use crate::cli::MAX_RENDER_SECONDS;
use crate::engine::{export_wav, ExportFormat, SoundKind, SoundscapeEngine};
use crate::error::Result;
use crate::tracker::{
    format_duration, render_lines, Clock, KeyValueStore, SessionTimer, SleepHistory,
    SystemClock, TimerDisplay,
};

pub const HELP_TEXT: &str = "\
Commands:
  start                 Start tracking sleep
  stop                  Stop tracking
  play <white|rain|ocean>
                        Play a soundscape
  silence               Stop the soundscape
  volume <0-100>        Set the master volume
  add <date> <hours>    Log a night (date as YYYY-MM-DD)
  log                   Log the last tracked session for today
  history               Show the sleep history
  clear                 Delete the sleep history
  render <secs> <file>  Write the playing soundscape to a WAV file
  graph                 Dump the audio graph as JSON
  status                Show timer and audio state
  help                  Show this help
  quit                  Leave the session";

// ============================================================================
// Console Display
// ============================================================================

/// Timer display that writes to the terminal
///
/// In live mode every tick rewrites the readout in place. Otherwise the last
/// readout is only remembered and printed on demand.
#[derive(Debug, Clone)]
pub struct ConsoleDisplay {
    live: bool,
    elapsed: String,
    start_enabled: bool,
    stop_enabled: bool,
}

impl ConsoleDisplay {
    pub fn new(live: bool) -> Self {
        Self {
            live,
            elapsed: crate::tracker::ZERO_ELAPSED.to_string(),
            start_enabled: true,
            stop_enabled: false,
        }
    }

    /// The most recent readout
    pub fn elapsed(&self) -> &str {
        &self.elapsed
    }

    pub fn start_enabled(&self) -> bool {
        self.start_enabled
    }

    pub fn stop_enabled(&self) -> bool {
        self.stop_enabled
    }
}

impl TimerDisplay for ConsoleDisplay {
    fn show_elapsed(&mut self, text: &str) {
        self.elapsed = text.to_string();
        if self.live {
            let mut stdout = io::stdout();
            let _ = write!(stdout, "\r⏱  {}", text);
            let _ = stdout.flush();
        }
    }

    fn show_status(&mut self, text: &str) {
        if self.live {
            println!();
        }
        println!("{}", text);
    }

    fn set_controls(&mut self, start_enabled: bool, stop_enabled: bool) {
        self.start_enabled = start_enabled;
        self.stop_enabled = stop_enabled;
        debug!("[CONTROLS] start={} stop={}", start_enabled, stop_enabled);
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Start,
    Stop,
    Play(SoundKind),
    Silence,
    Volume(u32),
    Add { date: String, hours: String },
    Log,
    History,
    Clear,
    Render { seconds: f32, path: PathBuf },
    Graph,
    Status,
    Help,
    Quit,
}

/// The remainder of `line` after its first `count` words, outer whitespace trimmed
fn skip_words(line: &str, count: usize) -> &str {
    let mut rest = line.trim_start();
    for _ in 0..count {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest.trim_end()
}

impl SessionCommand {
    /// Parse one input line
    ///
    /// Returns `Ok(None)` for blank lines and `Err` with a message the user
    /// should see for anything unrecognised.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("start", []) => SessionCommand::Start,
            ("stop", []) => SessionCommand::Stop,
            ("play", [kind]) => SessionCommand::Play(kind.parse().map_err(
                |e: crate::error::SomnusError| e.friendly_message(),
            )?),
            ("silence", []) => SessionCommand::Silence,
            ("volume", [value]) => {
                let percent = value
                    .parse::<u32>()
                    .ok()
                    .filter(|p| *p <= 100)
                    .ok_or_else(|| format!("Volume must be 0-100, got '{}'", value))?;
                SessionCommand::Volume(percent)
            }
            ("add", [date, hours]) => SessionCommand::Add {
                date: date.to_string(),
                hours: hours.to_string(),
            },
            // Missing fields still reach validation so the user sees its message.
            ("add", [date]) => SessionCommand::Add {
                date: date.to_string(),
                hours: String::new(),
            },
            ("add", []) => SessionCommand::Add {
                date: String::new(),
                hours: String::new(),
            },
            ("log", []) => SessionCommand::Log,
            ("history", []) => SessionCommand::History,
            ("clear", []) => SessionCommand::Clear,
            // The path is the rest of the line, so it may contain spaces.
            ("render", [seconds, _, ..]) => {
                let seconds = seconds
                    .parse::<f32>()
                    .ok()
                    .filter(|s| s.is_finite() && *s > 0.0 && *s <= MAX_RENDER_SECONDS)
                    .ok_or_else(|| {
                        format!(
                            "Render length must be within (0, {}] seconds, got '{}'",
                            MAX_RENDER_SECONDS, seconds
                        )
                    })?;
                SessionCommand::Render {
                    seconds,
                    path: PathBuf::from(skip_words(line, 2)),
                }
            }
            ("graph", []) => SessionCommand::Graph,
            ("status", []) => SessionCommand::Status,
            ("help", []) | ("?", []) => SessionCommand::Help,
            ("quit", []) | ("exit", []) => SessionCommand::Quit,
            (other, _) => {
                return Err(format!(
                    "Unknown command or wrong arguments: '{}'. Type 'help'.",
                    other
                ))
            }
        };
        Ok(Some(command))
    }
}

/// Whether the event loop should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

// ============================================================================
// Session
// ============================================================================

/// Timer, soundscape engine and history driven by one user
pub struct Session<S: KeyValueStore, D: TimerDisplay, C: Clock = SystemClock> {
    timer: SessionTimer<D, C>,
    engine: SoundscapeEngine,
    history: SleepHistory<S>,
    export_format: ExportFormat,
}

impl<S: KeyValueStore, D: TimerDisplay, C: Clock> Session<S, D, C> {
    pub fn new(timer: SessionTimer<D, C>, engine: SoundscapeEngine, history: SleepHistory<S>) -> Self {
        Self {
            timer,
            engine,
            history,
            export_format: ExportFormat::default(),
        }
    }

    pub fn timer(&self) -> &SessionTimer<D, C> {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut SessionTimer<D, C> {
        &mut self.timer
    }

    pub fn engine(&self) -> &SoundscapeEngine {
        &self.engine
    }

    pub fn history(&self) -> &SleepHistory<S> {
        &self.history
    }

    /// Apply one command, writing any user-facing output to `out`
    pub fn execute<W: Write>(&mut self, command: SessionCommand, out: &mut W) -> Result<Flow> {
        debug!("[SESSION] {:?}", command);
        match command {
            SessionCommand::Start => self.timer.start(),
            SessionCommand::Stop => self.timer.stop(),
            SessionCommand::Play(kind) => {
                self.engine.play(kind)?;
                writeln!(out, "Playing {} ({})", kind, self.engine.volume_label())?;
            }
            SessionCommand::Silence => {
                if self.engine.is_stop_enabled() {
                    self.engine.stop();
                    writeln!(out, "Soundscape stopped")?;
                } else {
                    writeln!(out, "Nothing is playing")?;
                }
            }
            SessionCommand::Volume(percent) => {
                self.engine.set_volume(percent);
                writeln!(out, "Volume {}", self.engine.volume_label())?;
            }
            SessionCommand::Add { date, hours } => {
                let entry = self.history.add(&date, &hours)?;
                writeln!(out, "Logged {}", entry.line())?;
            }
            SessionCommand::Log => match self.timer.last_session() {
                Some(duration) => {
                    let entry = self.history.add_session(Local::now().date_naive(), duration)?;
                    writeln!(out, "Logged {}", entry.line())?;
                }
                None => writeln!(out, "No finished session to log yet")?,
            },
            SessionCommand::History => {
                for line in render_lines(&self.history.load()?) {
                    writeln!(out, "{}", line)?;
                }
            }
            SessionCommand::Clear => {
                self.history.clear()?;
                writeln!(out, "Sleep history cleared")?;
            }
            SessionCommand::Render { seconds, path } => {
                let buffer = self.engine.render_seconds(seconds);
                export_wav(&buffer, &path, self.export_format)?;
                writeln!(out, "Wrote {:.1}s to {}", buffer.duration_secs(), path.display())?;
            }
            SessionCommand::Graph => match self.engine.context() {
                Some(graph) => {
                    let json = serde_json::to_string_pretty(&graph.snapshot())?;
                    writeln!(out, "{}", json)?;
                }
                None => writeln!(out, "No audio context yet; play a sound first")?,
            },
            SessionCommand::Status => self.write_status(out)?,
            SessionCommand::Help => writeln!(out, "{}", HELP_TEXT)?,
            SessionCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn write_status<W: Write>(&self, out: &mut W) -> Result<()> {
        match self.timer.elapsed() {
            Some(elapsed) => writeln!(out, "Timer:  running {}", format_duration(elapsed))?,
            None => writeln!(out, "Timer:  stopped")?,
        }
        if let Some(last) = self.timer.last_session() {
            writeln!(out, "Last:   {}", format_duration(last))?;
        }
        writeln!(
            out,
            "Audio:  {} ({} nodes)",
            self.engine.state(),
            self.engine.active_nodes().len()
        )?;
        writeln!(out, "Volume: {}", self.engine.volume_label())?;
        Ok(())
    }

    /// Stop the timer and any soundscape
    pub fn shutdown(&mut self) {
        self.timer.stop();
        let report = self.engine.stop();
        info!(
            "Session closed ({} nodes released, {} teardown errors ignored)",
            report.released, report.errors_discarded
        );
    }
}
