//! Sleep History
//!
//! A newest-first log of `{date, hours}` entries kept as a JSON array under
//! one key of a [`KeyValueStore`].

use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, SomnusError};
use crate::tracker::store::KeyValueStore;

/// Store key holding the serialized history
pub const HISTORY_KEY: &str = "sleepHistory";

/// Line shown in place of an empty history
pub const EMPTY_PLACEHOLDER: &str = "No sleep history yet 🌙";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One logged night
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Calendar date, `YYYY-MM-DD`
    pub date: String,
    /// Hours slept, kept exactly as entered
    #[serde(deserialize_with = "string_or_number")]
    pub hours: String,
}

impl HistoryEntry {
    /// Render as a history line
    pub fn line(&self) -> String {
        format!("{}  {} hrs", self.date, self.hours)
    }
}

// Older stores wrote hours as a bare number.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected hours as a string or number, got {}",
            other
        ))),
    }
}

/// Render entries one per line, or the placeholder if there are none
pub fn render_lines(entries: &[HistoryEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec![EMPTY_PLACEHOLDER.to_string()];
    }
    entries.iter().map(HistoryEntry::line).collect()
}

/// Persistent sleep log over any key-value store
#[derive(Debug)]
pub struct SleepHistory<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SleepHistory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read all entries, newest first
    ///
    /// A missing key is an empty history. A corrupt value is an error.
    pub fn load(&self) -> Result<Vec<HistoryEntry>> {
        match self.store.get(HISTORY_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Validate and prepend one entry
    ///
    /// # Arguments
    /// * `date` - `YYYY-MM-DD`, surrounding whitespace ignored
    /// * `hours` - Finite non-negative number, stored as the trimmed text
    ///
    /// # Errors
    /// * `MissingField` - Either input is blank; nothing is written
    /// * `InvalidField` - Date or hours do not parse
    pub fn add(&mut self, date: &str, hours: &str) -> Result<HistoryEntry> {
        let date = date.trim();
        let hours = hours.trim();

        if date.is_empty() {
            return Err(SomnusError::MissingField { field: "date" });
        }
        if hours.is_empty() {
            return Err(SomnusError::MissingField { field: "hours" });
        }

        NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|e| SomnusError::InvalidField {
            field: "date",
            value: date.to_string(),
            reason: e.to_string(),
        })?;

        match hours.parse::<f64>() {
            Ok(h) if h.is_finite() && h >= 0.0 => {}
            _ => {
                return Err(SomnusError::InvalidField {
                    field: "hours",
                    value: hours.to_string(),
                    reason: "expected a non-negative number".to_string(),
                })
            }
        }

        let entry = HistoryEntry {
            date: date.to_string(),
            hours: hours.to_string(),
        };

        let mut entries = self.load()?;
        entries.insert(0, entry.clone());
        self.save(&entries)?;

        info!("Logged {} hrs for {}", entry.hours, entry.date);
        Ok(entry)
    }

    /// Log a timed session against a date, hours rounded to one decimal
    pub fn add_session(&mut self, date: NaiveDate, duration: Duration) -> Result<HistoryEntry> {
        let hours = duration.as_secs_f64() / 3600.0;
        self.add(
            &date.format(DATE_FORMAT).to_string(),
            &format!("{:.1}", hours),
        )
    }

    /// Delete the whole history
    pub fn clear(&mut self) -> Result<()> {
        self.store.remove(HISTORY_KEY)?;
        info!("Sleep history cleared");
        Ok(())
    }

    fn save(&mut self, entries: &[HistoryEntry]) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.store.set(HISTORY_KEY, &raw)?;
        debug!("Stored {} history entries", entries.len());
        Ok(())
    }
}
