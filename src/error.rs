//! Error handling for Somnus
//!
//! Every fallible operation in the library returns [`SomnusError`]. Errors
//! carry enough context to be shown to the user directly.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::NodeId;

/// Result type alias for Somnus operations
pub type Result<T> = std::result::Result<T, SomnusError>;

/// Main error type for Somnus operations
#[derive(Error, Debug)]
pub enum SomnusError {
    // File Errors
    #[error("Failed to read file: {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}: {source}")]
    FileWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory creation failed: {path}: {source}")]
    DirectoryCreateError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Input Errors
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid {field} '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown sound kind: {name}")]
    UnknownSoundKind { name: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Audio Graph Errors
    #[error("Audio node not found: {node}")]
    NodeNotFound { node: NodeId },

    #[error("Audio node {node} is not a scheduled source")]
    NotASource { node: NodeId },

    #[error("Invalid state for audio node {node}: {reason}")]
    InvalidNodeState { node: NodeId, reason: &'static str },

    #[error("Connecting {from} to {to} would create a cycle")]
    GraphCycle { from: NodeId, to: NodeId },

    #[error("Node type '{node_type}' has no '{param}' parameter")]
    UnsupportedParam {
        node_type: &'static str,
        param: &'static str,
    },

    #[error("Audio context is closed")]
    ContextClosed,

    #[error("Audio export failed: {reason}")]
    AudioExport { reason: String },

    // Serialization Errors
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SomnusError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SomnusError::FileReadError { .. } => "FILE_READ_ERROR",
            SomnusError::FileWriteError { .. } => "FILE_WRITE_ERROR",
            SomnusError::DirectoryCreateError { .. } => "DIRECTORY_CREATE_ERROR",
            SomnusError::MissingField { .. } => "MISSING_FIELD",
            SomnusError::InvalidField { .. } => "INVALID_FIELD",
            SomnusError::UnknownSoundKind { .. } => "UNKNOWN_SOUND_KIND",
            SomnusError::InvalidConfig { .. } => "INVALID_CONFIG",
            SomnusError::NodeNotFound { .. } => "NODE_NOT_FOUND",
            SomnusError::NotASource { .. } => "NOT_A_SOURCE",
            SomnusError::InvalidNodeState { .. } => "INVALID_NODE_STATE",
            SomnusError::GraphCycle { .. } => "GRAPH_CYCLE",
            SomnusError::UnsupportedParam { .. } => "UNSUPPORTED_PARAM",
            SomnusError::ContextClosed => "CONTEXT_CLOSED",
            SomnusError::AudioExport { .. } => "AUDIO_EXPORT_ERROR",
            SomnusError::Serialization(_) => "SERIALIZATION_ERROR",
            SomnusError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if the user can fix this error by retrying with different input
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SomnusError::MissingField { .. }
                | SomnusError::InvalidField { .. }
                | SomnusError::UnknownSoundKind { .. }
                | SomnusError::InvalidNodeState { .. }
                | SomnusError::FileWriteError { .. }
        )
    }

    /// Returns a user-facing recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SomnusError::MissingField { .. } => Some("Enter both a date and a number of hours."),
            SomnusError::InvalidField { field: "date", .. } => {
                Some("Dates are written as YYYY-MM-DD, e.g. 2024-01-31.")
            }
            SomnusError::InvalidField { field: "hours", .. } => {
                Some("Hours must be a non-negative number, e.g. 7.5.")
            }
            SomnusError::UnknownSoundKind { .. } => Some("Available sounds: white, rain, ocean."),
            SomnusError::Serialization(_) => {
                Some("The history store is corrupt; clear it with 'somnus-cli history clear'.")
            }
            SomnusError::InvalidConfig { .. } => Some("Check the values in your config file."),
            _ => None,
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            SomnusError::MissingField { .. } => "Enter date and hours".to_string(),
            SomnusError::UnknownSoundKind { name } => {
                format!("There's no '{}' soundscape. Try white, rain or ocean.", name)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SomnusError::MissingField { field: "date" };
        assert_eq!(err.error_code(), "MISSING_FIELD");

        let err = SomnusError::NotASource { node: NodeId::new(3) };
        assert_eq!(err.error_code(), "NOT_A_SOURCE");
    }

    #[test]
    fn test_missing_field_friendly_message() {
        let err = SomnusError::MissingField { field: "hours" };
        assert_eq!(err.friendly_message(), "Enter date and hours");
        assert!(err.is_recoverable());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_node_errors_display_node_id() {
        let err = SomnusError::InvalidNodeState {
            node: NodeId::new(7),
            reason: "already stopped",
        };
        assert_eq!(
            err.to_string(),
            "Invalid state for audio node #7: already stopped"
        );
    }
}
