use std::path::PathBuf;
use thiserror::Error;

use crate::naming::FileRole;

/// The main error type for caseiter operations.
#[derive(Debug, Error)]
pub enum CaseIterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse batch table {path}: {source}")]
    CsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to parse settings from {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Bad table structure, out-of-range start index or missing columns.
    /// Fatal to `start`; the batch does not begin.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A required file could not be resolved for a case.
    #[error("Missing data for case {case}: {message}")]
    MissingData { case: String, message: String },

    /// Loading a file through the case IO adapter failed.
    #[error("Failed to load {role} from {path}: {source}")]
    Load {
        path: PathBuf,
        role: FileRole,
        #[source]
        source: std::io::Error,
    },

    /// Persisting a mask failed. The session that owns it stays open.
    #[error("Failed to save {role} to {path}: {source}")]
    Save {
        path: PathBuf,
        role: FileRole,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid reader initials '{initials}': {message}")]
    InvalidReader { initials: String, message: String },

    #[error("No batch is running")]
    NotRunning,

    #[error("No {role} is loaded in the current case")]
    UnknownRole { role: FileRole },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl CaseIterError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        CaseIterError::InvalidInput {
            message: message.into(),
        }
    }
}
