// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VqError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Failed to parse command output: {0}")]
    Parse(String),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Plotting error: {0}")]
    Plot(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("No {0} frames were collected")]
    EmptySample(&'static str),

    #[error("{metric} stream failed near frame {frame}: {reason}")]
    IncompleteSample {
        metric: &'static str,
        frame: u64,
        reason: String,
    },

    #[error("Result tables disagree on metric columns: {0}")]
    SchemaMismatch(String),

    #[error("Encode at quality {quality} failed: {reason}")]
    EncodeFailure { quality: u32, reason: String },
}

// Define a standard Result type for the crate
pub type Result<T> = std::result::Result<T, VqError>;
