//! Error types for biascorr
//!
//! Every variant maps to a skip/failure outcome local to one (directory,
//! channel) unit of the batch, except `Load`, which is fatal to the phase
//! that raised it (summary derivation or batch start-up).

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// biascorr error types
#[derive(Error, Debug)]
pub enum Error {
    /// Summary table missing/unparsable, or reports root absent
    #[error("Load error: {0}")]
    Load(String),

    /// Report file contained zero valid time/value pairs
    #[error("No valid time/value pairs found in {0}")]
    EmptyData(String),

    /// One or more of the three orthogonal components is absent
    #[error("Acceleration component missing: {0}")]
    ComponentMissing(String),

    /// Component time axes disagree beyond tolerance
    #[error("Time grids do not match across components: {0}")]
    TimeGridMismatch(String),

    /// Corrected output could not be persisted
    #[error("Write error: {0}")]
    Write(String),

    /// Delimited-table error (summary tables, evaluation artifacts)
    #[error("Table error: {0}")]
    Csv(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}
