//! # biascorr: measurement bias correction for head-impact simulations
//!
//! Numerical head-impact models systematically over- or under-predict the
//! quantities measured in physical reference trials. This crate derives a
//! per-metric affine correction (`corrected = slope * simulated +
//! intercept`) from paired summary observations, validates it (R², slope
//! p-value, MAPE before/after), and applies it to the full time-series
//! report files of every simulation run in a batch:
//!
//! - acceleration magnitude, reconstructed from three orthogonal
//!   component files sharing a common time grid;
//! - coup and contrecoup intracranial pressure channels.
//!
//! Report files store mm/s² and MPa; models are derived in m/s² and mmHg,
//! so every channel round-trips through the unit converter with exact
//! reciprocal factors. Failures are isolated per (directory, channel)
//! unit: a malformed file or mismatched time grid never aborts the batch.
//!
//! ## Example
//!
//! ```rust,no_run
//! use biascorr::pipeline::{self, PipelineConfig};
//!
//! let config = PipelineConfig::from_json_file("pipeline.json")?;
//! let report = pipeline::run(&config)?;
//! if let Some(batch) = &report.batch {
//!     println!("corrected {} report files", batch.files_corrected);
//! }
//! # Ok::<(), biascorr::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod batch;
pub mod error;
pub mod evaluate;
pub mod magnitude;
pub mod model;
pub mod pipeline;
pub mod series;
pub mod summary;
pub mod units;

pub use batch::{BatchConfig, BatchReport, Channel, ChannelOutcome, CorrectionModelSet};
pub use error::{Error, Result};
pub use model::{CorrectionModel, Metric};
pub use series::TimeSeries;
pub use summary::SummaryRecord;
