//! End-to-end correction pipeline
//!
//! Summary tables → per-metric model fits → evaluation artifacts → batch
//! correction of report directories. The summary phase is the only fatal
//! one: without merged observations no models can be derived and the
//! batch never starts.

use crate::batch::{self, BatchConfig, BatchReport, Channel, CorrectionModelSet};
use crate::evaluate;
use crate::model::{CorrectionModel, Metric};
use crate::summary::{self, AccelColumns, PressureColumns, SummaryRecord};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Regression parameter table file name inside the results directory.
pub const PARAMS_TABLE: &str = "regression_parameters.csv";
/// Corrected per-trial summary table file name.
pub const SUMMARY_TABLE: &str = "corrected_summary.csv";
/// MAPE before/after table file name.
pub const MAPE_TABLE: &str = "mape_summary.csv";
/// Fitted model set audit file name.
pub const MODELS_JSON: &str = "correction_models.json";

/// Whole-pipeline configuration, constructed once (optionally from JSON)
/// and passed by reference.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Acceleration summary table (`;` separated, decimal comma)
    pub accel_table: PathBuf,
    /// Pressure summary table
    pub pressure_table: PathBuf,
    /// Directory for evaluation artifacts
    pub results_dir: PathBuf,
    /// Declared acceleration-table column names
    #[serde(default)]
    pub accel_columns: AccelColumns,
    /// Declared pressure-table column names
    #[serde(default)]
    pub pressure_columns: PressureColumns,
    /// Batch processor configuration
    #[serde(default)]
    pub batch: BatchConfig,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] when the file is missing or malformed.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw).map_err(|e| Error::Load(format!("{}: {e}", path.display())))
    }
}

/// What the pipeline produced.
#[derive(Debug)]
pub struct PipelineReport {
    /// Merged trials the models were derived from
    pub trials: usize,
    /// Metrics that received a fitted model
    pub models_fitted: usize,
    /// Batch result, absent when no channel model could be fitted
    pub batch: Option<BatchReport>,
}

/// Fit one model per metric from the merged summary records.
///
/// Metrics without enough valid pairs simply contribute no model.
#[must_use]
pub fn fit_models(records: &[SummaryRecord]) -> CorrectionModelSet {
    let mut fitted = Vec::new();
    for metric in Metric::ALL {
        let pairs: Vec<(f64, f64)> = records
            .iter()
            .filter_map(|r| {
                let (reference, simulated) = r.metric_pair(metric);
                Some((simulated?, reference?))
            })
            .collect();
        if let Some(model) = CorrectionModel::fit(metric, &pairs) {
            fitted.push(model);
        }
    }
    CorrectionModelSet::new(fitted)
}

/// Run the whole pipeline.
///
/// # Errors
///
/// Returns [`Error::Load`] when the summary tables cannot be loaded and
/// merged, or when the reports root is absent; evaluation-artifact write
/// failures propagate as [`Error::Write`] / [`Error::Csv`].
pub fn run(config: &PipelineConfig) -> Result<PipelineReport> {
    let records = summary::load_summary(
        &config.accel_table,
        &config.pressure_table,
        &config.accel_columns,
        &config.pressure_columns,
    )?;
    let models = fit_models(&records);
    info!(
        trials = records.len(),
        models = models.models().len(),
        "correction models derived"
    );

    evaluate::write_model_parameters(&config.results_dir.join(PARAMS_TABLE), &models)?;
    evaluate::write_corrected_summary(
        &config.results_dir.join(SUMMARY_TABLE),
        &records,
        &models,
    )?;
    evaluate::write_mape_summary(&config.results_dir.join(MAPE_TABLE), &records, &models)?;
    evaluate::write_models_json(&config.results_dir.join(MODELS_JSON), &models)?;

    // Peak-time models are summary-only: the batch needs at least one of
    // the three report channels to have a model
    let has_channel_model = [
        Channel::AccelerationMagnitude,
        Channel::CoupPressure,
        Channel::ContrecoupPressure,
    ]
    .iter()
    .any(|c| models.get(c.metric()).is_some());

    let batch = if has_channel_model {
        Some(batch::process_batch(&config.batch, &models)?)
    } else {
        warn!("no channel model fitted, report correction skipped");
        None
    };

    Ok(PipelineReport {
        trials: records.len(),
        models_fitted: models.models().len(),
        batch,
    })
}
