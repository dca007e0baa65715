//! Batched correction of per-simulation report directories
//!
//! Each immediate subdirectory of the reports root is one simulation run
//! holding three acceleration component files and two pressure files. The
//! processor drives read → reconstruct → correct → write per channel,
//! isolating every failure to its own (directory, channel) unit: one bad
//! grid or missing file never blocks the other channels of that directory
//! or any other directory.
//!
//! Correction models are immutable shared state; with the `rayon` feature
//! (default) directories are processed in parallel and per-directory
//! outcomes are combined by a fold, never by shared mutable counters.

use crate::magnitude::{self, DEFAULT_GRID_TOLERANCE};
use crate::model::{apply_correction, CorrectionModel, Metric};
use crate::series::TimeSeries;
use crate::units;
use crate::{Error, Result};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The three time-series channels the batch corrects.
///
/// Peak-time models are fitted and reported from summary data but have no
/// stored report channel, so they never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Reconstructed acceleration magnitude
    AccelerationMagnitude,
    /// Coup pressure report file
    CoupPressure,
    /// Contrecoup pressure report file
    ContrecoupPressure,
}

impl Channel {
    /// Metric whose model corrects this channel.
    #[must_use]
    pub const fn metric(self) -> Metric {
        match self {
            Self::AccelerationMagnitude => Metric::AccelerationMagnitude,
            Self::CoupPressure => Metric::CoupPressure,
            Self::ContrecoupPressure => Metric::ContrecoupPressure,
        }
    }
}

/// Why a (directory, channel) unit was skipped rather than processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No correction model was fitted for the channel's metric
    NoModel,
    /// A required input file is absent
    MissingInput,
    /// The input file exists but holds no valid data lines
    EmptyInput,
}

/// Outcome of one (directory, channel) unit.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOutcome {
    /// Corrected series written successfully
    Corrected,
    /// Unit skipped before any correction work
    Skipped(SkipReason),
    /// Unit failed mid-pipeline (parse, grid mismatch, write)
    Failed(String),
}

/// Per-directory channel outcomes.
#[derive(Debug, Clone)]
pub struct DirectoryReport {
    /// Simulation directory name
    pub directory: String,
    /// Acceleration magnitude outcome
    pub magnitude: ChannelOutcome,
    /// Coup pressure outcome
    pub coup: ChannelOutcome,
    /// Contrecoup pressure outcome
    pub contrecoup: ChannelOutcome,
    /// True when the magnitude pipeline reached the correction stage
    pub magnitude_attempted: bool,
    /// Number of pressure input files found and read
    pub pressure_attempted: usize,
}

impl DirectoryReport {
    /// Outcomes of all three channels.
    #[must_use]
    pub fn outcomes(&self) -> [&ChannelOutcome; 3] {
        [&self.magnitude, &self.coup, &self.contrecoup]
    }
}

/// Aggregated counts over the whole batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Directories where magnitude reconstruction reached correction
    pub magnitude_attempted: usize,
    /// Pressure input files found and read
    pub pressure_attempted: usize,
    /// Report files corrected and written (all channels)
    pub files_corrected: usize,
    /// (directory, channel) units skipped
    pub units_skipped: usize,
    /// (directory, channel) units failed
    pub units_failed: usize,
    /// Per-directory detail, in directory order
    pub directories: Vec<DirectoryReport>,
}

impl BatchReport {
    fn fold(mut self, dir: DirectoryReport) -> Self {
        self.magnitude_attempted += usize::from(dir.magnitude_attempted);
        self.pressure_attempted += dir.pressure_attempted;
        for outcome in dir.outcomes() {
            match outcome {
                ChannelOutcome::Corrected => self.files_corrected += 1,
                ChannelOutcome::Skipped(_) => self.units_skipped += 1,
                ChannelOutcome::Failed(_) => self.units_failed += 1,
            }
        }
        self.directories.push(dir);
        self
    }
}

/// Canonical report file name with the fixed fallback-candidate order:
/// directory-prefixed name first, then the bare canonical name, then a
/// deterministic scan for any file ending with `_<base>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct ReportName {
    /// Canonical base file name, e.g. `Pressure_FRONTREF_mean.rpt`
    pub base: String,
}

impl ReportName {
    /// Build from a canonical base name.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Resolve the input file inside `dir`, returning the matching file
    /// name. Candidates are evaluated in fixed order; first match wins.
    #[must_use]
    pub fn resolve(&self, dir: &Path) -> Option<String> {
        if let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) {
            let prefixed = format!("{dir_name}_{}", self.base);
            if dir.join(&prefixed).is_file() {
                return Some(prefixed);
            }
        }
        if dir.join(&self.base).is_file() {
            return Some(self.base.clone());
        }
        // Sorted scan keeps the fallback deterministic across runs
        let suffix = format!("_{}", self.base);
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .ok()?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.ends_with(&suffix))
            .collect();
        names.sort();
        names.into_iter().next()
    }
}

/// Batch processor configuration, constructed once and passed by reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Root directory holding one subdirectory per simulation
    pub reports_root: PathBuf,
    /// The three orthogonal acceleration component file names
    pub accel_components: [String; 3],
    /// Output file name for the corrected magnitude channel
    pub magnitude_output: String,
    /// Coup pressure input file
    pub coup_input: ReportName,
    /// Contrecoup pressure input file
    pub contrecoup_input: ReportName,
    /// Suffix inserted before the extension of corrected pressure outputs
    pub output_suffix: String,
    /// Absolute/relative time-grid tolerance for magnitude reconstruction
    pub grid_tolerance: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            reports_root: PathBuf::from("reports"),
            accel_components: [
                "A1_Acc_mean.rpt".into(),
                "A2_Acc_mean.rpt".into(),
                "A3_Acc_mean.rpt".into(),
            ],
            magnitude_output: "Magnitude_Acc_mean_fixed.rpt".into(),
            coup_input: ReportName::new("Pressure_FRONTREF_mean.rpt"),
            contrecoup_input: ReportName::new("Pressure_BACKREF_mean.rpt"),
            output_suffix: "_fixed".into(),
            grid_tolerance: DEFAULT_GRID_TOLERANCE,
        }
    }
}

impl BatchConfig {
    /// Default configuration rooted at `reports_root`.
    #[must_use]
    pub fn new(reports_root: impl Into<PathBuf>) -> Self {
        Self {
            reports_root: reports_root.into(),
            ..Self::default()
        }
    }
}

/// Read-only model set shared across all directories of a batch.
#[derive(Debug, Default)]
pub struct CorrectionModelSet {
    models: Vec<CorrectionModel>,
}

impl CorrectionModelSet {
    /// Collect fitted models (absent models simply do not appear).
    #[must_use]
    pub fn new(models: Vec<CorrectionModel>) -> Self {
        Self { models }
    }

    /// Model for a metric, if one was fitted.
    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<&CorrectionModel> {
        self.models.iter().find(|m| m.metric() == metric)
    }

    /// All fitted models, in insertion order.
    #[must_use]
    pub fn models(&self) -> &[CorrectionModel] {
        &self.models
    }

    /// True when no metric has a model.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Process every simulation subdirectory under the configured root.
///
/// # Errors
///
/// Returns [`Error::Load`] only when the root directory itself is absent
/// or unlistable; all per-directory trouble is captured in the report.
pub fn process_batch(config: &BatchConfig, models: &CorrectionModelSet) -> Result<BatchReport> {
    let root = &config.reports_root;
    if !root.is_dir() {
        return Err(Error::Load(format!(
            "reports root '{}' does not exist",
            root.display()
        )));
    }

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .map_err(|e| Error::Load(format!("cannot list '{}': {e}", root.display())))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    if dirs.is_empty() {
        warn!(root = %root.display(), "no simulation directories found");
        return Ok(BatchReport::default());
    }
    info!(root = %root.display(), directories = dirs.len(), "batch started");

    #[cfg(feature = "rayon")]
    let per_dir: Vec<DirectoryReport> = dirs
        .par_iter()
        .map(|dir| process_directory(config, models, dir))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let per_dir: Vec<DirectoryReport> = dirs
        .iter()
        .map(|dir| process_directory(config, models, dir))
        .collect();

    let report = per_dir.into_iter().fold(BatchReport::default(), BatchReport::fold);
    info!(
        magnitude_attempted = report.magnitude_attempted,
        pressure_attempted = report.pressure_attempted,
        files_corrected = report.files_corrected,
        skipped = report.units_skipped,
        failed = report.units_failed,
        "batch finished"
    );
    Ok(report)
}

fn process_directory(
    config: &BatchConfig,
    models: &CorrectionModelSet,
    dir: &Path,
) -> DirectoryReport {
    let name = dir
        .file_name()
        .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned());
    info!(directory = %name, "processing simulation directory");

    let (magnitude, magnitude_attempted) = process_magnitude(config, models, dir);

    let mut pressure_attempted = 0;
    let coup = process_pressure(
        config,
        models,
        dir,
        Channel::CoupPressure,
        &config.coup_input,
        &mut pressure_attempted,
    );
    let contrecoup = process_pressure(
        config,
        models,
        dir,
        Channel::ContrecoupPressure,
        &config.contrecoup_input,
        &mut pressure_attempted,
    );

    DirectoryReport {
        directory: name,
        magnitude,
        coup,
        contrecoup,
        magnitude_attempted,
        pressure_attempted,
    }
}

fn process_magnitude(
    config: &BatchConfig,
    models: &CorrectionModelSet,
    dir: &Path,
) -> (ChannelOutcome, bool) {
    let Some(model) = models.get(Metric::AccelerationMagnitude) else {
        warn!(dir = %dir.display(), "no acceleration model, magnitude channel skipped");
        return (ChannelOutcome::Skipped(SkipReason::NoModel), false);
    };

    // Resolve all three components up front so one missing axis costs no reads
    let mut names: [String; 3] = Default::default();
    for (slot, component) in names.iter_mut().zip(&config.accel_components) {
        match ReportName::new(component.clone()).resolve(dir) {
            Some(resolved) => *slot = resolved,
            None => {
                warn!(dir = %dir.display(), component = %component, "component not found, magnitude skipped");
                return (ChannelOutcome::Skipped(SkipReason::MissingInput), false);
            }
        }
    }

    let magnitude = match magnitude::reconstruct_magnitude(dir, &names, config.grid_tolerance) {
        Ok(series) => series,
        Err(Error::ComponentMissing(_)) => {
            return (ChannelOutcome::Skipped(SkipReason::EmptyInput), false);
        }
        Err(e) => return (ChannelOutcome::Failed(e.to_string()), false),
    };

    // Reached the correction stage: counts as attempted regardless of the
    // write outcome
    let corrected = apply_correction(&magnitude, Some(model)).map_values(units::m_s2_to_mm_s2);
    let out_path = dir.join(&config.magnitude_output);
    match corrected.write_report(&out_path) {
        Ok(()) => {
            info!(file = %out_path.display(), "corrected magnitude written");
            (ChannelOutcome::Corrected, true)
        }
        Err(e) => (ChannelOutcome::Failed(e.to_string()), true),
    }
}

fn process_pressure(
    config: &BatchConfig,
    models: &CorrectionModelSet,
    dir: &Path,
    channel: Channel,
    input: &ReportName,
    attempted: &mut usize,
) -> ChannelOutcome {
    let Some(model) = models.get(channel.metric()) else {
        warn!(dir = %dir.display(), metric = %channel.metric(), "no model, pressure channel skipped");
        return ChannelOutcome::Skipped(SkipReason::NoModel);
    };
    let Some(input_name) = input.resolve(dir) else {
        return ChannelOutcome::Skipped(SkipReason::MissingInput);
    };
    *attempted += 1;

    let series = match TimeSeries::read_report(dir.join(&input_name)) {
        Ok(series) => series,
        Err(Error::EmptyData(_)) => {
            warn!(dir = %dir.display(), file = %input_name, "no data in pressure file, skipped");
            return ChannelOutcome::Skipped(SkipReason::EmptyInput);
        }
        Err(e) => return ChannelOutcome::Failed(e.to_string()),
    };

    // MPa (storage) -> mmHg (analysis) -> correct -> MPa (storage)
    let analysis = series.map_values(units::mpa_to_mmhg);
    let corrected = apply_correction(&analysis, Some(model)).map_values(units::mmhg_to_mpa);

    let out_path = dir.join(output_name(&input.base, &config.output_suffix));
    match corrected.write_report(&out_path) {
        Ok(()) => {
            info!(file = %out_path.display(), "corrected pressure written");
            ChannelOutcome::Corrected
        }
        Err(e) => ChannelOutcome::Failed(e.to_string()),
    }
}

/// Insert `suffix` before the extension of a canonical report name.
#[must_use]
pub fn output_name(base: &str, suffix: &str) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}{suffix}.{ext}"),
        None => format!("{base}{suffix}"),
    }
}
