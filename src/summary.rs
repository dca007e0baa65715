//! Paired-observation summary tables
//!
//! Two delimited text tables (`;` separator, decimal comma) carry one row
//! per physical trial: the acceleration table and the pressure table. Both
//! are keyed by a trial identifier and joined inner-style; a trial absent
//! from either table drops out of the merged set. Placeholder tokens
//! (`---`, empty) and unparsable numerics become missing values, carried
//! as `Option<f64>` so absence propagates by type instead of by NaN.

use crate::model::Metric;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Declared column names of the acceleration summary table.
///
/// Mapping each source column to its canonical field up front replaces the
/// suffix-stripping collision resolution of older tooling; headers are
/// checked once at load time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccelColumns {
    /// Trial identifier (join key)
    pub trial: String,
    /// Impact force covariate [kN]
    pub impact_force: String,
    /// Impact energy covariate [J]
    pub impact_energy: String,
    /// Head impact velocity covariate [m/s]
    pub impact_velocity: String,
    /// Reference acceleration magnitude [m/s²]
    pub acc_reference: String,
    /// Simulated acceleration magnitude [m/s²]
    pub acc_simulated: String,
    /// Reference peak time [ms]
    pub peak_time_reference: String,
    /// Simulated peak time [ms]
    pub peak_time_simulated: String,
}

impl Default for AccelColumns {
    fn default() -> Self {
        Self {
            trial: "trial".into(),
            impact_force: "impact_force_kN".into(),
            impact_energy: "energy_J".into(),
            impact_velocity: "velocity_m_s".into(),
            acc_reference: "acc_ref_m_s2".into(),
            acc_simulated: "acc_sim_m_s2".into(),
            peak_time_reference: "t_peak_ref_ms".into(),
            peak_time_simulated: "t_peak_sim_ms".into(),
        }
    }
}

/// Declared column names of the pressure summary table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PressureColumns {
    /// Trial identifier (join key)
    pub trial: String,
    /// Reference coup pressure [mmHg]
    pub coup_reference: String,
    /// Simulated coup pressure [mmHg]
    pub coup_simulated: String,
    /// Reference contrecoup pressure [mmHg], signed
    pub contrecoup_reference: String,
    /// Simulated contrecoup pressure [mmHg], signed
    pub contrecoup_simulated: String,
}

impl Default for PressureColumns {
    fn default() -> Self {
        Self {
            trial: "trial".into(),
            coup_reference: "p_coup_ref_mmHg".into(),
            coup_simulated: "p_coup_sim_mmHg".into(),
            contrecoup_reference: "p_contrecoup_ref_mmHg".into(),
            contrecoup_simulated: "p_contrecoup_sim_mmHg".into(),
        }
    }
}

/// One merged row per trial after the inner join.
///
/// Covariates come from the acceleration table (first table wins when a
/// column exists in both sources).
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRecord {
    /// Trial identifier, unique within the merged set
    pub trial: String,
    /// Impact force [kN]
    pub impact_force_kn: Option<f64>,
    /// Impact energy [J]
    pub impact_energy_j: Option<f64>,
    /// Head impact velocity [m/s]
    pub impact_velocity_m_s: Option<f64>,
    /// Reference acceleration magnitude [m/s²]
    pub acc_reference: Option<f64>,
    /// Simulated acceleration magnitude [m/s²]
    pub acc_simulated: Option<f64>,
    /// Reference peak time [ms]
    pub peak_time_reference: Option<f64>,
    /// Simulated peak time [ms]
    pub peak_time_simulated: Option<f64>,
    /// Reference coup pressure [mmHg]
    pub coup_reference: Option<f64>,
    /// Simulated coup pressure [mmHg]
    pub coup_simulated: Option<f64>,
    /// Reference contrecoup pressure [mmHg], signed
    pub contrecoup_reference: Option<f64>,
    /// Simulated contrecoup pressure [mmHg], signed
    pub contrecoup_simulated: Option<f64>,
}

impl SummaryRecord {
    /// (reference, simulated) pair for a metric. Signed values throughout;
    /// the contrecoup regression is fitted on signed pressures.
    #[must_use]
    pub fn metric_pair(&self, metric: Metric) -> (Option<f64>, Option<f64>) {
        match metric {
            Metric::AccelerationMagnitude => (self.acc_reference, self.acc_simulated),
            Metric::CoupPressure => (self.coup_reference, self.coup_simulated),
            Metric::ContrecoupPressure => {
                (self.contrecoup_reference, self.contrecoup_simulated)
            }
            Metric::PeakTime => (self.peak_time_reference, self.peak_time_simulated),
        }
    }

    /// Diagnostic reference/simulated ratio for a metric.
    ///
    /// Undefined (`None`) when the simulated value is zero or either
    /// operand is missing. The contrecoup ratio uses absolute values of
    /// both operands; its sign is physically meaningful and handled by the
    /// signed regression instead.
    #[must_use]
    pub fn ratio(&self, metric: Metric) -> Option<f64> {
        let (reference, simulated) = self.metric_pair(metric);
        let (mut r, mut s) = (reference?, simulated?);
        if metric == Metric::ContrecoupPressure {
            r = r.abs();
            s = s.abs();
        }
        (s != 0.0).then(|| r / s)
    }
}

/// Load and merge the two summary tables.
///
/// # Errors
///
/// Returns [`Error::Load`] when either table cannot be read, a declared
/// column is absent, or the merged set is empty.
pub fn load_summary(
    accel_path: &Path,
    pressure_path: &Path,
    accel_cols: &AccelColumns,
    pressure_cols: &PressureColumns,
) -> Result<Vec<SummaryRecord>> {
    let accel_rows = read_table(accel_path)?;
    let pressure_rows = read_table(pressure_path)?;

    let accel_idx = AccelIndices::resolve(accel_path, &accel_rows.headers, accel_cols)?;
    let pressure_idx =
        PressureIndices::resolve(pressure_path, &pressure_rows.headers, pressure_cols)?;

    // Pressure rows keyed by trial for the inner join
    let mut by_trial: HashMap<String, &Vec<String>> = HashMap::new();
    for row in &pressure_rows.rows {
        if let Some(trial) = row.get(pressure_idx.trial) {
            by_trial.insert(trial.trim().to_string(), row);
        }
    }

    let mut merged = Vec::new();
    for row in &accel_rows.rows {
        let Some(trial) = row.get(accel_idx.trial).map(|t| t.trim().to_string()) else {
            continue;
        };
        let Some(pressure_row) = by_trial.get(&trial) else {
            debug!(trial = %trial, "trial absent from pressure table, dropped from merge");
            continue;
        };
        merged.push(SummaryRecord {
            trial,
            impact_force_kn: field(row, accel_idx.impact_force),
            impact_energy_j: field(row, accel_idx.impact_energy),
            impact_velocity_m_s: field(row, accel_idx.impact_velocity),
            acc_reference: field(row, accel_idx.acc_reference),
            acc_simulated: field(row, accel_idx.acc_simulated),
            peak_time_reference: field(row, accel_idx.peak_time_reference),
            peak_time_simulated: field(row, accel_idx.peak_time_simulated),
            coup_reference: field(pressure_row, pressure_idx.coup_reference),
            coup_simulated: field(pressure_row, pressure_idx.coup_simulated),
            contrecoup_reference: field(pressure_row, pressure_idx.contrecoup_reference),
            contrecoup_simulated: field(pressure_row, pressure_idx.contrecoup_simulated),
        });
    }

    if merged.is_empty() {
        return Err(Error::Load(format!(
            "no trials shared between {} and {}",
            accel_path.display(),
            pressure_path.display()
        )));
    }
    info!(trials = merged.len(), "summary tables merged");
    Ok(merged)
}

/// Parse one numeric field: decimal comma accepted, `---`/empty/unparsable
/// coerced to missing.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "---" {
        return None;
    }
    trimmed.replace(',', ".").parse().ok()
}

struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn read_table(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTable { headers, rows })
}

fn column_index(path: &Path, headers: &[String], name: &str) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        Error::Load(format!(
            "{}: expected column '{name}' not found (headers: {})",
            path.display(),
            headers.join(", ")
        ))
    })
}

fn field(row: &[String], idx: usize) -> Option<f64> {
    row.get(idx).and_then(|raw| parse_decimal(raw))
}

struct AccelIndices {
    trial: usize,
    impact_force: usize,
    impact_energy: usize,
    impact_velocity: usize,
    acc_reference: usize,
    acc_simulated: usize,
    peak_time_reference: usize,
    peak_time_simulated: usize,
}

impl AccelIndices {
    fn resolve(path: &Path, headers: &[String], cols: &AccelColumns) -> Result<Self> {
        Ok(Self {
            trial: column_index(path, headers, &cols.trial)?,
            impact_force: column_index(path, headers, &cols.impact_force)?,
            impact_energy: column_index(path, headers, &cols.impact_energy)?,
            impact_velocity: column_index(path, headers, &cols.impact_velocity)?,
            acc_reference: column_index(path, headers, &cols.acc_reference)?,
            acc_simulated: column_index(path, headers, &cols.acc_simulated)?,
            peak_time_reference: column_index(path, headers, &cols.peak_time_reference)?,
            peak_time_simulated: column_index(path, headers, &cols.peak_time_simulated)?,
        })
    }
}

struct PressureIndices {
    trial: usize,
    coup_reference: usize,
    coup_simulated: usize,
    contrecoup_reference: usize,
    contrecoup_simulated: usize,
}

impl PressureIndices {
    fn resolve(path: &Path, headers: &[String], cols: &PressureColumns) -> Result<Self> {
        Ok(Self {
            trial: column_index(path, headers, &cols.trial)?,
            coup_reference: column_index(path, headers, &cols.coup_reference)?,
            coup_simulated: column_index(path, headers, &cols.coup_simulated)?,
            contrecoup_reference: column_index(path, headers, &cols.contrecoup_reference)?,
            contrecoup_simulated: column_index(path, headers, &cols.contrecoup_simulated)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ACCEL_CSV: &str = "\
trial;impact_force_kN;energy_J;velocity_m_s;acc_ref_m_s2;acc_sim_m_s2;t_peak_ref_ms;t_peak_sim_ms
T37;7,9;310;9,4;1962,0;1500,0;5,5;6,0
T43;5,2;210;7,0;---;1200,0;4,8;5,1
T54;6,1;250;8,2;1400,0;0,0;5,0;5,2
";

    const PRESSURE_CSV: &str = "\
trial;p_coup_ref_mmHg;p_coup_sim_mmHg;p_contrecoup_ref_mmHg;p_contrecoup_sim_mmHg
T37;1100,0;900,0;-5,0;-2,0
T54;950,0;800,0;-300,0;-250,0
T99;800,0;700,0;-200,0;-150,0
";

    fn write_tables(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let accel = dir.join("accel.csv");
        let pressure = dir.join("pressure.csv");
        fs::write(&accel, ACCEL_CSV).unwrap();
        fs::write(&pressure, PRESSURE_CSV).unwrap();
        (accel, pressure)
    }

    #[test]
    fn test_inner_join_drops_unmatched_trials() {
        let dir = tempfile::tempdir().unwrap();
        let (accel, pressure) = write_tables(dir.path());
        let records = load_summary(
            &accel,
            &pressure,
            &AccelColumns::default(),
            &PressureColumns::default(),
        )
        .unwrap();

        // T43 has no pressure row, T99 no acceleration row
        let trials: Vec<_> = records.iter().map(|r| r.trial.as_str()).collect();
        assert_eq!(trials, ["T37", "T54"]);
    }

    #[test]
    fn test_decimal_comma_and_placeholders() {
        assert_eq!(parse_decimal("1,5"), Some(1.5));
        assert_eq!(parse_decimal(" 1962,0 "), Some(1962.0));
        assert_eq!(parse_decimal("3.25e-2"), Some(0.0325));
        assert_eq!(parse_decimal("---"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("n/a"), None);
    }

    #[test]
    fn test_ratios_guarded() {
        let dir = tempfile::tempdir().unwrap();
        let (accel, pressure) = write_tables(dir.path());
        let records = load_summary(
            &accel,
            &pressure,
            &AccelColumns::default(),
            &PressureColumns::default(),
        )
        .unwrap();

        let t37 = &records[0];
        let acc_ratio = t37.ratio(Metric::AccelerationMagnitude).unwrap();
        assert!((acc_ratio - 1962.0 / 1500.0).abs() < 1e-12);

        // Contrecoup ratio uses absolute values: |-5| / |-2| = 2.5
        let cc_ratio = t37.ratio(Metric::ContrecoupPressure).unwrap();
        assert!((cc_ratio - 2.5).abs() < 1e-12);

        // T54: simulated acceleration is 0 -> ratio undefined, no error
        let t54 = &records[1];
        assert_eq!(t54.ratio(Metric::AccelerationMagnitude), None);
    }

    #[test]
    fn test_missing_column_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let accel = dir.path().join("accel.csv");
        let pressure = dir.path().join("pressure.csv");
        fs::write(&accel, "trial;unexpected\nT1;1,0\n").unwrap();
        fs::write(&pressure, PRESSURE_CSV).unwrap();

        let err = load_summary(
            &accel,
            &pressure,
            &AccelColumns::default(),
            &PressureColumns::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_, pressure) = write_tables(dir.path());
        let err = load_summary(
            &dir.path().join("absent.csv"),
            &pressure,
            &AccelColumns::default(),
            &PressureColumns::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }
}
