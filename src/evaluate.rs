//! Evaluation artifacts: regression parameters, corrected summaries, MAPE
//!
//! These are the audit trail of model estimation: delimited text tables
//! (`;` separator, decimal comma, matching the summary-input convention)
//! plus the fitted model set as JSON. Downstream comparison tooling reads
//! these; the batch itself does not.

use crate::batch::CorrectionModelSet;
use crate::model::{self, Metric};
use crate::summary::SummaryRecord;
use crate::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Missing-value placeholder, same token the summary tables use.
const MISSING: &str = "---";

/// Write the regression parameter table: one row per fitted metric.
///
/// # Errors
///
/// Returns [`Error::Csv`] / [`Error::Io`] when the table cannot be written.
pub fn write_model_parameters(path: &Path, models: &CorrectionModelSet) -> Result<()> {
    let mut writer = table_writer(path)?;
    writer.write_record([
        "metric",
        "slope",
        "intercept",
        "r_squared",
        "p_value",
        "std_err",
        "samples",
        "equation",
    ])?;
    for m in models.models() {
        writer.write_record(&[
            m.metric().name().to_string(),
            fmt_num(m.slope()),
            fmt_num(m.intercept()),
            fmt_num(m.r_squared()),
            fmt_num(m.p_value()),
            fmt_num(m.std_err()),
            m.samples().to_string(),
            m.equation(),
        ])?;
    }
    writer.flush().map_err(Error::Io)?;
    info!(file = %path.display(), "regression parameter table written");
    Ok(())
}

/// Write the per-trial corrected summary table.
///
/// Each metric contributes reference, simulated and corrected columns;
/// the corrected value is a passthrough where no model exists.
///
/// # Errors
///
/// Returns [`Error::Csv`] / [`Error::Io`] when the table cannot be written.
pub fn write_corrected_summary(
    path: &Path,
    records: &[SummaryRecord],
    models: &CorrectionModelSet,
) -> Result<()> {
    let mut writer = table_writer(path)?;
    let mut header = vec!["trial".to_string()];
    for metric in Metric::ALL {
        let tag = metric_tag(metric);
        header.push(format!("{tag}_ref"));
        header.push(format!("{tag}_sim"));
        header.push(format!("{tag}_corrected"));
    }
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![record.trial.clone()];
        for metric in Metric::ALL {
            let (reference, simulated) = record.metric_pair(metric);
            let corrected = model::correct_optional(simulated, models.get(metric));
            row.push(fmt_opt(reference));
            row.push(fmt_opt(simulated));
            row.push(fmt_opt(corrected));
        }
        writer.write_record(&row)?;
    }
    writer.flush().map_err(Error::Io)?;
    info!(file = %path.display(), trials = records.len(), "corrected summary table written");
    Ok(())
}

/// Write the MAPE table: per metric, mean absolute percentage error of the
/// simulated values against the reference, before and after correction.
///
/// The contrecoup row compares absolute values, consistent with its
/// magnitude ratio; samples with a missing or zero reference are excluded.
///
/// # Errors
///
/// Returns [`Error::Csv`] / [`Error::Io`] when the table cannot be written.
pub fn write_mape_summary(
    path: &Path,
    records: &[SummaryRecord],
    models: &CorrectionModelSet,
) -> Result<()> {
    let mut writer = table_writer(path)?;
    writer.write_record(["metric", "mape_before_pct", "mape_after_pct"])?;

    for metric in Metric::ALL {
        let (before, after) = metric_mape(records, models, metric);
        writer.write_record(&[metric.name().to_string(), fmt_opt(before), fmt_opt(after)])?;
    }
    writer.flush().map_err(Error::Io)?;
    info!(file = %path.display(), "MAPE table written");
    Ok(())
}

/// MAPE before/after correction for one metric across the merged records.
#[must_use]
pub fn metric_mape(
    records: &[SummaryRecord],
    models: &CorrectionModelSet,
    metric: Metric,
) -> (Option<f64>, Option<f64>) {
    let take_abs = metric == Metric::ContrecoupPressure;
    let abs_opt = |v: Option<f64>| if take_abs { v.map(f64::abs) } else { v };

    let mut reference = Vec::with_capacity(records.len());
    let mut simulated = Vec::with_capacity(records.len());
    let mut corrected = Vec::with_capacity(records.len());
    for record in records {
        let (r, s) = record.metric_pair(metric);
        reference.push(abs_opt(r));
        simulated.push(abs_opt(s));
        corrected.push(abs_opt(model::correct_optional(s, models.get(metric))));
    }
    (
        model::mape(&reference, &simulated),
        model::mape(&reference, &corrected),
    )
}

/// Persist the fitted model set as JSON for audit.
///
/// # Errors
///
/// Returns [`Error::Write`] when serialization or the write fails.
pub fn write_models_json(path: &Path, models: &CorrectionModelSet) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(models.models())
        .map_err(|e| Error::Write(format!("{}: {e}", path.display())))?;
    fs::write(path, json).map_err(|e| Error::Write(format!("{}: {e}", path.display())))?;
    info!(file = %path.display(), models = models.models().len(), "model set written");
    Ok(())
}

fn table_writer(path: &Path) -> Result<csv::Writer<fs::File>> {
    ensure_parent(path)?;
    csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(Error::from)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Numeric table field: shortest round-trip float with a decimal comma.
fn fmt_num(v: f64) -> String {
    if v.is_nan() {
        return MISSING.to_string();
    }
    format!("{v}").replace('.', ",")
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| MISSING.to_string(), fmt_num)
}

fn metric_tag(metric: Metric) -> &'static str {
    match metric {
        Metric::AccelerationMagnitude => "acc_m_s2",
        Metric::CoupPressure => "p_coup_mmHg",
        Metric::ContrecoupPressure => "p_contrecoup_mmHg",
        Metric::PeakTime => "t_peak_ms",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CorrectionModel;

    fn records() -> Vec<SummaryRecord> {
        vec![
            SummaryRecord {
                trial: "T1".into(),
                impact_force_kn: Some(7.9),
                impact_energy_j: Some(310.0),
                impact_velocity_m_s: Some(9.4),
                acc_reference: Some(100.0),
                acc_simulated: Some(50.0),
                peak_time_reference: Some(5.0),
                peak_time_simulated: Some(5.5),
                coup_reference: Some(1100.0),
                coup_simulated: Some(1000.0),
                contrecoup_reference: Some(-500.0),
                contrecoup_simulated: Some(-400.0),
            },
            SummaryRecord {
                trial: "T2".into(),
                impact_force_kn: None,
                impact_energy_j: None,
                impact_velocity_m_s: Some(7.0),
                acc_reference: Some(200.0),
                acc_simulated: Some(100.0),
                peak_time_reference: None,
                peak_time_simulated: Some(5.0),
                coup_reference: Some(900.0),
                coup_simulated: Some(800.0),
                contrecoup_reference: Some(-300.0),
                contrecoup_simulated: Some(-200.0),
            },
        ]
    }

    fn doubling_models() -> CorrectionModelSet {
        CorrectionModelSet::new(vec![CorrectionModel::fit(
            Metric::AccelerationMagnitude,
            &[(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)],
        )
        .unwrap()])
    }

    #[test]
    fn test_mape_before_and_after() {
        // Before: |100-50|/100 and |200-100|/200 -> 50 %
        // After doubling: exact -> 0 %
        let (before, after) =
            metric_mape(&records(), &doubling_models(), Metric::AccelerationMagnitude);
        assert!((before.unwrap() - 50.0).abs() < 1e-9);
        assert!(after.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_mape_passthrough_without_model() {
        // No coup model: before == after
        let (before, after) = metric_mape(&records(), &doubling_models(), Metric::CoupPressure);
        assert_eq!(before, after);
        assert!(before.is_some());
    }

    #[test]
    fn test_contrecoup_mape_uses_absolute_values() {
        let (before, _) =
            metric_mape(&records(), &doubling_models(), Metric::ContrecoupPressure);
        // |500-400|/500 = 0.2, |300-200|/300 = 0.333... -> mean ~26.67 %
        assert!((before.unwrap() - (0.2 + 1.0 / 3.0) / 2.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_tables_written_with_decimal_comma() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("results").join("regression_parameters.csv");
        let mape = dir.path().join("results").join("mape_summary.csv");
        let summary = dir.path().join("results").join("corrected_summary.csv");
        let models = doubling_models();

        write_model_parameters(&params, &models).unwrap();
        write_mape_summary(&mape, &records(), &models).unwrap();
        write_corrected_summary(&summary, &records(), &models).unwrap();

        let body = fs::read_to_string(&params).unwrap();
        assert!(body.starts_with("metric;slope;intercept"));
        assert!(body.contains("Acceleration magnitude;2;0;1;"));

        let body = fs::read_to_string(&summary).unwrap();
        assert!(body.contains("T1;100;50;100"));
        assert!(body.contains(";---;"), "missing values use the placeholder");

        let body = fs::read_to_string(&mape).unwrap();
        assert!(body.contains("26,6"), "fractional fields use a decimal comma");
    }

    #[test]
    fn test_models_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results").join("correction_models.json");
        write_models_json(&path, &doubling_models()).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert!((parsed[0]["slope"].as_f64().unwrap() - 2.0).abs() < 1e-12);
    }
}
