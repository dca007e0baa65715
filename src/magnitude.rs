//! Vector magnitude reconstruction from three orthogonal components
//!
//! The solver exports one report file per acceleration axis. The magnitude
//! channel is rebuilt by reading all three, checking that they share a
//! common time grid, and combining them elementwise. A grid mismatch fails
//! the reconstruction for that simulation only; the series is never
//! truncated or resampled to force agreement.

use crate::series::TimeSeries;
use crate::units;
use crate::{Error, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Absolute and relative time-grid tolerance (numpy-allclose form).
pub const DEFAULT_GRID_TOLERANCE: f64 = 1e-7;

/// Three orthogonal component series sharing a common time grid.
#[derive(Debug, Clone)]
pub struct ComponentSet {
    components: [TimeSeries; 3],
}

impl ComponentSet {
    /// Assemble a component set, validating time-grid consistency.
    ///
    /// The first component's time axis is the reference grid; the others
    /// must match it in length and elementwise within
    /// `|a - b| <= tol + tol * |b|`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimeGridMismatch`] when any component disagrees
    /// with the reference grid.
    pub fn new(components: [TimeSeries; 3], tolerance: f64) -> Result<Self> {
        let reference = components[0].times();
        for (idx, comp) in components.iter().enumerate().skip(1) {
            if comp.len() != reference.len() {
                return Err(Error::TimeGridMismatch(format!(
                    "component {} has {} samples, reference has {}",
                    idx + 1,
                    comp.len(),
                    reference.len()
                )));
            }
            if !allclose(comp.times(), reference, tolerance, tolerance) {
                return Err(Error::TimeGridMismatch(format!(
                    "component {} time axis deviates beyond tolerance {tolerance}",
                    idx + 1
                )));
            }
        }
        Ok(Self { components })
    }

    /// Euclidean magnitude series on the reference time grid.
    #[must_use]
    pub fn magnitude(&self) -> TimeSeries {
        let [a1, a2, a3] = &self.components;
        let values = a1
            .values()
            .iter()
            .zip(a2.values())
            .zip(a3.values())
            .map(|((x, y), z)| x.hypot(*y).hypot(*z))
            .collect();
        TimeSeries::new(a1.times().to_vec(), values)
    }
}

/// Read three component report files from `dir` and reconstruct the
/// acceleration magnitude in analysis units (m/s²).
///
/// Component values are stored in mm/s² and converted before combining.
///
/// # Errors
///
/// Returns [`Error::ComponentMissing`] when a component file is absent or
/// empty, [`Error::TimeGridMismatch`] when the grids disagree.
pub fn reconstruct_magnitude(
    dir: &Path,
    component_names: &[String; 3],
    tolerance: f64,
) -> Result<TimeSeries> {
    let mut read = Vec::with_capacity(3);
    for name in component_names {
        let path = dir.join(name);
        if !path.is_file() {
            warn!(dir = %dir.display(), component = %name, "component file not found");
            return Err(Error::ComponentMissing(name.clone()));
        }
        match TimeSeries::read_report(&path) {
            Ok(series) => read.push(series.map_values(units::mm_s2_to_m_s2)),
            Err(Error::EmptyData(_)) => {
                warn!(dir = %dir.display(), component = %name, "component file has no data");
                return Err(Error::ComponentMissing(name.clone()));
            }
            Err(e) => return Err(e),
        }
    }
    let components: [TimeSeries; 3] = match read.try_into() {
        Ok(c) => c,
        Err(_) => return Err(Error::ComponentMissing("component read underflow".into())),
    };
    let set = ComponentSet::new(components, tolerance)?;
    let magnitude = set.magnitude();
    debug!(dir = %dir.display(), samples = magnitude.len(), "magnitude reconstructed");
    Ok(magnitude)
}

/// Elementwise closeness check, `|a - b| <= atol + rtol * |b|` per sample.
fn allclose(a: &[f64], b: &[f64], atol: f64, rtol: f64) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_rpt(dir: &Path, name: &str, rows: &[(f64, f64)]) {
        let body: String = rows
            .iter()
            .map(|(t, v)| format!("{t:e} {v:e}\n"))
            .collect();
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_magnitude_3_4_0_is_5() {
        let a1 = TimeSeries::new(vec![0.0], vec![3.0]);
        let a2 = TimeSeries::new(vec![0.0], vec![4.0]);
        let a3 = TimeSeries::new(vec![0.0], vec![0.0]);
        let set = ComponentSet::new([a1, a2, a3], DEFAULT_GRID_TOLERANCE).unwrap();
        let mag = set.magnitude();
        assert!((mag.values()[0] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_magnitude_zero_components() {
        let zero = TimeSeries::new(vec![0.0, 1.0], vec![0.0, 0.0]);
        let set = ComponentSet::new(
            [zero.clone(), zero.clone(), zero],
            DEFAULT_GRID_TOLERANCE,
        )
        .unwrap();
        assert_eq!(set.magnitude().values(), &[0.0, 0.0]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let a1 = TimeSeries::new(vec![0.0, 1.0], vec![1.0, 1.0]);
        let a2 = TimeSeries::new(vec![0.0], vec![1.0]);
        let a3 = TimeSeries::new(vec![0.0, 1.0], vec![1.0, 1.0]);
        let err = ComponentSet::new([a1, a2, a3], DEFAULT_GRID_TOLERANCE).unwrap_err();
        assert!(matches!(err, Error::TimeGridMismatch(_)));
    }

    #[test]
    fn test_grid_deviation_beyond_tolerance_rejected() {
        let a1 = TimeSeries::new(vec![0.0, 1.0e-3], vec![1.0, 1.0]);
        let a2 = TimeSeries::new(vec![0.0, 1.0e-3 + 1.0e-5], vec![1.0, 1.0]);
        let a3 = TimeSeries::new(vec![0.0, 1.0e-3], vec![1.0, 1.0]);
        let err = ComponentSet::new([a1, a2, a3], DEFAULT_GRID_TOLERANCE).unwrap_err();
        assert!(matches!(err, Error::TimeGridMismatch(_)));
    }

    #[test]
    fn test_grid_deviation_within_tolerance_accepted() {
        let a1 = TimeSeries::new(vec![1.0], vec![1.0]);
        let a2 = TimeSeries::new(vec![1.0 + 5.0e-8], vec![1.0]);
        let a3 = TimeSeries::new(vec![1.0], vec![1.0]);
        assert!(ComponentSet::new([a1, a2, a3], DEFAULT_GRID_TOLERANCE).is_ok());
    }

    #[test]
    fn test_reconstruct_from_files_converts_units() {
        let dir = tempfile::tempdir().unwrap();
        // 3000/4000/0 mm/s² -> 3/4/0 m/s² -> magnitude 5 m/s²
        write_rpt(dir.path(), "A1_Acc_mean.rpt", &[(0.0, 3000.0)]);
        write_rpt(dir.path(), "A2_Acc_mean.rpt", &[(0.0, 4000.0)]);
        write_rpt(dir.path(), "A3_Acc_mean.rpt", &[(0.0, 0.0)]);

        let names = [
            "A1_Acc_mean.rpt".to_string(),
            "A2_Acc_mean.rpt".to_string(),
            "A3_Acc_mean.rpt".to_string(),
        ];
        let mag = reconstruct_magnitude(dir.path(), &names, DEFAULT_GRID_TOLERANCE).unwrap();
        assert!((mag.values()[0] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_reconstruct_missing_component() {
        let dir = tempfile::tempdir().unwrap();
        write_rpt(dir.path(), "A1_Acc_mean.rpt", &[(0.0, 1.0)]);

        let names = [
            "A1_Acc_mean.rpt".to_string(),
            "A2_Acc_mean.rpt".to_string(),
            "A3_Acc_mean.rpt".to_string(),
        ];
        let err =
            reconstruct_magnitude(dir.path(), &names, DEFAULT_GRID_TOLERANCE).unwrap_err();
        assert!(matches!(err, Error::ComponentMissing(_)));
    }
}
