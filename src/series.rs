//! Time-series report file reading and writing
//!
//! Report files carry one time/value pair per data line, whitespace
//! separated, optionally in exponential notation, with extra trailing
//! columns ignored. Non-data lines are blank, asterisk-prefixed comments,
//! or plot-header markers. The reader is tolerant of noise: a malformed
//! data line is logged and skipped, and only a file with zero valid pairs
//! is reported as empty.

use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Ordered sequence of (time, value) pairs from one report file.
///
/// The unit of the value column is a contract of the surrounding code
/// (storage units as read, analysis units after conversion); it is not
/// stored per point.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Create a series from parallel time and value vectors.
    ///
    /// Both vectors must have the same length.
    #[must_use]
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(times.len(), values.len());
        Self { times, values }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True when the series holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time axis.
    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Value column.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Apply `f` to every value, keeping the time axis unchanged.
    #[must_use]
    pub fn map_values<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        Self {
            times: self.times.clone(),
            values: self.values.iter().copied().map(f).collect(),
        }
    }

    /// Parse a two-column report file into a series.
    ///
    /// Blank lines, asterisk-prefixed comments and plot-header markers are
    /// skipped. A line whose first token is numeric but whose second is not
    /// is logged and skipped (non-fatal).
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyData`] if no valid pair was found, or
    /// [`Error::Io`] if the file cannot be read.
    pub fn read_report<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let mut times = Vec::new();
        let mut values = Vec::new();

        for (line_no, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || is_header_line(line) {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let (Some(t_tok), Some(v_tok)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            let Ok(time) = t_tok.parse::<f64>() else {
                // Not a data line (text label, column heading)
                continue;
            };
            match v_tok.parse::<f64>() {
                Ok(value) => {
                    times.push(time);
                    values.push(value);
                }
                Err(e) => {
                    warn!(
                        file = %path.display(),
                        line = line_no + 1,
                        "skipping malformed data line ({e}): {line}"
                    );
                }
            }
        }

        if times.is_empty() {
            return Err(Error::EmptyData(path.display().to_string()));
        }
        debug!(file = %path.display(), samples = times.len(), "report read");
        Ok(Self { times, values })
    }

    /// Write the series as a two-column report file.
    ///
    /// Values are formatted in fixed-precision scientific notation with no
    /// header line. The file is written to a temporary sibling first and
    /// renamed into place, so an interrupted run never leaves a
    /// half-written output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] if the file cannot be persisted.
    pub fn write_report<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("rpt.tmp");

        let mut out = String::with_capacity(self.len() * 28);
        for (t, v) in self.times.iter().zip(&self.values) {
            out.push_str(&format_scientific(*t));
            out.push(' ');
            out.push_str(&format_scientific(*v));
            out.push('\n');
        }

        let write = |tmp: &Path| -> std::io::Result<()> {
            let mut f = fs::File::create(tmp)?;
            f.write_all(out.as_bytes())?;
            f.sync_all()
        };
        write(&tmp_path)
            .and_then(|()| fs::rename(&tmp_path, path))
            .map_err(|e| {
                // Best effort cleanup of the temp sibling
                let _ = fs::remove_file(&tmp_path);
                Error::Write(format!("{}: {e}", path.display()))
            })
    }
}

/// True for comment/header lines: asterisk-prefixed or an `X ... PLOT` marker.
fn is_header_line(line: &str) -> bool {
    if line.starts_with('*') {
        return true;
    }
    let mut tokens = line.split_whitespace();
    matches!(
        (tokens.next(), tokens.next()),
        (Some("X"), Some(t)) if t.eq_ignore_ascii_case("PLOT")
    )
}

/// Fixed-precision scientific formatting: 6 fractional digits, signed
/// two-digit exponent (`1.234568e+04`). Deterministic, so re-running a
/// batch reproduces output files byte for byte.
#[must_use]
pub fn format_scientific(v: f64) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    let s = format!("{v:.6e}");
    let (mantissa, exp) = match s.split_once('e') {
        Some(pair) => pair,
        None => (s.as_str(), "0"),
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exp.abs())
}
