//! Scalar conversions between storage units and analysis units
//!
//! Report files store acceleration in mm/s² and pressure in MPa; the
//! correction models are derived in m/s² and mmHg. Each return trip uses the
//! exact reciprocal of the forward factor so a round trip reproduces the
//! input to floating precision. Non-finite inputs pass through unchanged.

/// mm/s² per m/s²
pub const MM_S2_PER_M_S2: f64 = 1000.0;

/// mmHg per MPa
pub const MMHG_PER_MPA: f64 = 7500.62;

/// MPa per mmHg (exact reciprocal, never re-derived)
pub const MPA_PER_MMHG: f64 = 1.0 / MMHG_PER_MPA;

/// Convert acceleration from storage units (mm/s²) to analysis units (m/s²).
#[must_use]
pub fn mm_s2_to_m_s2(v: f64) -> f64 {
    v / MM_S2_PER_M_S2
}

/// Convert acceleration from analysis units (m/s²) to storage units (mm/s²).
#[must_use]
pub fn m_s2_to_mm_s2(v: f64) -> f64 {
    v * MM_S2_PER_M_S2
}

/// Convert pressure from storage units (MPa) to analysis units (mmHg).
#[must_use]
pub fn mpa_to_mmhg(v: f64) -> f64 {
    v * MMHG_PER_MPA
}

/// Convert pressure from analysis units (mmHg) to storage units (MPa).
#[must_use]
pub fn mmhg_to_mpa(v: f64) -> f64 {
    v * MPA_PER_MMHG
}
