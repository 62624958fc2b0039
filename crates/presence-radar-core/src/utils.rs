//! Common numeric helpers.

/// Clamps `v` to `[0, 1]`. Non-finite input maps to 0.
#[must_use]
pub fn clamp01(v: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    v.clamp(0.0, 1.0)
}

/// Linear interpolation between `a` and `b`.
#[must_use]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Ramp a noise scale from 1 to `scale_max` as `value` moves from `full` to
/// `cutoff`.
///
/// Returns 1 for non-finite input or when `scale_max <= 1`.
#[must_use]
pub fn map_scale(value: f64, full: f64, cutoff: f64, scale_max: f64) -> f64 {
    if !value.is_finite() || !full.is_finite() || !cutoff.is_finite() || !scale_max.is_finite() {
        return 1.0;
    }
    if scale_max <= 1.0 || value <= full {
        return 1.0;
    }
    if value >= cutoff {
        return scale_max;
    }
    let t = (value - full) / (cutoff - full).max(1e-9);
    lerp(1.0, scale_max, clamp01(t))
}

/// Percentile `p` in `[0, 1]` of an ascending slice, using index
/// `floor(p * (n - 1))`. Returns `None` when empty.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentile_from_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (clamp01(p) * (sorted.len() - 1) as f64).floor() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// Local bearing in degrees, `atan2(x, y)`: 0 is straight ahead.
#[must_use]
pub fn bearing_deg(x_mm: f64, y_mm: f64) -> f64 {
    x_mm.atan2(y_mm).to_degrees()
}

/// Distance from the sensor.
#[must_use]
pub fn range_mm(x_mm: f64, y_mm: f64) -> f64 {
    x_mm.hypot(y_mm)
}
