//! Progress normalization
//!
//! Backend progress is reported on a 0–100 scale and is untrusted: it may be
//! negative, above 100, or not a number. Everything forwarded to a caller lies
//! in `[0, 1]`.

/// Progress range occupied by the object upload
pub const UPLOAD_RANGE: ProgressRange = ProgressRange::new(0.0, 0.3);

/// Progress range occupied by status polling
pub const POLL_RANGE: ProgressRange = ProgressRange::new(0.3, 0.65);

/// Progress reported once a job reaches a terminal state
pub const COMPLETE: f64 = 1.0;

/// Clamp a value into `[0, 1]`, mapping NaN to `0`
fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Normalize a raw 0–100 backend progress value into a caller sub-range.
///
/// `raw / 100` is clamped to `[0, 1]` and then mapped to
/// `range_start + clamped * range_span`. The result is clamped again so a
/// misconfigured range can never push a report outside `[0, 1]`.
pub fn normalize(raw: f64, range_start: f64, range_span: f64) -> f64 {
    ProgressRange::new(range_start, range_span).remap(raw / 100.0)
}

/// A sub-range of the caller-visible `[0, 1]` progress scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRange {
    pub start: f64,
    pub span: f64,
}

impl ProgressRange {
    /// The whole unit interval
    pub const UNIT: ProgressRange = ProgressRange::new(0.0, 1.0);

    pub const fn new(start: f64, span: f64) -> Self {
        Self { start, span }
    }

    /// Map a unit-scale fraction into this range
    pub fn remap(&self, fraction: f64) -> f64 {
        clamp_unit(self.start + clamp_unit(fraction) * self.span)
    }

    /// Map a 0–100 percentage into this range
    pub fn remap_percent(&self, percent: f64) -> f64 {
        self.remap(percent / 100.0)
    }

    /// Upper bound of the range
    pub fn end(&self) -> f64 {
        clamp_unit(self.start + self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_midpoint_in_polling_range() {
        assert!((normalize(50.0, 0.3, 0.65) - 0.625).abs() < EPS);
    }

    #[test]
    fn test_malformed_input_stays_in_unit_interval() {
        for raw in [
            -1.0,
            -1e9,
            0.0,
            100.0,
            101.0,
            1e12,
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ] {
            for (start, span) in [(0.0, 1.0), (0.3, 0.65), (0.9, 0.5), (-1.0, 0.2)] {
                let value = normalize(raw, start, span);
                assert!(
                    (0.0..=1.0).contains(&value),
                    "normalize({raw}, {start}, {span}) = {value}"
                );
            }
        }
    }

    #[test]
    fn test_clamps_before_remapping() {
        assert_eq!(normalize(250.0, 0.0, 0.3), 0.3);
        assert_eq!(normalize(-10.0, 0.3, 0.65), 0.3);
        assert_eq!(normalize(f64::NAN, 0.3, 0.65), 0.3);
    }

    #[test]
    fn test_named_ranges_compose() {
        assert_eq!(UPLOAD_RANGE.remap(0.0), 0.0);
        assert!((UPLOAD_RANGE.end() - POLL_RANGE.start).abs() < EPS);
        assert!((POLL_RANGE.end() - 0.95).abs() < EPS);
        assert!((POLL_RANGE.remap_percent(100.0) - 0.95).abs() < EPS);
        assert_eq!(ProgressRange::UNIT.remap_percent(40.0), 0.4);
    }
}
