//! Wilson score interval for a binomial proportion.
//!
//! Used for conservative conversion-rate reporting only, never for selection.

/// z for a two-sided 95% interval.
pub const DEFAULT_Z: f64 = 1.96;

/// Wilson score interval `(lower, upper)` for `successes` out of `total`.
///
/// Returns `(0, 0)` when `total == 0`. `successes` above `total` is treated as
/// `total`, since counters may briefly disagree under concurrent recording.
pub fn wilson_interval(successes: u64, total: u64, z: f64) -> (f64, f64) {
    if total == 0 {
        return (0.0, 0.0);
    }
    let n = total as f64;
    let p = successes.min(total) as f64 / n;
    let z2 = z * z;

    let denom = 1.0 + z2 / n;
    let centre = p + z2 / (2.0 * n);
    let adj = z * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();

    let lower = ((centre - adj) / denom).clamp(0.0, p);
    let upper = ((centre + adj) / denom).clamp(p, 1.0);
    (lower, upper)
}

/// Lower bound of the Wilson score interval.
pub fn wilson_lower_bound(successes: u64, total: u64, z: f64) -> f64 {
    wilson_interval(successes, total, z).0
}
