//! Insulin-on-board decay model.
//!
//! Each injection contributes the fraction of its units that has not yet
//! acted. Contributions are summed linearly. The fraction is 1 at injection
//! time, non-increasing, and exactly 0 from `dia_hours` onward.
//!
//! The default curve is bilinear: activity rises linearly to a peak at
//! `peak_fraction * DIA`, then falls linearly to zero at DIA. Integrating
//! that triangle gives the remaining fraction:
//!
//! ```text
//! t <= p:      1 - t² / (D·p)
//! p < t < D:   (D - t)² / (D·(D - p))
//! t >= D:      0
//! ```

use crate::Injection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Remaining-fraction strategy for a single bolus
pub trait DecayModel {
    /// Fraction of a bolus still active `elapsed_hours` after injection
    fn fraction_remaining(&self, elapsed_hours: f64, dia_hours: f64) -> f64;
}

/// Built-in activity curves
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecayCurve {
    /// Constant activity over the whole DIA
    Linear,
    /// Triangular activity peaking at `peak_fraction` of DIA
    Bilinear { peak_fraction: f64 },
}

impl Default for DecayCurve {
    fn default() -> Self {
        // Rapid-acting analogues peak around 75 minutes of a 3 hour action
        DecayCurve::Bilinear {
            peak_fraction: 0.42,
        }
    }
}

impl DecayModel for DecayCurve {
    fn fraction_remaining(&self, elapsed_hours: f64, dia_hours: f64) -> f64 {
        if dia_hours <= 0.0 || elapsed_hours >= dia_hours {
            return 0.0;
        }
        // Injections stamped after the reference time have not started acting
        let t = elapsed_hours.max(0.0);
        let d = dia_hours;

        let fraction = match *self {
            DecayCurve::Linear => 1.0 - t / d,
            DecayCurve::Bilinear { peak_fraction } => {
                let p = d * peak_fraction.clamp(0.05, 0.95);
                if t <= p {
                    1.0 - (t * t) / (d * p)
                } else {
                    let left = d - t;
                    (left * left) / (d * (d - p))
                }
            }
        };

        fraction.clamp(0.0, 1.0)
    }
}

/// Hours between an injection and the reference time
pub fn hours_since(injection: &Injection, now: DateTime<Utc>) -> f64 {
    (now.timestamp_millis() - injection.timestamp) as f64 / MILLIS_PER_HOUR
}

/// Units still active at `now` using the default bilinear curve
pub fn calculate_iob(injections: &[Injection], dia_hours: f64, now: DateTime<Utc>) -> f64 {
    calculate_iob_with(&DecayCurve::default(), injections, dia_hours, now)
}

/// Units still active at `now` using any decay model
pub fn calculate_iob_with<M: DecayModel + ?Sized>(
    model: &M,
    injections: &[Injection],
    dia_hours: f64,
    now: DateTime<Utc>,
) -> f64 {
    let iob: f64 = injections
        .iter()
        .map(|inj| inj.units * model.fraction_remaining(hours_since(inj, now), dia_hours))
        .sum();

    tracing::debug!(
        "IOB from {} injections over {}h DIA: {:.3} U",
        injections.len(),
        dia_hours,
        iob
    );

    iob.max(0.0)
}

/// Most recent injection, if any
pub fn last_injection(injections: &[Injection]) -> Option<&Injection> {
    injections.iter().max_by_key(|inj| inj.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn injection(minutes_ago: i64, units: f64) -> Injection {
        Injection::at(now() - Duration::minutes(minutes_ago), units)
    }

    #[test]
    fn test_empty_history_is_zero() {
        assert_eq!(calculate_iob(&[], 4.0, now()), 0.0);
    }

    #[test]
    fn test_fresh_injection_fully_active() {
        let iob = calculate_iob(&[injection(0, 5.0)], 4.0, now());
        assert!((iob - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_at_and_after_dia() {
        assert_eq!(calculate_iob(&[injection(240, 5.0)], 4.0, now()), 0.0);
        assert_eq!(calculate_iob(&[injection(600, 5.0)], 4.0, now()), 0.0);
    }

    #[test]
    fn test_non_increasing_over_time() {
        for curve in [DecayCurve::Linear, DecayCurve::default()] {
            let mut previous = f64::INFINITY;
            for minute in 0..=300 {
                let value = curve.fraction_remaining(minute as f64 / 60.0, 4.0);
                assert!(value <= previous + 1e-12, "{:?} rose at minute {}", curve, minute);
                assert!((0.0..=1.0).contains(&value));
                previous = value;
            }
        }
    }

    #[test]
    fn test_bilinear_continuous_at_peak() {
        let curve = DecayCurve::Bilinear { peak_fraction: 0.5 };
        let before = curve.fraction_remaining(2.0 - 1e-9, 4.0);
        let after = curve.fraction_remaining(2.0 + 1e-9, 4.0);
        assert!((before - 0.5).abs() < 1e-6);
        assert!((after - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_superposition() {
        let a = injection(30, 3.0);
        let b = injection(90, 2.0);
        let both = calculate_iob(&[a, b], 4.0, now());
        let sum = calculate_iob(&[a], 4.0, now()) + calculate_iob(&[b], 4.0, now());
        assert!((both - sum).abs() < 1e-9);
    }

    #[test]
    fn test_linear_halfway() {
        let iob = calculate_iob_with(&DecayCurve::Linear, &[injection(120, 4.0)], 4.0, now());
        assert!((iob - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_future_injection_counts_fully() {
        let iob = calculate_iob(&[injection(-30, 2.0)], 4.0, now());
        assert!((iob - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_injection() {
        let injections = [injection(200, 1.0), injection(20, 2.0), injection(90, 3.0)];
        assert_eq!(last_injection(&injections).unwrap().units, 2.0);
        assert!(last_injection(&[]).is_none());
    }
}
