//! Recommendation tiering over a multi-day record.
//!
//! Rates are percentages of all measurements in the window. The tier is
//! chosen by descending severity: hypoglycemia first, then time in range,
//! then the positive branch when lows are rare.

use crate::config::TierConfig;
use crate::i18n::{whole, Localized};
use crate::validation::validate_weekly_record;
use crate::{Result, WeeklyRecord};
use serde::{Deserialize, Serialize};

/// Overall control classification, most severe first
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationTier {
    UrgentAdjustment,
    Caution,
    ReviewPoorControl,
    ReviewPoorControlHyper,
    Optimize,
    Continue,
    ContinueMonitoring,
    ModelWorkingWell,
    Excellent,
}

impl RecommendationTier {
    pub fn key(self) -> &'static str {
        match self {
            RecommendationTier::UrgentAdjustment => "tier.urgent_adjustment",
            RecommendationTier::Caution => "tier.caution",
            RecommendationTier::ReviewPoorControl => "tier.review_poor_control",
            RecommendationTier::ReviewPoorControlHyper => "tier.review_poor_control_hyper",
            RecommendationTier::Optimize => "tier.optimize",
            RecommendationTier::Continue => "tier.continue",
            RecommendationTier::ContinueMonitoring => "tier.continue_monitoring",
            RecommendationTier::ModelWorkingWell => "tier.model_working_well",
            RecommendationTier::Excellent => "tier.excellent",
        }
    }

    /// Pick a tier from percentages
    pub fn classify(in_range: f64, hypo_rate: f64, hyper_rate: f64, cfg: &TierConfig) -> Self {
        if hypo_rate > cfg.urgent_hypo_rate {
            RecommendationTier::UrgentAdjustment
        } else if hypo_rate > cfg.caution_hypo_rate {
            RecommendationTier::Caution
        } else if in_range < cfg.review_in_range {
            if hyper_rate > cfg.review_hyper_rate {
                RecommendationTier::ReviewPoorControlHyper
            } else {
                RecommendationTier::ReviewPoorControl
            }
        } else if in_range < cfg.optimize_in_range {
            RecommendationTier::Optimize
        } else if in_range >= cfg.excellent_in_range && hypo_rate == 0.0 {
            RecommendationTier::Excellent
        } else if in_range >= cfg.monitor_in_range && hypo_rate <= cfg.well_hypo_rate {
            RecommendationTier::ModelWorkingWell
        } else if in_range >= cfg.monitor_in_range {
            RecommendationTier::ContinueMonitoring
        } else {
            RecommendationTier::Continue
        }
    }
}

/// Retrospective control summary
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub days: usize,
    pub total_measurements: usize,
    pub day_in_range_percentage: f64,
    pub hypo_rate: f64,
    pub hyper_rate: f64,
    /// Share of dosed readings whose 3 hour follow-up landed in range
    pub post_dose_in_range: Option<f64>,
    pub tier: RecommendationTier,
}

impl Localized for ValidationReport {
    fn key(&self) -> &'static str {
        self.tier.key()
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("inRange", whole(self.day_in_range_percentage)),
            ("hypo", whole(self.hypo_rate)),
            ("hyper", whole(self.hyper_rate)),
        ]
    }
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

/// Validate the record and classify overall control
pub fn build_validation_report(record: &WeeklyRecord, cfg: &TierConfig) -> Result<ValidationReport> {
    validate_weekly_record(record)?;

    let in_band = |g: f64| g >= cfg.target_low && g <= cfg.target_high;

    let mut total = 0;
    let mut in_range = 0;
    let mut hypo = 0;
    let mut hyper = 0;
    let mut dosed = 0;
    let mut dosed_in_range = 0;

    for m in record.measurements() {
        total += 1;
        if m.glucose < cfg.target_low {
            hypo += 1;
        } else if m.glucose > cfg.target_high {
            hyper += 1;
        } else {
            in_range += 1;
        }

        if let (Some(insulin), Some(later)) = (m.insulin, m.glucose_3h_later) {
            if insulin > 0.0 {
                dosed += 1;
                if in_band(later) {
                    dosed_in_range += 1;
                }
            }
        }
    }

    let day_in_range_percentage = percent(in_range, total);
    let hypo_rate = percent(hypo, total);
    let hyper_rate = percent(hyper, total);
    let post_dose_in_range = (dosed > 0).then(|| percent(dosed_in_range, dosed));

    let tier = RecommendationTier::classify(day_in_range_percentage, hypo_rate, hyper_rate, cfg);

    tracing::info!(
        "Validation over {} days: {:.1}% in range, {:.1}% low, {:.1}% high -> {:?}",
        record.days.len(),
        day_in_range_percentage,
        hypo_rate,
        hyper_rate,
        tier
    );

    Ok(ValidationReport {
        days: record.days.len(),
        total_measurements: total,
        day_in_range_percentage,
        hypo_rate,
        hyper_rate,
        post_dose_in_range,
        tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DayRecord, GlucoseMeasurement};
    use chrono::{NaiveDate, TimeZone, Utc};

    /// Seven days x 20 readings; `value(i)` for reading index 0..140
    fn record(mut value: impl FnMut(usize) -> f64) -> WeeklyRecord {
        let mut i = 0;
        WeeklyRecord::new(
            (1..=7)
                .map(|d| DayRecord {
                    date: NaiveDate::from_ymd_opt(2024, 4, d).unwrap(),
                    measurements: (0..20)
                        .map(|h| {
                            let g = value(i);
                            i += 1;
                            GlucoseMeasurement {
                                timestamp: Utc.with_ymd_and_hms(2024, 4, d, h, 0, 0).unwrap(),
                                glucose: g,
                                glucose_3h_later: None,
                                insulin: None,
                                carbs: None,
                            }
                        })
                        .collect(),
                })
                .collect(),
        )
    }

    fn classify(in_range: f64, hypo: f64, hyper: f64) -> RecommendationTier {
        RecommendationTier::classify(in_range, hypo, hyper, &TierConfig::default())
    }

    #[test]
    fn test_excellent_week() {
        // 133 of 140 in range (95%), 7 high
        let week = record(|i| if i % 20 == 0 { 200.0 } else { 120.0 });
        let report = build_validation_report(&week, &TierConfig::default()).unwrap();
        assert_eq!(report.total_measurements, 140);
        assert_eq!(report.hypo_rate, 0.0);
        assert!((report.day_in_range_percentage - 95.0).abs() < 1e-9);
        assert_eq!(report.tier, RecommendationTier::Excellent);
    }

    #[test]
    fn test_urgent_regardless_of_range() {
        // 15 lows of 140 (>10%), everything else in range
        let week = record(|i| if i < 15 { 60.0 } else { 120.0 });
        let report = build_validation_report(&week, &TierConfig::default()).unwrap();
        assert!(report.hypo_rate > 10.0);
        assert_eq!(report.tier, RecommendationTier::UrgentAdjustment);
    }

    #[test]
    fn test_tier_ladder() {
        assert_eq!(classify(85.0, 6.0, 0.0), RecommendationTier::Caution);
        assert_eq!(classify(40.0, 0.0, 60.0), RecommendationTier::ReviewPoorControlHyper);
        assert_eq!(classify(40.0, 2.0, 30.0), RecommendationTier::ReviewPoorControl);
        assert_eq!(classify(60.0, 0.0, 40.0), RecommendationTier::Optimize);
        assert_eq!(classify(75.0, 0.0, 25.0), RecommendationTier::Continue);
        assert_eq!(classify(85.0, 3.0, 12.0), RecommendationTier::ContinueMonitoring);
        assert_eq!(classify(85.0, 0.5, 14.5), RecommendationTier::ModelWorkingWell);
        assert_eq!(classify(92.0, 0.5, 7.5), RecommendationTier::ModelWorkingWell);
        assert_eq!(classify(92.0, 0.0, 8.0), RecommendationTier::Excellent);
    }

    #[test]
    fn test_tiers_ordered_by_severity() {
        assert!(RecommendationTier::UrgentAdjustment < RecommendationTier::Caution);
        assert!(RecommendationTier::ModelWorkingWell < RecommendationTier::Excellent);
    }

    #[test]
    fn test_post_dose_in_range() {
        let mut week = record(|_| 130.0);
        let m = &mut week.days[0].measurements;
        m[0].insulin = Some(4.0);
        m[0].glucose_3h_later = Some(150.0);
        m[1].insulin = Some(3.0);
        m[1].glucose_3h_later = Some(240.0);
        m[2].insulin = None;
        m[2].glucose_3h_later = Some(110.0);

        let report = build_validation_report(&week, &TierConfig::default()).unwrap();
        assert_eq!(report.post_dose_in_range, Some(50.0));

        let plain = build_validation_report(&record(|_| 130.0), &TierConfig::default()).unwrap();
        assert_eq!(plain.post_dose_in_range, None);
    }

    #[test]
    fn test_renders_tier_message() {
        let week = record(|_| 120.0);
        let report = build_validation_report(&week, &TierConfig::default()).unwrap();
        let text = report.render(&crate::i18n::MessageCatalog::default());
        assert_eq!(
            text,
            "Excellent control: 100% of readings in range and no hypoglycemia."
        );
    }
}
