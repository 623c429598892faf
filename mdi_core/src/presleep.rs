//! Bedtime evaluation.
//!
//! A pure function of glucose, IOB and the profile. The projected overnight
//! glucose is the current value minus what the active insulin will still
//! drop it by.

use crate::config::PreSleepConfig;
use crate::i18n::{units, whole, Localized};
use crate::safety::round_to_half;
use crate::InsulinProfile;
use serde::{Deserialize, Serialize};

/// What to do before sleeping
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreSleepAction {
    EatSnack,
    SmallCorrection,
    Sleep,
}

/// Why the action was chosen
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreSleepReason {
    ProjectedLow { projected: f64, carbs: f64 },
    HighGlucose { glucose: f64, dose: f64, recheck: bool },
    SafeRange { glucose: f64 },
}

impl Localized for PreSleepReason {
    fn key(&self) -> &'static str {
        match self {
            PreSleepReason::ProjectedLow { .. } => "presleep.eat_snack",
            PreSleepReason::HighGlucose { recheck: true, .. } => {
                "presleep.small_correction_recheck"
            }
            PreSleepReason::HighGlucose { .. } => "presleep.small_correction",
            PreSleepReason::SafeRange { .. } => "presleep.sleep",
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match *self {
            PreSleepReason::ProjectedLow { projected, carbs } => {
                vec![("projected", whole(projected)), ("carbs", whole(carbs))]
            }
            PreSleepReason::HighGlucose { glucose, dose, .. } => {
                vec![("glucose", whole(glucose)), ("dose", units(dose))]
            }
            PreSleepReason::SafeRange { glucose } => vec![("glucose", whole(glucose))],
        }
    }
}

/// Bedtime recommendation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreSleepEvaluation {
    pub action: PreSleepAction,
    #[serde(rename = "remainingIOB")]
    pub remaining_iob: f64,
    pub projected_glucose: f64,
    pub reason: PreSleepReason,
    /// Set for `EatSnack`
    pub carbohydrates: Option<f64>,
    /// Set for `SmallCorrection`
    pub correction_dose: Option<f64>,
    #[serde(rename = "recheckAt3am")]
    pub recheck_at_3am: bool,
}

/// Decide between a snack, a small correction, or nothing
pub fn evaluate_pre_sleep(
    glucose: f64,
    iob: f64,
    profile: &InsulinProfile,
    config: &PreSleepConfig,
) -> PreSleepEvaluation {
    let projected = glucose - iob * profile.isf;

    if projected < config.snack_threshold {
        tracing::info!(
            "Pre-sleep: projected {:.0} mg/dL below {:.0}, recommending snack",
            projected,
            config.snack_threshold
        );
        return PreSleepEvaluation {
            action: PreSleepAction::EatSnack,
            remaining_iob: iob,
            projected_glucose: projected,
            reason: PreSleepReason::ProjectedLow {
                projected,
                carbs: config.snack_carbs,
            },
            carbohydrates: Some(config.snack_carbs),
            correction_dose: None,
            recheck_at_3am: false,
        };
    }

    if glucose > config.correction_threshold {
        let correction = ((glucose - profile.target) / profile.isf).max(0.0);
        let dose = round_to_half((correction - iob).max(0.0) * config.correction_factor);

        if dose > 0.0 {
            let recheck = glucose <= config.recheck_upper;
            tracing::info!(
                "Pre-sleep: glucose {:.0} mg/dL, conservative correction {:.1} U",
                glucose,
                dose
            );
            return PreSleepEvaluation {
                action: PreSleepAction::SmallCorrection,
                remaining_iob: iob,
                projected_glucose: projected,
                reason: PreSleepReason::HighGlucose {
                    glucose,
                    dose,
                    recheck,
                },
                carbohydrates: None,
                correction_dose: Some(dose),
                recheck_at_3am: recheck,
            };
        }
    }

    tracing::info!("Pre-sleep: glucose {:.0} mg/dL, no action", glucose);
    PreSleepEvaluation {
        action: PreSleepAction::Sleep,
        remaining_iob: iob,
        projected_glucose: projected,
        reason: PreSleepReason::SafeRange { glucose },
        carbohydrates: None,
        correction_dose: None,
        recheck_at_3am: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IcRatio;

    fn profile() -> InsulinProfile {
        InsulinProfile {
            isf: 50.0,
            ic_ratio: IcRatio {
                breakfast: 15.0,
                lunch: 12.0,
                dinner: 10.0,
            },
            dia_hours: 4.0,
            target: 100.0,
        }
    }

    fn eval(glucose: f64, iob: f64) -> PreSleepEvaluation {
        evaluate_pre_sleep(glucose, iob, &profile(), &PreSleepConfig::default())
    }

    #[test]
    fn test_snack_when_projected_low() {
        // 140 - 1.5 * 50 = 65
        let result = eval(140.0, 1.5);
        assert_eq!(result.action, PreSleepAction::EatSnack);
        assert_eq!(result.carbohydrates, Some(15.0));
        assert!(result.correction_dose.is_none());
        assert_eq!(result.projected_glucose, 65.0);
    }

    #[test]
    fn test_small_correction_with_recheck() {
        // (240 - 100) / 50 = 2.8, halved = 1.4 -> 1.5
        let result = eval(240.0, 0.0);
        assert_eq!(result.action, PreSleepAction::SmallCorrection);
        assert_eq!(result.correction_dose, Some(1.5));
        assert!(result.recheck_at_3am);
        assert_eq!(result.reason.key(), "presleep.small_correction_recheck");
    }

    #[test]
    fn test_small_correction_above_borderline_band() {
        let result = eval(320.0, 0.0);
        assert_eq!(result.action, PreSleepAction::SmallCorrection);
        assert!(!result.recheck_at_3am);
        assert_eq!(result.correction_dose, Some(2.0));
    }

    #[test]
    fn test_sleep_in_safe_band() {
        let result = eval(140.0, 0.2);
        assert_eq!(result.action, PreSleepAction::Sleep);
        assert!(result.carbohydrates.is_none());
        assert!(result.correction_dose.is_none());
    }

    #[test]
    fn test_iob_covering_high_glucose_means_sleep() {
        // 260 - 3 * 50 = 110 projected, correction 3.2 - 3.0 = 0.2 -> 0.1 -> 0
        let result = eval(260.0, 3.0);
        assert_eq!(result.action, PreSleepAction::Sleep);
    }

    #[test]
    fn test_idempotent() {
        assert_eq!(eval(230.0, 0.5), eval(230.0, 0.5));
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(eval(140.0, 1.5)).unwrap();
        assert_eq!(json["action"], "eat_snack");
        assert!(json.get("remainingIOB").is_some());
        assert!(json.get("recheckAt3am").is_some());
    }
}
