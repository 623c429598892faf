//! Between-meal correction guard.
//!
//! A correction outside a meal is only allowed once the minimum interval
//! since the last injection has passed. A refusal is a normal result with
//! `dose = 0`, not an error.

use crate::config::EngineConfig;
use crate::i18n::{units, whole, Localized};
use crate::iob::{calculate_iob_with, hours_since, last_injection};
use crate::safety::round_to_half;
use crate::warnings::DoseWarning;
use crate::{Injection, InsulinProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the guard
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BetweenMealReason {
    MustWait { elapsed_hours: f64, min_hours: f64 },
    BelowTarget { glucose: f64 },
    NoCorrectionNeeded { iob: f64 },
    Correction { dose: f64, recheck_hours: f64 },
}

impl Localized for BetweenMealReason {
    fn key(&self) -> &'static str {
        match self {
            BetweenMealReason::MustWait { .. } => "between.must_wait",
            BetweenMealReason::BelowTarget { .. } => "between.below_target",
            BetweenMealReason::NoCorrectionNeeded { .. } => "between.no_correction_needed",
            BetweenMealReason::Correction { .. } => "between.correction",
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match *self {
            BetweenMealReason::MustWait {
                elapsed_hours,
                min_hours,
            } => vec![("hours", units(elapsed_hours)), ("min", whole(min_hours))],
            BetweenMealReason::BelowTarget { glucose } => vec![("glucose", whole(glucose))],
            BetweenMealReason::NoCorrectionNeeded { iob } => vec![("iob", units(iob))],
            BetweenMealReason::Correction {
                dose,
                recheck_hours,
            } => vec![("dose", units(dose)), ("hours", whole(recheck_hours))],
        }
    }
}

/// Ad-hoc correction outcome
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BetweenMealCorrectionResult {
    pub dose: f64,
    pub reason: BetweenMealReason,
    pub warnings: Vec<DoseWarning>,
    pub hours_since_last_injection: Option<f64>,
    pub iob: f64,
}

/// Guarded, conservative correction outside a meal
pub fn calculate_between_meal_correction(
    glucose: f64,
    previous_injections: &[Injection],
    profile: &InsulinProfile,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> BetweenMealCorrectionResult {
    let guard = &config.between_meals;
    let safety = &config.safety;

    let mut warnings = Vec::new();
    if glucose < safety.hypo_threshold {
        warnings.push(DoseWarning::Hypoglycemia {
            glucose,
            threshold: safety.hypo_threshold,
            carbs: safety.hypo_treatment_carbs,
        });
    }
    if glucose > safety.ketone_threshold {
        warnings.push(DoseWarning::CheckKetones {
            glucose,
            threshold: safety.ketone_threshold,
        });
    }

    let elapsed = last_injection(previous_injections).map(|last| hours_since(last, now));
    let iob = calculate_iob_with(
        &config.iob.curve,
        previous_injections,
        profile.dia_hours,
        now,
    );

    let result = |dose: f64, reason: BetweenMealReason, warnings: Vec<DoseWarning>| {
        BetweenMealCorrectionResult {
            dose,
            reason,
            warnings,
            hours_since_last_injection: elapsed,
            iob,
        }
    };

    if let Some(hours) = elapsed {
        if hours < guard.min_interval_hours {
            tracing::info!(
                "Between-meal correction refused: {:.1}h since last injection (< {}h)",
                hours,
                guard.min_interval_hours
            );
            return result(
                0.0,
                BetweenMealReason::MustWait {
                    elapsed_hours: hours.max(0.0),
                    min_hours: guard.min_interval_hours,
                },
                warnings,
            );
        }
    }

    let correction = ((glucose - profile.target) / profile.isf).max(0.0);
    if correction == 0.0 || glucose < safety.hypo_threshold {
        return result(0.0, BetweenMealReason::BelowTarget { glucose }, warnings);
    }

    if iob >= correction {
        tracing::info!(
            "Between-meal correction not needed: IOB {:.2} U covers {:.2} U",
            iob,
            correction
        );
        return result(0.0, BetweenMealReason::NoCorrectionNeeded { iob }, warnings);
    }

    let dose = round_to_half((correction - iob) * guard.conservative_factor);
    if dose == 0.0 {
        return result(0.0, BetweenMealReason::NoCorrectionNeeded { iob }, warnings);
    }

    if dose > safety.high_dose_threshold {
        warnings.push(DoseWarning::HighDose {
            dose,
            limit: safety.high_dose_threshold,
        });
    }

    tracing::info!(
        "Between-meal correction: {:.1} U (full correction {:.2} U, IOB {:.2} U)",
        dose,
        correction,
        iob
    );
    result(
        dose,
        BetweenMealReason::Correction {
            dose,
            recheck_hours: guard.recheck_hours,
        },
        warnings,
    )
}
