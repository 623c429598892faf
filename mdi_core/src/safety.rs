//! Safety clamp, rounding and warning generation.

use crate::config::{ContextConfig, SafetyConfig};
use crate::warnings::DoseWarning;
use crate::{DoseContext, HighFatSplit, TimeOfDay};

/// Round to the nearest 0.5 U, never below zero
pub fn round_to_half(units: f64) -> f64 {
    let rounded = (units * 2.0).round() / 2.0;
    if rounded > 0.0 {
        rounded
    } else {
        0.0
    }
}

/// Round a context-adjusted dose to 0.5 U without losing the adjustment.
///
/// `baseline` is the same dose computed without context factors. When the
/// factors raised the dose the result is rounded up and lands at least one
/// step above the rounded baseline; when they lowered it the result is
/// rounded down and lands at least one step below, never under zero.
pub fn round_adjusted(adjusted: f64, baseline: f64) -> f64 {
    const EPSILON: f64 = 1e-9;
    let base = round_to_half(baseline);

    if adjusted > baseline + EPSILON {
        let up = (adjusted * 2.0 - EPSILON).ceil() / 2.0;
        up.max(base + 0.5)
    } else if adjusted < baseline - EPSILON {
        let down = (adjusted * 2.0 + EPSILON).floor() / 2.0;
        down.min(base - 0.5).max(0.0)
    } else {
        round_to_half(adjusted)
    }
}

/// Reduce correction-only doses during the night window.
///
/// Returns the new dose and the units removed, if any.
pub fn apply_nocturnal(
    dose: f64,
    time_of_day: TimeOfDay,
    hour: Option<u32>,
    config: &SafetyConfig,
) -> (f64, Option<f64>) {
    match hour {
        Some(h) if time_of_day == TimeOfDay::Correction && config.is_night(h) && dose > 0.0 => {
            let reduced = dose * config.nocturnal_factor;
            tracing::debug!("Nocturnal adjustment at {}h: {:.2} -> {:.2} U", h, dose, reduced);
            (reduced, Some(dose - reduced))
        }
        _ => (dose, None),
    }
}

/// What the clamp needs to know about a calculation
#[derive(Clone, Debug)]
pub struct ClampInput<'a> {
    pub glucose: f64,
    pub iob: f64,
    pub carbohydrates: f64,
    pub carb_dose: f64,
    pub adjusted_dose: f64,
    /// Dose the same request would reach with no context factors
    pub baseline_dose: f64,
    pub context: Option<&'a DoseContext>,
}

/// Final dose with safety warnings
#[derive(Clone, Debug, PartialEq)]
pub struct ClampOutcome {
    pub dose: f64,
    pub warnings: Vec<DoseWarning>,
    pub high_fat_split: Option<HighFatSplit>,
}

/// Round the adjusted dose and flag every unsafe condition
pub fn clamp(
    input: &ClampInput<'_>,
    safety: &SafetyConfig,
    context_config: &ContextConfig,
) -> ClampOutcome {
    let mut warnings = Vec::new();
    let glucose = input.glucose;
    let hypo = glucose < safety.hypo_threshold;

    let dose = if hypo {
        warnings.push(DoseWarning::Hypoglycemia {
            glucose,
            threshold: safety.hypo_threshold,
            carbs: safety.hypo_treatment_carbs,
        });
        0.0
    } else {
        round_adjusted(input.adjusted_dose, input.baseline_dose)
    };

    if glucose > safety.ketone_threshold {
        warnings.push(DoseWarning::CheckKetones {
            glucose,
            threshold: safety.ketone_threshold,
        });
    }

    if input.iob >= safety.stacking_iob_units && glucose < safety.stacking_glucose {
        warnings.push(DoseWarning::StackingRisk {
            iob: input.iob,
            glucose,
        });
    }

    if !hypo && input.carbohydrates > 0.0 && input.carb_dose > 0.0 && input.iob > 0.0 && dose == 0.0
    {
        warnings.push(DoseWarning::IobCoversCarbs {
            iob: input.iob,
            carbs: input.carbohydrates,
        });
    }

    let hour = input.context.and_then(|c| c.hour_of_day);
    if let Some(h) = hour {
        if safety.is_night(h) && dose > safety.nocturnal_max_dose {
            warnings.push(DoseWarning::NocturnalDose {
                dose,
                limit: safety.nocturnal_max_dose,
            });
        }
    }

    if dose > safety.high_dose_threshold {
        warnings.push(DoseWarning::HighDose {
            dose,
            limit: safety.high_dose_threshold,
        });
    }

    let high_fat = input.context.map(|c| c.high_fat_meal).unwrap_or(false);
    let high_fat_split = if high_fat && dose > 0.0 {
        let immediate = round_to_half(dose * context_config.high_fat_immediate_fraction);
        let split = HighFatSplit {
            immediate,
            delayed: dose - immediate,
            delay_hours: context_config.high_fat_delay_hours,
        };
        warnings.push(DoseWarning::SplitHighFat {
            immediate: split.immediate,
            delayed: split.delayed,
            hours: split.delay_hours,
        });
        Some(split)
    } else {
        None
    };

    for w in &warnings {
        tracing::warn!("Dose safety warning: {:?}", w);
    }

    ClampOutcome {
        dose,
        warnings,
        high_fat_split,
    }
}
