//! Context adjustments.
//!
//! Situational flags scale the raw dose multiplicatively, always in the
//! same order: exercise, illness, stress, menstruation. Alcohol never
//! changes the dose; it only adds a warning. High-fat meals change how
//! the dose is delivered, which is settled after rounding in [`crate::safety`].

use crate::config::ContextConfig;
use crate::warnings::DoseWarning;
use crate::{DoseAdjustments, DoseContext};

/// Dose after context scaling, with an audit of what moved it
#[derive(Clone, Debug, PartialEq)]
pub struct ContextOutcome {
    pub adjusted: f64,
    pub adjustments: DoseAdjustments,
    pub warnings: Vec<DoseWarning>,
}

/// Apply every enabled context factor to `raw`
pub fn apply_context(
    raw: f64,
    context: Option<&DoseContext>,
    config: &ContextConfig,
) -> ContextOutcome {
    let mut adjustments = DoseAdjustments::default();
    let mut warnings = Vec::new();
    let mut dose = raw;

    let Some(ctx) = context else {
        return ContextOutcome {
            adjusted: dose,
            adjustments,
            warnings,
        };
    };

    if ctx.recent_exercise {
        let before = dose;
        dose *= config.exercise_factor;
        adjustments.exercise = Some(before - dose);
        tracing::debug!("Exercise adjustment: {:.2} -> {:.2} U", before, dose);
    }

    if ctx.illness {
        let before = dose;
        dose *= config.illness_factor;
        adjustments.illness = Some(dose - before);
        tracing::debug!("Illness adjustment: {:.2} -> {:.2} U", before, dose);
    }

    if ctx.stress {
        let before = dose;
        dose *= config.stress_factor;
        adjustments.stress = Some(dose - before);
        tracing::debug!("Stress adjustment: {:.2} -> {:.2} U", before, dose);
    }

    if ctx.menstruation {
        let before = dose;
        dose *= config.menstruation_factor;
        adjustments.menstruation = Some(dose - before);
        tracing::debug!("Menstruation adjustment: {:.2} -> {:.2} U", before, dose);
    }

    if ctx.alcohol {
        warnings.push(DoseWarning::Alcohol);
    }

    ContextOutcome {
        adjusted: dose,
        adjustments,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DoseContext {
        DoseContext::default()
    }

    #[test]
    fn test_no_context_is_identity() {
        let out = apply_context(4.0, None, &ContextConfig::default());
        assert_eq!(out.adjusted, 4.0);
        assert_eq!(out.adjustments, DoseAdjustments::default());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_exercise_reduces() {
        let c = DoseContext {
            recent_exercise: true,
            ..ctx()
        };
        let out = apply_context(5.0, Some(&c), &ContextConfig::default());
        assert!((out.adjusted - 4.0).abs() < 1e-9);
        assert!((out.adjustments.exercise.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_illness_increases() {
        let c = DoseContext {
            illness: true,
            ..ctx()
        };
        let out = apply_context(5.0, Some(&c), &ContextConfig::default());
        assert!((out.adjusted - 6.0).abs() < 1e-9);
        assert!((out.adjustments.illness.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_combined_is_multiplicative() {
        let c = DoseContext {
            recent_exercise: true,
            illness: true,
            stress: true,
            menstruation: true,
            ..ctx()
        };
        let out = apply_context(10.0, Some(&c), &ContextConfig::default());
        let expected = 10.0 * 0.8 * 1.2 * 1.1 * 1.1;
        assert!((out.adjusted - expected).abs() < 1e-9);
    }

    #[test]
    fn test_alcohol_warns_without_changing_dose() {
        let c = DoseContext {
            alcohol: true,
            ..ctx()
        };
        let out = apply_context(3.0, Some(&c), &ContextConfig::default());
        assert_eq!(out.adjusted, 3.0);
        assert_eq!(out.warnings, vec![DoseWarning::Alcohol]);
    }
}
