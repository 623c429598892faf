//! Dose calculation engine.
//!
//! Derives a recommended dose from carbohydrates, glucose and insulin
//! history:
//! 1. IOB from the injection history at the reference time
//! 2. Carb dose = carbohydrates / IC ratio for the meal
//! 3. Correction dose = max(0, (glucose - target) / ISF)
//! 4. Raw dose = max(0, carb + correction - IOB)
//! 5. Context factors, then between-meal and nocturnal reductions for
//!    correction-only requests
//! 6. Safety clamp: round to 0.5 U and attach warnings
//!
//! The reference time is always passed in; nothing here reads the clock.

use crate::between_meals::{self, BetweenMealCorrectionResult};
use crate::config::EngineConfig;
use crate::context::apply_context;
use crate::iob::{self, calculate_iob_with};
use crate::presleep::{self, PreSleepEvaluation};
use crate::safety::{apply_nocturnal, clamp, ClampInput};
use crate::validation::{
    validate_dose_calculation_input, validate_glucose, validate_injections,
    validate_insulin_profile,
};
use crate::{
    CalculateDoseParams, DoseBreakdown, DoseContext, DoseResult, Injection, InsulinProfile,
    Result, TimeOfDay,
};
use chrono::{DateTime, Utc};

/// Dose calculator bound to one validated profile and configuration
#[derive(Clone, Debug)]
pub struct DoseCalculator {
    profile: InsulinProfile,
    config: EngineConfig,
}

impl DoseCalculator {
    /// Create a calculator with default configuration
    pub fn new(profile: InsulinProfile) -> Result<Self> {
        Self::with_config(profile, EngineConfig::default())
    }

    /// Create a calculator with explicit configuration
    pub fn with_config(profile: InsulinProfile, config: EngineConfig) -> Result<Self> {
        validate_insulin_profile(&profile)?;
        config.validate()?;
        Ok(Self { profile, config })
    }

    pub fn profile(&self) -> &InsulinProfile {
        &self.profile
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Units still active at `now`, using the configured decay curve
    pub fn calculate_iob(&self, injections: &[Injection], now: DateTime<Utc>) -> f64 {
        calculate_iob_with(
            &self.config.iob.curve,
            injections,
            self.profile.dia_hours,
            now,
        )
    }

    /// Calculate a dose for any request, dispatching on `time_of_day`
    pub fn calculate_dose(
        &self,
        params: &CalculateDoseParams,
        now: DateTime<Utc>,
    ) -> Result<DoseResult> {
        validate_dose_calculation_input(params)?;
        Ok(self.compute(params, now))
    }

    pub fn calculate_breakfast_dose(
        &self,
        glucose: f64,
        carbohydrates: f64,
        previous_injections: &[Injection],
        context: Option<&DoseContext>,
        now: DateTime<Utc>,
    ) -> Result<DoseResult> {
        self.calculate_meal_dose(
            TimeOfDay::Breakfast,
            glucose,
            carbohydrates,
            previous_injections,
            context,
            now,
        )
    }

    pub fn calculate_lunch_dose(
        &self,
        glucose: f64,
        carbohydrates: f64,
        previous_injections: &[Injection],
        context: Option<&DoseContext>,
        now: DateTime<Utc>,
    ) -> Result<DoseResult> {
        self.calculate_meal_dose(
            TimeOfDay::Lunch,
            glucose,
            carbohydrates,
            previous_injections,
            context,
            now,
        )
    }

    pub fn calculate_dinner_dose(
        &self,
        glucose: f64,
        carbohydrates: f64,
        previous_injections: &[Injection],
        context: Option<&DoseContext>,
        now: DateTime<Utc>,
    ) -> Result<DoseResult> {
        self.calculate_meal_dose(
            TimeOfDay::Dinner,
            glucose,
            carbohydrates,
            previous_injections,
            context,
            now,
        )
    }

    /// Correction-only dose; carbohydrates are ignored
    pub fn calculate_correction_dose(
        &self,
        glucose: f64,
        previous_injections: &[Injection],
        context: Option<&DoseContext>,
        now: DateTime<Utc>,
    ) -> Result<DoseResult> {
        let params = CalculateDoseParams {
            time_of_day: TimeOfDay::Correction,
            glucose,
            carbohydrates: None,
            previous_injections: previous_injections.to_vec(),
            context: context.cloned(),
        };
        self.calculate_dose(&params, now)
    }

    /// Bedtime recommendation from current glucose and active insulin
    pub fn evaluate_pre_sleep(
        &self,
        glucose: f64,
        previous_injections: &[Injection],
        now: DateTime<Utc>,
    ) -> Result<PreSleepEvaluation> {
        validate_glucose(glucose)?;
        validate_injections(previous_injections)?;
        let iob = self.calculate_iob(previous_injections, now);
        Ok(presleep::evaluate_pre_sleep(
            glucose,
            iob,
            &self.profile,
            &self.config.pre_sleep,
        ))
    }

    /// Ad-hoc correction outside a meal, guarded by the minimum interval
    pub fn calculate_between_meal_correction(
        &self,
        glucose: f64,
        previous_injections: &[Injection],
        now: DateTime<Utc>,
    ) -> Result<BetweenMealCorrectionResult> {
        validate_glucose(glucose)?;
        validate_injections(previous_injections)?;
        Ok(between_meals::calculate_between_meal_correction(
            glucose,
            previous_injections,
            &self.profile,
            &self.config,
            now,
        ))
    }

    fn calculate_meal_dose(
        &self,
        time_of_day: TimeOfDay,
        glucose: f64,
        carbohydrates: f64,
        previous_injections: &[Injection],
        context: Option<&DoseContext>,
        now: DateTime<Utc>,
    ) -> Result<DoseResult> {
        let params = CalculateDoseParams {
            time_of_day,
            glucose,
            carbohydrates: Some(carbohydrates),
            previous_injections: previous_injections.to_vec(),
            context: context.cloned(),
        };
        self.calculate_dose(&params, now)
    }

    /// Between-meal halving then nocturnal reduction, correction requests only
    fn reduce_correction(
        &self,
        dose: f64,
        params: &CalculateDoseParams,
        hour: Option<u32>,
        now: DateTime<Utc>,
    ) -> Reduced {
        let time_of_day = params.time_of_day;
        let mut dose = dose;
        let mut between_meals = None;

        // Correction shortly after another injection: stacking protection
        if time_of_day == TimeOfDay::Correction && dose > 0.0 {
            let recent = iob::last_injection(&params.previous_injections)
                .map(|last| iob::hours_since(last, now))
                .filter(|hours| *hours < self.config.between_meals.min_interval_hours);
            if let Some(hours) = recent {
                let reduced = dose * self.config.between_meals.conservative_factor;
                tracing::debug!(
                    "Between-meal adjustment ({:.1}h since last injection): {:.2} -> {:.2} U",
                    hours,
                    dose,
                    reduced
                );
                between_meals = Some(dose - reduced);
                dose = reduced;
            }
        }

        let (dose, nocturnal) = apply_nocturnal(dose, time_of_day, hour, &self.config.safety);
        Reduced {
            dose,
            between_meals,
            nocturnal,
        }
    }

    /// Run the derivation on already-validated input
    fn compute(&self, params: &CalculateDoseParams, now: DateTime<Utc>) -> DoseResult {
        let profile = &self.profile;
        let time_of_day = params.time_of_day;
        let glucose = params.glucose;
        let context = params.context.as_ref();

        let iob = self.calculate_iob(&params.previous_injections, now);

        let carbohydrates = match time_of_day {
            TimeOfDay::Correction => 0.0,
            _ => params.carbohydrates.unwrap_or(0.0),
        };
        let carb_dose = profile
            .ic_ratio_for(time_of_day)
            .map(|ratio| carbohydrates / ratio)
            .unwrap_or(0.0);

        let correction_dose = ((glucose - profile.target) / profile.isf).max(0.0);
        let raw = (carb_dose + correction_dose - iob).max(0.0);

        tracing::debug!(
            "{:?}: carb {:.2} U + correction {:.2} U - IOB {:.2} U = raw {:.2} U",
            time_of_day,
            carb_dose,
            correction_dose,
            iob,
            raw
        );

        let context_outcome = apply_context(raw, context, &self.config.context);
        let mut adjustments = context_outcome.adjustments;

        let hour = context.and_then(|c| c.hour_of_day);
        let reduced = self.reduce_correction(context_outcome.adjusted, params, hour, now);
        adjustments.between_meals = reduced.between_meals;
        adjustments.nocturnal = reduced.nocturnal;
        let adjusted = reduced.dose;

        // Same reductions without context factors, so rounding can keep
        // the direction the factors moved the dose
        let baseline = self.reduce_correction(raw, params, hour, now).dose;

        let clamped = clamp(
            &ClampInput {
                glucose,
                iob,
                carbohydrates,
                carb_dose,
                adjusted_dose: adjusted,
                baseline_dose: baseline,
                context,
            },
            &self.config.safety,
            &self.config.context,
        );
        adjustments.high_fat_split = clamped.high_fat_split;

        let delivered_before_rounding = if glucose < self.config.safety.hypo_threshold {
            0.0
        } else {
            adjusted
        };

        let mut warnings = clamped.warnings;
        warnings.extend(context_outcome.warnings);

        tracing::info!(
            "{:?} dose for glucose {:.0} mg/dL: {:.1} U ({} warnings)",
            time_of_day,
            glucose,
            clamped.dose,
            warnings.len()
        );

        DoseResult {
            dose: clamped.dose,
            breakdown: DoseBreakdown {
                carb_dose,
                correction_dose,
                iob,
                carbohydrates,
                glucose,
                target_glucose: profile.target,
                safety_reduction: raw - delivered_before_rounding,
                adjustments,
            },
            warnings,
        }
    }
}

/// Dose after the correction-only reductions
struct Reduced {
    dose: f64,
    between_meals: Option<f64>,
    nocturnal: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warnings::DoseWarning;
    use crate::{Error, IcRatio};
    use chrono::{Duration, TimeZone};

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

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn calculator() -> DoseCalculator {
        DoseCalculator::new(profile()).unwrap()
    }

    fn is_half_step(dose: f64) -> bool {
        dose >= 0.0 && (dose * 2.0).fract() == 0.0
    }

    #[test]
    fn test_breakfast_example() {
        let params = CalculateDoseParams {
            time_of_day: TimeOfDay::Breakfast,
            glucose: 180.0,
            carbohydrates: Some(60.0),
            previous_injections: vec![],
            context: None,
        };
        let result = calculator().calculate_dose(&params, now()).unwrap();

        assert!((result.breakdown.carb_dose - 4.0).abs() < 1e-9);
        assert!((result.breakdown.correction_dose - 1.6).abs() < 1e-9);
        assert_eq!(result.breakdown.iob, 0.0);
        assert_eq!(result.dose, 5.5);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let mut p = profile();
        p.isf = 5.0;
        assert!(matches!(
            DoseCalculator::new(p),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_out_of_range_glucose_rejected() {
        let err = calculator()
            .calculate_correction_dose(10.0, &[], None, now())
            .unwrap_err();
        assert_eq!(err.field(), Some("glucose"));
    }

    #[test]
    fn test_correction_zero_at_or_below_target() {
        for glucose in [80.0, 100.0] {
            let result = calculator()
                .calculate_correction_dose(glucose, &[], None, now())
                .unwrap();
            assert_eq!(result.breakdown.correction_dose, 0.0);
            assert_eq!(result.dose, 0.0);
        }
    }

    #[test]
    fn test_correction_ignores_carbohydrates() {
        let params = CalculateDoseParams {
            time_of_day: TimeOfDay::Correction,
            glucose: 200.0,
            carbohydrates: Some(50.0),
            previous_injections: vec![],
            context: None,
        };
        let result = calculator().calculate_dose(&params, now()).unwrap();
        assert_eq!(result.breakdown.carb_dose, 0.0);
        assert_eq!(result.breakdown.carbohydrates, 0.0);
        assert_eq!(result.dose, 2.0);
    }

    #[test]
    fn test_iob_subtracted() {
        let injections = [Injection::at(now() - Duration::hours(1), 3.0)];
        let with_iob = calculator()
            .calculate_lunch_dose(150.0, 60.0, &injections, None, now())
            .unwrap();
        let without = calculator()
            .calculate_lunch_dose(150.0, 60.0, &[], None, now())
            .unwrap();
        assert!(with_iob.breakdown.iob > 0.0);
        assert!(with_iob.dose < without.dose);
    }

    #[test]
    fn test_doses_are_half_unit_steps() {
        let calc = calculator();
        for glucose in (60..=400).step_by(17) {
            for carbs in [0.0, 13.0, 47.0, 95.0] {
                let result = calc
                    .calculate_dinner_dose(glucose as f64, carbs, &[], None, now())
                    .unwrap();
                assert!(is_half_step(result.dose), "dose {}", result.dose);
            }
        }
    }

    #[test]
    fn test_exercise_decreases_illness_increases() {
        let calc = calculator();
        let exercise = DoseContext {
            recent_exercise: true,
            ..Default::default()
        };
        let illness = DoseContext {
            illness: true,
            ..Default::default()
        };
        let dose = |time_of_day, glucose, carbs, context: Option<&DoseContext>| {
            let params = CalculateDoseParams {
                time_of_day,
                glucose,
                carbohydrates: Some(carbs),
                previous_injections: vec![],
                context: context.cloned(),
            };
            calc.calculate_dose(&params, now()).unwrap()
        };

        for time_of_day in [TimeOfDay::Breakfast, TimeOfDay::Correction] {
            for glucose in (70..=400).step_by(5) {
                for carbs in [0.0, 6.0, 18.0, 33.0, 60.0, 95.0] {
                    let glucose = glucose as f64;
                    let base = dose(time_of_day, glucose, carbs, None);
                    let lower = dose(time_of_day, glucose, carbs, Some(&exercise));
                    let higher = dose(time_of_day, glucose, carbs, Some(&illness));
                    let b = &base.breakdown;
                    let raw = (b.carb_dose + b.correction_dose - b.iob).max(0.0);
                    let case = format!("{:?} glucose {} carbs {}", time_of_day, glucose, carbs);

                    assert!(
                        lower.dose < base.dose || (base.dose == 0.0 && lower.dose == 0.0),
                        "exercise {} vs {} at {}",
                        lower.dose,
                        base.dose,
                        case
                    );
                    if raw > 0.0 {
                        assert!(
                            higher.dose > base.dose,
                            "illness {} vs {} at {}",
                            higher.dose,
                            base.dose,
                            case
                        );
                        assert!(lower.breakdown.safety_reduction > 0.0, "{}", case);
                        assert!(higher.breakdown.safety_reduction < 0.0, "{}", case);
                    } else {
                        assert_eq!(higher.dose, 0.0, "{}", case);
                    }
                }
            }
        }
    }

    #[test]
    fn test_small_context_change_survives_rounding() {
        let calc = calculator();
        let illness = DoseContext {
            illness: true,
            ..Default::default()
        };
        // 1.0 U correction; 1.2 U would round back to 1.0
        let base = calc.calculate_correction_dose(150.0, &[], None, now()).unwrap();
        let sick = calc
            .calculate_correction_dose(150.0, &[], Some(&illness), now())
            .unwrap();
        assert_eq!(base.dose, 1.0);
        assert_eq!(sick.dose, 1.5);

        let exercise = DoseContext {
            recent_exercise: true,
            ..Default::default()
        };
        // 18 g at target is 1.2 U; 0.96 U would round back to 1.0
        let base = calc.calculate_breakfast_dose(100.0, 18.0, &[], None, now()).unwrap();
        let exercised = calc
            .calculate_breakfast_dose(100.0, 18.0, &[], Some(&exercise), now())
            .unwrap();
        assert_eq!(base.dose, 1.0);
        assert_eq!(exercised.dose, 0.5);
    }

    #[test]
    fn test_hypoglycemia_returns_zero_with_warning() {
        let result = calculator()
            .calculate_lunch_dose(55.0, 40.0, &[], None, now())
            .unwrap();
        assert_eq!(result.dose, 0.0);
        assert!(result.has_warning("warning.hypoglycemia"));
        assert!(result.breakdown.safety_reduction > 0.0);
    }

    #[test]
    fn test_recent_injection_halves_correction() {
        let injections = [Injection::at(now() - Duration::hours(2), 1.0)];
        let result = calculator()
            .calculate_correction_dose(300.0, &injections, None, now())
            .unwrap();
        assert!(result.breakdown.adjustments.between_meals.is_some());

        let old = [Injection::at(now() - Duration::hours(5), 1.0)];
        let result = calculator()
            .calculate_correction_dose(300.0, &old, None, now())
            .unwrap();
        assert!(result.breakdown.adjustments.between_meals.is_none());
        assert_eq!(result.dose, 4.0);
        assert!(result.has_warning("warning.check_ketones"));
    }

    #[test]
    fn test_nocturnal_correction_reduced() {
        let night = DoseContext {
            hour_of_day: Some(2),
            ..Default::default()
        };
        let result = calculator()
            .calculate_correction_dose(250.0, &[], Some(&night), now())
            .unwrap();
        // 3.0 U * 0.8
        assert_eq!(result.dose, 2.5);
        assert!(result.breakdown.adjustments.nocturnal.is_some());
    }

    #[test]
    fn test_high_dose_warning() {
        let result = calculator()
            .calculate_dinner_dose(300.0, 150.0, &[], None, now())
            .unwrap();
        assert!(result.dose > 15.0);
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, DoseWarning::HighDose { .. })));
    }

    #[test]
    fn test_alcohol_and_high_fat() {
        let ctx = DoseContext {
            alcohol: true,
            high_fat_meal: true,
            ..Default::default()
        };
        let result = calculator()
            .calculate_dinner_dose(120.0, 80.0, &[], Some(&ctx), now())
            .unwrap();
        assert!(result.has_warning("warning.alcohol"));
        assert!(result.has_warning("warning.split_high_fat"));
        let split = result.breakdown.adjustments.high_fat_split.unwrap();
        assert_eq!(split.immediate + split.delayed, result.dose);
    }

    #[test]
    fn test_explicit_time_makes_result_deterministic() {
        let injections = [Injection::at(now() - Duration::minutes(45), 2.0)];
        let a = calculator()
            .calculate_breakfast_dose(170.0, 50.0, &injections, None, now())
            .unwrap();
        let b = calculator()
            .calculate_breakfast_dose(170.0, 50.0, &injections, None, now())
            .unwrap();
        assert_eq!(a, b);
    }
}
