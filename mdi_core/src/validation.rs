//! Input validation.
//!
//! Every external input is range- and shape-checked before any
//! calculation runs. Failures name the offending field and the rule it
//! broke; values are never clamped into range.

use crate::{
    CalculateDoseParams, DoseContext, Error, GlucoseMeasurement, Injection, InsulinProfile, Meal,
    Result, WeeklyRecord,
};

pub const ISF_RANGE: (f64, f64) = (10.0, 200.0);
pub const IC_RATIO_RANGE: (f64, f64) = (3.0, 30.0);
pub const DIA_RANGE: (f64, f64) = (2.0, 8.0);
pub const TARGET_RANGE: (f64, f64) = (70.0, 180.0);
pub const GLUCOSE_RANGE: (f64, f64) = (20.0, 600.0);
pub const CARBS_RANGE: (f64, f64) = (0.0, 300.0);
pub const MAX_INJECTION_UNITS: f64 = 50.0;
pub const WEEK_DAYS_RANGE: (usize, usize) = (3, 14);

fn check_range(field: &str, value: f64, (min, max): (f64, f64)) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(Error::validation(
            field,
            format!("must be between {} and {} (got {})", min, max, value),
        ));
    }
    Ok(())
}

/// Validate a patient's insulin profile
pub fn validate_insulin_profile(profile: &InsulinProfile) -> Result<()> {
    check_range("isf", profile.isf, ISF_RANGE)?;
    check_range("icRatio.breakfast", profile.ic_ratio.breakfast, IC_RATIO_RANGE)?;
    check_range("icRatio.lunch", profile.ic_ratio.lunch, IC_RATIO_RANGE)?;
    check_range("icRatio.dinner", profile.ic_ratio.dinner, IC_RATIO_RANGE)?;
    check_range("diaHours", profile.dia_hours, DIA_RANGE)?;
    check_range("target", profile.target, TARGET_RANGE)?;
    Ok(())
}

/// Validate one injection, `field` being its path for error reporting
pub fn validate_injection(field: &str, injection: &Injection) -> Result<()> {
    if injection.timestamp <= 0 {
        return Err(Error::validation(
            format!("{}.timestamp", field),
            "must be a positive epoch-millisecond timestamp",
        ));
    }
    let units = injection.units;
    if !units.is_finite() || units <= 0.0 || units > MAX_INJECTION_UNITS {
        return Err(Error::validation(
            format!("{}.units", field),
            format!("must be greater than 0 and at most {} (got {})", MAX_INJECTION_UNITS, units),
        ));
    }
    Ok(())
}

/// Validate a meal record
pub fn validate_meal(meal: &Meal) -> Result<()> {
    if meal.timestamp <= 0 {
        return Err(Error::validation(
            "timestamp",
            "must be a positive epoch-millisecond timestamp",
        ));
    }
    check_range("carbohydrates", meal.carbohydrates, CARBS_RANGE)
}

/// Validate situational context
pub fn validate_context(field: &str, context: &DoseContext) -> Result<()> {
    if let Some(hour) = context.hour_of_day {
        if hour > 23 {
            return Err(Error::validation(
                format!("{}.hourOfDay", field),
                format!("must be between 0 and 23 (got {})", hour),
            ));
        }
    }
    Ok(())
}

/// Validate glucose, carbohydrates and history for a dose request
pub fn validate_dose_calculation_input(params: &CalculateDoseParams) -> Result<()> {
    check_range("glucose", params.glucose, GLUCOSE_RANGE)?;
    if let Some(carbs) = params.carbohydrates {
        check_range("carbohydrates", carbs, CARBS_RANGE)?;
    }
    for (i, injection) in params.previous_injections.iter().enumerate() {
        validate_injection(&format!("previousInjections[{}]", i), injection)?;
    }
    if let Some(ref context) = params.context {
        validate_context("context", context)?;
    }
    Ok(())
}

/// Validate a bare glucose reading
pub fn validate_glucose(glucose: f64) -> Result<()> {
    check_range("glucose", glucose, GLUCOSE_RANGE)
}

/// Validate an injection history
pub fn validate_injections(injections: &[Injection]) -> Result<()> {
    for (i, injection) in injections.iter().enumerate() {
        validate_injection(&format!("previousInjections[{}]", i), injection)?;
    }
    Ok(())
}

fn validate_measurement(field: &str, m: &GlucoseMeasurement) -> Result<()> {
    check_range(&format!("{}.glucose", field), m.glucose, GLUCOSE_RANGE)?;
    if let Some(later) = m.glucose_3h_later {
        check_range(&format!("{}.glucose3hLater", field), later, GLUCOSE_RANGE)?;
    }
    if let Some(insulin) = m.insulin {
        if !insulin.is_finite() || insulin < 0.0 || insulin > MAX_INJECTION_UNITS {
            return Err(Error::validation(
                format!("{}.insulin", field),
                format!("must be between 0 and {} (got {})", MAX_INJECTION_UNITS, insulin),
            ));
        }
    }
    if let Some(carbs) = m.carbs {
        check_range(&format!("{}.carbs", field), carbs, CARBS_RANGE)?;
    }
    Ok(())
}

/// Validate a multi-day record for retrospective analysis
pub fn validate_weekly_record(record: &WeeklyRecord) -> Result<()> {
    let (min, max) = WEEK_DAYS_RANGE;
    let len = record.days.len();
    if len < min || len > max {
        return Err(Error::validation(
            "days",
            format!("must contain between {} and {} days (got {})", min, max, len),
        ));
    }

    for (d, day) in record.days.iter().enumerate() {
        if day.measurements.is_empty() {
            return Err(Error::validation(
                format!("days[{}].measurements", d),
                "must contain at least one measurement",
            ));
        }
        for (i, m) in day.measurements.iter().enumerate() {
            validate_measurement(&format!("days[{}].measurements[{}]", d, i), m)?;
        }
    }
    Ok(())
}
