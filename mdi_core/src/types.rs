//! Core domain types for the MDI dose advisory engine.
//!
//! This module defines the request-scoped value objects the engine consumes
//! and produces:
//! - Insulin profile, injections and meals
//! - Dose requests, context and results
//! - Retrospective glucose records
//!
//! Wire names are camelCase so records produced by the surrounding
//! application deserialize directly.

use crate::warnings::DoseWarning;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Profile Types
// ============================================================================

/// Grams of carbohydrate covered by one unit, per meal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct IcRatio {
    pub breakfast: f64,
    pub lunch: f64,
    pub dinner: f64,
}

/// Patient's personalized dosing parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InsulinProfile {
    /// mg/dL drop per unit
    pub isf: f64,
    pub ic_ratio: IcRatio,
    pub dia_hours: f64,
    /// Target glucose, mg/dL
    pub target: f64,
}

impl InsulinProfile {
    /// IC ratio for a meal; `None` for correction-only requests
    pub fn ic_ratio_for(&self, time_of_day: TimeOfDay) -> Option<f64> {
        match time_of_day {
            TimeOfDay::Breakfast => Some(self.ic_ratio.breakfast),
            TimeOfDay::Lunch => Some(self.ic_ratio.lunch),
            TimeOfDay::Dinner => Some(self.ic_ratio.dinner),
            TimeOfDay::Correction => None,
        }
    }
}

// ============================================================================
// History Types
// ============================================================================

/// A past insulin administration
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Injection {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub units: f64,
}

impl Injection {
    pub fn at(time: DateTime<Utc>, units: f64) -> Self {
        Self {
            timestamp: time.timestamp_millis(),
            units,
        }
    }
}

/// Carbohydrate absorption speed
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Fast,
    Normal,
    Slow,
    VerySlow,
}

impl MealType {
    /// Typical hours for the carbohydrates to be absorbed
    pub fn absorption_hours(self) -> f64 {
        match self {
            MealType::Fast => 2.0,
            MealType::Normal => 3.0,
            MealType::Slow => 4.0,
            MealType::VerySlow => 5.0,
        }
    }
}

/// A carbohydrate intake event
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Meal {
    /// Epoch milliseconds
    pub timestamp: i64,
    pub carbohydrates: f64,
    #[serde(rename = "type")]
    pub meal_type: MealType,
}

// ============================================================================
// Request Types
// ============================================================================

/// Which dose is being asked for
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Breakfast,
    Lunch,
    Dinner,
    Correction,
}

/// Situational modifiers for one calculation. Absent flags mean no adjustment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DoseContext {
    pub recent_exercise: bool,
    pub alcohol: bool,
    pub illness: bool,
    pub stress: bool,
    pub menstruation: bool,
    pub high_fat_meal: bool,
    /// Local hour, 0-23
    pub hour_of_day: Option<u32>,
}

/// One dose request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculateDoseParams {
    pub time_of_day: TimeOfDay,
    pub glucose: f64,
    #[serde(default)]
    pub carbohydrates: Option<f64>,
    #[serde(default)]
    pub previous_injections: Vec<Injection>,
    #[serde(default)]
    pub context: Option<DoseContext>,
}

// ============================================================================
// Result Types
// ============================================================================

/// Delivery split recommended for a high-fat meal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HighFatSplit {
    pub immediate: f64,
    pub delayed: f64,
    pub delay_hours: f64,
}

/// Units moved by each context adjustment. Reductions are positive for
/// exercise, nocturnal and between-meal entries; increases are positive for
/// illness, stress and menstruation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DoseAdjustments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub illness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menstruation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nocturnal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub between_meals: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_fat_split: Option<HighFatSplit>,
}

/// Itemized derivation of a dose
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoseBreakdown {
    pub carb_dose: f64,
    pub correction_dose: f64,
    pub iob: f64,
    pub carbohydrates: f64,
    pub glucose: f64,
    pub target_glucose: f64,
    /// Raw dose minus the adjusted dose before rounding; negative when
    /// context increased it
    pub safety_reduction: f64,
    pub adjustments: DoseAdjustments,
}

/// Final engine output
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DoseResult {
    /// Units, in 0.5 U increments
    pub dose: f64,
    pub breakdown: DoseBreakdown,
    pub warnings: Vec<DoseWarning>,
}

impl DoseResult {
    pub fn has_warning(&self, key: &str) -> bool {
        use crate::i18n::Localized;
        self.warnings.iter().any(|w| w.key() == key)
    }
}

// ============================================================================
// Retrospective Records
// ============================================================================

/// One retrospective glucose sample
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlucoseMeasurement {
    pub timestamp: DateTime<Utc>,
    pub glucose: f64,
    #[serde(rename = "glucose3hLater", default)]
    pub glucose_3h_later: Option<f64>,
    #[serde(default)]
    pub insulin: Option<f64>,
    #[serde(default)]
    pub carbs: Option<f64>,
}

/// One day of measurements
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub measurements: Vec<GlucoseMeasurement>,
}

/// Multi-day dataset for analysis; serializes as a bare array of days
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct WeeklyRecord {
    pub days: Vec<DayRecord>,
}

impl WeeklyRecord {
    pub fn new(days: Vec<DayRecord>) -> Self {
        Self { days }
    }

    /// Every measurement across all days, in day order
    pub fn measurements(&self) -> impl Iterator<Item = &GlucoseMeasurement> + '_ {
        self.days.iter().flat_map(|d| d.measurements.iter())
    }
}
