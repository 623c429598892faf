#![forbid(unsafe_code)]

//! Core dose advisory engine for multiple-daily-injection insulin therapy.
//!
//! This crate provides:
//! - Domain types (profile, injections, dose requests and results)
//! - Input validation
//! - Insulin-on-board decay model
//! - Meal and correction dose calculation with context adjustments
//! - Safety clamping and structured warnings
//! - Bedtime and between-meal guards
//! - Retrospective pattern analysis and recommendation tiering
//! - Localized message catalog
//!
//! Every calculation is a pure function of its inputs. The reference time
//! is always an explicit argument.

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod i18n;
pub mod warnings;
pub mod validation;
pub mod iob;
pub mod context;
pub mod safety;
pub mod engine;
pub mod presleep;
pub mod between_meals;
pub mod patterns;
pub mod tiering;
pub mod records;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::EngineConfig;
pub use i18n::{configure, Language, Localized, MessageCatalog, MessageResolver};
pub use warnings::DoseWarning;
pub use validation::{
    validate_dose_calculation_input, validate_insulin_profile, validate_weekly_record,
};
pub use iob::{calculate_iob, DecayCurve, DecayModel};
pub use engine::DoseCalculator;
pub use presleep::{evaluate_pre_sleep, PreSleepAction, PreSleepEvaluation};
pub use between_meals::{BetweenMealCorrectionResult, BetweenMealReason};
pub use patterns::{analyze_patterns, PatternFinding, PatternReport, SuggestedAction};
pub use tiering::{build_validation_report, RecommendationTier, ValidationReport};
pub use records::{load_injections, load_weekly_record};
