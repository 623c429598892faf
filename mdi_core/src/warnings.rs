//! Structured dose warnings.
//!
//! Warnings are codes with parameters; text comes from the message catalog.

use crate::i18n::{units, whole, Localized};
use serde::{Deserialize, Serialize};

/// A safety condition attached to a dose result
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DoseWarning {
    /// Glucose below the hypoglycemia threshold; treat with carbohydrates
    Hypoglycemia {
        glucose: f64,
        threshold: f64,
        carbs: f64,
    },
    CheckKetones { glucose: f64, threshold: f64 },
    /// Substantial insulin still active while glucose is low
    StackingRisk { iob: f64, glucose: f64 },
    /// Carbohydrates will be eaten with active insulin covering them
    IobCoversCarbs { iob: f64, carbs: f64 },
    NocturnalDose { dose: f64, limit: f64 },
    HighDose { dose: f64, limit: f64 },
    Alcohol,
    SplitHighFat {
        immediate: f64,
        delayed: f64,
        hours: f64,
    },
}

impl Localized for DoseWarning {
    fn key(&self) -> &'static str {
        match self {
            DoseWarning::Hypoglycemia { .. } => "warning.hypoglycemia",
            DoseWarning::CheckKetones { .. } => "warning.check_ketones",
            DoseWarning::StackingRisk { .. } => "warning.stacking_risk",
            DoseWarning::IobCoversCarbs { .. } => "warning.iob_covers_carbs",
            DoseWarning::NocturnalDose { .. } => "warning.nocturnal_dose",
            DoseWarning::HighDose { .. } => "warning.high_dose",
            DoseWarning::Alcohol => "warning.alcohol",
            DoseWarning::SplitHighFat { .. } => "warning.split_high_fat",
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match *self {
            DoseWarning::Hypoglycemia {
                glucose,
                threshold,
                carbs,
            } => vec![
                ("glucose", whole(glucose)),
                ("threshold", whole(threshold)),
                ("carbs", whole(carbs)),
            ],
            DoseWarning::CheckKetones { glucose, threshold } => {
                vec![("glucose", whole(glucose)), ("threshold", whole(threshold))]
            }
            DoseWarning::StackingRisk { iob, glucose } => {
                vec![("iob", units(iob)), ("glucose", whole(glucose))]
            }
            DoseWarning::IobCoversCarbs { iob, carbs } => {
                vec![("iob", units(iob)), ("carbs", whole(carbs))]
            }
            DoseWarning::NocturnalDose { dose, limit } | DoseWarning::HighDose { dose, limit } => {
                vec![("dose", units(dose)), ("limit", units(limit))]
            }
            DoseWarning::Alcohol => vec![],
            DoseWarning::SplitHighFat {
                immediate,
                delayed,
                hours,
            } => vec![
                ("immediate", units(immediate)),
                ("delayed", units(delayed)),
                ("hours", units(hours)),
            ],
        }
    }
}
