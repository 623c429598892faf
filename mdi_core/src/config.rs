//! Engine configuration.
//!
//! Every clinical threshold the engine uses lives here so it can be
//! recalibrated without touching control flow. Configuration is loaded from
//! `$XDG_CONFIG_HOME/mdi/config.toml`; any field left out keeps its default.

use crate::i18n::{Language, MessageCatalog};
use crate::iob::DecayCurve;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub iob: IobConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub pre_sleep: PreSleepConfig,

    #[serde(default)]
    pub between_meals: BetweenMealsConfig,

    #[serde(default)]
    pub patterns: PatternConfig,

    #[serde(default)]
    pub tiers: TierConfig,

    #[serde(default)]
    pub i18n: I18nConfig,
}

/// Insulin decay curve selection
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IobConfig {
    #[serde(default)]
    pub curve: DecayCurve,
}

impl Default for IobConfig {
    fn default() -> Self {
        Self {
            curve: DecayCurve::default(),
        }
    }
}

/// Context adjustment factors, applied in field order
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContextConfig {
    #[serde(default = "default_exercise_factor")]
    pub exercise_factor: f64,

    #[serde(default = "default_illness_factor")]
    pub illness_factor: f64,

    #[serde(default = "default_stress_factor")]
    pub stress_factor: f64,

    #[serde(default = "default_menstruation_factor")]
    pub menstruation_factor: f64,

    #[serde(default = "default_high_fat_immediate_fraction")]
    pub high_fat_immediate_fraction: f64,

    #[serde(default = "default_high_fat_delay_hours")]
    pub high_fat_delay_hours: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            exercise_factor: default_exercise_factor(),
            illness_factor: default_illness_factor(),
            stress_factor: default_stress_factor(),
            menstruation_factor: default_menstruation_factor(),
            high_fat_immediate_fraction: default_high_fat_immediate_fraction(),
            high_fat_delay_hours: default_high_fat_delay_hours(),
        }
    }
}

/// Safety clamp and warning thresholds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SafetyConfig {
    #[serde(default = "default_hypo_threshold")]
    pub hypo_threshold: f64,

    #[serde(default = "default_ketone_threshold")]
    pub ketone_threshold: f64,

    /// IOB at or above this while glucose is below `stacking_glucose` warns
    #[serde(default = "default_stacking_iob_units")]
    pub stacking_iob_units: f64,

    #[serde(default = "default_stacking_glucose")]
    pub stacking_glucose: f64,

    #[serde(default = "default_nocturnal_start_hour")]
    pub nocturnal_start_hour: u32,

    #[serde(default = "default_nocturnal_end_hour")]
    pub nocturnal_end_hour: u32,

    /// Multiplier for correction-only doses during night hours
    #[serde(default = "default_nocturnal_factor")]
    pub nocturnal_factor: f64,

    #[serde(default = "default_nocturnal_max_dose")]
    pub nocturnal_max_dose: f64,

    #[serde(default = "default_high_dose_threshold")]
    pub high_dose_threshold: f64,

    #[serde(default = "default_hypo_treatment_carbs")]
    pub hypo_treatment_carbs: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            hypo_threshold: default_hypo_threshold(),
            ketone_threshold: default_ketone_threshold(),
            stacking_iob_units: default_stacking_iob_units(),
            stacking_glucose: default_stacking_glucose(),
            nocturnal_start_hour: default_nocturnal_start_hour(),
            nocturnal_end_hour: default_nocturnal_end_hour(),
            nocturnal_factor: default_nocturnal_factor(),
            nocturnal_max_dose: default_nocturnal_max_dose(),
            high_dose_threshold: default_high_dose_threshold(),
            hypo_treatment_carbs: default_hypo_treatment_carbs(),
        }
    }
}

impl SafetyConfig {
    /// Whether `hour` falls in the night window, which may wrap midnight
    pub fn is_night(&self, hour: u32) -> bool {
        let (start, end) = (self.nocturnal_start_hour, self.nocturnal_end_hour);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

/// Bedtime evaluation thresholds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PreSleepConfig {
    /// Projected glucose below this recommends a snack
    #[serde(default = "default_snack_threshold")]
    pub snack_threshold: f64,

    #[serde(default = "default_snack_carbs")]
    pub snack_carbs: f64,

    /// Glucose above this recommends a small correction
    #[serde(default = "default_presleep_correction_threshold")]
    pub correction_threshold: f64,

    #[serde(default = "default_presleep_correction_factor")]
    pub correction_factor: f64,

    /// Corrections at or below this glucose also get a 3 AM recheck
    #[serde(default = "default_recheck_upper")]
    pub recheck_upper: f64,
}

impl Default for PreSleepConfig {
    fn default() -> Self {
        Self {
            snack_threshold: default_snack_threshold(),
            snack_carbs: default_snack_carbs(),
            correction_threshold: default_presleep_correction_threshold(),
            correction_factor: default_presleep_correction_factor(),
            recheck_upper: default_recheck_upper(),
        }
    }
}

/// Between-meal correction guard
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BetweenMealsConfig {
    #[serde(default = "default_min_interval_hours")]
    pub min_interval_hours: f64,

    #[serde(default = "default_conservative_factor")]
    pub conservative_factor: f64,

    #[serde(default = "default_recheck_hours")]
    pub recheck_hours: f64,
}

impl Default for BetweenMealsConfig {
    fn default() -> Self {
        Self {
            min_interval_hours: default_min_interval_hours(),
            conservative_factor: default_conservative_factor(),
            recheck_hours: default_recheck_hours(),
        }
    }
}

/// Pattern analyzer thresholds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatternConfig {
    #[serde(default = "default_hypo_threshold")]
    pub hypo_threshold: f64,

    #[serde(default = "default_hyper_threshold")]
    pub hyper_threshold: f64,

    /// Fraction of days an hour must be affected to count as recurring
    #[serde(default = "default_min_frequency")]
    pub min_frequency: f64,

    #[serde(default = "default_min_days")]
    pub min_days: usize,

    /// Population SD (mg/dL) above which variability is flagged
    #[serde(default = "default_variability_sd")]
    pub variability_sd: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            hypo_threshold: default_hypo_threshold(),
            hyper_threshold: default_hyper_threshold(),
            min_frequency: default_min_frequency(),
            min_days: default_min_days(),
            variability_sd: default_variability_sd(),
        }
    }
}

/// Recommendation tier cutoffs. Rates are percentages.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TierConfig {
    #[serde(default = "default_hypo_threshold")]
    pub target_low: f64,

    #[serde(default = "default_hyper_threshold")]
    pub target_high: f64,

    #[serde(default = "default_urgent_hypo_rate")]
    pub urgent_hypo_rate: f64,

    #[serde(default = "default_caution_hypo_rate")]
    pub caution_hypo_rate: f64,

    #[serde(default = "default_review_in_range")]
    pub review_in_range: f64,

    #[serde(default = "default_review_hyper_rate")]
    pub review_hyper_rate: f64,

    #[serde(default = "default_optimize_in_range")]
    pub optimize_in_range: f64,

    #[serde(default = "default_monitor_in_range")]
    pub monitor_in_range: f64,

    #[serde(default = "default_well_hypo_rate")]
    pub well_hypo_rate: f64,

    #[serde(default = "default_excellent_in_range")]
    pub excellent_in_range: f64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            target_low: default_hypo_threshold(),
            target_high: default_hyper_threshold(),
            urgent_hypo_rate: default_urgent_hypo_rate(),
            caution_hypo_rate: default_caution_hypo_rate(),
            review_in_range: default_review_in_range(),
            review_hyper_rate: default_review_hyper_rate(),
            optimize_in_range: default_optimize_in_range(),
            monitor_in_range: default_monitor_in_range(),
            well_hypo_rate: default_well_hypo_rate(),
            excellent_in_range: default_excellent_in_range(),
        }
    }
}

/// Message catalog language selection
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct I18nConfig {
    #[serde(default)]
    pub language: Language,

    #[serde(default)]
    pub fallback: Option<Language>,
}

impl I18nConfig {
    pub fn catalog(&self) -> MessageCatalog {
        MessageCatalog::new(self.language, self.fallback)
    }
}

// Default value functions
fn default_exercise_factor() -> f64 {
    0.8
}

fn default_illness_factor() -> f64 {
    1.2
}

fn default_stress_factor() -> f64 {
    1.1
}

fn default_menstruation_factor() -> f64 {
    1.1
}

fn default_high_fat_immediate_fraction() -> f64 {
    0.6
}

fn default_high_fat_delay_hours() -> f64 {
    2.5
}

fn default_hypo_threshold() -> f64 {
    70.0
}

fn default_hyper_threshold() -> f64 {
    180.0
}

fn default_ketone_threshold() -> f64 {
    250.0
}

fn default_stacking_iob_units() -> f64 {
    2.0
}

fn default_stacking_glucose() -> f64 {
    120.0
}

fn default_nocturnal_start_hour() -> u32 {
    22
}

fn default_nocturnal_end_hour() -> u32 {
    6
}

fn default_nocturnal_factor() -> f64 {
    0.8
}

fn default_nocturnal_max_dose() -> f64 {
    4.0
}

fn default_high_dose_threshold() -> f64 {
    15.0
}

fn default_hypo_treatment_carbs() -> f64 {
    15.0
}

fn default_snack_threshold() -> f64 {
    100.0
}

fn default_snack_carbs() -> f64 {
    15.0
}

fn default_presleep_correction_threshold() -> f64 {
    200.0
}

fn default_presleep_correction_factor() -> f64 {
    0.5
}

fn default_recheck_upper() -> f64 {
    250.0
}

fn default_min_interval_hours() -> f64 {
    3.0
}

fn default_conservative_factor() -> f64 {
    0.5
}

fn default_recheck_hours() -> f64 {
    2.0
}

fn default_min_frequency() -> f64 {
    0.4
}

fn default_min_days() -> usize {
    3
}

fn default_variability_sd() -> f64 {
    50.0
}

fn default_urgent_hypo_rate() -> f64 {
    10.0
}

fn default_caution_hypo_rate() -> f64 {
    4.0
}

fn default_review_in_range() -> f64 {
    50.0
}

fn default_review_hyper_rate() -> f64 {
    40.0
}

fn default_optimize_in_range() -> f64 {
    70.0
}

fn default_monitor_in_range() -> f64 {
    80.0
}

fn default_well_hypo_rate() -> f64 {
    1.0
}

fn default_excellent_in_range() -> f64 {
    90.0
}

impl EngineConfig {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let base = match dirs::config_dir() {
            Some(dir) => dir,
            None => {
                let home = std::env::var("HOME")
                    .map_err(|_| Error::Config("HOME environment variable not set".into()))?;
                PathBuf::from(home).join(".config")
            }
        };
        Ok(base.join("mdi").join("config.toml"))
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject settings that would make the engine's rules meaningless
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("context.exercise_factor", self.context.exercise_factor),
            ("context.illness_factor", self.context.illness_factor),
            ("context.stress_factor", self.context.stress_factor),
            ("context.menstruation_factor", self.context.menstruation_factor),
            ("safety.nocturnal_factor", self.safety.nocturnal_factor),
            ("pre_sleep.correction_factor", self.pre_sleep.correction_factor),
            ("between_meals.conservative_factor", self.between_meals.conservative_factor),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(Error::Config(format!("{} must be positive", name)));
            }
        }

        let fraction = self.context.high_fat_immediate_fraction;
        if !(0.0..=1.0).contains(&fraction) {
            return Err(Error::Config(
                "context.high_fat_immediate_fraction must be between 0 and 1".into(),
            ));
        }

        if self.safety.nocturnal_start_hour > 23 || self.safety.nocturnal_end_hour > 23 {
            return Err(Error::Config(
                "safety nocturnal hours must be between 0 and 23".into(),
            ));
        }

        if !(self.patterns.min_frequency >= 0.0 && self.patterns.min_frequency < 1.0) {
            return Err(Error::Config(
                "patterns.min_frequency must be in [0, 1)".into(),
            ));
        }

        let t = &self.tiers;
        if t.target_low >= t.target_high {
            return Err(Error::Config("tiers.target_low must be below target_high".into()));
        }
        if t.caution_hypo_rate > t.urgent_hypo_rate {
            return Err(Error::Config(
                "tiers.caution_hypo_rate must not exceed urgent_hypo_rate".into(),
            ));
        }
        let in_range = [
            t.review_in_range,
            t.optimize_in_range,
            t.monitor_in_range,
            t.excellent_in_range,
        ];
        if in_range.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Config(
                "tiers in-range cutoffs must be ascending: review <= optimize <= monitor <= excellent"
                    .into(),
            ));
        }

        if let DecayCurve::Bilinear { peak_fraction } = self.iob.curve {
            if !(peak_fraction > 0.0 && peak_fraction < 1.0) {
                return Err(Error::Config(
                    "iob.curve.peak_fraction must be in (0, 1)".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.safety.high_dose_threshold, 15.0);
        assert_eq!(config.between_meals.min_interval_hours, 3.0);
        assert_eq!(config.context.exercise_factor, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[safety]
nocturnal_max_dose = 3.0

[i18n]
language = "es"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.safety.nocturnal_max_dose, 3.0);
        assert_eq!(config.safety.high_dose_threshold, 15.0); // default
        assert_eq!(config.i18n.language, Language::Es);
    }

    #[test]
    fn test_night_window_wraps_midnight() {
        let safety = SafetyConfig::default();
        assert!(safety.is_night(23));
        assert!(safety.is_night(0));
        assert!(safety.is_night(5));
        assert!(!safety.is_night(6));
        assert!(!safety.is_night(12));
    }

    #[test]
    fn test_rejects_unordered_tiers() {
        let mut config = EngineConfig::default();
        config.tiers.optimize_in_range = 95.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_min_frequency_range() {
        let mut config = EngineConfig::default();
        config.patterns.min_frequency = 0.0;
        assert!(config.validate().is_ok());
        config.patterns.min_frequency = 1.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = EngineConfig::default();
        config.patterns.min_days = 4;
        config.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.patterns.min_days, 4);
    }
}
