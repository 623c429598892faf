//! Retrospective pattern analysis.
//!
//! Measurements are bucketed by hour of day (taken from the measurement
//! timestamp as recorded). For each hour we count the distinct days that
//! had at least one low or high reading. An hour is a recurring problem
//! when the share of observed days affected exceeds `min_frequency` and at
//! least `min_days` days are affected.
//!
//! Findings are produced lazily by [`PatternReport::findings`]; calling it
//! again restarts the sequence.

use crate::config::PatternConfig;
use crate::i18n::{units, Localized};
use crate::validation::validate_weekly_record;
use crate::{Result, WeeklyRecord};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-hour occurrence counts
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HourStats {
    pub hour: u32,
    pub readings: usize,
    pub days_observed: usize,
    pub hypo_days: usize,
    pub hyper_days: usize,
}

/// Corrective direction for a finding
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuggestedAction {
    ReduceDose { hour: u32 },
    IncreaseDose { hour: u32 },
    ImproveConsistency,
    NoChange,
}

/// One detected pattern
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum PatternFinding {
    RecurringHypoglycemia { hour: u32, days: usize, total_days: usize },
    RecurringHyperglycemia { hour: u32, days: usize, total_days: usize },
    HighVariability { standard_deviation: f64 },
    NoPatterns,
}

impl PatternFinding {
    /// Hour bucket as "HH:00-HH:00", when the finding has one
    pub fn time_descriptor(&self) -> Option<String> {
        match *self {
            PatternFinding::RecurringHypoglycemia { hour, .. }
            | PatternFinding::RecurringHyperglycemia { hour, .. } => {
                Some(format!("{:02}:00-{:02}:00", hour, (hour + 1) % 24))
            }
            _ => None,
        }
    }

    pub fn suggested_action(&self) -> SuggestedAction {
        match *self {
            PatternFinding::RecurringHypoglycemia { hour, .. } => SuggestedAction::ReduceDose { hour },
            PatternFinding::RecurringHyperglycemia { hour, .. } => {
                SuggestedAction::IncreaseDose { hour }
            }
            PatternFinding::HighVariability { .. } => SuggestedAction::ImproveConsistency,
            PatternFinding::NoPatterns => SuggestedAction::NoChange,
        }
    }
}

impl Localized for PatternFinding {
    fn key(&self) -> &'static str {
        match self {
            PatternFinding::RecurringHypoglycemia { .. } => "pattern.recurring_hypo",
            PatternFinding::RecurringHyperglycemia { .. } => "pattern.recurring_hyper",
            PatternFinding::HighVariability { .. } => "pattern.high_variability",
            PatternFinding::NoPatterns => "pattern.none",
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match *self {
            PatternFinding::RecurringHypoglycemia {
                days, total_days, ..
            }
            | PatternFinding::RecurringHyperglycemia {
                days, total_days, ..
            } => vec![
                ("time", self.time_descriptor().unwrap_or_default()),
                ("days", days.to_string()),
                ("total", total_days.to_string()),
            ],
            PatternFinding::HighVariability { standard_deviation } => {
                vec![("sd", units(standard_deviation))]
            }
            PatternFinding::NoPatterns => vec![],
        }
    }
}

/// Aggregated statistics for a record window
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatternReport {
    pub total_days: usize,
    pub total_readings: usize,
    pub mean: f64,
    pub standard_deviation: f64,
    pub hourly: Vec<HourStats>,
    #[serde(skip)]
    config: PatternConfig,
}

/// Validate the record and compute per-hour statistics
pub fn analyze_patterns(record: &WeeklyRecord, config: &PatternConfig) -> Result<PatternReport> {
    validate_weekly_record(record)?;

    let mut hourly: Vec<HourStats> = (0..24)
        .map(|hour| HourStats {
            hour,
            ..Default::default()
        })
        .collect();
    let mut observed: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); 24];
    let mut hypo: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); 24];
    let mut hyper: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); 24];

    let mut values = Vec::new();
    for (day_idx, day) in record.days.iter().enumerate() {
        for m in &day.measurements {
            let h = m.timestamp.hour() as usize;
            hourly[h].readings += 1;
            observed[h].insert(day_idx);
            if m.glucose < config.hypo_threshold {
                hypo[h].insert(day_idx);
            } else if m.glucose > config.hyper_threshold {
                hyper[h].insert(day_idx);
            }
            values.push(m.glucose);
        }
    }

    for (h, stats) in hourly.iter_mut().enumerate() {
        stats.days_observed = observed[h].len();
        stats.hypo_days = hypo[h].len();
        stats.hyper_days = hyper[h].len();
    }

    let (mean, standard_deviation) = population_stats(&values);

    tracing::debug!(
        "Pattern analysis over {} days, {} readings: mean {:.1}, SD {:.1}",
        record.days.len(),
        values.len(),
        mean,
        standard_deviation
    );

    Ok(PatternReport {
        total_days: record.days.len(),
        total_readings: values.len(),
        mean,
        standard_deviation,
        hourly,
        config: config.clone(),
    })
}

/// Mean and population standard deviation
pub fn population_stats(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl PatternReport {
    /// Lazily evaluated findings; restartable
    pub fn findings(&self) -> Findings<'_> {
        Findings {
            report: self,
            stage: Stage::Hypo(0),
            emitted: false,
        }
    }

    fn is_recurring(&self, affected: usize, observed: usize) -> bool {
        observed > 0
            && affected >= self.config.min_days
            && (affected as f64 / observed as f64) > self.config.min_frequency
    }
}

#[derive(Clone, Copy, Debug)]
enum Stage {
    Hypo(usize),
    Hyper(usize),
    Variability,
    Fallback,
    Done,
}

/// Iterator over a report's findings
#[derive(Clone, Debug)]
pub struct Findings<'a> {
    report: &'a PatternReport,
    stage: Stage,
    emitted: bool,
}

impl Iterator for Findings<'_> {
    type Item = PatternFinding;

    fn next(&mut self) -> Option<PatternFinding> {
        let report = self.report;
        loop {
            match self.stage {
                Stage::Hypo(h) if h < 24 => {
                    self.stage = Stage::Hypo(h + 1);
                    let stats = &report.hourly[h];
                    if report.is_recurring(stats.hypo_days, stats.days_observed) {
                        self.emitted = true;
                        return Some(PatternFinding::RecurringHypoglycemia {
                            hour: stats.hour,
                            days: stats.hypo_days,
                            total_days: stats.days_observed,
                        });
                    }
                }
                Stage::Hypo(_) => self.stage = Stage::Hyper(0),
                Stage::Hyper(h) if h < 24 => {
                    self.stage = Stage::Hyper(h + 1);
                    let stats = &report.hourly[h];
                    if report.is_recurring(stats.hyper_days, stats.days_observed) {
                        self.emitted = true;
                        return Some(PatternFinding::RecurringHyperglycemia {
                            hour: stats.hour,
                            days: stats.hyper_days,
                            total_days: stats.days_observed,
                        });
                    }
                }
                Stage::Hyper(_) => self.stage = Stage::Variability,
                Stage::Variability => {
                    self.stage = Stage::Fallback;
                    if report.standard_deviation > report.config.variability_sd {
                        self.emitted = true;
                        return Some(PatternFinding::HighVariability {
                            standard_deviation: report.standard_deviation,
                        });
                    }
                }
                Stage::Fallback => {
                    self.stage = Stage::Done;
                    if !self.emitted {
                        return Some(PatternFinding::NoPatterns);
                    }
                }
                Stage::Done => return None,
            }
        }
    }
}
