//! Loading caller-supplied snapshots from disk.
//!
//! Weekly records come as a JSON array of days or as a flat CSV export
//! that is grouped by date here. Profiles come as TOML or JSON, and
//! injection histories as a JSON array.

use crate::validation::{validate_injections, validate_insulin_profile};
use crate::{DayRecord, Error, GlucoseMeasurement, Injection, InsulinProfile, Result, WeeklyRecord};
use chrono::{DateTime, NaiveDate, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// CSV row format for exported glucose readings
#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    timestamp: String,
    glucose: f64,
    glucose_3h_later: Option<f64>,
    insulin: Option<f64>,
    carbs: Option<f64>,
}

impl CsvRow {
    fn into_measurement(self) -> Result<(NaiveDate, GlucoseMeasurement)> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|e| Error::Other(format!("Invalid date '{}': {}", self.date, e)))?;

        let timestamp = DateTime::parse_from_rfc3339(self.timestamp.trim())
            .map_err(|e| Error::Other(format!("Invalid timestamp '{}': {}", self.timestamp, e)))?
            .with_timezone(&Utc);

        Ok((
            date,
            GlucoseMeasurement {
                timestamp,
                glucose: self.glucose,
                glucose_3h_later: self.glucose_3h_later,
                insulin: self.insulin,
                carbs: self.carbs,
            },
        ))
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Load a weekly record, picking the format from the file extension
pub fn load_weekly_record(path: &Path) -> Result<WeeklyRecord> {
    if is_csv(path) {
        load_weekly_record_csv(path)
    } else {
        load_weekly_record_json(path)
    }
}

/// Load a weekly record stored as a JSON array of days
pub fn load_weekly_record_json(path: &Path) -> Result<WeeklyRecord> {
    let contents = std::fs::read_to_string(path)?;
    let record: WeeklyRecord = serde_json::from_str(&contents)?;
    tracing::info!("Loaded {} days from {:?}", record.days.len(), path);
    Ok(record)
}

/// Load a weekly record from CSV rows, grouped by date in ascending order
///
/// Rows that fail to parse are skipped with a warning.
pub fn load_weekly_record_csv(path: &Path) -> Result<WeeklyRecord> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut days: BTreeMap<NaiveDate, Vec<GlucoseMeasurement>> = BTreeMap::new();
    let mut skipped = 0;

    for result in reader.deserialize::<CsvRow>() {
        match result {
            Ok(row) => match row.into_measurement() {
                Ok((date, measurement)) => days.entry(date).or_default().push(measurement),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Failed to parse CSV row: {}", e);
                }
            },
            Err(e) => {
                skipped += 1;
                tracing::warn!("Failed to deserialize CSV row: {}", e);
            }
        }
    }

    let days: Vec<DayRecord> = days
        .into_iter()
        .map(|(date, mut measurements)| {
            measurements.sort_by_key(|m| m.timestamp);
            DayRecord { date, measurements }
        })
        .collect();

    tracing::info!(
        "Loaded {} days from {:?} ({} rows skipped)",
        days.len(),
        path,
        skipped
    );

    Ok(WeeklyRecord::new(days))
}

/// Load and validate an injection history stored as a JSON array
pub fn load_injections(path: &Path) -> Result<Vec<Injection>> {
    let contents = std::fs::read_to_string(path)?;
    let injections: Vec<Injection> = serde_json::from_str(&contents)?;
    validate_injections(&injections)?;
    tracing::debug!("Loaded {} injections from {:?}", injections.len(), path);
    Ok(injections)
}

impl InsulinProfile {
    /// Load a profile from TOML, or JSON when the extension is `.json`
    ///
    /// The profile is validated before it is returned.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let profile: InsulinProfile = if is_json {
            serde_json::from_str(&contents)?
        } else {
            toml::from_str(&contents)?
        };

        validate_insulin_profile(&profile)?;
        tracing::info!("Loaded insulin profile from {:?}", path);
        Ok(profile)
    }
}
