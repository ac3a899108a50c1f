//! Validator configuration
//!
//! Settings can be given as JSON or TOML; omitted fields take their defaults.

use crate::categorizer::{DayTypePolicy, HolidayCalendar};
use crate::comparison::IndicatorWeights;
use crate::error::AssureError;
use crate::normalizer::StartTimePolicy;
use crate::statistics::DEFAULT_MIN_SAMPLES;
use crate::taxonomy::Taxonomy;
use crate::types::Resolution;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const MINUTES_PER_DAY: u32 = 1440;

/// Settings of a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Target number of timesteps per day
    #[serde(default)]
    pub resolution: Resolution,
    /// Minimum category size for confident statistics and valid comparisons
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
    #[serde(default)]
    pub weights: IndicatorWeights,
    /// Public holidays, treated as rest days by the calendar policy
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    /// Minutes after midnight at which a day begins
    #[serde(default)]
    pub day_start_offset_minutes: u32,
    #[serde(default)]
    pub day_type: DayTypePolicy,
    #[serde(default)]
    pub start_time: StartTimePolicy,
    /// Count sleep across midnight as a single run
    #[serde(default)]
    pub merge_wraparound_runs: bool,
    /// Pool working and rest days of unemployed and retired persons
    #[serde(default)]
    pub merge_unemployed_day_types: bool,
}

fn default_min_samples() -> u64 {
    DEFAULT_MIN_SAMPLES
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            min_samples: default_min_samples(),
            weights: IndicatorWeights::default(),
            holidays: Vec::new(),
            day_start_offset_minutes: 0,
            day_type: DayTypePolicy::default(),
            start_time: StartTimePolicy::default(),
            merge_wraparound_runs: false,
            merge_unemployed_day_types: false,
        }
    }
}

impl ValidatorConfig {
    pub fn from_json(json: &str) -> Result<Self, AssureError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml: &str) -> Result<Self, AssureError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, choosing the format by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssureError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            Some("toml") => Self::from_toml(&content),
            _ => Err(AssureError::ConfigError(format!(
                "unsupported config file '{}', expected .json or .toml",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), AssureError> {
        self.weights.validate()?;
        if self.day_start_offset_minutes >= MINUTES_PER_DAY {
            return Err(AssureError::ConfigError(format!(
                "day start offset of {} minutes is not within a day",
                self.day_start_offset_minutes
            )));
        }
        if let DayTypePolicy::WorkingTime {
            work_activities,
            threshold_minutes,
        } = &self.day_type
        {
            if work_activities.is_empty() {
                return Err(AssureError::ConfigError(
                    "working time policy needs at least one work activity".into(),
                ));
            }
            if *threshold_minutes > MINUTES_PER_DAY {
                return Err(AssureError::ConfigError(format!(
                    "working time threshold of {threshold_minutes} minutes exceeds a day"
                )));
            }
        }
        Ok(())
    }

    /// Check that settings naming activities refer to labels of `taxonomy`
    pub fn validate_activities(&self, taxonomy: &Taxonomy) -> Result<(), AssureError> {
        if let DayTypePolicy::WorkingTime {
            work_activities, ..
        } = &self.day_type
        {
            if let Some(unknown) = work_activities
                .iter()
                .find(|name| !taxonomy.is_valid_label(name))
            {
                return Err(AssureError::ConfigError(format!(
                    "work activity '{unknown}' is not part of the activity vocabulary"
                )));
            }
        }
        Ok(())
    }

    pub fn holiday_calendar(&self) -> HolidayCalendar {
        HolidayCalendar::new(self.holidays.iter().copied())
    }
}
