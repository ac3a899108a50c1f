//! Core types for the Activity Assure pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw profiles, normalized single-day profiles, run-length histograms
//! and the ingestion contract for model datasets.

use crate::category::{CategoryKey, PersonMetadata};
use crate::error::AssureError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Number of seconds in a day
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Default number of timesteps per day (15 minute steps)
pub const DEFAULT_TIMESTEPS_PER_DAY: u32 = 96;

/// Canonical activity name from a closed vocabulary.
///
/// Labels are handed out by [`crate::taxonomy::Taxonomy`]; cloning only bumps a
/// reference count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLabel(Arc<str>);

impl ActivityLabel {
    pub(crate) fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ActivityLabel {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of equal-width timesteps per day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Resolution(u32);

impl Resolution {
    /// Create a resolution; the step width must be a whole number of seconds
    pub fn new(timesteps_per_day: u32) -> Result<Self, AssureError> {
        if timesteps_per_day == 0 || SECONDS_PER_DAY % timesteps_per_day != 0 {
            return Err(AssureError::InvalidResolution(format!(
                "{timesteps_per_day} timesteps do not divide a day evenly"
            )));
        }
        Ok(Self(timesteps_per_day))
    }

    pub fn timesteps_per_day(self) -> u32 {
        self.0
    }

    /// Width of one timestep in seconds
    pub fn step_secs(self) -> u32 {
        SECONDS_PER_DAY / self.0
    }

    /// Width of one timestep in minutes
    pub fn step_minutes(self) -> f64 {
        self.step_secs() as f64 / 60.0
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self(DEFAULT_TIMESTEPS_PER_DAY)
    }
}

impl TryFrom<u32> for Resolution {
    type Error = AssureError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Resolution::new(value)
    }
}

impl From<Resolution> for u32 {
    fn from(resolution: Resolution) -> Self {
        resolution.0
    }
}

/// A single (timestep, activity) entry of a raw profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// 0-based timestep index, relative to the profile start
    pub timestep: u32,
    /// Activity name as produced by the model
    pub activity: String,
}

impl RawEntry {
    pub fn new(timestep: u32, activity: impl Into<String>) -> Self {
        Self {
            timestep,
            activity: activity.into(),
        }
    }
}

/// Raw activity sequence of one person, as produced by a simulation model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProfile {
    /// Person identifier, used to look up person metadata
    pub person: String,
    /// Wall-clock time of timestep 0
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    /// Width of one raw timestep in seconds
    pub step_secs: u32,
    /// Activity entries; each holds until the next entry begins
    pub entries: Vec<RawEntry>,
}

/// A maximal block of consecutive timesteps with the same activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub activity: ActivityLabel,
    /// Index of the first timestep
    pub start: usize,
    /// Number of timesteps
    pub length: usize,
}

/// Single-day activity profile at a fixed resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedProfile {
    person: String,
    date: NaiveDate,
    category: Option<CategoryKey>,
    resolution: Resolution,
    activities: Vec<ActivityLabel>,
}

impl NormalizedProfile {
    /// Create a profile; the number of activities must match the resolution
    pub fn new(
        person: impl Into<String>,
        date: NaiveDate,
        resolution: Resolution,
        activities: Vec<ActivityLabel>,
    ) -> Result<Self, AssureError> {
        if activities.len() != resolution.timesteps_per_day() as usize {
            return Err(AssureError::InvalidResolution(format!(
                "profile has {} timesteps, expected {}",
                activities.len(),
                resolution.timesteps_per_day()
            )));
        }
        Ok(Self {
            person: person.into(),
            date,
            category: None,
            resolution,
            activities,
        })
    }

    pub fn person(&self) -> &str {
        &self.person
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn category(&self) -> Option<&CategoryKey> {
        self.category.as_ref()
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn activities(&self) -> &[ActivityLabel] {
        &self.activities
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Same profile with a category assigned
    pub fn with_category(mut self, category: CategoryKey) -> Self {
        self.category = Some(category);
        self
    }

    /// Split the profile into maximal runs of the same activity, in time order
    pub fn runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = Vec::new();
        for (index, activity) in self.activities.iter().enumerate() {
            match runs.last_mut() {
                Some(run) if run.activity == *activity => run.length += 1,
                _ => runs.push(Run {
                    activity: activity.clone(),
                    start: index,
                    length: 1,
                }),
            }
        }
        runs
    }
}

/// Histogram over non-negative integer values (run lengths, runs per day)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Histogram {
    counts: BTreeMap<u32, u64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, value: u32) {
        self.record_n(value, 1);
    }

    pub fn record_n(&mut self, value: u32, count: u64) {
        if count > 0 {
            *self.counts.entry(value).or_insert(0) += count;
        }
    }

    /// Number of observations for a value
    pub fn count(&self, value: u32) -> u64 {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    /// Total number of observations
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Observed values with their counts, in ascending value order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.counts.iter().map(|(v, c)| (*v, *c))
    }

    /// Relative frequency of each value; `None` for an empty histogram
    pub fn normalized(&self) -> Option<BTreeMap<u32, f64>> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        Some(
            self.counts
                .iter()
                .map(|(v, c)| (*v, *c as f64 / total as f64))
                .collect(),
        )
    }

    /// Mean observed value; `None` for an empty histogram
    pub fn mean(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let sum: f64 = self.counts.iter().map(|(v, c)| *v as f64 * *c as f64).sum();
        Some(sum / total as f64)
    }

    /// Add all observations of another histogram
    pub fn absorb(&mut self, other: &Histogram) {
        for (value, count) in other.iter() {
            self.record_n(value, count);
        }
    }

    /// Histogram with every value multiplied by `factor`
    pub fn scale_values(&self, factor: u32) -> Histogram {
        Histogram {
            counts: self.counts.iter().map(|(v, c)| (v * factor, *c)).collect(),
        }
    }
}

/// Which side of a comparison a statistics object belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Model,
    Reference,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Model => "model",
            DataSource::Reference => "reference",
        }
    }
}

/// Parsed model output handed over by the ingestion layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelDataset {
    /// Person characteristics by person identifier
    pub persons: BTreeMap<String, PersonMetadata>,
    /// Raw activity profiles, in input order
    pub profiles: Vec<RawProfile>,
}
