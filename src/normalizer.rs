//! Profile normalization
//!
//! This module turns raw model output into single-day profiles:
//! - Raw activity names remapped to canonical labels
//! - Resampled onto the target resolution (sample-and-hold)
//! - Split into calendar days, incomplete days discarded
//! - Optional merge of canonical labels

use crate::error::AssureError;
use crate::taxonomy::{ActivityMapping, MergeMapping};
use crate::types::{ActivityLabel, NormalizedProfile, RawProfile, Resolution};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where the wall-clock time of raw timestep 0 comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartTimePolicy {
    /// Use the start timestamp stored in each profile
    #[default]
    FromProfile,
    /// Use the same start timestamp for every profile
    Fixed(NaiveDateTime),
}

/// Normalizer for converting raw profiles to single-day profiles
#[derive(Debug, Clone)]
pub struct ProfileNormalizer<'a> {
    mapping: &'a ActivityMapping,
    merge: Option<&'a MergeMapping>,
    resolution: Resolution,
    start_policy: StartTimePolicy,
    day_offset: Duration,
}

impl<'a> ProfileNormalizer<'a> {
    pub fn new(mapping: &'a ActivityMapping, resolution: Resolution) -> Self {
        Self {
            mapping,
            merge: None,
            resolution,
            start_policy: StartTimePolicy::default(),
            day_offset: Duration::zero(),
        }
    }

    pub fn with_merge(mut self, merge: Option<&'a MergeMapping>) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_start_policy(mut self, policy: StartTimePolicy) -> Self {
        self.start_policy = policy;
        self
    }

    /// Let days begin this many minutes after midnight
    pub fn with_day_offset_minutes(mut self, minutes: u32) -> Self {
        self.day_offset = Duration::minutes(i64::from(minutes));
        self
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Normalize one raw profile into zero or more complete days, in day order
    pub fn normalize(&self, raw: &RawProfile) -> Result<Vec<NormalizedProfile>, AssureError> {
        if raw.step_secs == 0 {
            return Err(AssureError::InvalidResolution(format!(
                "profile of person '{}' has a raw step of 0 seconds",
                raw.person
            )));
        }

        let entries = self.remap(raw)?;
        let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
            debug!(person = %raw.person, "Empty raw profile");
            return Ok(Vec::new());
        };

        let start = match self.start_policy {
            StartTimePolicy::FromProfile => raw
                .start
                .ok_or_else(|| AssureError::MissingStartTime(raw.person.clone()))?,
            StartTimePolicy::Fixed(start) => start,
        };

        let raw_step = i64::from(raw.step_secs);
        let out_of_range = || AssureError::TimeOutOfRange(raw.person.clone());
        let covered_from = raw_instant(start, first.0, raw_step).ok_or_else(out_of_range)?;
        let covered_until = raw_instant(start, last.0 + 1, raw_step).ok_or_else(out_of_range)?;

        let one_day = Duration::days(1);
        let step = Duration::seconds(i64::from(self.resolution.step_secs()));
        let slots = self.resolution.timesteps_per_day();

        let mut profiles = Vec::new();
        let mut day_start = self.first_day_start(covered_from).ok_or_else(out_of_range)?;
        while let Some(day_end) = day_start.checked_add_signed(one_day) {
            if day_end > covered_until {
                break;
            }
            let activities = (0..slots)
                .map(|slot| {
                    let instant = day_start + step * slot as i32;
                    let offset = (instant - start).num_seconds();
                    let label = active_label(&entries, raw_step, offset);
                    match self.merge {
                        Some(merge) => merge.apply(label),
                        None => label.clone(),
                    }
                })
                .collect();
            profiles.push(NormalizedProfile::new(
                raw.person.clone(),
                day_start.date(),
                self.resolution,
                activities,
            )?);
            day_start = day_end;
        }

        debug!(
            person = %raw.person,
            days = profiles.len(),
            "Normalized raw profile"
        );
        Ok(profiles)
    }

    /// Remapped entries sorted by timestep, one per timestep (last write wins)
    fn remap(&self, raw: &RawProfile) -> Result<Vec<(i64, ActivityLabel)>, AssureError> {
        let mut entries = raw
            .entries
            .iter()
            .map(|e| Ok((i64::from(e.timestep), self.mapping.map(&raw.person, &e.activity)?)))
            .collect::<Result<Vec<_>, AssureError>>()?;
        entries.sort_by_key(|(timestep, _)| *timestep);

        let mut deduped: Vec<(i64, ActivityLabel)> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last_mut() {
                Some(previous) if previous.0 == entry.0 => *previous = entry,
                _ => deduped.push(entry),
            }
        }
        Ok(deduped)
    }

    /// First day boundary at or after `instant`, `None` past the end of the calendar
    fn first_day_start(&self, instant: NaiveDateTime) -> Option<NaiveDateTime> {
        let shifted = instant.checked_sub_signed(self.day_offset)?;
        let midnight = shifted.date().and_hms_opt(0, 0, 0)?;
        let boundary = midnight.checked_add_signed(self.day_offset)?;
        if boundary < instant {
            boundary.checked_add_signed(Duration::days(1))
        } else {
            Some(boundary)
        }
    }
}

/// Wall-clock instant of raw timestep `timestep`
fn raw_instant(start: NaiveDateTime, timestep: i64, raw_step: i64) -> Option<NaiveDateTime> {
    let seconds = timestep.checked_mul(raw_step)?;
    start.checked_add_signed(Duration::try_seconds(seconds)?)
}

/// Label of the last entry that began at or before `offset` seconds.
/// Callers only ask for offsets inside the covered range.
fn active_label(entries: &[(i64, ActivityLabel)], raw_step: i64, offset: i64) -> &ActivityLabel {
    let index = entries.partition_point(|(timestep, _)| timestep * raw_step <= offset);
    &entries[index.saturating_sub(1)].1
}
