//! Statistics set management
//!
//! A statistics set holds the per-category statistics of one data source in a
//! stable order, together with the activity vocabulary they were computed over.
//! Sets can be trimmed, coarsened and persisted as JSON.

use crate::category::{CategoryKey, DayType, WorkStatus};
use crate::error::AssureError;
use crate::statistics::CategoryStatistics;
use crate::taxonomy::MergeMapping;
use crate::types::{ActivityLabel, DataSource, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Ordered per-category statistics of one data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSet {
    source: DataSource,
    activities: Vec<ActivityLabel>,
    categories: Vec<CategoryStatistics>,
}

impl StatisticsSet {
    pub fn new(source: DataSource, activities: Vec<ActivityLabel>) -> Self {
        Self {
            source,
            activities,
            categories: Vec::new(),
        }
    }

    /// Build a set from statistics in the given order
    pub fn from_statistics(
        source: DataSource,
        activities: Vec<ActivityLabel>,
        statistics: impl IntoIterator<Item = CategoryStatistics>,
    ) -> Self {
        let mut set = Self::new(source, activities);
        for stats in statistics {
            set.insert(stats);
        }
        set
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    pub fn activities(&self) -> &[ActivityLabel] {
        &self.activities
    }

    /// Insert statistics, replacing those of the same category in place
    pub fn insert(&mut self, stats: CategoryStatistics) -> Option<CategoryStatistics> {
        match self.position(stats.key()) {
            Some(position) => Some(std::mem::replace(&mut self.categories[position], stats)),
            None => {
                self.categories.push(stats);
                None
            }
        }
    }

    pub fn get(&self, key: &CategoryKey) -> Option<&CategoryStatistics> {
        self.categories.iter().find(|s| s.key() == key)
    }

    pub fn contains(&self, key: &CategoryKey) -> bool {
        self.position(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CategoryKey> {
        self.categories.iter().map(|s| s.key())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryStatistics> {
        self.categories.iter()
    }

    pub fn as_slice(&self) -> &[CategoryStatistics] {
        &self.categories
    }

    /// Number of categories
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Number of profiles across all categories
    pub fn total_profiles(&self) -> u64 {
        self.categories.iter().map(|s| s.profile_count()).sum()
    }

    /// Drop categories with fewer than `min_size` profiles; returns how many were dropped
    pub fn filter_categories(&mut self, min_size: u64) -> usize {
        let before = self.categories.len();
        self.categories.retain(|s| s.profile_count() >= min_size);
        let removed = before - self.categories.len();
        info!(
            source = self.source.as_str(),
            removed,
            remaining = self.categories.len(),
            min_size,
            "Filtered small categories"
        );
        removed
    }

    /// Pool the `sources` categories into `target`.
    ///
    /// The merged statistics take the place of the first source present.
    /// Returns `false` when none of the sources exist.
    pub fn merge_categories(
        &mut self,
        sources: &[CategoryKey],
        target: CategoryKey,
    ) -> Result<bool, AssureError> {
        if self.contains(&target) && !sources.contains(&target) {
            return Err(AssureError::CategoryMergeConflict(format!(
                "target category {target} already exists"
            )));
        }
        let Some(first) = self
            .categories
            .iter()
            .position(|s| sources.contains(s.key()))
        else {
            return Ok(false);
        };

        let parts: Vec<&CategoryStatistics> = self
            .categories
            .iter()
            .filter(|s| sources.contains(s.key()))
            .collect();
        let merged = CategoryStatistics::merge(target, &parts)?;

        let mut index = 0;
        self.categories.retain(|s| {
            let keep = index == first || !sources.contains(s.key());
            index += 1;
            keep
        });
        self.categories[first] = merged;
        Ok(true)
    }

    /// For unemployed and retired persons the day type carries no information;
    /// pool their working and rest days into an undetermined day type.
    pub fn merge_unemployed_day_types(&mut self) -> Result<usize, AssureError> {
        let mut targets: Vec<CategoryKey> = Vec::new();
        let mut seen = HashSet::new();
        for key in self.keys() {
            let unemployed = matches!(key.work_status, WorkStatus::Unemployed | WorkStatus::Retired);
            if unemployed && key.day_type != DayType::Undetermined {
                let target = key.with_day_type(DayType::Undetermined);
                if seen.insert(target.clone()) {
                    targets.push(target);
                }
            }
        }

        for target in &targets {
            let sources: Vec<CategoryKey> = DayType::ALL
                .iter()
                .map(|day_type| target.with_day_type(*day_type))
                .collect();
            self.merge_categories(&sources, target.clone())?;
        }
        Ok(targets.len())
    }

    /// Re-express all statistics at a finer resolution
    pub fn refine(&self, resolution: Resolution) -> Result<Self, AssureError> {
        let categories = self
            .categories
            .iter()
            .map(|s| s.refine(resolution))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: self.source,
            activities: self.activities.clone(),
            categories,
        })
    }

    /// Relabel all statistics through a merge mapping, so that statistics
    /// stored with a finer vocabulary can be compared against merged ones
    pub fn map_activities(&self, merge: &MergeMapping) -> Self {
        let mut seen = HashSet::new();
        let activities: Vec<ActivityLabel> = self
            .activities
            .iter()
            .map(|label| merge.apply(label))
            .filter(|label| seen.insert(label.clone()))
            .collect();
        let categories = self
            .categories
            .iter()
            .map(|s| s.map_activities(merge))
            .collect();
        info!(
            source = self.source.as_str(),
            before = self.activities.len(),
            after = activities.len(),
            "Merged activities of statistics set"
        );
        Self {
            source: self.source,
            activities,
            categories,
        }
    }

    /// Load a statistics set from JSON
    pub fn from_json(json: &str) -> Result<Self, AssureError> {
        let set: Self = serde_json::from_str(json)?;
        let mut keys = HashSet::new();
        if let Some(duplicate) = set.keys().find(|key| !keys.insert(*key)) {
            return Err(AssureError::CategoryMergeConflict(format!(
                "duplicate category {duplicate}"
            )));
        }
        Ok(set)
    }

    /// Serialize the statistics set to JSON
    pub fn to_json(&self) -> Result<String, AssureError> {
        Ok(serde_json::to_string(self)?)
    }

    fn position(&self, key: &CategoryKey) -> Option<usize> {
        self.categories.iter().position(|s| s.key() == key)
    }
}
