//! Per-category statistics
//!
//! This module summarizes a group of single-day profiles:
//! - Activity counts per timestep (probability profiles)
//! - Duration histograms of maximal activity runs
//! - Frequency histograms of runs per day
//!
//! Statistics are kept as integer counts, so the result only depends on the
//! multiset of profiles and statistics of disjoint groups can be pooled exactly.

use crate::category::CategoryKey;
use crate::error::AssureError;
use crate::taxonomy::MergeMapping;
use crate::types::{ActivityLabel, Histogram, NormalizedProfile, Resolution, Run};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Minimum group size for statistics that are not flagged as low confidence
pub const DEFAULT_MIN_SAMPLES: u64 = 20;

/// Statistics of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStatistics {
    key: CategoryKey,
    profile_count: u64,
    min_samples: u64,
    resolution: Resolution,
    /// Number of profiles doing each activity, per timestep
    timestep_counts: Vec<BTreeMap<ActivityLabel, u64>>,
    /// Run length in timesteps -> number of runs, per activity
    durations: BTreeMap<ActivityLabel, Histogram>,
    /// Runs per day -> number of profiles, per activity
    frequencies: BTreeMap<ActivityLabel, Histogram>,
    /// Activities without duration and frequency histograms. Pooling labels of
    /// stored statistics loses which runs touched, so those runs are unknown.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    runs_unavailable: BTreeSet<ActivityLabel>,
}

impl CategoryStatistics {
    pub fn key(&self) -> &CategoryKey {
        &self.key
    }

    pub fn profile_count(&self) -> u64 {
        self.profile_count
    }

    pub fn min_samples(&self) -> u64 {
        self.min_samples
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Whether the group is smaller than the configured minimum sample size
    pub fn is_low_confidence(&self) -> bool {
        self.profile_count < self.min_samples
    }

    pub fn is_empty(&self) -> bool {
        self.profile_count == 0
    }

    /// Activities covered by these statistics
    pub fn labels(&self) -> impl Iterator<Item = &ActivityLabel> {
        self.timestep_counts
            .iter()
            .take(1)
            .flat_map(|counts| counts.keys())
    }

    /// Whether duration and frequency histograms exist for `label`
    pub fn has_run_statistics(&self, label: &str) -> bool {
        !self.runs_unavailable.contains(label)
    }

    pub fn timestep_counts(&self) -> &[BTreeMap<ActivityLabel, u64>] {
        &self.timestep_counts
    }

    pub fn durations(&self) -> &BTreeMap<ActivityLabel, Histogram> {
        &self.durations
    }

    pub fn frequencies(&self) -> &BTreeMap<ActivityLabel, Histogram> {
        &self.frequencies
    }

    /// Activity probabilities per timestep; `None` everywhere for an empty group
    pub fn probabilities(&self) -> Vec<Option<BTreeMap<ActivityLabel, f64>>> {
        let n = self.profile_count;
        self.timestep_counts
            .iter()
            .map(|counts| {
                (n > 0).then(|| {
                    counts
                        .iter()
                        .map(|(label, count)| (label.clone(), *count as f64 / n as f64))
                        .collect()
                })
            })
            .collect()
    }

    /// Probability curve of one activity over the day; `None` for an empty group
    pub fn probability_curve(&self, label: &str) -> Option<Vec<f64>> {
        let n = self.profile_count;
        (n > 0).then(|| {
            self.timestep_counts
                .iter()
                .map(|counts| counts.get(label).copied().unwrap_or(0) as f64 / n as f64)
                .collect()
        })
    }

    /// Mean run length of an activity in minutes
    pub fn mean_duration_minutes(&self, label: &str) -> Option<f64> {
        self.durations
            .get(label)?
            .mean()
            .map(|steps| steps * self.resolution.step_minutes())
    }

    /// Mean number of runs of an activity per day
    pub fn mean_frequency(&self, label: &str) -> Option<f64> {
        self.frequencies.get(label)?.mean()
    }

    /// Same statistics under another key
    pub fn with_key(mut self, key: CategoryKey) -> Self {
        self.key = key;
        self
    }

    /// Re-express the statistics at a finer resolution.
    ///
    /// The target must be an integer multiple of the current resolution;
    /// probabilities are repeated and run lengths scaled accordingly.
    pub fn refine(&self, target: Resolution) -> Result<CategoryStatistics, AssureError> {
        let from = self.resolution.timesteps_per_day();
        let to = target.timesteps_per_day();
        if to % from != 0 {
            return Err(AssureError::IncompatibleResolution(from, to));
        }
        let factor = to / from;
        if factor == 1 {
            return Ok(self.clone());
        }

        let timestep_counts = self
            .timestep_counts
            .iter()
            .flat_map(|counts| std::iter::repeat(counts.clone()).take(factor as usize))
            .collect();
        let durations = self
            .durations
            .iter()
            .map(|(label, histogram)| (label.clone(), histogram.scale_values(factor)))
            .collect();

        Ok(CategoryStatistics {
            key: self.key.clone(),
            profile_count: self.profile_count,
            min_samples: self.min_samples,
            resolution: target,
            timestep_counts,
            durations,
            frequencies: self.frequencies.clone(),
            runs_unavailable: self.runs_unavailable.clone(),
        })
    }

    /// Relabel the statistics through a merge mapping.
    ///
    /// Counts per timestep are summed exactly. A merged label keeps run
    /// statistics only when at most one of its source labels ever occurs;
    /// otherwise adjacent runs of different sources would have to be joined,
    /// which the histograms cannot tell, and the label loses its runs.
    pub fn map_activities(&self, merge: &MergeMapping) -> CategoryStatistics {
        let timestep_counts = self
            .timestep_counts
            .iter()
            .map(|counts| {
                let mut mapped: BTreeMap<ActivityLabel, u64> = BTreeMap::new();
                for (label, count) in counts {
                    *mapped.entry(merge.apply(label)).or_insert(0) += count;
                }
                mapped
            })
            .collect();

        let mut sources: BTreeMap<ActivityLabel, Vec<&ActivityLabel>> = BTreeMap::new();
        for label in self.labels() {
            sources.entry(merge.apply(label)).or_default().push(label);
        }

        let mut durations = BTreeMap::new();
        let mut frequencies = BTreeMap::new();
        let mut runs_unavailable = BTreeSet::new();
        for (target, labels) in sources {
            let occurring: Vec<&ActivityLabel> = labels
                .iter()
                .copied()
                .filter(|label| self.occurs(label))
                .collect();
            let source = match occurring.as_slice() {
                [] => labels.first().copied(),
                [only] => Some(*only),
                _ => None,
            };
            let histograms = source.and_then(|label| {
                Some((self.durations.get(label)?, self.frequencies.get(label)?))
            });
            match histograms {
                Some((duration, frequency)) => {
                    durations.insert(target.clone(), duration.clone());
                    frequencies.insert(target, frequency.clone());
                }
                None => {
                    runs_unavailable.insert(target);
                }
            }
        }
        if !runs_unavailable.is_empty() {
            debug!(
                category = %self.key,
                activities = runs_unavailable.len(),
                "Merged activities have no run statistics"
            );
        }

        CategoryStatistics {
            key: self.key.clone(),
            profile_count: self.profile_count,
            min_samples: self.min_samples,
            resolution: self.resolution,
            timestep_counts,
            durations,
            frequencies,
            runs_unavailable,
        }
    }

    fn occurs(&self, label: &ActivityLabel) -> bool {
        self.timestep_counts
            .iter()
            .any(|counts| counts.get(label).is_some_and(|count| *count > 0))
    }

    /// Pool the statistics of several disjoint groups under a new key
    pub fn merge(key: CategoryKey, parts: &[&CategoryStatistics]) -> Result<Self, AssureError> {
        let Some(first) = parts.first() else {
            return Err(AssureError::CategoryMergeConflict(format!(
                "no statistics to merge into {key}"
            )));
        };
        if let Some(other) = parts.iter().find(|p| p.resolution != first.resolution) {
            return Err(AssureError::IncompatibleResolution(
                first.resolution.timesteps_per_day(),
                other.resolution.timesteps_per_day(),
            ));
        }

        let mut merged = CategoryStatistics {
            key,
            profile_count: 0,
            min_samples: first.min_samples,
            resolution: first.resolution,
            timestep_counts: vec![BTreeMap::new(); first.timestep_counts.len()],
            durations: BTreeMap::new(),
            frequencies: BTreeMap::new(),
            runs_unavailable: BTreeSet::new(),
        };
        for part in parts {
            merged.absorb(part);
        }
        Ok(merged)
    }

    fn absorb(&mut self, other: &CategoryStatistics) {
        for (mine, theirs) in self.timestep_counts.iter_mut().zip(&other.timestep_counts) {
            for (label, count) in theirs {
                *mine.entry(label.clone()).or_insert(0) += count;
            }
        }
        for label in &other.runs_unavailable {
            self.durations.remove(label);
            self.frequencies.remove(label);
            self.runs_unavailable.insert(label.clone());
        }
        for (label, histogram) in &other.durations {
            if !self.runs_unavailable.contains(label) {
                self.durations.entry(label.clone()).or_default().absorb(histogram);
            }
        }
        // profiles counted so far never had a run of a label new to this merge
        for (label, histogram) in &other.frequencies {
            if self.runs_unavailable.contains(label) {
                continue;
            }
            if !self.frequencies.contains_key(label) {
                let mut zeros = Histogram::new();
                zeros.record_n(0, self.profile_count);
                self.frequencies.insert(label.clone(), zeros);
            }
            if let Some(mine) = self.frequencies.get_mut(label) {
                mine.absorb(histogram);
            }
        }
        for (label, histogram) in self.frequencies.iter_mut() {
            if !other.frequencies.contains_key(label) {
                histogram.record_n(0, other.profile_count);
            }
        }
        self.profile_count += other.profile_count;
    }
}

/// Calculator for per-category statistics
#[derive(Debug, Clone)]
pub struct StatisticsCalculator {
    labels: Vec<ActivityLabel>,
    min_samples: u64,
    merge_wraparound_runs: bool,
}

impl StatisticsCalculator {
    /// Create a calculator over the given activity vocabulary
    pub fn new(labels: Vec<ActivityLabel>, min_samples: u64) -> Self {
        Self {
            labels,
            min_samples,
            merge_wraparound_runs: false,
        }
    }

    /// Count a run ending at midnight and a run of the same activity starting
    /// at midnight as one run
    pub fn with_wraparound_runs(mut self, merge: bool) -> Self {
        self.merge_wraparound_runs = merge;
        self
    }

    pub fn labels(&self) -> &[ActivityLabel] {
        &self.labels
    }

    /// Compute the statistics of one group of profiles
    pub fn compute(
        &self,
        key: CategoryKey,
        resolution: Resolution,
        profiles: &[NormalizedProfile],
    ) -> Result<CategoryStatistics, AssureError> {
        let slots = resolution.timesteps_per_day() as usize;
        let zero_counts: BTreeMap<ActivityLabel, u64> =
            self.labels.iter().map(|label| (label.clone(), 0)).collect();

        let mut timestep_counts = vec![zero_counts; slots];
        let mut durations: BTreeMap<ActivityLabel, Histogram> = self
            .labels
            .iter()
            .map(|label| (label.clone(), Histogram::new()))
            .collect();
        let mut frequencies = durations.clone();

        for profile in profiles {
            if profile.resolution() != resolution {
                return Err(AssureError::IncompatibleResolution(
                    resolution.timesteps_per_day(),
                    profile.resolution().timesteps_per_day(),
                ));
            }

            for (counts, label) in timestep_counts.iter_mut().zip(profile.activities()) {
                let count = counts
                    .get_mut(label)
                    .ok_or_else(|| AssureError::UnknownActivity(label.to_string()))?;
                *count += 1;
            }

            let mut runs_per_label: BTreeMap<&ActivityLabel, u32> = BTreeMap::new();
            let runs = self.runs(profile);
            for run in &runs {
                if let Some(histogram) = durations.get_mut(&run.activity) {
                    histogram.record(run.length as u32);
                }
                *runs_per_label.entry(&run.activity).or_insert(0) += 1;
            }
            for (label, histogram) in frequencies.iter_mut() {
                histogram.record(runs_per_label.get(label).copied().unwrap_or(0));
            }
        }

        let stats = CategoryStatistics {
            key,
            profile_count: profiles.len() as u64,
            min_samples: self.min_samples,
            resolution,
            timestep_counts,
            durations,
            frequencies,
            runs_unavailable: BTreeSet::new(),
        };
        if stats.is_low_confidence() {
            warn!(
                category = %stats.key,
                profiles = stats.profile_count,
                min_samples = self.min_samples,
                "Category has few profiles; statistics are low confidence"
            );
        } else {
            debug!(category = %stats.key, profiles = stats.profile_count, "Computed statistics");
        }
        Ok(stats)
    }

    /// Compute statistics for many groups in parallel, keeping input order
    pub fn compute_all(
        &self,
        resolution: Resolution,
        groups: &[(CategoryKey, Vec<NormalizedProfile>)],
    ) -> Result<Vec<CategoryStatistics>, AssureError> {
        groups
            .par_iter()
            .map(|(key, profiles)| self.compute(key.clone(), resolution, profiles))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    fn runs(&self, profile: &NormalizedProfile) -> Vec<Run> {
        let mut runs = profile.runs();
        let wraps = runs.len() > 1
            && runs.first().map(|r| &r.activity) == runs.last().map(|r| &r.activity);
        if self.merge_wraparound_runs && wraps {
            let head = runs.remove(0);
            if let Some(last) = runs.last_mut() {
                last.length += head.length;
            }
        }
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::Taxonomy;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(["sleep", "work", "eat"]).unwrap()
    }

    fn key() -> CategoryKey {
        "DE_female_full time_working day".parse().unwrap()
    }

    fn profile(tax: &Taxonomy, names: &[&str]) -> NormalizedProfile {
        let labels = names.iter().map(|n| tax.label(n).unwrap()).collect();
        let resolution = Resolution::new(names.len() as u32).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        NormalizedProfile::new("anna", date, resolution, labels).unwrap()
    }

    fn calculator(tax: &Taxonomy, min_samples: u64) -> StatisticsCalculator {
        StatisticsCalculator::new(tax.labels().to_vec(), min_samples)
    }

    fn res(t: u32) -> Resolution {
        Resolution::new(t).unwrap()
    }

    #[test]
    fn test_probabilities() {
        let tax = taxonomy();
        let profiles = vec![
            profile(&tax, &["sleep", "sleep", "work", "work"]),
            profile(&tax, &["sleep", "work", "work", "work"]),
        ];
        let stats = calculator(&tax, 1).compute(key(), res(4), &profiles).unwrap();

        assert_eq!(stats.profile_count(), 2);
        let probabilities = stats.probabilities();
        let t1 = probabilities[1].as_ref().unwrap();
        assert_eq!(t1["sleep"], 0.5);
        assert_eq!(t1["work"], 0.5);
        assert_eq!(t1["eat"], 0.0);
        for timestep in &probabilities {
            let sum: f64 = timestep.as_ref().unwrap().values().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
        assert_eq!(stats.probability_curve("sleep").unwrap(), vec![1.0, 0.5, 0.0, 0.0]);
        assert_eq!(stats.probability_curve("eat").unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn test_duration_and_frequency_histograms() {
        let tax = taxonomy();
        let profiles = vec![
            profile(&tax, &["sleep", "sleep", "work", "work"]),
            profile(&tax, &["sleep", "work", "sleep", "sleep"]),
        ];
        let stats = calculator(&tax, 1).compute(key(), res(4), &profiles).unwrap();

        let sleep = &stats.durations()["sleep"];
        assert_eq!(sleep.count(2), 2);
        assert_eq!(sleep.count(1), 1);
        assert!(stats.durations()["eat"].is_empty());

        let sleep_runs = &stats.frequencies()["sleep"];
        assert_eq!(sleep_runs.count(1), 1);
        assert_eq!(sleep_runs.count(2), 1);
        // days without any eating still count
        assert_eq!(stats.frequencies()["eat"].count(0), 2);
        assert_eq!(stats.mean_frequency("work"), Some(1.0));
        assert_eq!(stats.mean_duration_minutes("work"), Some(1.5 * 360.0));
    }

    #[test]
    fn test_single_profile_group() {
        let tax = taxonomy();
        let mut names = vec!["sleep"; 48];
        names.extend(vec!["work"; 48]);
        let profiles = vec![profile(&tax, &names)];
        let stats = calculator(&tax, DEFAULT_MIN_SAMPLES)
            .compute(key(), res(96), &profiles)
            .unwrap();

        assert!(stats.is_low_confidence());
        let curve = stats.probability_curve("sleep").unwrap();
        assert!(curve[..48].iter().all(|p| *p == 1.0));
        assert!(curve[48..].iter().all(|p| *p == 0.0));
        assert_eq!(stats.durations()["sleep"].count(48), 1);
        assert_eq!(stats.durations()["work"].count(48), 1);
        assert_eq!(stats.frequencies()["sleep"].count(1), 1);
        assert_eq!(stats.frequencies()["work"].count(1), 1);
        assert_eq!(stats.frequencies()["eat"].count(0), 1);
    }

    #[test]
    fn test_empty_group() {
        let tax = taxonomy();
        let stats = calculator(&tax, 1).compute(key(), res(4), &[]).unwrap();
        assert!(stats.is_empty());
        assert!(stats.is_low_confidence());
        assert_eq!(stats.probabilities().len(), 4);
        assert!(stats.probabilities().iter().all(|p| p.is_none()));
        assert!(stats.probability_curve("sleep").is_none());
        assert!(stats.mean_frequency("sleep").is_none());
    }

    #[test]
    fn test_low_confidence_threshold() {
        let tax = taxonomy();
        let profiles = vec![profile(&tax, &["sleep", "work"]); 3];
        let calc = calculator(&tax, 3);
        assert!(!calc.compute(key(), res(2), &profiles).unwrap().is_low_confidence());
        assert!(calc.compute(key(), res(2), &profiles[..2]).unwrap().is_low_confidence());
    }

    #[test]
    fn test_resolution_mismatch() {
        let tax = taxonomy();
        let profiles = vec![profile(&tax, &["sleep", "work"])];
        assert!(matches!(
            calculator(&tax, 1).compute(key(), res(4), &profiles),
            Err(AssureError::IncompatibleResolution(4, 2))
        ));
    }

    #[test]
    fn test_label_outside_vocabulary() {
        let tax = taxonomy();
        let profiles = vec![profile(&tax, &["sleep", "eat"])];
        let narrow = StatisticsCalculator::new(vec![tax.label("sleep").unwrap()], 1);
        assert!(matches!(
            narrow.compute(key(), res(2), &profiles),
            Err(AssureError::UnknownActivity(label)) if label == "eat"
        ));
    }

    #[test]
    fn test_wraparound_runs() {
        let tax = taxonomy();
        let profiles = vec![profile(&tax, &["sleep", "work", "eat", "sleep"])];

        let plain = calculator(&tax, 1).compute(key(), res(4), &profiles).unwrap();
        assert_eq!(plain.durations()["sleep"].count(1), 2);
        assert_eq!(plain.frequencies()["sleep"].count(2), 1);

        let wrapped = calculator(&tax, 1)
            .with_wraparound_runs(true)
            .compute(key(), res(4), &profiles)
            .unwrap();
        assert_eq!(wrapped.durations()["sleep"].count(2), 1);
        assert_eq!(wrapped.durations()["sleep"].total(), 1);
        assert_eq!(wrapped.frequencies()["sleep"].count(1), 1);

        let whole_day = vec![profile(&tax, &["sleep", "sleep"])];
        let stats = calculator(&tax, 1)
            .with_wraparound_runs(true)
            .compute(key(), res(2), &whole_day)
            .unwrap();
        assert_eq!(stats.durations()["sleep"].count(2), 1);
    }

    #[test]
    fn test_refine() {
        let tax = taxonomy();
        let profiles = vec![
            profile(&tax, &["sleep", "work"]),
            profile(&tax, &["sleep", "sleep"]),
        ];
        let coarse = calculator(&tax, 1).compute(key(), res(2), &profiles).unwrap();
        let fine = coarse.refine(res(6)).unwrap();

        assert_eq!(fine.resolution(), res(6));
        assert_eq!(
            fine.probability_curve("sleep").unwrap(),
            vec![1.0, 1.0, 1.0, 0.5, 0.5, 0.5]
        );
        assert_eq!(fine.durations()["sleep"].count(6), 1);
        assert_eq!(fine.durations()["sleep"].count(3), 1);
        assert_eq!(fine.frequencies(), coarse.frequencies());

        assert!(matches!(
            coarse.refine(res(5)),
            Err(AssureError::IncompatibleResolution(2, 5))
        ));
        assert_eq!(coarse.refine(res(2)).unwrap(), coarse);
    }

    #[test]
    fn test_merge_equals_union() {
        let tax = taxonomy();
        let a = vec![
            profile(&tax, &["sleep", "work", "work", "sleep"]),
            profile(&tax, &["sleep", "eat", "work", "sleep"]),
        ];
        let b = vec![profile(&tax, &["sleep", "sleep", "eat", "eat"])];
        let calc = calculator(&tax, 1);

        let stats_a = calc.compute(key(), res(4), &a).unwrap();
        let stats_b = calc.compute(key(), res(4), &b).unwrap();
        let merged = CategoryStatistics::merge(key(), &[&stats_a, &stats_b]).unwrap();

        let union: Vec<NormalizedProfile> = a.into_iter().chain(b).collect();
        let expected = calc.compute(key(), res(4), &union).unwrap();
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_merge_with_partial_vocabularies() {
        let tax = taxonomy();
        let a = vec![profile(&tax, &["sleep", "work"])];
        let b = vec![profile(&tax, &["sleep", "eat"])];
        let sleep = tax.label("sleep").unwrap();
        let work = tax.label("work").unwrap();
        let eat = tax.label("eat").unwrap();

        let stats_a = StatisticsCalculator::new(vec![sleep.clone(), work], 1)
            .compute(key(), res(2), &a)
            .unwrap();
        let stats_b = StatisticsCalculator::new(vec![sleep, eat], 1)
            .compute(key(), res(2), &b)
            .unwrap();
        let merged = CategoryStatistics::merge(key(), &[&stats_a, &stats_b]).unwrap();

        let union: Vec<NormalizedProfile> = a.into_iter().chain(b).collect();
        let expected = calculator(&tax, 1).compute(key(), res(2), &union).unwrap();
        assert_eq!(merged, expected);
    }

    fn merge_mapping(tax: &Taxonomy, pairs: &[(&str, &str)]) -> MergeMapping {
        let table: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MergeMapping::new(tax, &table).unwrap()
    }

    #[test]
    fn test_map_activities_sums_counts() {
        let tax = taxonomy();
        let profiles = vec![
            profile(&tax, &["sleep", "eat", "work", "sleep"]),
            profile(&tax, &["sleep", "work", "eat", "eat"]),
        ];
        let stats = calculator(&tax, 1).compute(key(), res(4), &profiles).unwrap();
        let mapped = stats.map_activities(&merge_mapping(&tax, &[("eat", "work")]));

        let labels: Vec<&str> = mapped.labels().map(|l| l.as_str()).collect();
        assert_eq!(labels, vec!["sleep", "work"]);
        assert_eq!(mapped.probability_curve("work").unwrap(), vec![0.0, 1.0, 1.0, 0.5]);
        assert_eq!(mapped.profile_count(), 2);

        // sleep is untouched, work now pools two occurring labels
        assert!(mapped.has_run_statistics("sleep"));
        assert_eq!(mapped.durations()["sleep"], stats.durations()["sleep"]);
        assert_eq!(mapped.frequencies()["sleep"], stats.frequencies()["sleep"]);
        assert!(!mapped.has_run_statistics("work"));
        assert!(!mapped.durations().contains_key("work"));
        assert!(mapped.mean_frequency("work").is_none());
    }

    #[test]
    fn test_map_activities_keeps_exact_runs() {
        let tax = taxonomy();
        let profiles = vec![
            profile(&tax, &["sleep", "work", "work", "sleep"]),
            profile(&tax, &["sleep", "sleep", "work", "sleep"]),
        ];
        let stats = calculator(&tax, 1).compute(key(), res(4), &profiles).unwrap();
        // eat never occurs, so merging it into work leaves the runs of work intact
        let mapped = stats.map_activities(&merge_mapping(&tax, &[("eat", "work")]));

        let merged_tax = Taxonomy::new(["sleep", "work"]).unwrap();
        let relabeled: Vec<NormalizedProfile> = profiles
            .iter()
            .map(|p| {
                let names: Vec<&str> = p.activities().iter().map(|l| l.as_str()).collect();
                profile(&merged_tax, &names)
            })
            .collect();
        let expected = calculator(&merged_tax, 1)
            .compute(key(), res(4), &relabeled)
            .unwrap();
        assert_eq!(mapped, expected);
    }

    #[test]
    fn test_unavailable_runs_survive_pooling_and_refining() {
        let tax = taxonomy();
        let merge = merge_mapping(&tax, &[("eat", "work")]);
        let calc = calculator(&tax, 1);
        let a = calc
            .compute(key(), res(2), &[profile(&tax, &["eat", "work"])])
            .unwrap()
            .map_activities(&merge);
        let b = calc
            .compute(key(), res(2), &[profile(&tax, &["sleep", "work"])])
            .unwrap()
            .map_activities(&merge);
        assert!(b.has_run_statistics("work"));

        let pooled = CategoryStatistics::merge(key(), &[&b, &a]).unwrap();
        assert_eq!(pooled.profile_count(), 2);
        assert!(!pooled.has_run_statistics("work"));
        assert!(!pooled.frequencies().contains_key("work"));
        assert_eq!(pooled.frequencies()["sleep"].count(0), 1);
        assert_eq!(pooled.frequencies()["sleep"].count(1), 1);

        let fine = pooled.refine(res(4)).unwrap();
        assert!(!fine.has_run_statistics("work"));
        assert_eq!(fine.durations()["sleep"].count(2), 1);

        let json = serde_json::to_string(&pooled).unwrap();
        let back: CategoryStatistics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pooled);
    }

    #[test]
    fn test_merge_errors() {
        let tax = taxonomy();
        assert!(matches!(
            CategoryStatistics::merge(key(), &[]),
            Err(AssureError::CategoryMergeConflict(_))
        ));

        let calc = calculator(&tax, 1);
        let two = calc.compute(key(), res(2), &[]).unwrap();
        let four = calc.compute(key(), res(4), &[]).unwrap();
        assert!(matches!(
            CategoryStatistics::merge(key(), &[&two, &four]),
            Err(AssureError::IncompatibleResolution(2, 4))
        ));
    }

    #[test]
    fn test_compute_all_keeps_order() {
        let tax = taxonomy();
        let other: CategoryKey = "FR_male_retired_rest day".parse().unwrap();
        let groups = vec![
            (other.clone(), vec![profile(&tax, &["sleep", "eat"])]),
            (key(), vec![profile(&tax, &["work", "work"]); 2]),
        ];
        let stats = calculator(&tax, 1).compute_all(res(2), &groups).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].key(), &other);
        assert_eq!(stats[1].profile_count(), 2);
    }

    #[test]
    fn test_statistics_serde() {
        let tax = taxonomy();
        let profiles = vec![profile(&tax, &["sleep", "work"])];
        let stats = calculator(&tax, 1).compute(key(), res(2), &profiles).unwrap();
        let json = serde_json::to_string(&stats).unwrap();
        let back: CategoryStatistics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }

    const NAMES: [&str; 3] = ["sleep", "work", "eat"];

    fn arb_profiles() -> impl Strategy<Value = Vec<Vec<usize>>> {
        proptest::collection::vec(proptest::collection::vec(0usize..3, 8), 0..12)
    }

    fn build(tax: &Taxonomy, picks: &[Vec<usize>]) -> Vec<NormalizedProfile> {
        picks
            .iter()
            .map(|p| {
                let names: Vec<&str> = p.iter().map(|i| NAMES[*i]).collect();
                profile(tax, &names)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_order_independent(picks in arb_profiles(), shift in 0usize..12) {
            let tax = taxonomy();
            let calc = calculator(&tax, 5).with_wraparound_runs(shift % 2 == 0);
            let profiles = build(&tax, &picks);

            let mut reordered = profiles.clone();
            reordered.reverse();
            if !reordered.is_empty() {
                let len = reordered.len();
                reordered.rotate_left(shift % len);
            }

            let a = calc.compute(key(), res(8), &profiles).unwrap();
            let b = calc.compute(key(), res(8), &reordered).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_probabilities_sum_to_one(picks in arb_profiles()) {
            let tax = taxonomy();
            let profiles = build(&tax, &picks);
            let stats = calculator(&tax, 1).compute(key(), res(8), &profiles).unwrap();
            for timestep in stats.probabilities() {
                match timestep {
                    Some(pmf) => {
                        let sum: f64 = pmf.values().sum();
                        prop_assert!((sum - 1.0).abs() < 1e-9);
                        prop_assert!(pmf.values().all(|p| (0.0..=1.0).contains(p)));
                    }
                    None => {
                        prop_assert!(profiles.is_empty());
                    }
                }
            }
        }
    }
}
