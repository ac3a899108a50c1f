//! Pipeline orchestration
//!
//! This module provides the public API for Activity Assure.
//! It orchestrates the full pipeline from raw model output to comparison results.

use crate::categorizer::{Categorizer, ProfileGroups};
use crate::category::CategoryKey;
use crate::comparison::{ComparisonEngine, ComparisonResult};
use crate::config::ValidatorConfig;
use crate::encoder::ReportEncoder;
use crate::error::AssureError;
use crate::normalizer::ProfileNormalizer;
use crate::statistics::{CategoryStatistics, StatisticsCalculator};
use crate::store::StatisticsSet;
use crate::taxonomy::{ActivityMapping, MergeMapping, Taxonomy};
use crate::types::{ActivityLabel, DataSource, ModelDataset, NormalizedProfile};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Read access to validation results for presentation layers
pub trait StatisticsQuery {
    /// All categories, model categories first
    fn list_categories(&self) -> Vec<CategoryKey>;

    fn get_statistics(&self, key: &CategoryKey, source: DataSource) -> Option<&CategoryStatistics>;

    fn get_comparison(&self, key: &CategoryKey) -> Option<&ComparisonResult>;
}

/// Statistics of both sides together with their comparison
#[derive(Debug, Clone)]
pub struct ValidationResults {
    model: StatisticsSet,
    reference: StatisticsSet,
    comparisons: Vec<ComparisonResult>,
}

impl ValidationResults {
    pub fn new(
        model: StatisticsSet,
        reference: StatisticsSet,
        comparisons: Vec<ComparisonResult>,
    ) -> Self {
        Self {
            model,
            reference,
            comparisons,
        }
    }

    pub fn model(&self) -> &StatisticsSet {
        &self.model
    }

    pub fn reference(&self) -> &StatisticsSet {
        &self.reference
    }

    /// Comparison results in category listing order
    pub fn comparisons(&self) -> &[ComparisonResult] {
        &self.comparisons
    }
}

impl StatisticsQuery for ValidationResults {
    fn list_categories(&self) -> Vec<CategoryKey> {
        let mut keys: Vec<CategoryKey> = self.model.keys().cloned().collect();
        let known: HashSet<&CategoryKey> = self.model.keys().collect();
        keys.extend(
            self.reference
                .keys()
                .filter(|key| !known.contains(key))
                .cloned(),
        );
        keys
    }

    fn get_statistics(&self, key: &CategoryKey, source: DataSource) -> Option<&CategoryStatistics> {
        match source {
            DataSource::Model => self.model.get(key),
            DataSource::Reference => self.reference.get(key),
        }
    }

    fn get_comparison(&self, key: &CategoryKey) -> Option<&ComparisonResult> {
        self.comparisons.iter().find(|c| c.key() == key)
    }
}

/// Validation pipeline over a fixed taxonomy and mapping tables.
///
/// Pipeline stages:
/// 1. ProfileNormalizer - Remap, resample and split raw profiles into days
/// 2. Categorizer - Assign category keys and group profiles
/// 3. StatisticsCalculator - Summarize each category
/// 4. ComparisonEngine - Compare model against reference statistics
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    config: ValidatorConfig,
    taxonomy: Taxonomy,
    mapping: ActivityMapping,
    merge: Option<MergeMapping>,
}

impl ValidationPipeline {
    pub fn new(
        config: ValidatorConfig,
        taxonomy: Taxonomy,
        mapping: ActivityMapping,
    ) -> Result<Self, AssureError> {
        config.validate()?;
        config.validate_activities(&taxonomy)?;
        Ok(Self {
            config,
            taxonomy,
            mapping,
            merge: None,
        })
    }

    /// Merge canonical labels after normalization
    pub fn with_merge_mapping(mut self, merge: MergeMapping) -> Self {
        self.merge = Some(merge);
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Activity labels that remain after merging
    pub fn activities(&self) -> Vec<ActivityLabel> {
        match &self.merge {
            Some(merge) => merge.merged_labels(&self.taxonomy),
            None => self.taxonomy.labels().to_vec(),
        }
    }

    fn normalizer(&self) -> ProfileNormalizer<'_> {
        ProfileNormalizer::new(&self.mapping, self.config.resolution)
            .with_merge(self.merge.as_ref())
            .with_start_policy(self.config.start_time)
            .with_day_offset_minutes(self.config.day_start_offset_minutes)
    }

    /// Normalize all raw profiles in parallel; days keep input order
    pub fn normalize(&self, dataset: &ModelDataset) -> Result<Vec<NormalizedProfile>, AssureError> {
        let normalizer = self.normalizer();
        let per_profile: Vec<Result<Vec<NormalizedProfile>, AssureError>> = dataset
            .profiles
            .par_iter()
            .map(|raw| normalizer.normalize(raw))
            .collect();

        let mut days = Vec::new();
        for result in per_profile {
            days.extend(result?);
        }
        info!(
            raw_profiles = dataset.profiles.len(),
            days = days.len(),
            "Normalized profiles"
        );
        Ok(days)
    }

    /// Categorize and group normalized profiles
    pub fn categorize(
        &self,
        dataset: &ModelDataset,
        profiles: Vec<NormalizedProfile>,
    ) -> Result<ProfileGroups, AssureError> {
        let categorizer = Categorizer::new(&dataset.persons)
            .with_policy(self.config.day_type.clone())
            .with_holidays(self.config.holiday_calendar());
        let groups = categorizer.group(profiles)?;
        for key in groups.keys() {
            self.taxonomy.validate_category_key(key)?;
        }
        Ok(groups)
    }

    /// Compute per-category statistics of a dataset
    pub fn compute_statistics(
        &self,
        dataset: &ModelDataset,
        source: DataSource,
    ) -> Result<StatisticsSet, AssureError> {
        let profiles = self.normalize(dataset)?;
        let groups = self.categorize(dataset, profiles)?.into_groups();

        let activities = self.activities();
        let calculator = StatisticsCalculator::new(activities.clone(), self.config.min_samples)
            .with_wraparound_runs(self.config.merge_wraparound_runs);
        let statistics = calculator.compute_all(self.config.resolution, &groups)?;

        let mut set = StatisticsSet::from_statistics(source, activities, statistics);
        if self.config.merge_unemployed_day_types {
            let merged = set.merge_unemployed_day_types()?;
            debug!(merged, "Pooled day types of unemployed and retired persons");
        }
        info!(
            source = source.as_str(),
            categories = set.len(),
            profiles = set.total_profiles(),
            "Computed statistics"
        );
        Ok(set)
    }

    /// Compare every category present on either side.
    ///
    /// Results follow the model order, followed by reference-only categories.
    pub fn compare(
        &self,
        model: &StatisticsSet,
        reference: &StatisticsSet,
    ) -> Result<Vec<ComparisonResult>, AssureError> {
        let engine = ComparisonEngine::new(self.config.weights, self.config.min_samples)?;

        let mut results = model
            .as_slice()
            .par_iter()
            .map(|stats| match reference.get(stats.key()) {
                Some(counterpart) => engine.compare(stats, counterpart),
                None => Ok(engine.missing_counterpart(stats, DataSource::Reference)),
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        results.extend(
            reference
                .iter()
                .filter(|stats| !model.contains(stats.key()))
                .map(|stats| engine.missing_counterpart(stats, DataSource::Model)),
        );

        let valid = results.iter().filter(|r| r.is_valid()).count();
        info!(
            compared = results.len(),
            valid,
            invalid = results.len() - valid,
            "Compared model with reference"
        );
        Ok(results)
    }

    /// Compute model statistics and compare them with reference statistics.
    ///
    /// With a merge mapping the reference is merged the same way first, so
    /// statistics stored with the full vocabulary stay comparable.
    pub fn validate(
        &self,
        dataset: &ModelDataset,
        reference: StatisticsSet,
    ) -> Result<ValidationResults, AssureError> {
        let reference = match &self.merge {
            Some(merge) => reference.map_activities(merge),
            None => reference,
        };
        let model = self.compute_statistics(dataset, DataSource::Model)?;
        let comparisons = self.compare(&model, &reference)?;
        Ok(ValidationResults::new(model, reference, comparisons))
    }
}

/// Validate model output against reference statistics and encode a JSON report.
///
/// # Arguments
/// * `dataset_json` - Model output as a serialized `ModelDataset`
/// * `reference_json` - Reference statistics as a serialized `StatisticsSet`
/// * `mapping_json` - Object mapping raw activity names to canonical labels
/// * `config` - Validator settings
///
/// The activity vocabulary is the set of mapping targets.
pub fn validate_to_report(
    dataset_json: &str,
    reference_json: &str,
    mapping_json: &str,
    config: ValidatorConfig,
) -> Result<String, AssureError> {
    let table: HashMap<String, String> = serde_json::from_str(mapping_json)?;
    let taxonomy = Taxonomy::from_mapping_targets(&table)?;
    let mapping = ActivityMapping::new(&taxonomy, &table)?;
    let dataset: ModelDataset = serde_json::from_str(dataset_json)?;
    let reference = StatisticsSet::from_json(reference_json)?;

    let pipeline = ValidationPipeline::new(config, taxonomy, mapping)?;
    let results = pipeline.validate(&dataset, reference)?;
    ReportEncoder::new().encode_to_json(&results)
}
