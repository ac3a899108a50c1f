//! Validation report encoding
//!
//! This module encodes validation results into a self-describing JSON report.
//! Every report carries its producer, a computation timestamp and a summary.

use crate::comparison::ComparisonOutcome;
use crate::error::AssureError;
use crate::pipeline::{StatisticsQuery, ValidationResults};
use crate::types::{ActivityLabel, DataSource, Resolution};
use crate::{ASSURE_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report format version
pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Outcome for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    /// Category in its textual form
    pub category: String,
    pub model_profiles: u64,
    pub reference_profiles: u64,
    /// Whether the model statistics of this category are low confidence
    pub low_confidence: bool,
    #[serde(flatten)]
    pub outcome: ComparisonOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub categories: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Mean score of the valid comparisons
    pub mean_score: Option<f64>,
    pub model_profiles: u64,
    pub reference_profiles: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub resolution: Resolution,
    pub activities: Vec<ActivityLabel>,
    pub summary: ReportSummary,
    pub categories: Vec<CategoryReport>,
}

/// Report encoder producing JSON validation reports
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Encode validation results into a report
    pub fn encode(&self, results: &ValidationResults) -> Result<ValidationReport, AssureError> {
        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: ASSURE_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let categories: Vec<CategoryReport> = results
            .list_categories()
            .iter()
            .filter_map(|key| {
                let comparison = results.get_comparison(key)?;
                let low_confidence = results
                    .get_statistics(key, DataSource::Model)
                    .map_or(false, |s| s.is_low_confidence());
                Some(CategoryReport {
                    category: key.to_string(),
                    model_profiles: comparison.model_profiles,
                    reference_profiles: comparison.reference_profiles,
                    low_confidence,
                    outcome: comparison.outcome.clone(),
                })
            })
            .collect();

        let scores: Vec<f64> = results
            .comparisons()
            .iter()
            .filter_map(|c| c.score())
            .collect();
        let mean_score =
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

        let summary = ReportSummary {
            categories: categories.len(),
            valid: scores.len(),
            invalid: results.comparisons().len() - scores.len(),
            mean_score,
            model_profiles: results.model().total_profiles(),
            reference_profiles: results.reference().total_profiles(),
        };

        let resolution = results
            .model()
            .iter()
            .next()
            .map(|s| s.resolution())
            .unwrap_or_default();

        Ok(ValidationReport {
            report_version: REPORT_VERSION.to_string(),
            producer,
            computed_at_utc: Utc::now().to_rfc3339(),
            resolution,
            activities: results.model().activities().to_vec(),
            summary,
            categories,
        })
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, results: &ValidationResults) -> Result<String, AssureError> {
        let report = self.encode(results)?;
        Ok(serde_json::to_string_pretty(&report)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::ComparisonEngine;
    use crate::category::CategoryKey;
    use crate::statistics::{CategoryStatistics, StatisticsCalculator};
    use crate::store::StatisticsSet;
    use crate::taxonomy::Taxonomy;
    use crate::types::NormalizedProfile;
    use chrono::NaiveDate;

    fn stats(tax: &Taxonomy, key: &str, days: usize, min_samples: u64) -> CategoryStatistics {
        let profiles: Vec<NormalizedProfile> = (0..days)
            .map(|_| {
                NormalizedProfile::new(
                    "p",
                    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                    Resolution::new(2).unwrap(),
                    vec![tax.label("sleep").unwrap(), tax.label("work").unwrap()],
                )
                .unwrap()
            })
            .collect();
        StatisticsCalculator::new(tax.labels().to_vec(), min_samples)
            .compute(key.parse().unwrap(), Resolution::new(2).unwrap(), &profiles)
            .unwrap()
    }

    fn make_results() -> ValidationResults {
        let tax = Taxonomy::new(["sleep", "work"]).unwrap();
        let model = StatisticsSet::from_statistics(
            DataSource::Model,
            tax.labels().to_vec(),
            [
                stats(&tax, "DE_female_student_working day", 3, 2),
                stats(&tax, "DE_male_student_working day", 1, 2),
            ],
        );
        let reference = StatisticsSet::from_statistics(
            DataSource::Reference,
            tax.labels().to_vec(),
            [
                stats(&tax, "DE_female_student_working day", 4, 2),
                stats(&tax, "DE_male_student_working day", 5, 2),
                stats(&tax, "FR_male_student_rest day", 5, 2),
            ],
        );

        let engine = ComparisonEngine::new(Default::default(), 2).unwrap();
        let mut comparisons: Vec<_> = model
            .iter()
            .map(|m| engine.compare(m, reference.get(m.key()).unwrap()).unwrap())
            .collect();
        let french: CategoryKey = "FR_male_student_rest day".parse().unwrap();
        let french_stats = reference.get(&french).unwrap();
        comparisons.push(engine.missing_counterpart(french_stats, DataSource::Model));
        ValidationResults::new(model, reference, comparisons)
    }

    #[test]
    fn test_encode_report() {
        let results = make_results();
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let report = encoder.encode(&results).unwrap();

        assert_eq!(report.report_version, REPORT_VERSION);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.version, ASSURE_VERSION);
        assert_eq!(report.producer.instance_id, "test-instance");
        assert_eq!(report.resolution.timesteps_per_day(), 2);
        assert_eq!(report.activities.len(), 2);

        assert_eq!(report.summary.categories, 3);
        assert_eq!(report.summary.valid, 1);
        assert_eq!(report.summary.invalid, 2);
        assert_eq!(report.summary.mean_score, Some(1.0));
        assert_eq!(report.summary.model_profiles, 4);
        assert_eq!(report.summary.reference_profiles, 14);

        assert_eq!(report.categories[0].category, "DE_female_student_working day");
        assert!(!report.categories[0].low_confidence);
        assert!(report.categories[1].low_confidence);
        assert_eq!(report.categories[2].category, "FR_male_student_rest day");
        assert_eq!(report.categories[2].model_profiles, 0);
    }

    #[test]
    fn test_encode_to_json() {
        let results = make_results();
        let json = ReportEncoder::new().encode_to_json(&results).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get("report_version").is_some());
        assert!(parsed.get("producer").is_some());
        assert!(parsed.get("computed_at_utc").is_some());
        assert_eq!(parsed["categories"][0]["status"], "valid");
        assert!(parsed["categories"][0]["indicators"]["per_activity"]["sleep"].is_object());
        assert_eq!(parsed["categories"][1]["status"], "invalid");
        assert_eq!(parsed["categories"][1]["reason"]["kind"], "too_few_profiles");

        let report: ValidationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.categories.len(), 3);
    }

    #[test]
    fn test_no_valid_comparisons() {
        let tax = Taxonomy::new(["sleep", "work"]).unwrap();
        let model = StatisticsSet::from_statistics(
            DataSource::Model,
            tax.labels().to_vec(),
            [stats(&tax, "DE_female_student_working day", 1, 2)],
        );
        let reference = StatisticsSet::new(DataSource::Reference, tax.labels().to_vec());
        let engine = ComparisonEngine::new(Default::default(), 2).unwrap();
        let comparisons =
            vec![engine.missing_counterpart(&model.as_slice()[0], DataSource::Reference)];
        let results = ValidationResults::new(model, reference, comparisons);

        let report = ReportEncoder::new().encode(&results).unwrap();
        assert_eq!(report.summary.mean_score, None);
        assert_eq!(report.summary.invalid, 1);
    }
}
