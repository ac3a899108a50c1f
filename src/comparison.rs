//! Comparison of model statistics against reference statistics
//!
//! For every activity the engine measures how far the model is from the
//! reference in three indicator families:
//! - Probability curves: mean absolute error, RMSE, bias, Wasserstein distance
//!   and correlation
//! - Run durations: total variation and Wasserstein distance of histograms
//! - Runs per day: total variation and Wasserstein distance of histograms
//!
//! The family means are folded into a single score in [0, 1], where 1 is a
//! perfect match. Probability indicators are also reported scaled by the share
//! of the day each activity takes, and computed on min-max normalized curves,
//! so that rare activities are not hidden behind small absolute errors.

use crate::category::CategoryKey;
use crate::error::AssureError;
use crate::statistics::CategoryStatistics;
use crate::types::{ActivityLabel, DataSource, Histogram};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Relative weights of the indicator families in the score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorWeights {
    pub probability: f64,
    pub duration: f64,
    pub frequency: f64,
}

impl Default for IndicatorWeights {
    fn default() -> Self {
        Self {
            probability: 1.0,
            duration: 1.0,
            frequency: 1.0,
        }
    }
}

impl IndicatorWeights {
    pub fn validate(&self) -> Result<(), AssureError> {
        let weights = [self.probability, self.duration, self.frequency];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AssureError::ConfigError(
                "indicator weights must be finite and non-negative".into(),
            ));
        }
        if self.total() <= 0.0 {
            return Err(AssureError::ConfigError(
                "indicator weights must not all be zero".into(),
            ));
        }
        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.probability + self.duration + self.frequency
    }
}

/// Distances between two probability curves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityIndicators {
    pub mae: f64,
    pub rmse: f64,
    /// Mean of model minus reference
    pub bias: f64,
    /// Earth mover's distance between the value distributions of the curves
    pub wasserstein: f64,
    /// Pearson correlation; undefined when either curve is constant
    pub pearson: Option<f64>,
}

impl ProbabilityIndicators {
    /// Distances relative to `share`; correlation does not depend on scale
    fn scaled(&self, share: f64) -> Self {
        Self {
            mae: self.mae / share,
            rmse: self.rmse / share,
            bias: self.bias / share,
            wasserstein: self.wasserstein / share,
            pearson: self.pearson,
        }
    }
}

/// Distances between two histograms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramIndicators {
    /// Total variation distance of the normalized histograms
    pub tvd: f64,
    /// Earth mover's distance; undefined when exactly one side is empty
    pub wasserstein: Option<f64>,
}

/// All indicators of one activity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityIndicators {
    pub probability: ProbabilityIndicators,
    /// `None` when either side has no run statistics for the activity
    pub duration: Option<HistogramIndicators>,
    pub frequency: Option<HistogramIndicators>,
}

/// Indicator means across activities.
/// Run indicators are `None` when no activity has run statistics on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSummary {
    pub probability_mae: f64,
    pub probability_rmse: f64,
    pub probability_bias: f64,
    pub probability_wasserstein: f64,
    pub probability_pearson: Option<f64>,
    pub duration_tvd: Option<f64>,
    pub duration_wasserstein: Option<f64>,
    pub frequency_tvd: Option<f64>,
    pub frequency_wasserstein: Option<f64>,
}

/// Probability indicators of one variant, per activity and averaged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityVariant {
    pub per_activity: BTreeMap<ActivityLabel, ProbabilityIndicators>,
    pub mean: ProbabilityIndicators,
}

impl ProbabilityVariant {
    fn new(per_activity: BTreeMap<ActivityLabel, ProbabilityIndicators>) -> Self {
        let all: Vec<ProbabilityIndicators> = per_activity.values().copied().collect();
        let mean = ProbabilityIndicators {
            mae: family_mean(&all, |p| p.mae),
            rmse: family_mean(&all, |p| p.rmse),
            bias: family_mean(&all, |p| p.bias),
            wasserstein: family_mean(&all, |p| p.wasserstein),
            pearson: defined_mean(&all, |p| p.pearson),
        };
        Self { per_activity, mean }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub per_activity: BTreeMap<ActivityLabel, ActivityIndicators>,
    pub mean: IndicatorSummary,
    /// Probability indicators divided by each activity's mean share of the
    /// day across both sides. Activities neither side ever does are left out.
    pub scaled: ProbabilityVariant,
    /// Probability indicators of curves min-max normalized to [0, 1]
    pub normalized: ProbabilityVariant,
}

/// Why a comparison produced no indicators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidReason {
    /// One side has no profiles at all
    Empty { source: DataSource },
    /// One side has fewer profiles than the minimum sample size
    TooFewProfiles {
        source: DataSource,
        count: u64,
        min_samples: u64,
    },
    /// The category only exists on the other side
    MissingCounterpart { missing: DataSource },
    /// Every family with a non-zero weight lacks indicators
    NoWeightedIndicators,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Empty { source } => {
                write!(f, "{} data has no profiles", source.as_str())
            }
            InvalidReason::TooFewProfiles {
                source,
                count,
                min_samples,
            } => write!(
                f,
                "{} data has {count} profiles, at least {min_samples} required",
                source.as_str()
            ),
            InvalidReason::MissingCounterpart { missing } => {
                write!(f, "no {} data for this category", missing.as_str())
            }
            InvalidReason::NoWeightedIndicators => {
                write!(f, "no weighted indicator family is defined")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Valid { indicators: Indicators, score: f64 },
    Invalid { reason: InvalidReason },
}

/// Outcome of comparing one model category with one reference category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub model_key: CategoryKey,
    pub reference_key: CategoryKey,
    pub model_profiles: u64,
    pub reference_profiles: u64,
    pub outcome: ComparisonOutcome,
}

impl ComparisonResult {
    /// Category of the model side
    pub fn key(&self) -> &CategoryKey {
        &self.model_key
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, ComparisonOutcome::Valid { .. })
    }

    pub fn score(&self) -> Option<f64> {
        match &self.outcome {
            ComparisonOutcome::Valid { score, .. } => Some(*score),
            ComparisonOutcome::Invalid { .. } => None,
        }
    }

    pub fn indicators(&self) -> Option<&Indicators> {
        match &self.outcome {
            ComparisonOutcome::Valid { indicators, .. } => Some(indicators),
            ComparisonOutcome::Invalid { .. } => None,
        }
    }
}

/// Engine for comparing category statistics
#[derive(Debug, Clone)]
pub struct ComparisonEngine {
    weights: IndicatorWeights,
    min_samples: u64,
}

impl ComparisonEngine {
    pub fn new(weights: IndicatorWeights, min_samples: u64) -> Result<Self, AssureError> {
        weights.validate()?;
        Ok(Self {
            weights,
            min_samples,
        })
    }

    pub fn weights(&self) -> &IndicatorWeights {
        &self.weights
    }

    /// Compare statistics of the same category
    pub fn compare(
        &self,
        model: &CategoryStatistics,
        reference: &CategoryStatistics,
    ) -> Result<ComparisonResult, AssureError> {
        if model.key() != reference.key() {
            return Err(AssureError::CategoryMismatch(
                model.key().to_string(),
                reference.key().to_string(),
            ));
        }
        self.compare_unmatched(model, reference)
    }

    /// Compare statistics without requiring matching categories
    pub fn compare_unmatched(
        &self,
        model: &CategoryStatistics,
        reference: &CategoryStatistics,
    ) -> Result<ComparisonResult, AssureError> {
        let outcome = match self.check_validity(model, reference) {
            Some(reason) => {
                debug!(category = %model.key(), %reason, "Comparison not possible");
                ComparisonOutcome::Invalid { reason }
            }
            None => {
                let (model, reference) = common_resolution(model, reference)?;
                let indicators = indicators(&model, &reference);
                match self.score(&indicators.mean) {
                    Some(score) => {
                        debug!(category = %model.key(), score, "Compared category");
                        ComparisonOutcome::Valid { indicators, score }
                    }
                    None => {
                        let reason = InvalidReason::NoWeightedIndicators;
                        debug!(category = %model.key(), %reason, "Comparison not possible");
                        ComparisonOutcome::Invalid { reason }
                    }
                }
            }
        };
        Ok(ComparisonResult {
            model_key: model.key().clone(),
            reference_key: reference.key().clone(),
            model_profiles: model.profile_count(),
            reference_profiles: reference.profile_count(),
            outcome,
        })
    }

    /// Result for a category that only one side has
    pub fn missing_counterpart(
        &self,
        present: &CategoryStatistics,
        missing: DataSource,
    ) -> ComparisonResult {
        let (model_profiles, reference_profiles) = match missing {
            DataSource::Model => (0, present.profile_count()),
            DataSource::Reference => (present.profile_count(), 0),
        };
        ComparisonResult {
            model_key: present.key().clone(),
            reference_key: present.key().clone(),
            model_profiles,
            reference_profiles,
            outcome: ComparisonOutcome::Invalid {
                reason: InvalidReason::MissingCounterpart { missing },
            },
        }
    }

    /// Compare every model category with every reference category
    pub fn compare_all_combinations(
        &self,
        model: &[CategoryStatistics],
        reference: &[CategoryStatistics],
    ) -> Result<Vec<ComparisonResult>, AssureError> {
        let pairs: Vec<(&CategoryStatistics, &CategoryStatistics)> = model
            .iter()
            .flat_map(|m| reference.iter().map(move |r| (m, r)))
            .collect();
        info!(
            model_categories = model.len(),
            reference_categories = reference.len(),
            "Comparing all category combinations"
        );
        pairs
            .par_iter()
            .map(|(m, r)| self.compare_unmatched(m, r))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }

    fn check_validity(
        &self,
        model: &CategoryStatistics,
        reference: &CategoryStatistics,
    ) -> Option<InvalidReason> {
        [(model, DataSource::Model), (reference, DataSource::Reference)]
            .into_iter()
            .find_map(|(stats, source)| {
                let count = stats.profile_count();
                if count == 0 {
                    Some(InvalidReason::Empty { source })
                } else if count < self.min_samples {
                    Some(InvalidReason::TooFewProfiles {
                        source,
                        count,
                        min_samples: self.min_samples,
                    })
                } else {
                    None
                }
            })
    }

    /// Weighted distance turned into a score; families without indicators
    /// drop out together with their weight
    fn score(&self, mean: &IndicatorSummary) -> Option<f64> {
        let w = &self.weights;
        let families = [
            (w.probability, Some(mean.probability_mae)),
            (w.duration, mean.duration_tvd),
            (w.frequency, mean.frequency_tvd),
        ];
        let (weighted, total) = families
            .iter()
            .filter_map(|(weight, distance)| Some((*weight, (*distance)?)))
            .fold((0.0, 0.0), |(sum, total), (weight, distance)| {
                (sum + weight * distance, total + weight)
            });
        (total > 0.0).then(|| (1.0 - weighted / total).clamp(0.0, 1.0))
    }
}

/// Bring both sides to the finer of the two resolutions
fn common_resolution(
    model: &CategoryStatistics,
    reference: &CategoryStatistics,
) -> Result<(CategoryStatistics, CategoryStatistics), AssureError> {
    let m = model.resolution().timesteps_per_day();
    let r = reference.resolution().timesteps_per_day();
    if m >= r {
        Ok((model.clone(), reference.refine(model.resolution())?))
    } else {
        Ok((model.refine(reference.resolution())?, reference.clone()))
    }
}

fn indicators(model: &CategoryStatistics, reference: &CategoryStatistics) -> Indicators {
    let labels: BTreeSet<&ActivityLabel> = model.labels().chain(reference.labels()).collect();
    let slots = model.resolution().timesteps_per_day() as usize;

    let mut per_activity = BTreeMap::new();
    let mut scaled = BTreeMap::new();
    let mut normalized = BTreeMap::new();
    for label in labels {
        let curve = |stats: &CategoryStatistics| {
            stats
                .probability_curve(label.as_str())
                .unwrap_or_else(|| vec![0.0; slots])
        };
        let durations = |stats: &CategoryStatistics| {
            stats.durations().get(label).cloned().unwrap_or_default()
        };
        // an activity outside a vocabulary is never done: zero runs every day
        let frequencies = |stats: &CategoryStatistics| {
            stats.frequencies().get(label).cloned().unwrap_or_else(|| {
                let mut zeros = Histogram::new();
                zeros.record_n(0, stats.profile_count());
                zeros
            })
        };

        let (model_curve, reference_curve) = (curve(model), curve(reference));
        let probability = probability_indicators(&model_curve, &reference_curve);
        let share = (mean(model_curve.iter().copied()) + mean(reference_curve.iter().copied())) / 2.0;
        if share > 0.0 {
            scaled.insert(label.clone(), probability.scaled(share));
        }
        normalized.insert(
            label.clone(),
            probability_indicators(&min_max(&model_curve), &min_max(&reference_curve)),
        );

        let with_runs = model.has_run_statistics(label.as_str())
            && reference.has_run_statistics(label.as_str());
        let indicators = ActivityIndicators {
            probability,
            duration: with_runs
                .then(|| histogram_indicators(&durations(model), &durations(reference))),
            frequency: with_runs
                .then(|| histogram_indicators(&frequencies(model), &frequencies(reference))),
        };
        per_activity.insert(label.clone(), indicators);
    }

    let all: Vec<ActivityIndicators> = per_activity.values().copied().collect();
    let mean = IndicatorSummary {
        probability_mae: family_mean(&all, |a| a.probability.mae),
        probability_rmse: family_mean(&all, |a| a.probability.rmse),
        probability_bias: family_mean(&all, |a| a.probability.bias),
        probability_wasserstein: family_mean(&all, |a| a.probability.wasserstein),
        probability_pearson: defined_mean(&all, |a| a.probability.pearson),
        duration_tvd: defined_mean(&all, |a| a.duration.map(|d| d.tvd)),
        duration_wasserstein: defined_mean(&all, |a| a.duration.and_then(|d| d.wasserstein)),
        frequency_tvd: defined_mean(&all, |a| a.frequency.map(|f| f.tvd)),
        frequency_wasserstein: defined_mean(&all, |a| a.frequency.and_then(|f| f.wasserstein)),
    };
    Indicators {
        per_activity,
        mean,
        scaled: ProbabilityVariant::new(scaled),
        normalized: ProbabilityVariant::new(normalized),
    }
}

fn family_mean<T>(all: &[T], f: impl Fn(&T) -> f64) -> f64 {
    mean(all.iter().map(f))
}

/// Mean over the entries where the indicator is defined
fn defined_mean<T>(all: &[T], f: impl Fn(&T) -> Option<f64>) -> Option<f64> {
    let defined: Vec<f64> = all.iter().filter_map(f).collect();
    (!defined.is_empty()).then(|| mean(defined.into_iter()))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Rescale a curve to span [0, 1]; a flat curve becomes all zeros
fn min_max(curve: &[f64]) -> Vec<f64> {
    let low = curve.iter().copied().fold(f64::INFINITY, f64::min);
    let high = curve.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = high - low;
    curve
        .iter()
        .map(|v| if range > 0.0 { (v - low) / range } else { v - low })
        .collect()
}

/// Compare two probability curves of equal length
pub fn probability_indicators(model: &[f64], reference: &[f64]) -> ProbabilityIndicators {
    let diffs: Vec<f64> = model.iter().zip(reference).map(|(m, r)| m - r).collect();
    ProbabilityIndicators {
        mae: mean(diffs.iter().map(|d| d.abs())),
        rmse: mean(diffs.iter().map(|d| d * d)).sqrt(),
        bias: mean(diffs.iter().copied()),
        wasserstein: value_wasserstein(model, reference),
        pearson: pearson(model, reference),
    }
}

/// Earth mover's distance between two equally sized samples of values
fn value_wasserstein(a: &[f64], b: &[f64]) -> f64 {
    let sorted = |values: &[f64]| {
        let mut values = values.to_vec();
        values.sort_by(f64::total_cmp);
        values
    };
    let (a, b) = (sorted(a), sorted(b));
    mean(a.iter().zip(&b).map(|(x, y)| (x - y).abs()))
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let mean_a = mean(a.iter().copied());
    let mean_b = mean(b.iter().copied());
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some((cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0))
}

/// Compare two histograms by their normalized shapes
pub fn histogram_indicators(model: &Histogram, reference: &Histogram) -> HistogramIndicators {
    match (model.normalized(), reference.normalized()) {
        (None, None) => HistogramIndicators {
            tvd: 0.0,
            wasserstein: Some(0.0),
        },
        (Some(p), Some(q)) => {
            let support: BTreeSet<u32> = p.keys().chain(q.keys()).copied().collect();
            let mass = |pmf: &BTreeMap<u32, f64>, v: u32| pmf.get(&v).copied().unwrap_or(0.0);

            let tvd = 0.5
                * support
                    .iter()
                    .map(|v| (mass(&p, *v) - mass(&q, *v)).abs())
                    .sum::<f64>();

            let values: Vec<u32> = support.into_iter().collect();
            let (mut cdf_p, mut cdf_q, mut wasserstein) = (0.0, 0.0, 0.0);
            for pair in values.windows(2) {
                cdf_p += mass(&p, pair[0]);
                cdf_q += mass(&q, pair[0]);
                wasserstein += (cdf_p - cdf_q).abs() * f64::from(pair[1] - pair[0]);
            }

            HistogramIndicators {
                tvd: tvd.clamp(0.0, 1.0),
                wasserstein: Some(wasserstein),
            }
        }
        _ => HistogramIndicators {
            tvd: 1.0,
            wasserstein: None,
        },
    }
}
