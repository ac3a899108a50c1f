//! Activity Assure - Validation engine for synthetic activity profiles
//!
//! Activity Assure compares the activity profiles produced by behavior
//! simulation models with a time-use reference dataset through a deterministic
//! pipeline: normalization → categorization → statistics → comparison →
//! report encoding.
//!
//! ## Modules
//!
//! - **Taxonomy**: Closed activity vocabulary, activity mappings and category attributes
//! - **Statistics**: Per-category probability profiles, durations and frequencies
//! - **Comparison**: Indicators and scores of model against reference statistics

pub mod categorizer;
pub mod category;
pub mod comparison;
pub mod config;
pub mod encoder;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod statistics;
pub mod store;
pub mod taxonomy;
pub mod types;

pub use category::{CategoryKey, Country, DayType, PersonMetadata, Sex, WorkStatus};
pub use comparison::{ComparisonEngine, ComparisonOutcome, ComparisonResult, IndicatorWeights};
pub use config::ValidatorConfig;
pub use encoder::{ReportEncoder, ValidationReport};
pub use error::AssureError;
pub use pipeline::{validate_to_report, StatisticsQuery, ValidationPipeline, ValidationResults};
pub use statistics::{CategoryStatistics, StatisticsCalculator};
pub use store::StatisticsSet;
pub use taxonomy::{ActivityMapping, MergeMapping, Taxonomy};
pub use types::{ActivityLabel, DataSource, ModelDataset, NormalizedProfile, RawProfile, Resolution};

/// Activity Assure version embedded in all reports
pub const ASSURE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "activity-assure";
