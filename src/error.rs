//! Error types for Activity Assure

use thiserror::Error;

/// Errors that can occur while preparing, summarizing or comparing activity profiles
#[derive(Debug, Error)]
pub enum AssureError {
    #[error("Unknown activity label: {0}")]
    UnknownActivity(String),

    #[error("Invalid value '{value}' for category attribute '{attribute}'")]
    InvalidCategoryValue { attribute: String, value: String },

    #[error("No mapping entry for raw activity '{activity}' (person {person})")]
    UnmappedActivity { person: String, activity: String },

    #[error("No person metadata found for '{0}'")]
    MissingPersonMetadata(String),

    #[error("Merge mapping is not idempotent: '{0}' is a merge target but maps to '{1}'")]
    NonIdempotentMerge(String, String),

    #[error("Invalid taxonomy: {0}")]
    InvalidTaxonomy(String),

    #[error("Profile of person '{0}' has no start timestamp")]
    MissingStartTime(String),

    #[error("Profile of person '{0}' extends beyond the supported date range")]
    TimeOutOfRange(String),

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Incompatible resolutions: {0} and {1} timesteps per day")]
    IncompatibleResolution(u32, u32),

    #[error("Cannot compare different categories: {0} and {1}")]
    CategoryMismatch(String, String),

    #[error("Cannot merge categories: {0}")]
    CategoryMergeConflict(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
