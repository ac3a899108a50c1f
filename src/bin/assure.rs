//! Assure CLI - Command-line interface for Activity Assure
//!
//! Commands:
//! - statistics: Compute per-category statistics of an activity dataset
//! - compare: Compare model statistics with reference statistics
//! - validate: Compute model statistics and compare them in one step
//! - filter: Drop small categories from a statistics file, optionally merging activities

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use activity_assure::encoder::ReportEncoder;
use activity_assure::pipeline::{ValidationPipeline, ValidationResults};
use activity_assure::{
    ActivityMapping, AssureError, DataSource, MergeMapping, ModelDataset, StatisticsSet, Taxonomy,
    ValidatorConfig, ASSURE_VERSION,
};

/// Assure - Validation of synthetic activity profiles against time-use surveys
#[derive(Parser)]
#[command(name = "assure")]
#[command(version = ASSURE_VERSION)]
#[command(about = "Validate simulated activity profiles against reference statistics", long_about = None)]
struct Cli {
    /// Configuration file (.json or .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute per-category statistics of an activity dataset
    Statistics {
        /// Dataset file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        #[command(flatten)]
        vocabulary: VocabularyArgs,

        /// Which side the statistics describe
        #[arg(long, default_value = "model")]
        source: SourceArg,

        /// Drop categories with fewer profiles than this
        #[arg(long)]
        min_size: Option<u64>,
    },

    /// Compare model statistics with reference statistics
    Compare {
        /// Model statistics file
        #[arg(short, long)]
        model: PathBuf,

        /// Reference statistics file
        #[arg(short, long)]
        reference: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Compute model statistics and compare them with reference statistics
    Validate {
        /// Model dataset file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Reference statistics file
        #[arg(short, long)]
        reference: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        #[command(flatten)]
        vocabulary: VocabularyArgs,

        /// Also save the model statistics to this file
        #[arg(long)]
        save_statistics: Option<PathBuf>,
    },

    /// Drop small categories from a statistics file, optionally merging activities
    Filter {
        /// Statistics file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Minimum number of profiles per category
        #[arg(long)]
        min_size: u64,

        /// Pool working and rest days of unemployed and retired persons
        #[arg(long)]
        merge_unemployed: bool,

        /// Merge mapping file (object of activity label to merged label)
        #[arg(long)]
        merge: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct VocabularyArgs {
    /// Activity mapping file (object of raw name to activity label)
    #[arg(long)]
    mapping: PathBuf,

    /// Activity vocabulary file (array of labels); defaults to the mapping targets
    #[arg(long)]
    activities: Option<PathBuf>,

    /// Merge mapping file (object of activity label to merged label)
    #[arg(long)]
    merge: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    /// Simulation model output
    Model,
    /// Time-use survey data
    Reference,
}

impl From<SourceArg> for DataSource {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Model => DataSource::Model,
            SourceArg::Reference => DataSource::Reference,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AssureCliError> {
    let config = match &cli.config {
        Some(path) => ValidatorConfig::from_file(path)?,
        None => ValidatorConfig::default(),
    };

    match cli.command {
        Commands::Statistics {
            input,
            output,
            vocabulary,
            source,
            min_size,
        } => cmd_statistics(&input, &output, &vocabulary, source.into(), min_size, config),

        Commands::Compare {
            model,
            reference,
            output,
        } => cmd_compare(&model, &reference, &output, config),

        Commands::Validate {
            input,
            reference,
            output,
            vocabulary,
            save_statistics,
        } => cmd_validate(
            &input,
            &reference,
            &output,
            &vocabulary,
            save_statistics.as_deref(),
            config,
        ),

        Commands::Filter {
            input,
            output,
            min_size,
            merge_unemployed,
            merge,
        } => cmd_filter(&input, &output, min_size, merge_unemployed, merge.as_deref()),
    }
}

fn cmd_statistics(
    input: &Path,
    output: &Path,
    vocabulary: &VocabularyArgs,
    source: DataSource,
    min_size: Option<u64>,
    config: ValidatorConfig,
) -> Result<(), AssureCliError> {
    let dataset = read_dataset(input)?;
    let pipeline = build_pipeline(vocabulary, config)?;

    let mut statistics = pipeline.compute_statistics(&dataset, source)?;
    if statistics.is_empty() {
        return Err(AssureCliError::NoProfiles);
    }
    if let Some(min_size) = min_size {
        statistics.filter_categories(min_size);
    }

    write_output(output, &statistics.to_json()?)
}

fn cmd_compare(
    model: &Path,
    reference: &Path,
    output: &Path,
    config: ValidatorConfig,
) -> Result<(), AssureCliError> {
    let model = StatisticsSet::from_json(&read_input(model)?)?;
    let reference = StatisticsSet::from_json(&read_input(reference)?)?;

    // Persisted statistics were computed over their own vocabulary
    let taxonomy = Taxonomy::new(model.activities().iter().map(|l| l.as_str()))?;
    let mapping = ActivityMapping::identity(&taxonomy);
    let pipeline = ValidationPipeline::new(config, taxonomy, mapping)?;

    let comparisons = pipeline.compare(&model, &reference)?;
    let results = ValidationResults::new(model, reference, comparisons);
    write_output(output, &ReportEncoder::new().encode_to_json(&results)?)
}

fn cmd_validate(
    input: &Path,
    reference: &Path,
    output: &Path,
    vocabulary: &VocabularyArgs,
    save_statistics: Option<&Path>,
    config: ValidatorConfig,
) -> Result<(), AssureCliError> {
    let dataset = read_dataset(input)?;
    let reference = StatisticsSet::from_json(&read_input(reference)?)?;
    let pipeline = build_pipeline(vocabulary, config)?;

    let results = pipeline.validate(&dataset, reference)?;
    if let Some(path) = save_statistics {
        fs::write(path, results.model().to_json()?)?;
        info!(path = %path.display(), "Saved model statistics");
    }

    write_output(output, &ReportEncoder::new().encode_to_json(&results)?)
}

fn cmd_filter(
    input: &Path,
    output: &Path,
    min_size: u64,
    merge_unemployed: bool,
    merge: Option<&Path>,
) -> Result<(), AssureCliError> {
    let mut statistics = StatisticsSet::from_json(&read_input(input)?)?;
    if let Some(path) = merge {
        let taxonomy = Taxonomy::new(statistics.activities().iter().map(|l| l.as_str()))?;
        let merge_table: HashMap<String, String> = serde_json::from_str(&read_input(path)?)?;
        let merge = MergeMapping::new(&taxonomy, &merge_table)?;
        statistics = statistics.map_activities(&merge);
    }
    if merge_unemployed {
        statistics.merge_unemployed_day_types()?;
    }
    statistics.filter_categories(min_size);
    write_output(output, &statistics.to_json()?)
}

fn build_pipeline(
    vocabulary: &VocabularyArgs,
    config: ValidatorConfig,
) -> Result<ValidationPipeline, AssureCliError> {
    let table: HashMap<String, String> = serde_json::from_str(&read_input(&vocabulary.mapping)?)?;
    let taxonomy = match &vocabulary.activities {
        Some(path) => {
            let labels: Vec<String> = serde_json::from_str(&read_input(path)?)?;
            Taxonomy::new(labels)?
        }
        None => Taxonomy::from_mapping_targets(&table)?,
    };
    let mapping = ActivityMapping::new(&taxonomy, &table)?;

    let mut pipeline = ValidationPipeline::new(config, taxonomy, mapping)?;
    if let Some(path) = &vocabulary.merge {
        let merge_table: HashMap<String, String> = serde_json::from_str(&read_input(path)?)?;
        let merge = MergeMapping::new(pipeline.taxonomy(), &merge_table)?;
        pipeline = pipeline.with_merge_mapping(merge);
    }
    Ok(pipeline)
}

fn read_dataset(path: &Path) -> Result<ModelDataset, AssureCliError> {
    let dataset: ModelDataset = serde_json::from_str(&read_input(path)?)?;
    if dataset.profiles.is_empty() {
        return Err(AssureCliError::NoProfiles);
    }
    Ok(dataset)
}

fn read_input(path: &Path) -> Result<String, AssureCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<(), AssureCliError> {
    if path.to_string_lossy() == "-" {
        println!("{}", data);
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum AssureCliError {
    Io(io::Error),
    Json(serde_json::Error),
    Assure(AssureError),
    NoProfiles,
}

impl From<io::Error> for AssureCliError {
    fn from(e: io::Error) -> Self {
        AssureCliError::Io(e)
    }
}

impl From<serde_json::Error> for AssureCliError {
    fn from(e: serde_json::Error) -> Self {
        AssureCliError::Json(e)
    }
}

impl From<AssureError> for AssureCliError {
    fn from(e: AssureError) -> Self {
        AssureCliError::Assure(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<AssureCliError> for CliError {
    fn from(e: AssureCliError) -> Self {
        match e {
            AssureCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            AssureCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            AssureCliError::NoProfiles => CliError {
                code: "NO_PROFILES".to_string(),
                message: "No activity profiles found in input".to_string(),
                hint: Some("Ensure the dataset contains complete days".to_string()),
            },
            AssureCliError::Assure(e) => {
                let (code, hint) = match &e {
                    AssureError::UnknownActivity(_) | AssureError::UnmappedActivity { .. } => {
                        ("MAPPING_ERROR", "Add the activity to the mapping file")
                    }
                    AssureError::MissingStartTime(_) | AssureError::TimeOutOfRange(_) => {
                        ("PROFILE_ERROR", "Check the start time and raw steps of the profile")
                    }
                    AssureError::MissingPersonMetadata(_)
                    | AssureError::InvalidCategoryValue { .. } => {
                        ("PERSON_ERROR", "Check the persons section of the dataset")
                    }
                    AssureError::ConfigError(_)
                    | AssureError::TomlError(_)
                    | AssureError::InvalidResolution(_) => {
                        ("CONFIG_ERROR", "Check the configuration file")
                    }
                    AssureError::IncompatibleResolution(..)
                    | AssureError::CategoryMergeConflict(_) => {
                        ("STATISTICS_ERROR", "Recompute statistics with matching settings")
                    }
                    AssureError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    AssureError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    _ => ("VALIDATION_ERROR", "Check the input files"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
        }
    }
}
