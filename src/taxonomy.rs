//! Activity taxonomy and mapping tables
//!
//! The taxonomy is the closed vocabulary of canonical activity labels together
//! with the set of supported countries. Mapping tables translate model-specific
//! activity names into that vocabulary, and optionally merge canonical labels
//! into coarser groups. All of these are loaded once and then only read.

use crate::category::{CategoryKey, Country, EUROSTAT_COUNTRY_CODES};
use crate::error::AssureError;
use crate::types::ActivityLabel;
use std::collections::{BTreeSet, HashMap};

/// Upper bound for the number of canonical activity labels
pub const MAX_VOCABULARY_SIZE: usize = 64;

/// Closed vocabulary of activity labels and valid category values
#[derive(Debug, Clone)]
pub struct Taxonomy {
    labels: Vec<ActivityLabel>,
    countries: BTreeSet<Country>,
}

impl Taxonomy {
    /// Create a taxonomy from label names, keeping their order.
    /// Countries default to the Eurostat codes.
    pub fn new<I, S>(labels: I) -> Result<Self, AssureError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let mut vocabulary = Vec::new();
        for name in labels {
            let name = name.as_ref();
            if name.trim().is_empty() {
                return Err(AssureError::InvalidTaxonomy("empty activity label".into()));
            }
            if name.trim() != name {
                return Err(AssureError::InvalidTaxonomy(format!(
                    "activity label '{name}' has surrounding whitespace"
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(AssureError::InvalidTaxonomy(format!(
                    "duplicate activity label '{name}'"
                )));
            }
            vocabulary.push(ActivityLabel::new(name));
        }
        if vocabulary.is_empty() {
            return Err(AssureError::InvalidTaxonomy("no activity labels".into()));
        }
        if vocabulary.len() > MAX_VOCABULARY_SIZE {
            return Err(AssureError::InvalidTaxonomy(format!(
                "{} activity labels exceed the limit of {MAX_VOCABULARY_SIZE}",
                vocabulary.len()
            )));
        }

        let countries = EUROSTAT_COUNTRY_CODES
            .iter()
            .map(|code| Country::new(code))
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            labels: vocabulary,
            countries,
        })
    }

    /// Build the vocabulary from the sorted set of mapping targets
    pub fn from_mapping_targets(table: &HashMap<String, String>) -> Result<Self, AssureError> {
        let targets: BTreeSet<&str> = table.values().map(String::as_str).collect();
        Self::new(targets)
    }

    /// Replace the set of supported countries
    pub fn with_countries<I, S>(mut self, codes: I) -> Result<Self, AssureError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.countries = codes
            .into_iter()
            .map(|code| Country::new(code.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(self)
    }

    /// All labels, in vocabulary order
    pub fn labels(&self) -> &[ActivityLabel] {
        &self.labels
    }

    pub fn countries(&self) -> &BTreeSet<Country> {
        &self.countries
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn is_valid_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.as_str() == name)
    }

    /// Look up a label by name
    pub fn label(&self, name: &str) -> Result<ActivityLabel, AssureError> {
        self.labels
            .iter()
            .find(|l| l.as_str() == name)
            .cloned()
            .ok_or_else(|| AssureError::UnknownActivity(name.to_string()))
    }

    pub fn is_valid_country(&self, country: &Country) -> bool {
        self.countries.contains(country)
    }

    /// Check a country code against the supported set
    pub fn country(&self, code: &str) -> Result<Country, AssureError> {
        let country = Country::new(code)?;
        if !self.is_valid_country(&country) {
            return Err(AssureError::InvalidCategoryValue {
                attribute: Country::TITLE.to_string(),
                value: code.to_string(),
            });
        }
        Ok(country)
    }

    /// Sex, work status and day type are valid by construction; only the
    /// country needs checking.
    pub fn is_valid_category_key(&self, key: &CategoryKey) -> bool {
        self.is_valid_country(&key.country)
    }

    pub fn validate_category_key(&self, key: &CategoryKey) -> Result<(), AssureError> {
        if self.is_valid_category_key(key) {
            Ok(())
        } else {
            Err(AssureError::InvalidCategoryValue {
                attribute: Country::TITLE.to_string(),
                value: key.country.to_string(),
            })
        }
    }
}

/// Translation from model-specific activity names to canonical labels
#[derive(Debug, Clone)]
pub struct ActivityMapping {
    table: HashMap<String, ActivityLabel>,
}

impl ActivityMapping {
    /// Build a mapping; every target must be part of the taxonomy
    pub fn new(taxonomy: &Taxonomy, table: &HashMap<String, String>) -> Result<Self, AssureError> {
        let table = table
            .iter()
            .map(|(source, target)| Ok((source.clone(), taxonomy.label(target)?)))
            .collect::<Result<HashMap<_, _>, AssureError>>()?;
        Ok(Self { table })
    }

    /// Mapping that accepts exactly the canonical labels
    pub fn identity(taxonomy: &Taxonomy) -> Self {
        let table = taxonomy
            .labels()
            .iter()
            .map(|l| (l.as_str().to_string(), l.clone()))
            .collect();
        Self { table }
    }

    /// Map a raw name, attributing failures to `person`
    pub fn map(&self, person: &str, raw: &str) -> Result<ActivityLabel, AssureError> {
        self.table
            .get(raw)
            .cloned()
            .ok_or_else(|| AssureError::UnmappedActivity {
                person: person.to_string(),
                activity: raw.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Merging of canonical labels into coarser groups
///
/// Labels without an entry are kept unchanged, and merge targets map to
/// themselves, so applying a merge mapping twice equals applying it once.
#[derive(Debug, Clone)]
pub struct MergeMapping {
    table: HashMap<ActivityLabel, ActivityLabel>,
}

impl MergeMapping {
    pub fn new(taxonomy: &Taxonomy, table: &HashMap<String, String>) -> Result<Self, AssureError> {
        let table = table
            .iter()
            .map(|(source, target)| Ok((taxonomy.label(source)?, taxonomy.label(target)?)))
            .collect::<Result<HashMap<_, _>, AssureError>>()?;

        for target in table.values() {
            if let Some(next) = table.get(target) {
                if next != target {
                    return Err(AssureError::NonIdempotentMerge(
                        target.to_string(),
                        next.to_string(),
                    ));
                }
            }
        }
        Ok(Self { table })
    }

    pub fn apply(&self, label: &ActivityLabel) -> ActivityLabel {
        self.table.get(label).unwrap_or(label).clone()
    }

    /// Labels that remain after merging, in taxonomy order
    pub fn merged_labels(&self, taxonomy: &Taxonomy) -> Vec<ActivityLabel> {
        let mut seen = BTreeSet::new();
        taxonomy
            .labels()
            .iter()
            .map(|l| self.apply(l))
            .filter(|l| seen.insert(l.clone()))
            .collect()
    }
}
