//! Categorization attributes
//!
//! A category is the combination of country, sex, work status and day type that
//! identifies which reference statistics a single-day profile is compared to.

use crate::error::AssureError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Country codes used by Eurostat in the HETUS 2010 survey
pub const EUROSTAT_COUNTRY_CODES: [&str; 27] = [
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "EL", "ES", "FI", "FR", "HR", "HU",
    "IE", "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK",
];

/// Separator used in the textual form of a category key
pub const KEY_SEPARATOR: char = '_';

fn invalid(attribute: &str, value: &str) -> AssureError {
    AssureError::InvalidCategoryValue {
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}

/// Home country of a person, as a two-letter upper-case code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Country(String);

impl Country {
    pub const TITLE: &'static str = "country";

    pub fn new(code: &str) -> Result<Self, AssureError> {
        let well_formed = code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase());
        if !well_formed {
            return Err(invalid(Self::TITLE, code));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Country {
    type Error = AssureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Country::new(&value)
    }
}

impl From<Country> for String {
    fn from(country: Country) -> Self {
        country.0
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sex of a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub const TITLE: &'static str = "sex";
    pub const ALL: [Sex; 2] = [Sex::Male, Sex::Female];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

impl FromStr for Sex {
    type Err = AssureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sex::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| invalid(Self::TITLE, s))
    }
}

/// Working status of a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkStatus {
    #[serde(rename = "full time")]
    FullTime,
    #[serde(rename = "part time")]
    PartTime,
    #[serde(rename = "unemployed")]
    Unemployed,
    #[serde(rename = "retired")]
    Retired,
    #[serde(rename = "student")]
    Student,
    #[serde(rename = "undetermined")]
    Undetermined,
    #[serde(rename = "full or part time")]
    FullOrPartTime,
    #[serde(rename = "unemployed or retired")]
    UnemployedOrRetired,
}

impl WorkStatus {
    pub const TITLE: &'static str = "work status";
    pub const ALL: [WorkStatus; 8] = [
        WorkStatus::FullTime,
        WorkStatus::PartTime,
        WorkStatus::Unemployed,
        WorkStatus::Retired,
        WorkStatus::Student,
        WorkStatus::Undetermined,
        WorkStatus::FullOrPartTime,
        WorkStatus::UnemployedOrRetired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::FullTime => "full time",
            WorkStatus::PartTime => "part time",
            WorkStatus::Unemployed => "unemployed",
            WorkStatus::Retired => "retired",
            WorkStatus::Student => "student",
            WorkStatus::Undetermined => "undetermined",
            WorkStatus::FullOrPartTime => "full or part time",
            WorkStatus::UnemployedOrRetired => "unemployed or retired",
        }
    }

    /// Whether this is a concrete status rather than an aggregate or unknown one
    pub fn is_determined(&self) -> bool {
        !matches!(
            self,
            WorkStatus::Undetermined | WorkStatus::FullOrPartTime | WorkStatus::UnemployedOrRetired
        )
    }
}

impl FromStr for WorkStatus {
    type Err = AssureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkStatus::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| invalid(Self::TITLE, s))
    }
}

/// Day type of a single-day profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayType {
    #[serde(rename = "working day")]
    Work,
    #[serde(rename = "rest day")]
    NoWork,
    #[serde(rename = "undetermined")]
    Undetermined,
}

impl DayType {
    pub const TITLE: &'static str = "day type";
    pub const ALL: [DayType; 3] = [DayType::Work, DayType::NoWork, DayType::Undetermined];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayType::Work => "working day",
            DayType::NoWork => "rest day",
            DayType::Undetermined => "undetermined",
        }
    }
}

impl FromStr for DayType {
    type Err = AssureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DayType::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| invalid(Self::TITLE, s))
    }
}

/// Characteristics of a person, supplied alongside the raw profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonMetadata {
    pub country: Country,
    pub sex: Sex,
    pub work_status: WorkStatus,
}

/// Category of a single-day activity profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryKey {
    pub country: Country,
    pub sex: Sex,
    pub work_status: WorkStatus,
    pub day_type: DayType,
}

impl CategoryKey {
    pub fn new(country: Country, sex: Sex, work_status: WorkStatus, day_type: DayType) -> Self {
        Self {
            country,
            sex,
            work_status,
            day_type,
        }
    }

    /// Build the key for a person on a day of the given type
    pub fn for_person(person: &PersonMetadata, day_type: DayType) -> Self {
        Self::new(person.country.clone(), person.sex, person.work_status, day_type)
    }

    /// Parse a key from its four attribute values, in key order
    pub fn from_parts(parts: &[&str]) -> Result<Self, AssureError> {
        let [country, sex, work_status, day_type] = parts else {
            return Err(invalid("category", &parts.join("_")));
        };
        Ok(Self::new(
            Country::new(country)?,
            sex.parse()?,
            work_status.parse()?,
            day_type.parse()?,
        ))
    }

    /// Same key with another day type
    pub fn with_day_type(&self, day_type: DayType) -> Self {
        Self {
            day_type,
            ..self.clone()
        }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.country,
            self.sex.as_str(),
            self.work_status.as_str(),
            self.day_type.as_str(),
            sep = KEY_SEPARATOR
        )
    }
}

impl FromStr for CategoryKey {
    type Err = AssureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(KEY_SEPARATOR).collect();
        CategoryKey::from_parts(&parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn de_key() -> CategoryKey {
        CategoryKey::new(
            Country::new("DE").unwrap(),
            Sex::Female,
            WorkStatus::FullTime,
            DayType::Work,
        )
    }

    #[test]
    fn test_country_validation() {
        assert!(Country::new("DE").is_ok());
        assert!(matches!(
            Country::new("Germany"),
            Err(AssureError::InvalidCategoryValue { .. })
        ));
        assert!(Country::new("de").is_err());
        assert!(Country::new("").is_err());
    }

    #[test]
    fn test_attribute_parsing() {
        assert_eq!("male".parse::<Sex>().unwrap(), Sex::Male);
        assert_eq!(
            "full or part time".parse::<WorkStatus>().unwrap(),
            WorkStatus::FullOrPartTime
        );
        assert_eq!("rest day".parse::<DayType>().unwrap(), DayType::NoWork);

        let err = "weekend".parse::<DayType>().unwrap_err();
        match err {
            AssureError::InvalidCategoryValue { attribute, value } => {
                assert_eq!(attribute, "day type");
                assert_eq!(value, "weekend");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_work_status_determined() {
        assert!(WorkStatus::Student.is_determined());
        assert!(!WorkStatus::UnemployedOrRetired.is_determined());
        assert!(!WorkStatus::Undetermined.is_determined());
    }

    #[test]
    fn test_key_display_and_parse() {
        let key = de_key();
        let text = key.to_string();
        assert_eq!(text, "DE_female_full time_working day");
        assert_eq!(text.parse::<CategoryKey>().unwrap(), key);
    }

    #[test]
    fn test_key_parse_rejects_wrong_arity() {
        assert!("DE_female_full time".parse::<CategoryKey>().is_err());
        assert!("DE_female_full time_working day_extra"
            .parse::<CategoryKey>()
            .is_err());
    }

    #[test]
    fn test_key_structural_equality() {
        use std::collections::HashSet;

        let mut keys = HashSet::new();
        keys.insert(de_key());
        keys.insert(de_key());
        keys.insert(de_key().with_day_type(DayType::NoWork));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_key_serde() {
        let key = de_key();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(
            json,
            r#"{"country":"DE","sex":"female","work_status":"full time","day_type":"working day"}"#
        );
        let back: CategoryKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        let bad = r#"{"country":"xx","sex":"female","work_status":"full time","day_type":"working day"}"#;
        assert!(serde_json::from_str::<CategoryKey>(bad).is_err());
    }
}
