//! Profile categorization
//!
//! Assigns each single-day profile its category key from the person's
//! characteristics and the day type, and groups profiles by key.

use crate::category::{CategoryKey, DayType, PersonMetadata};
use crate::error::AssureError;
use crate::types::NormalizedProfile;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Activities counted as working time by default
pub const DEFAULT_WORK_ACTIVITIES: [&str; 2] = ["work", "education"];

/// Minimum working time for a working day, in minutes
pub const DEFAULT_WORKTIME_THRESHOLD_MINUTES: u32 = 180;

/// How the day type of a profile is determined
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DayTypePolicy {
    /// Weekends and holidays are rest days, all other days are working days
    #[default]
    Calendar,
    /// A working day has at least `threshold_minutes` in `work_activities`
    WorkingTime {
        work_activities: Vec<String>,
        threshold_minutes: u32,
    },
}

impl DayTypePolicy {
    pub fn working_time() -> Self {
        DayTypePolicy::WorkingTime {
            work_activities: DEFAULT_WORK_ACTIVITIES.iter().map(|s| s.to_string()).collect(),
            threshold_minutes: DEFAULT_WORKTIME_THRESHOLD_MINUTES,
        }
    }
}

/// Set of public holidays
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    dates: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Assigns category keys to normalized profiles
#[derive(Debug, Clone)]
pub struct Categorizer<'a> {
    persons: &'a BTreeMap<String, PersonMetadata>,
    policy: DayTypePolicy,
    holidays: HolidayCalendar,
}

impl<'a> Categorizer<'a> {
    pub fn new(persons: &'a BTreeMap<String, PersonMetadata>) -> Self {
        Self {
            persons,
            policy: DayTypePolicy::default(),
            holidays: HolidayCalendar::default(),
        }
    }

    pub fn with_policy(mut self, policy: DayTypePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_holidays(mut self, holidays: HolidayCalendar) -> Self {
        self.holidays = holidays;
        self
    }

    /// Day type of a profile under the configured policy
    pub fn day_type(&self, profile: &NormalizedProfile) -> DayType {
        match &self.policy {
            DayTypePolicy::Calendar => {
                let date = profile.date();
                let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
                if weekend || self.holidays.contains(date) {
                    DayType::NoWork
                } else {
                    DayType::Work
                }
            }
            DayTypePolicy::WorkingTime {
                work_activities,
                threshold_minutes,
            } => {
                let working_steps = profile
                    .activities()
                    .iter()
                    .filter(|label| work_activities.iter().any(|w| w == label.as_str()))
                    .count();
                let minutes = working_steps as f64 * profile.resolution().step_minutes();
                if minutes >= f64::from(*threshold_minutes) {
                    DayType::Work
                } else {
                    DayType::NoWork
                }
            }
        }
    }

    /// Category key of a profile
    pub fn key(&self, profile: &NormalizedProfile) -> Result<CategoryKey, AssureError> {
        let person = self
            .persons
            .get(profile.person())
            .ok_or_else(|| AssureError::MissingPersonMetadata(profile.person().to_string()))?;
        Ok(CategoryKey::for_person(person, self.day_type(profile)))
    }

    /// Attach the category key to a profile
    pub fn categorize(&self, profile: NormalizedProfile) -> Result<NormalizedProfile, AssureError> {
        let key = self.key(&profile)?;
        Ok(profile.with_category(key))
    }

    /// Categorize all profiles and group them by key in a single pass
    pub fn group(
        &self,
        profiles: impl IntoIterator<Item = NormalizedProfile>,
    ) -> Result<ProfileGroups, AssureError> {
        let mut groups = ProfileGroups::new();
        for profile in profiles {
            let key = self.key(&profile)?;
            groups.insert(key.clone(), profile.with_category(key));
        }
        debug!(
            categories = groups.len(),
            profiles = groups.total_profiles(),
            "Grouped profiles"
        );
        Ok(groups)
    }
}

/// Profiles grouped by category, in order of first appearance
#[derive(Debug, Clone, Default)]
pub struct ProfileGroups {
    groups: Vec<(CategoryKey, Vec<NormalizedProfile>)>,
    index: HashMap<CategoryKey, usize>,
}

impl ProfileGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: CategoryKey, profile: NormalizedProfile) {
        match self.index.get(&key) {
            Some(&position) => self.groups[position].1.push(profile),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push((key, vec![profile]));
            }
        }
    }

    pub fn get(&self, key: &CategoryKey) -> Option<&[NormalizedProfile]> {
        self.index
            .get(key)
            .map(|&position| self.groups[position].1.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &CategoryKey> {
        self.groups.iter().map(|(key, _)| key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CategoryKey, &[NormalizedProfile])> {
        self.groups
            .iter()
            .map(|(key, profiles)| (key, profiles.as_slice()))
    }

    /// Number of categories
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_profiles(&self) -> usize {
        self.groups.iter().map(|(_, profiles)| profiles.len()).sum()
    }

    pub fn into_groups(self) -> Vec<(CategoryKey, Vec<NormalizedProfile>)> {
        self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{Country, Sex, WorkStatus};
    use crate::taxonomy::Taxonomy;
    use crate::types::{ActivityLabel, Resolution};
    use pretty_assertions::assert_eq;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(["sleep", "work", "education", "other"]).unwrap()
    }

    fn persons() -> BTreeMap<String, PersonMetadata> {
        let mut persons = BTreeMap::new();
        persons.insert(
            "anna".to_string(),
            PersonMetadata {
                country: Country::new("DE").unwrap(),
                sex: Sex::Female,
                work_status: WorkStatus::FullTime,
            },
        );
        persons.insert(
            "ben".to_string(),
            PersonMetadata {
                country: Country::new("FR").unwrap(),
                sex: Sex::Male,
                work_status: WorkStatus::Retired,
            },
        );
        persons
    }

    fn profile(tax: &Taxonomy, person: &str, date: (i32, u32, u32), names: &[&str]) -> NormalizedProfile {
        let labels: Vec<ActivityLabel> = names.iter().map(|n| tax.label(n).unwrap()).collect();
        let resolution = Resolution::new(names.len() as u32).unwrap();
        let date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        NormalizedProfile::new(person, date, resolution, labels).unwrap()
    }

    #[test]
    fn test_calendar_day_types() {
        let tax = taxonomy();
        let persons = persons();
        let categorizer = Categorizer::new(&persons).with_holidays(HolidayCalendar::new([
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        ]));

        let monday = profile(&tax, "anna", (2024, 1, 15), &["sleep", "other"]);
        let saturday = profile(&tax, "anna", (2024, 1, 20), &["sleep", "work"]);
        let sunday = profile(&tax, "anna", (2024, 1, 21), &["sleep", "work"]);
        let new_year = profile(&tax, "anna", (2024, 1, 1), &["sleep", "work"]);

        assert_eq!(categorizer.day_type(&monday), DayType::Work);
        assert_eq!(categorizer.day_type(&saturday), DayType::NoWork);
        assert_eq!(categorizer.day_type(&sunday), DayType::NoWork);
        assert_eq!(categorizer.day_type(&new_year), DayType::NoWork);
    }

    #[test]
    fn test_working_time_day_types() {
        let tax = taxonomy();
        let persons = persons();
        let categorizer = Categorizer::new(&persons).with_policy(DayTypePolicy::working_time());

        // four six-hour steps: one step of work reaches the three hour threshold
        let office = profile(&tax, "anna", (2024, 1, 20), &["sleep", "work", "other", "sleep"]);
        let school = profile(&tax, "anna", (2024, 1, 15), &["sleep", "education", "other", "sleep"]);
        let home = profile(&tax, "anna", (2024, 1, 15), &["sleep", "other", "other", "sleep"]);

        assert_eq!(categorizer.day_type(&office), DayType::Work);
        assert_eq!(categorizer.day_type(&school), DayType::Work);
        assert_eq!(categorizer.day_type(&home), DayType::NoWork);

        let strict = Categorizer::new(&persons).with_policy(DayTypePolicy::WorkingTime {
            work_activities: vec!["work".into()],
            threshold_minutes: 480,
        });
        assert_eq!(strict.day_type(&office), DayType::NoWork);
    }

    #[test]
    fn test_categorize_assigns_key() {
        let tax = taxonomy();
        let persons = persons();
        let categorizer = Categorizer::new(&persons);
        let categorized = categorizer
            .categorize(profile(&tax, "ben", (2024, 1, 15), &["sleep", "other"]))
            .unwrap();
        assert_eq!(
            categorized.category().unwrap().to_string(),
            "FR_male_retired_working day"
        );
    }

    #[test]
    fn test_missing_person_metadata() {
        let tax = taxonomy();
        let persons = persons();
        let categorizer = Categorizer::new(&persons);
        let result = categorizer.categorize(profile(&tax, "carl", (2024, 1, 15), &["sleep", "other"]));
        assert!(matches!(
            result,
            Err(AssureError::MissingPersonMetadata(person)) if person == "carl"
        ));
    }

    #[test]
    fn test_grouping_keeps_first_appearance_order() {
        let tax = taxonomy();
        let persons = persons();
        let categorizer = Categorizer::new(&persons);
        let profiles = vec![
            profile(&tax, "ben", (2024, 1, 20), &["sleep", "other"]),
            profile(&tax, "anna", (2024, 1, 15), &["sleep", "work"]),
            profile(&tax, "ben", (2024, 1, 21), &["sleep", "sleep"]),
            profile(&tax, "anna", (2024, 1, 16), &["work", "work"]),
        ];
        let groups = categorizer.group(profiles).unwrap();

        let keys: Vec<String> = groups.keys().map(|k| k.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "FR_male_retired_rest day".to_string(),
                "DE_female_full time_working day".to_string(),
            ]
        );
        assert_eq!(groups.total_profiles(), 4);

        let rest: CategoryKey = "FR_male_retired_rest day".parse().unwrap();
        let members = groups.get(&rest).unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|p| p.category() == Some(&rest)));
    }

    #[test]
    fn test_grouping_fails_on_unknown_person() {
        let tax = taxonomy();
        let persons = persons();
        let categorizer = Categorizer::new(&persons);
        let profiles = vec![
            profile(&tax, "anna", (2024, 1, 15), &["sleep", "work"]),
            profile(&tax, "zoe", (2024, 1, 15), &["sleep", "work"]),
        ];
        assert!(categorizer.group(profiles).is_err());
    }

    #[test]
    fn test_day_type_policy_serde() {
        let policy: DayTypePolicy = serde_json::from_str(
            r#"{"kind":"working_time","work_activities":["work"],"threshold_minutes":120}"#,
        )
        .unwrap();
        assert_eq!(
            policy,
            DayTypePolicy::WorkingTime {
                work_activities: vec!["work".to_string()],
                threshold_minutes: 120,
            }
        );
        let calendar: DayTypePolicy = serde_json::from_str(r#"{"kind":"calendar"}"#).unwrap();
        assert_eq!(calendar, DayTypePolicy::Calendar);
    }
}
