use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::model::{
    api::validation::{required_text, FieldErrors},
    common::survey::{OptionId, SurveyState, MAX_OPTIONS, MIN_OPTIONS},
    db::survey::{Survey, SurveyOption},
};

pub const MAX_TITLE_LENGTH: usize = 50;
pub const MAX_LABEL_LENGTH: usize = 255;
pub const MAX_TAG_LENGTH: usize = 50;

/// A survey submission, used both to create a survey and to edit a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveySpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// When voting should close. `None` leaves the survey open indefinitely.
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    /// Publish now, or keep as a draft.
    #[serde(default)]
    pub is_public: bool,
    pub options: Vec<OptionSpec>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One entry of a submitted option list.
///
/// Entries without an `id` are new options; blank new entries are skipped.
/// Entries with an `id` edit or delete an existing option. Existing options
/// that aren't mentioned are left as they are.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionSpec {
    #[serde(default)]
    pub id: Option<OptionId>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub delete: bool,
}

/// The edits allowed once a survey is published. There is deliberately no
/// title or description here: those are frozen at publication, and any such
/// fields in the request body are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEdit {
    /// Absent keeps the current end time; `null` removes it.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_at: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub options: Vec<OptionSpec>,
    /// Replacement tag list; `None` keeps the current tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Distinguish an explicit `null` from a missing field, which `default` covers.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A validated [`SurveySpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyContent {
    pub title: String,
    pub description: String,
    pub end_at: Option<DateTime<Utc>>,
    pub state: SurveyState,
    pub options: Vec<SurveyOption>,
    pub tags: Vec<String>,
}

/// A validated [`PublishedEdit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedChanges {
    /// The end time after the edit.
    pub end_at: Option<DateTime<Utc>>,
    pub options: Vec<SurveyOption>,
    pub tags: Option<Vec<String>>,
}

impl SurveySpec {
    /// Validate this submission against the survey's current options
    /// (empty for a new survey). Every problem is reported at once.
    pub fn validate(
        self,
        existing: &[SurveyOption],
        current_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<SurveyContent, Error> {
        let mut errors = FieldErrors::default();
        let title = required_text(&mut errors, "title", &self.title, MAX_TITLE_LENGTH);
        let description = self.description.trim().to_string();
        // Publishing opens voting now, so even a kept end time must be ahead.
        let kept_end = if self.is_public { None } else { current_end };
        check_end_at(&mut errors, self.end_at, kept_end, now);
        // Drafts never have votes, so nothing is protected from deletion.
        let options = merge_options(&mut errors, existing, self.options, &HashSet::new());
        let tags = normalize_tags(&mut errors, self.tags);
        errors.into_result()?;

        Ok(SurveyContent {
            title,
            description,
            end_at: self.end_at,
            state: SurveyState::from_public_flag(self.is_public),
            options,
            tags,
        })
    }
}

impl PublishedEdit {
    /// Validate these edits against a published survey. Options in
    /// `protected` have active votes and cannot be deleted.
    pub fn validate(
        self,
        survey: &Survey,
        protected: &HashSet<OptionId>,
        now: DateTime<Utc>,
    ) -> Result<PublishedChanges, Error> {
        let mut errors = FieldErrors::default();
        let current_end = survey.end_at.map(|end| end.to_chrono());
        let end_at = self.end_at.unwrap_or(current_end);
        check_end_at(&mut errors, end_at, current_end, now);
        let options = merge_options(&mut errors, &survey.options, self.options, protected);
        let tags = self.tags.map(|tags| normalize_tags(&mut errors, tags));
        errors.into_result()?;

        Ok(PublishedChanges {
            end_at,
            options,
            tags,
        })
    }
}

/// A new or changed end time must lie in the future.
fn check_end_at(
    errors: &mut FieldErrors,
    end_at: Option<DateTime<Utc>>,
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) {
    if let Some(end_at) = end_at {
        if Some(end_at) != current && end_at <= now {
            errors.add("end_at", "The end time must be in the future.");
        }
    }
}

/// Apply submitted option entries to a survey's current options.
///
/// The result keeps every existing option, including deleted ones, so IDs
/// are never reused. It is only meaningful if no errors were added.
pub fn merge_options(
    errors: &mut FieldErrors,
    existing: &[SurveyOption],
    submitted: Vec<OptionSpec>,
    protected: &HashSet<OptionId>,
) -> Vec<SurveyOption> {
    let mut options = existing.to_vec();
    let mut next_id = options.iter().map(|o| o.id).max().unwrap_or(0) + 1;
    let mut seen = HashSet::new();

    for spec in submitted {
        let label = spec.label.trim();
        match spec.id {
            Some(id) => {
                let Some(option) = options.iter_mut().find(|o| o.id == id && !o.is_deleted) else {
                    errors.add("options", format!("Option {id} does not exist."));
                    continue;
                };
                if !seen.insert(id) {
                    errors.add("options", format!("Option {id} appears more than once."));
                    continue;
                }
                if spec.delete {
                    if protected.contains(&id) {
                        errors.add(
                            "options",
                            format!("Option {id} has votes and cannot be deleted."),
                        );
                    } else {
                        option.is_deleted = true;
                    }
                } else if label.is_empty() {
                    errors.add("options", format!("Option {id} needs a label."));
                } else if label.chars().count() > MAX_LABEL_LENGTH {
                    errors.add(
                        "options",
                        format!("Option labels have at most {MAX_LABEL_LENGTH} characters."),
                    );
                } else {
                    option.label = label.to_string();
                }
            }
            None => {
                if spec.delete || label.is_empty() {
                    continue;
                }
                if label.chars().count() > MAX_LABEL_LENGTH {
                    errors.add(
                        "options",
                        format!("Option labels have at most {MAX_LABEL_LENGTH} characters."),
                    );
                    continue;
                }
                options.push(SurveyOption {
                    id: next_id,
                    label: label.to_string(),
                    is_deleted: false,
                });
                next_id += 1;
            }
        }
    }

    let live = options.iter().filter(|o| !o.is_deleted).count();
    if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&live) {
        errors.add(
            "options",
            format!("A survey needs between {MIN_OPTIONS} and {MAX_OPTIONS} options."),
        );
    }
    options
}

/// Trim tag names and drop blanks and duplicates, keeping submission order.
pub fn normalize_tags(errors: &mut FieldErrors, tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LENGTH {
            errors.add(
                "tags",
                format!("Tag names have at most {MAX_TAG_LENGTH} characters."),
            );
            continue;
        }
        if seen.insert(tag.to_string()) {
            result.push(tag.to_string());
        }
    }
    result
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use chrono::Duration;

    impl OptionSpec {
        pub fn new_label(label: &str) -> Self {
            Self {
                label: label.to_string(),
                ..Default::default()
            }
        }

        pub fn relabel(id: OptionId, label: &str) -> Self {
            Self {
                id: Some(id),
                label: label.to_string(),
                delete: false,
            }
        }

        pub fn delete(id: OptionId) -> Self {
            Self {
                id: Some(id),
                label: String::new(),
                delete: true,
            }
        }
    }

    impl SurveySpec {
        /// A published survey closing in a week.
        pub fn example() -> Self {
            Self {
                title: "Best ramen topping".to_string(),
                description: "Pick one.".to_string(),
                end_at: Some(Utc::now() + Duration::days(7)),
                is_public: true,
                options: vec![
                    OptionSpec::new_label("Chashu"),
                    OptionSpec::new_label("Menma"),
                    OptionSpec::new_label(""),
                    OptionSpec::new_label(""),
                ],
                tags: vec!["food".to_string(), "ramen".to_string()],
            }
        }

        pub fn draft_example() -> Self {
            Self {
                title: "Weekend plans".to_string(),
                description: String::new(),
                end_at: None,
                is_public: false,
                options: vec![
                    OptionSpec::new_label("Hiking"),
                    OptionSpec::new_label("Sleeping"),
                    OptionSpec::new_label("Onsen"),
                ],
                tags: vec!["life".to_string()],
            }
        }
    }
}
