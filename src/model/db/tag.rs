use std::ops::Deref;

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::{common::survey::SurveyId, mongodb::Id};

/// Core tag data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCore {
    /// Unique among live tags.
    pub name: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime>,
}

impl TagCore {
    pub fn new(name: String) -> Self {
        let now = DateTime::now();
        Self {
            name,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

/// A tag without an ID.
pub type NewTag = TagCore;

/// A tag from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub tag: TagCore,
}

impl Deref for Tag {
    type Target = TagCore;

    fn deref(&self) -> &Self::Target {
        &self.tag
    }
}

/// Join record between a tag and a survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSurveyCore {
    pub tag_id: Id,
    pub survey_id: SurveyId,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime>,
}

impl TagSurveyCore {
    pub fn new(tag_id: Id, survey_id: SurveyId) -> Self {
        let now = DateTime::now();
        Self {
            tag_id,
            survey_id,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

/// A tag-survey link without an ID.
pub type NewTagSurvey = TagSurveyCore;

/// A tag-survey link from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSurvey {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub link: TagSurveyCore,
}

impl Deref for TagSurvey {
    type Target = TagSurveyCore;

    fn deref(&self) -> &Self::Target {
        &self.link
    }
}
