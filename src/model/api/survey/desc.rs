use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::survey::{OptionId, SurveyId, SurveyState, VotingStatus},
    db::survey::{Survey, SurveyOption},
};

/// A live option, as shown to voters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDescription {
    pub id: OptionId,
    pub label: String,
}

impl From<&SurveyOption> for OptionDescription {
    fn from(option: &SurveyOption) -> Self {
        Self {
            id: option.id,
            label: option.label.clone(),
        }
    }
}

/// An API-friendly survey description. Deleted options are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyDescription {
    pub id: SurveyId,
    pub owner_id: ApiId,
    pub title: String,
    pub description: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub is_public: bool,
    pub status: VotingStatus,
    /// Whether a vote cast now would be accepted.
    pub accepting_votes: bool,
    pub options: Vec<OptionDescription>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurveyDescription {
    pub fn new(survey: Survey, tags: Vec<String>) -> Self {
        let accepting_votes = survey.accepts_votes(BsonDateTime::now());
        let options = survey.live_options().map(Into::into).collect();
        Self {
            id: survey.id,
            owner_id: survey.owner_id.into(),
            title: survey.title,
            description: survey.description,
            start_at: survey.start_at.map(BsonDateTime::to_chrono),
            end_at: survey.end_at.map(BsonDateTime::to_chrono),
            is_public: survey.state == SurveyState::Published,
            status: survey.status,
            accepting_votes,
            options,
            tags,
            created_at: survey.created_at.to_chrono(),
            updated_at: survey.updated_at.to_chrono(),
        }
    }
}

/// A summary of a survey for listings, shorter than the full `SurveyDescription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveySummary {
    pub id: SurveyId,
    pub title: String,
    pub is_public: bool,
    pub status: VotingStatus,
    pub end_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SurveySummary {
    pub fn new(survey: Survey, tags: Vec<String>) -> Self {
        Self {
            id: survey.id,
            title: survey.title,
            is_public: survey.state == SurveyState::Published,
            status: survey.status,
            end_at: survey.end_at.map(BsonDateTime::to_chrono),
            tags,
            created_at: survey.created_at.to_chrono(),
        }
    }
}
