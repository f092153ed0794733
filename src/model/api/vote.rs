use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::{id::ApiId, survey::SurveyResults},
    common::survey::{OptionId, SurveyId},
    db::{survey::Survey, vote::Vote},
};

/// A vote submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSpec {
    pub option_id: OptionId,
    #[serde(default)]
    pub comment: Option<String>,
}

/// An API-friendly description of a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDescription {
    pub id: ApiId,
    pub survey_id: SurveyId,
    pub option_id: OptionId,
    /// Label of the chosen option, if it still exists.
    pub option_label: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VoteDescription {
    pub fn new(vote: Vote, survey: &Survey) -> Self {
        Self {
            id: vote.id.into(),
            survey_id: vote.survey_id,
            option_id: vote.option_id,
            option_label: survey.live_option(vote.option_id).map(|o| o.label.clone()),
            comment: vote.vote.comment,
            created_at: vote.vote.created_at.to_chrono(),
        }
    }
}

/// A vote together with the current results of its survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDetail {
    pub vote: VoteDescription,
    pub results: SurveyResults,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl VoteSpec {
        pub fn example() -> Self {
            Self {
                option_id: 1,
                comment: Some("Thick slices please".to_string()),
            }
        }

        pub fn silent(option_id: OptionId) -> Self {
            Self {
                option_id,
                comment: None,
            }
        }
    }
}
