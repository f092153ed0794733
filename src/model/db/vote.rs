use std::ops::{Deref, DerefMut};

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::survey::{OptionId, SurveyId},
    mongodb::Id,
};

/// Core vote data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub user_id: Id,
    pub survey_id: SurveyId,
    pub option_id: OptionId,
    /// Moderated free text; `None` if the voter left no comment.
    pub comment: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime>,
}

impl VoteCore {
    /// Create a new live vote. Blank comments are stored as `None`.
    pub fn new(
        user_id: Id,
        survey_id: SurveyId,
        option_id: OptionId,
        comment: Option<String>,
    ) -> Self {
        let now = DateTime::now();
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Self {
            user_id,
            survey_id,
            option_id,
            comment,
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

impl DerefMut for Vote {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.vote
    }
}
