use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::survey::{OptionId, SurveyId, SurveyState, VotingStatus},
    mongodb::Id,
};

/// A single selectable answer, embedded in its survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyOption {
    /// Unique within the survey; never reused after deletion.
    pub id: OptionId,
    pub label: String,
    pub is_deleted: bool,
}

/// A survey as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Survey {
    #[serde(rename = "_id")]
    pub id: SurveyId,
    /// The user who created the survey.
    pub owner_id: Id,
    pub title: String,
    pub description: String,
    /// When voting opened; set on publication.
    pub start_at: Option<DateTime>,
    /// When voting closes, if ever.
    pub end_at: Option<DateTime>,
    pub state: SurveyState,
    pub status: VotingStatus,
    /// All options ever created for this survey, including deleted ones.
    pub options: Vec<SurveyOption>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime>,
}

/// Why a survey is not accepting votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotingBlocked {
    Deleted,
    Draft,
    Closed,
    NotStarted,
    Ended,
}

impl VotingBlocked {
    pub fn message(self) -> &'static str {
        match self {
            Self::Deleted => "This survey has been deleted.",
            Self::Draft => "This survey has not been published.",
            Self::Closed => "Voting on this survey is closed.",
            Self::NotStarted => "Voting on this survey has not started yet.",
            Self::Ended => "Voting on this survey has ended.",
        }
    }
}

impl Survey {
    /// Options that have not been deleted, in creation order.
    pub fn live_options(&self) -> impl Iterator<Item = &SurveyOption> {
        self.options.iter().filter(|option| !option.is_deleted)
    }

    /// Look up a live option by ID.
    pub fn live_option(&self, id: OptionId) -> Option<&SurveyOption> {
        self.live_options().find(|option| option.id == id)
    }

    pub fn is_owned_by(&self, user: Id) -> bool {
        self.owner_id == user
    }

    /// Drafts are only visible to their owner; deleted surveys to nobody.
    pub fn is_visible_to(&self, user: Option<Id>) -> bool {
        if self.is_deleted {
            return false;
        }
        self.state == SurveyState::Published || user.map_or(false, |u| self.is_owned_by(u))
    }

    /// Check whether a vote may be cast at the given instant.
    pub fn check_accepts_votes(&self, now: DateTime) -> Result<(), VotingBlocked> {
        if self.is_deleted {
            return Err(VotingBlocked::Deleted);
        }
        if self.state != SurveyState::Published {
            return Err(VotingBlocked::Draft);
        }
        if self.status == VotingStatus::Closed {
            return Err(VotingBlocked::Closed);
        }
        if matches!(self.start_at, Some(start) if now < start) {
            return Err(VotingBlocked::NotStarted);
        }
        if matches!(self.end_at, Some(end) if now >= end) {
            return Err(VotingBlocked::Ended);
        }
        Ok(())
    }

    pub fn accepts_votes(&self, now: DateTime) -> bool {
        self.check_accepts_votes(now).is_ok()
    }
}
