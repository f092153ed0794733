use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// States in the Survey lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurveyState {
    /// Saved but not public, only visible to the owner.
    Draft,
    /// Visible to all; title and description are frozen.
    Published,
}

impl SurveyState {
    /// The state a survey should be saved in, given the submitted public flag.
    pub fn from_public_flag(is_public: bool) -> Self {
        if is_public {
            Self::Published
        } else {
            Self::Draft
        }
    }
}

impl From<SurveyState> for Bson {
    fn from(state: SurveyState) -> Self {
        to_bson(&state).expect("Serialisation is infallible")
    }
}

/// Whether a survey is accepting votes. Stored as a number, `0` for open.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum VotingStatus {
    Open = 0,
    Closed = 1,
}

impl From<VotingStatus> for Bson {
    fn from(status: VotingStatus) -> Self {
        Bson::Int32(status as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voting_status_is_numeric() {
        assert_eq!(to_bson(&VotingStatus::Open).unwrap(), Bson::Int32(0));
        assert_eq!(to_bson(&VotingStatus::Closed).unwrap(), Bson::Int32(1));
        assert_eq!(Bson::from(VotingStatus::Closed), Bson::Int32(1));
    }

    #[test]
    fn public_flag() {
        assert_eq!(SurveyState::from_public_flag(true), SurveyState::Published);
        assert_eq!(SurveyState::from_public_flag(false), SurveyState::Draft);
    }
}
