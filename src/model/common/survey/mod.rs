mod state;

pub use state::{SurveyState, VotingStatus};

/// Our survey IDs are integers handed out by a counter.
pub type SurveyId = u32;
/// Our option IDs are integers, unique within their survey.
pub type OptionId = u32;

/// Fewest live options a survey may have.
pub const MIN_OPTIONS: usize = 2;
/// Most live options a survey may have.
pub const MAX_OPTIONS: usize = 4;
