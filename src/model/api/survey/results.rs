use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    common::survey::{OptionId, SurveyId},
    db::{survey::Survey, vote::Vote},
};

/// Vote count for a single option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionResult {
    pub id: OptionId,
    pub label: String,
    pub votes: u64,
}

/// Current standing of a survey: a count per live option and every comment
/// left with an active vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResults {
    pub survey_id: SurveyId,
    pub total_votes: u64,
    pub options: Vec<OptionResult>,
    pub comments: Vec<String>,
}

impl SurveyResults {
    /// Tally the given active votes. Votes for options that are no longer
    /// live are not counted.
    pub fn tally(survey: &Survey, votes: &[Vote]) -> Self {
        let mut counts: HashMap<OptionId, u64> = HashMap::new();
        let mut comments = Vec::new();
        for vote in votes.iter().filter(|v| !v.is_deleted) {
            if survey.live_option(vote.option_id).is_none() {
                continue;
            }
            *counts.entry(vote.option_id).or_default() += 1;
            if let Some(comment) = &vote.comment {
                comments.push(comment.clone());
            }
        }

        let options: Vec<_> = survey
            .live_options()
            .map(|option| OptionResult {
                id: option.id,
                label: option.label.clone(),
                votes: counts.get(&option.id).copied().unwrap_or(0),
            })
            .collect();
        Self {
            survey_id: survey.id,
            total_votes: options.iter().map(|o| o.votes).sum(),
            options,
            comments,
        }
    }
}
