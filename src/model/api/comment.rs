use serde::{Deserialize, Serialize};

use crate::moderation::Verdict;

/// Free text submitted for checking or rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentText {
    pub text: String,
}

/// Outcome of a moderation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl From<Verdict> for ModerationResult {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Allowed => Self {
                allowed: true,
                reason: None,
            },
            Verdict::Blocked(reason) => Self {
                allowed: false,
                reason: Some(reason.message().to_string()),
            },
        }
    }
}
