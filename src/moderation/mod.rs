//! Comment moderation.
//!
//! Text passes through three checks in order, stopping at the first that
//! objects: a local keyword list, an external moderation classifier, and
//! (optionally) a generative model asked for an `OK`/`NG` verdict.

mod keywords;
mod openai;
#[cfg(test)]
mod stub;

pub use keywords::find_blocked_keyword;
pub use openai::OpenAiClient;
#[cfg(test)]
pub use stub::StubService;

use crate::error::Result;

/// Why a piece of text was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Matched the local keyword list.
    Keyword,
    /// Flagged by the moderation classifier.
    Flagged,
    /// Judged abusive by the generative model.
    Classifier,
}

impl BlockReason {
    pub fn message(self) -> &'static str {
        match self {
            Self::Keyword => "The comment contains a word that is not allowed.",
            Self::Flagged => "The comment was flagged by content moderation.",
            Self::Classifier => "The comment may be hurtful to others.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Blocked(BlockReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        *self == Self::Allowed
    }
}

/// An external service that can judge and rewrite text.
#[rocket::async_trait]
pub trait LanguageService: Send + Sync {
    /// Does the moderation classifier flag this text?
    async fn is_flagged(&self, text: &str) -> Result<bool>;

    /// Does the generative model consider this text abusive?
    async fn is_offensive(&self, text: &str) -> Result<bool>;

    /// Rewrite this text in a gentler tone.
    async fn soften(&self, text: &str) -> Result<String>;
}

/// The moderation pipeline. Lives in managed state.
pub struct Moderator {
    service: Box<dyn LanguageService>,
    classify_with_llm: bool,
}

impl Moderator {
    pub fn new(service: Box<dyn LanguageService>, classify_with_llm: bool) -> Self {
        Self {
            service,
            classify_with_llm,
        }
    }

    /// Run the full pipeline over `text`.
    /// Blank text is always allowed and never leaves the process.
    pub async fn check(&self, text: &str) -> Result<Verdict> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Verdict::Allowed);
        }

        if let Some(keyword) = find_blocked_keyword(text) {
            debug!("Comment blocked by keyword {keyword:?}");
            return Ok(Verdict::Blocked(BlockReason::Keyword));
        }

        if self.service.is_flagged(text).await? {
            debug!("Comment flagged by moderation classifier");
            return Ok(Verdict::Blocked(BlockReason::Flagged));
        }

        if self.classify_with_llm && self.service.is_offensive(text).await? {
            debug!("Comment rejected by generative classifier");
            return Ok(Verdict::Blocked(BlockReason::Classifier));
        }

        Ok(Verdict::Allowed)
    }

    /// Rewrite `text` in a softer tone. Blank text comes back empty.
    pub async fn soften(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(String::new());
        }
        self.service.soften(text).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use rocket::http::Status;

    use super::*;

    #[rocket::async_test]
    async fn blank_text_skips_every_check() {
        let (moderator, calls) = Moderator::stub_with_counter(true);
        assert_eq!(moderator.check("").await.unwrap(), Verdict::Allowed);
        assert_eq!(moderator.check("  \n\t").await.unwrap(), Verdict::Allowed);
        assert_eq!(moderator.soften(" ").await.unwrap(), "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[rocket::async_test]
    async fn keyword_hit_short_circuits() {
        let (moderator, calls) = Moderator::stub_with_counter(true);
        let verdict = moderator.check("お前はバカだ [flag]").await.unwrap();
        assert_eq!(verdict, Verdict::Blocked(BlockReason::Keyword));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[rocket::async_test]
    async fn external_checks_run_in_order() {
        // Exercises the debug logging on each verdict.
        log4rs_test_utils::test_logging::init_logging_once_for(["survey_backend"], None, None);

        let (moderator, calls) = Moderator::stub_with_counter(true);
        assert_eq!(
            moderator.check("terrible [flag] [rude]").await.unwrap(),
            Verdict::Blocked(BlockReason::Flagged)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            moderator.check("quietly [rude]").await.unwrap(),
            Verdict::Blocked(BlockReason::Classifier)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert_eq!(
            moderator.check("I think there is room for improvement").await.unwrap(),
            Verdict::Allowed
        );
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[rocket::async_test]
    async fn generative_check_can_be_disabled() {
        let (moderator, calls) = Moderator::stub_with_counter(false);
        assert!(moderator.check("quietly [rude]").await.unwrap().is_allowed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[rocket::async_test]
    async fn service_failures_propagate() {
        let moderator = Moderator::new(Box::new(StubService::unavailable()), true);
        let err = moderator.check("hello").await.unwrap_err();
        assert_eq!(err.status(), Status::BadGateway);
        let err = moderator.soften("hello").await.unwrap_err();
        assert_eq!(err.status(), Status::BadGateway);
    }

    #[rocket::async_test]
    async fn soften_rewrites() {
        let moderator = Moderator::stub();
        assert_eq!(
            moderator.soften(" 遅すぎる ").await.unwrap(),
            "(softened) 遅すぎる"
        );
    }
}
