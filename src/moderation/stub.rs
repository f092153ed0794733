use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rocket::http::Status;

use crate::error::{Error, Result};

use super::{LanguageService, Moderator};

/// Offline [`LanguageService`] for tests.
///
/// Text containing `[flag]` is flagged by the classifier and text containing
/// `[rude]` is judged offensive. Every call is counted.
pub struct StubService {
    calls: Arc<AtomicUsize>,
    available: bool,
}

impl StubService {
    pub fn new() -> Self {
        Self {
            calls: Default::default(),
            available: true,
        }
    }

    /// A service whose every request fails.
    pub fn unavailable() -> Self {
        Self {
            calls: Default::default(),
            available: false,
        }
    }

    fn call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(())
        } else {
            Err(Error::Status(
                Status::BadGateway,
                "Language service unavailable".to_string(),
            ))
        }
    }
}

#[rocket::async_trait]
impl LanguageService for StubService {
    async fn is_flagged(&self, text: &str) -> Result<bool> {
        self.call()?;
        Ok(text.contains("[flag]"))
    }

    async fn is_offensive(&self, text: &str) -> Result<bool> {
        self.call()?;
        Ok(text.contains("[rude]"))
    }

    async fn soften(&self, text: &str) -> Result<String> {
        self.call()?;
        Ok(format!("(softened) {text}"))
    }
}

impl Moderator {
    pub fn stub() -> Self {
        Self::new(Box::new(StubService::new()), true)
    }

    /// A stub moderator plus a handle on its call counter.
    pub fn stub_with_counter(classify_with_llm: bool) -> (Self, Arc<AtomicUsize>) {
        let service = StubService::new();
        let calls = service.calls.clone();
        (Self::new(Box::new(service), classify_with_llm), calls)
    }
}
