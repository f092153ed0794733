use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use rocket::tokio::{
    self,
    sync::Notify,
    task::{JoinError, JoinHandle},
    time::Duration,
};

/// A task scheduled for a specific point in the future.
/// It runs by itself at that point, unless cancelled or triggered early.
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
    trigger: Arc<Notify>,
}

impl<T> ScheduledTask<T>
where
    T: Send + 'static,
{
    /// Schedule `task` to run at `run_at`, or immediately if that has passed.
    pub fn new<Fut>(task: Fut, run_at: DateTime<Utc>) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let trigger = Arc::new(Notify::new());
        let delay = delay_until(run_at);
        let early = trigger.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = early.notified() => {}
            }
            task.await
        });

        Self { handle, trigger }
    }

    /// Cancel the task. Returns true iff it had already completed before we could cancel it.
    pub async fn cancel(self) -> bool {
        self.handle.abort();
        self.handle.await.is_ok()
    }

    /// Run the task now instead of waiting for its time.
    pub fn trigger_now(&self) {
        // `notify_one` stores a permit, so this works even before the task first polls.
        self.trigger.notify_one();
    }
}

/// Await the task's output directly.
impl<T> Future for ScheduledTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

/// Time from now until `datetime`; zero if it has passed.
fn delay_until(datetime: DateTime<Utc>) -> Duration {
    (datetime - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Duration as ChronoDuration;

    use super::*;

    #[test]
    fn past_times_have_no_delay() {
        assert_eq!(delay_until(Utc::now() - ChronoDuration::hours(1)), Duration::ZERO);
        assert!(delay_until(Utc::now() + ChronoDuration::hours(1)) > Duration::from_secs(3500));
    }

    #[rocket::async_test]
    async fn runs_when_due() {
        let task = ScheduledTask::new(async { 7 }, Utc::now());
        assert_eq!(task.await.unwrap(), 7);
    }

    #[rocket::async_test]
    async fn trigger_runs_early() {
        let task = ScheduledTask::new(async { "done" }, Utc::now() + ChronoDuration::days(1));
        task.trigger_now();
        assert_eq!(task.await.unwrap(), "done");
    }

    #[rocket::async_test]
    async fn cancel_prevents_running() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let task = ScheduledTask::new(
            async move { flag.store(true, Ordering::SeqCst) },
            Utc::now() + ChronoDuration::days(1),
        );
        assert!(!task.cancel().await);
        assert!(!ran.load(Ordering::SeqCst));
    }
}
