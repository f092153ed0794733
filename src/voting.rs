//! Closing voting automatically when a survey's end time passes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use mongodb::{
    bson::{doc, DateTime},
    error::Error as DbError,
    Database,
};
use rocket::futures::TryStreamExt;
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    http::Status,
    tokio::sync::Mutex,
    Build, Rocket,
};

use crate::{
    error::Error,
    model::{
        common::survey::{SurveyId, SurveyState, VotingStatus},
        db::survey::Survey,
        mongodb::{u32_id_filter, Coll},
    },
    scheduled_task::ScheduledTask,
};

/// Map from survey IDs to closer tasks.
type TaskMap = HashMap<SurveyId, ScheduledTask<Result<(), Error>>>;

/// Seconds to wait before retrying a failed closer.
const RETRY_INTERVAL_SECONDS: i64 = 300;

/// Voting closers: one scheduled task per open survey with an end time,
/// which flips the survey's voting status to closed once that time passes.
///
/// Vote acceptance checks `end_at` itself, so a late or failed closer only
/// leaves the stored status stale.
pub struct VotingClosers {
    tasks: Arc<Mutex<TaskMap>>,
}

impl VotingClosers {
    /// Create an empty set of closers.
    pub fn new() -> Self {
        Self {
            tasks: Default::default(),
        }
    }

    /// Does the given survey have a closer scheduled?
    pub async fn has_closer(&self, survey_id: SurveyId) -> bool {
        self.tasks.lock().await.contains_key(&survey_id)
    }

    /// Schedule a closer for every live, published, open survey with an end time.
    pub async fn schedule_surveys(&self, db: &Database) -> Result<(), DbError> {
        let filter = doc! {
            "is_deleted": false,
            "state": SurveyState::Published,
            "status": VotingStatus::Open,
            "end_at": { "$ne": null },
        };
        let surveys: Vec<Survey> = Coll::<Survey>::from_db(db)
            .find(filter, None)
            .await?
            .try_collect()
            .await?;
        let count = surveys.len();
        for survey in surveys {
            self.schedule_survey(Coll::from_db(db), &survey).await;
        }
        debug!("Scheduled {count} voting closers");

        Ok(())
    }

    /// Bring the closer for the given survey in line with its current state.
    /// Any existing closer is replaced. Surveys that can't be closed
    /// automatically (drafts, closed, deleted or without an end time) end up
    /// with none.
    pub async fn schedule_survey(&self, surveys: Coll<Survey>, survey: &Survey) {
        self.cancel(survey.id).await;

        let end_at = match survey.end_at {
            Some(end_at)
                if !survey.is_deleted
                    && survey.state == SurveyState::Published
                    && survey.status == VotingStatus::Open =>
            {
                end_at
            }
            _ => return,
        };

        let closer = Self::closer(survey.id, surveys, self.tasks.clone());
        let task = ScheduledTask::new(closer, end_at.to_chrono());
        self.tasks.lock().await.insert(survey.id, task);
        trace!("Closer for survey {} scheduled at {end_at}", survey.id);
    }

    /// Drop the closer for the given survey, if any.
    pub async fn cancel(&self, survey_id: SurveyId) {
        let task = self.tasks.lock().await.remove(&survey_id);
        if let Some(task) = task {
            if task.cancel().await {
                // A closer removes itself on success and replaces itself on failure.
                warn!("Closer for survey {survey_id} had already completed when cancelled");
            }
        }
    }

    /// Immediately run the closer for the given survey.
    /// Has no effect if none is scheduled.
    pub async fn close_now(&self, survey_id: SurveyId) -> Result<(), Error> {
        let task = self.tasks.lock().await.remove(&survey_id);
        // The lock is released here, as the closer needs it too.
        match task {
            Some(closer) => {
                closer.trigger_now();
                closer.await.unwrap_or_else(|_| {
                    Err(Error::Status(
                        Status::InternalServerError,
                        format!("Failed to close voting on survey {survey_id}"),
                    ))
                })
            }
            None => Ok(()),
        }
    }

    /// Close voting on the given survey if it is still open and due.
    /// Recursive on failure, hence the `BoxFuture`.
    fn closer(
        survey_id: SurveyId,
        surveys: Coll<Survey>,
        tasks: Arc<Mutex<TaskMap>>,
    ) -> BoxFuture<'static, Result<(), Error>> {
        async fn close(survey_id: SurveyId, surveys: &Coll<Survey>) -> Result<(), Error> {
            let now = DateTime::now();
            // The end time may have moved since this closer was scheduled.
            let mut filter = u32_id_filter(survey_id);
            filter.extend(doc! {
                "is_deleted": false,
                "state": SurveyState::Published,
                "status": VotingStatus::Open,
                "end_at": { "$lte": now },
            });
            let update = doc! {
                "$set": {
                    "status": VotingStatus::Closed,
                    "updated_at": now,
                }
            };
            let result = surveys.update_one(filter, update, None).await?;
            if result.modified_count > 0 {
                info!("Closed voting on survey {survey_id}");
            } else {
                debug!("Closer for survey {survey_id} had nothing to do");
            }
            Ok(())
        }

        async move {
            let result = close(survey_id, &surveys).await;
            match result {
                Ok(()) => {
                    tasks.lock().await.remove(&survey_id);
                }
                Err(ref e) => {
                    error!("Closer for survey {survey_id} failed: {e}");
                    let retry = Self::closer(survey_id, surveys, tasks.clone());
                    let retry_at = Utc::now() + Duration::seconds(RETRY_INTERVAL_SECONDS);
                    tasks
                        .lock()
                        .await
                        .insert(survey_id, ScheduledTask::new(retry, retry_at));
                    warn!("Failed closer will be retried in {RETRY_INTERVAL_SECONDS} seconds");
                }
            }
            result
        }
        .boxed()
    }
}

impl Default for VotingClosers {
    fn default() -> Self {
        Self::new()
    }
}

/// A fairing that schedules closers for all applicable surveys during
/// Rocket ignition, and places a `VotingClosers` into managed state.
/// Must be attached after the fairing that manages the database.
pub struct VotingCloserFairing;

#[rocket::async_trait]
impl Fairing for VotingCloserFairing {
    fn info(&self) -> Info {
        Info {
            name: "Voting Closers",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        info!("Scheduling voting closers...");
        let closers = VotingClosers::new();
        let db = match rocket.state::<Database>() {
            Some(db) => db,
            None => {
                error!("Database was not available when scheduling closers");
                return Err(rocket);
            }
        };
        if let Err(e) = closers.schedule_surveys(db).await {
            error!("Failed to schedule voting closers: {e}");
            return Err(rocket);
        }
        info!("...voting closers scheduled!");

        rocket = rocket.manage(closers);
        Ok(rocket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::mongodb::Id;

    fn millis_from_now(offset: i64) -> DateTime {
        DateTime::from_millis(DateTime::now().timestamp_millis() + offset)
    }

    #[backend_test]
    async fn closes_due_survey(surveys: Coll<Survey>) {
        let mut survey = Survey::published_example(1, Id::new());
        survey.end_at = Some(millis_from_now(60 * 60 * 1000));
        surveys.insert_one(&survey, None).await.unwrap();

        let closers = VotingClosers::new();
        closers.schedule_survey(surveys.clone(), &survey).await;
        assert!(closers.has_closer(1).await);

        // Not due yet, so triggering early leaves it open.
        closers.close_now(1).await.unwrap();
        assert!(!closers.has_closer(1).await);
        let stored = surveys.find_one(u32_id_filter(1), None).await.unwrap().unwrap();
        assert_eq!(stored.status, VotingStatus::Open);

        // Once due, the closer closes it.
        let update = doc! { "$set": { "end_at": millis_from_now(-1000) } };
        surveys.update_one(u32_id_filter(1), update, None).await.unwrap();
        closers.schedule_survey(surveys.clone(), &survey).await;
        closers.close_now(1).await.unwrap();
        let stored = surveys.find_one(u32_id_filter(1), None).await.unwrap().unwrap();
        assert_eq!(stored.status, VotingStatus::Closed);
    }

    #[backend_test]
    async fn unclosable_surveys_get_no_closer(surveys: Coll<Survey>) {
        let closers = VotingClosers::new();
        let owner = Id::new();

        let draft = Survey::draft_example(1, owner);
        closers.schedule_survey(surveys.clone(), &draft).await;
        assert!(!closers.has_closer(1).await);

        let mut endless = Survey::published_example(2, owner);
        endless.end_at = None;
        closers.schedule_survey(surveys.clone(), &endless).await;
        assert!(!closers.has_closer(2).await);

        // Rescheduling after closing removes an existing closer.
        let mut survey = Survey::published_example(3, owner);
        closers.schedule_survey(surveys.clone(), &survey).await;
        assert!(closers.has_closer(3).await);
        survey.status = VotingStatus::Closed;
        closers.schedule_survey(surveys.clone(), &survey).await;
        assert!(!closers.has_closer(3).await);
    }

    #[backend_test]
    async fn schedules_existing_surveys(db: Database, surveys: Coll<Survey>) {
        let owner = Id::new();
        let open = Survey::published_example(1, owner);
        let draft = Survey::draft_example(2, owner);
        let mut deleted = Survey::published_example(3, owner);
        deleted.is_deleted = true;
        let mut closed = Survey::published_example(4, owner);
        closed.status = VotingStatus::Closed;
        surveys
            .insert_many(vec![open, draft, deleted, closed], None)
            .await
            .unwrap();

        let closers = VotingClosers::new();
        closers.schedule_surveys(&db).await.unwrap();
        assert!(closers.has_closer(1).await);
        for id in 2..=4 {
            assert!(!closers.has_closer(id).await);
        }
    }
}
