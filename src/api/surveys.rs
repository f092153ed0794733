use chrono::Utc;
use mongodb::{
    bson::{doc, DateTime, Document},
    options::FindOptions,
    Client, Database,
};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            pagination::{Paginated, Pagination},
            survey::{PublishedEdit, SurveyDescription, SurveyResults, SurveySpec, SurveySummary},
        },
        common::survey::{SurveyId, SurveyState, VotingStatus},
        db::{
            live, soft_delete,
            survey::Survey,
            tag::{Tag, TagSurvey},
            vote::Vote,
        },
        mongodb::{u32_id_filter, Coll, Counter, SURVEY_ID_COUNTER_ID},
    },
    VotingClosers,
};

use super::common::{
    owned_survey, retry_transaction, set_tags, survey_results, survey_tag_names, tag_names,
    visible_survey, voted_options,
};

pub fn routes() -> Vec<Route> {
    routes![
        list_surveys,
        my_surveys,
        get_survey,
        create_survey,
        edit_draft,
        edit_published,
        close_survey,
        reopen_survey,
        delete_survey,
        get_results,
    ]
}

/// Published surveys, newest first, optionally only those with the given tag.
#[get("/surveys?<tag>")]
pub async fn list_surveys(
    tag: Option<String>,
    pagination: Pagination,
    surveys: Coll<Survey>,
    tags: Coll<Tag>,
    links: Coll<TagSurvey>,
    db: &State<Database>,
) -> Result<Json<Paginated<SurveySummary>>> {
    let mut filter = doc! { "state": SurveyState::Published };
    filter.extend(live());

    if let Some(name) = tag.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
        let mut with_name = doc! { "name": name };
        with_name.extend(live());
        let tag_id = match tags.find_one(with_name, None).await? {
            Some(tag) => tag.id,
            None => {
                return Ok(Json(Paginated {
                    items: vec![],
                    pagination: pagination.result(0),
                }))
            }
        };
        let survey_ids: Vec<i64> = links
            .find(doc! { "tag_id": tag_id, "is_deleted": false }, None)
            .await?
            .map_ok(|link| i64::from(link.survey_id))
            .try_collect()
            .await?;
        filter.insert("_id", doc! { "$in": survey_ids });
    }

    page_of_summaries(&surveys, db, filter, pagination).await
}

/// The signed-in user's surveys, drafts included, newest first.
#[get("/surveys/mine")]
pub async fn my_surveys(
    token: AuthToken,
    pagination: Pagination,
    surveys: Coll<Survey>,
    db: &State<Database>,
) -> Result<Json<Paginated<SurveySummary>>> {
    let mut filter = doc! { "owner_id": token.id };
    filter.extend(live());
    page_of_summaries(&surveys, db, filter, pagination).await
}

async fn page_of_summaries(
    surveys: &Coll<Survey>,
    db: &Database,
    filter: mongodb::bson::Document,
    pagination: Pagination,
) -> Result<Json<Paginated<SurveySummary>>> {
    let total = surveys.count_documents(filter.clone(), None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(i64::try_from(pagination.page_size()).unwrap_or(i64::MAX))
        .build();
    let page: Vec<Survey> = surveys.find(filter, options).await?.try_collect().await?;

    let ids = page.iter().map(|survey| survey.id).collect::<Vec<_>>();
    let mut tags = tag_names(db, &ids).await?;
    let items = page
        .into_iter()
        .map(|survey| {
            let survey_tags = tags.remove(&survey.id).unwrap_or_default();
            SurveySummary::new(survey, survey_tags)
        })
        .collect();

    Ok(Json(Paginated {
        items,
        pagination: pagination.result(total),
    }))
}

#[get("/surveys/<survey_id>")]
pub async fn get_survey(
    survey_id: SurveyId,
    token: Option<AuthToken>,
    surveys: Coll<Survey>,
    db: &State<Database>,
) -> Result<Json<SurveyDescription>> {
    let survey = visible_survey(&surveys, survey_id, token.map(|t| t.id)).await?;
    let tags = survey_tag_names(db, survey_id).await?;
    Ok(Json(SurveyDescription::new(survey, tags)))
}

#[post("/surveys", data = "<spec>", format = "json")]
pub async fn create_survey(
    token: AuthToken,
    spec: Json<SurveySpec>,
    surveys: Coll<Survey>,
    counters: Coll<Counter>,
    db_client: &State<Client>,
    db: &State<Database>,
    closers: &State<VotingClosers>,
) -> Result<Json<SurveyDescription>> {
    let content = spec.0.validate(&[], None, Utc::now())?;
    let id = Counter::next_u32(&counters, SURVEY_ID_COUNTER_ID).await?;
    let now = DateTime::now();

    let survey = Survey {
        id,
        owner_id: token.id,
        title: content.title,
        description: content.description,
        start_at: (content.state == SurveyState::Published).then_some(now),
        end_at: content.end_at.map(DateTime::from_chrono),
        state: content.state,
        status: VotingStatus::Open,
        options: content.options,
        created_at: now,
        updated_at: now,
        is_deleted: false,
        deleted_at: None,
    };

    let tags = retry_transaction(|| insert_survey(db_client, db, &survey, &content.tags)).await?;
    info!("Survey {id} created as {:?}", survey.state);

    closers.schedule_survey(surveys, &survey).await;
    Ok(Json(SurveyDescription::new(survey, tags)))
}

/// Edit a draft. May also publish it.
#[put("/surveys/<survey_id>/draft", data = "<spec>", format = "json")]
pub async fn edit_draft(
    token: AuthToken,
    survey_id: SurveyId,
    spec: Json<SurveySpec>,
    surveys: Coll<Survey>,
    db_client: &State<Client>,
    db: &State<Database>,
    closers: &State<VotingClosers>,
) -> Result<Json<SurveyDescription>> {
    let mut survey = owned_survey(&surveys, survey_id, token.id).await?;
    if survey.state != SurveyState::Draft {
        return Err(Error::Status(
            Status::Conflict,
            format!("Survey {survey_id} is published; only published edits are allowed"),
        ));
    }

    let current_end = survey.end_at.map(DateTime::to_chrono);
    let content = spec.0.validate(&survey.options, current_end, Utc::now())?;
    let now = DateTime::now();
    survey.title = content.title;
    survey.description = content.description;
    survey.end_at = content.end_at.map(DateTime::from_chrono);
    survey.options = content.options;
    survey.state = content.state;
    if survey.state == SurveyState::Published {
        survey.start_at = Some(now);
    }
    survey.updated_at = now;

    let tags = retry_transaction(|| replace_survey(db_client, db, &survey, &content.tags)).await?;

    closers.schedule_survey(surveys, &survey).await;
    Ok(Json(SurveyDescription::new(survey, tags)))
}

/// Edit a published survey: end time, options and tags only.
#[put("/surveys/<survey_id>/published", data = "<edit>", format = "json")]
#[allow(clippy::too_many_arguments)]
pub async fn edit_published(
    token: AuthToken,
    survey_id: SurveyId,
    edit: Json<PublishedEdit>,
    surveys: Coll<Survey>,
    votes: Coll<Vote>,
    db_client: &State<Client>,
    db: &State<Database>,
    closers: &State<VotingClosers>,
) -> Result<Json<SurveyDescription>> {
    let mut survey = owned_survey(&surveys, survey_id, token.id).await?;
    if survey.state != SurveyState::Published {
        return Err(Error::Status(
            Status::Conflict,
            format!("Survey {survey_id} is a draft"),
        ));
    }

    let protected = voted_options(&votes, survey_id).await?;
    let changes = edit.0.validate(&survey, &protected, Utc::now())?;
    let now = DateTime::now();
    survey.end_at = changes.end_at.map(DateTime::from_chrono);
    survey.options = changes.options;
    survey.updated_at = now;

    let update = doc! {
        "$set": {
            "end_at": survey.end_at,
            "options": mongodb::bson::to_bson(&survey.options)
                .map_err(|e| Error::Status(Status::InternalServerError, e.to_string()))?,
            "updated_at": now,
        }
    };
    retry_transaction(|| {
        update_published(db_client, db, survey_id, &update, changes.tags.as_deref(), now)
    })
    .await?;
    let tags = survey_tag_names(db, survey_id).await?;

    closers.schedule_survey(surveys, &survey).await;
    Ok(Json(SurveyDescription::new(survey, tags)))
}

/// Store a new survey and its tags in one transaction.
async fn insert_survey(
    db_client: &Client,
    db: &Database,
    survey: &Survey,
    tags: &[String],
) -> Result<Vec<String>> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    Coll::<Survey>::from_db(db)
        .insert_one_with_session(survey, None, &mut session)
        .await?;
    let tags = set_tags(db, &mut session, survey.id, tags, survey.updated_at).await?;
    session.commit_transaction().await?;
    Ok(tags)
}

/// Overwrite a draft and its tags in one transaction.
async fn replace_survey(
    db_client: &Client,
    db: &Database,
    survey: &Survey,
    tags: &[String],
) -> Result<Vec<String>> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    Coll::<Survey>::from_db(db)
        .replace_one_with_session(u32_id_filter(survey.id), survey, None, &mut session)
        .await?;
    let tags = set_tags(db, &mut session, survey.id, tags, survey.updated_at).await?;
    session.commit_transaction().await?;
    Ok(tags)
}

/// Apply a published edit, and its tags if given, in one transaction.
async fn update_published(
    db_client: &Client,
    db: &Database,
    survey_id: SurveyId,
    update: &Document,
    tags: Option<&[String]>,
    now: DateTime,
) -> Result<()> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    Coll::<Survey>::from_db(db)
        .update_one_with_session(u32_id_filter(survey_id), update.clone(), None, &mut session)
        .await?;
    if let Some(tags) = tags {
        set_tags(db, &mut session, survey_id, tags, now).await?;
    }
    session.commit_transaction().await?;
    Ok(())
}

#[post("/surveys/<survey_id>/close")]
pub async fn close_survey(
    token: AuthToken,
    survey_id: SurveyId,
    surveys: Coll<Survey>,
    db: &State<Database>,
    closers: &State<VotingClosers>,
) -> Result<Json<SurveyDescription>> {
    set_voting_status(&token, survey_id, VotingStatus::Closed, &surveys, db, closers).await
}

#[post("/surveys/<survey_id>/reopen")]
pub async fn reopen_survey(
    token: AuthToken,
    survey_id: SurveyId,
    surveys: Coll<Survey>,
    db: &State<Database>,
    closers: &State<VotingClosers>,
) -> Result<Json<SurveyDescription>> {
    set_voting_status(&token, survey_id, VotingStatus::Open, &surveys, db, closers).await
}

async fn set_voting_status(
    token: &AuthToken,
    survey_id: SurveyId,
    status: VotingStatus,
    surveys: &Coll<Survey>,
    db: &Database,
    closers: &VotingClosers,
) -> Result<Json<SurveyDescription>> {
    let mut survey = owned_survey(surveys, survey_id, token.id).await?;
    if survey.state != SurveyState::Published {
        return Err(Error::Status(
            Status::Conflict,
            format!("Survey {survey_id} is a draft"),
        ));
    }
    let now = DateTime::now();
    if status == VotingStatus::Open && matches!(survey.end_at, Some(end) if end <= now) {
        return Err(Error::Status(
            Status::Conflict,
            "The end time has passed; move it later before reopening".to_string(),
        ));
    }

    survey.status = status;
    survey.updated_at = now;
    let update = doc! { "$set": { "status": status, "updated_at": now } };
    surveys
        .update_one(u32_id_filter(survey_id), update, None)
        .await?;
    info!("Voting on survey {survey_id} set to {status:?}");

    closers.schedule_survey(surveys.clone(), &survey).await;
    let tags = survey_tag_names(db, survey_id).await?;
    Ok(Json(SurveyDescription::new(survey, tags)))
}

/// Soft-delete a survey along with its votes and tag links.
#[delete("/surveys/<survey_id>")]
pub async fn delete_survey(
    token: AuthToken,
    survey_id: SurveyId,
    surveys: Coll<Survey>,
    votes: Coll<Vote>,
    links: Coll<TagSurvey>,
    db_client: &State<Client>,
    closers: &State<VotingClosers>,
) -> Result<()> {
    owned_survey(&surveys, survey_id, token.id).await?;
    let now = DateTime::now();
    let children = doc! { "survey_id": survey_id, "is_deleted": false };

    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;
    surveys
        .update_one_with_session(u32_id_filter(survey_id), soft_delete(now), None, &mut session)
        .await?;
    let deleted_votes = votes
        .update_many_with_session(children.clone(), soft_delete(now), None, &mut session)
        .await?
        .modified_count;
    links
        .update_many_with_session(children, soft_delete(now), None, &mut session)
        .await?;
    session.commit_transaction().await?;
    warn!("Survey {survey_id} deleted along with {deleted_votes} votes");

    closers.cancel(survey_id).await;
    Ok(())
}

#[get("/surveys/<survey_id>/results")]
pub async fn get_results(
    survey_id: SurveyId,
    token: Option<AuthToken>,
    surveys: Coll<Survey>,
    votes: Coll<Vote>,
) -> Result<Json<SurveyResults>> {
    let survey = visible_survey(&surveys, survey_id, token.map(|t| t.id)).await?;
    if survey.state != SurveyState::Published {
        return Err(Error::not_found(format!("Results for survey {survey_id}")));
    }
    Ok(Json(survey_results(&votes, &survey).await?))
}
