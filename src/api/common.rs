use std::collections::{HashMap, HashSet};
use std::{future::Future, time::Duration};

use mongodb::{
    bson::{doc, DateTime},
    options::FindOptions,
    ClientSession, Database,
};
use rocket::{futures::TryStreamExt, http::Status, tokio::time::sleep};

use crate::error::{Error, Result};
use crate::model::{
    api::{auth::AuthToken, survey::SurveyResults},
    common::survey::{OptionId, SurveyId},
    db::{
        live, soft_delete,
        survey::Survey,
        tag::{NewTag, NewTagSurvey, Tag, TagSurvey},
        user::User,
        vote::Vote,
    },
    mongodb::{is_transaction_race, u32_id_filter, Coll, Id},
};

/// The signed-in user's account.
pub async fn current_user(token: &AuthToken, users: &Coll<User>) -> Result<User> {
    let mut filter = token.id.as_doc();
    filter.extend(live());
    users
        .find_one(filter, None)
        .await?
        .ok_or_else(|| Error::Status(Status::Unauthorized, "Account no longer exists".to_string()))
}

/// A survey that `viewer` may see. Anything else is reported as missing.
pub async fn visible_survey(
    surveys: &Coll<Survey>,
    survey_id: SurveyId,
    viewer: Option<Id>,
) -> Result<Survey> {
    surveys
        .find_one(u32_id_filter(survey_id), None)
        .await?
        .filter(|survey| survey.is_visible_to(viewer))
        .ok_or_else(|| Error::not_found(format!("Survey {survey_id}")))
}

/// A live survey belonging to `owner`.
pub async fn owned_survey(surveys: &Coll<Survey>, survey_id: SurveyId, owner: Id) -> Result<Survey> {
    let survey = visible_survey(surveys, survey_id, Some(owner)).await?;
    if !survey.is_owned_by(owner) {
        return Err(Error::Status(
            Status::Forbidden,
            format!("Survey {survey_id} belongs to another user"),
        ));
    }
    Ok(survey)
}

/// Active votes on a survey, oldest first.
pub async fn live_votes(votes: &Coll<Vote>, survey_id: SurveyId) -> Result<Vec<Vote>> {
    let filter = doc! { "survey_id": survey_id, "is_deleted": false };
    let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
    Ok(votes.find(filter, options).await?.try_collect().await?)
}

/// Current results of a survey.
pub async fn survey_results(votes: &Coll<Vote>, survey: &Survey) -> Result<SurveyResults> {
    let votes = live_votes(votes, survey.id).await?;
    Ok(SurveyResults::tally(survey, &votes))
}

/// Options of a survey that have active votes.
pub async fn voted_options(votes: &Coll<Vote>, survey_id: SurveyId) -> Result<HashSet<OptionId>> {
    Ok(live_votes(votes, survey_id)
        .await?
        .into_iter()
        .map(|vote| vote.option_id)
        .collect())
}

/// Live tag names for each of the given surveys, alphabetical.
pub async fn tag_names(db: &Database, survey_ids: &[SurveyId]) -> Result<HashMap<SurveyId, Vec<String>>> {
    let ids = survey_ids.iter().map(|id| i64::from(*id)).collect::<Vec<_>>();
    let links: Vec<TagSurvey> = Coll::<TagSurvey>::from_db(db)
        .find(
            doc! { "survey_id": { "$in": ids }, "is_deleted": false },
            None,
        )
        .await?
        .try_collect()
        .await?;
    let tag_ids = links.iter().map(|link| link.tag_id).collect::<HashSet<_>>();
    let tags: Vec<Tag> = Coll::<Tag>::from_db(db)
        .find(
            doc! { "_id": { "$in": tag_ids.into_iter().collect::<Vec<_>>() }, "is_deleted": false },
            None,
        )
        .await?
        .try_collect()
        .await?;
    let names = tags
        .into_iter()
        .map(|tag| (tag.id, tag.tag.name))
        .collect::<HashMap<_, _>>();

    let mut result: HashMap<SurveyId, Vec<String>> = HashMap::new();
    for link in links {
        if let Some(name) = names.get(&link.tag_id) {
            result.entry(link.survey_id).or_default().push(name.clone());
        }
    }
    for names in result.values_mut() {
        names.sort();
    }
    Ok(result)
}

/// Live tag names for a single survey, alphabetical.
pub async fn survey_tag_names(db: &Database, survey_id: SurveyId) -> Result<Vec<String>> {
    Ok(tag_names(db, &[survey_id])
        .await?
        .remove(&survey_id)
        .unwrap_or_default())
}

/// Make the survey's live tags exactly `names`, creating missing tags and
/// soft-deleting links that are no longer wanted. Returns the names, sorted.
pub async fn set_tags(
    db: &Database,
    session: &mut ClientSession,
    survey_id: SurveyId,
    names: &[String],
    now: DateTime,
) -> Result<Vec<String>> {
    let tags = Coll::<Tag>::from_db(db);
    let new_tags = Coll::<NewTag>::from_db(db);
    let links = Coll::<TagSurvey>::from_db(db);
    let new_links = Coll::<NewTagSurvey>::from_db(db);

    // Resolve every name to a live tag.
    let mut wanted = HashSet::new();
    for name in names {
        let filter = doc! { "name": name, "is_deleted": false };
        let tag_id = match tags.find_one_with_session(filter, None, session).await? {
            Some(tag) => tag.id,
            None => new_tags
                .insert_one_with_session(NewTag::new(name.clone()), None, session)
                .await?
                .inserted_id
                .as_object_id()
                .ok_or_else(|| {
                    Error::Status(
                        Status::InternalServerError,
                        "Tag inserted without an object ID".to_string(),
                    )
                })?
                .into(),
        };
        wanted.insert(tag_id);
    }

    // Compare with the links already in place.
    let mut cursor = links
        .find_with_session(
            doc! { "survey_id": survey_id, "is_deleted": false },
            None,
            session,
        )
        .await?;
    let existing: Vec<TagSurvey> = cursor.stream(session).try_collect().await?;
    let linked = existing.iter().map(|link| link.tag_id).collect::<HashSet<_>>();

    let stale = existing
        .iter()
        .filter(|link| !wanted.contains(&link.tag_id))
        .map(|link| link.id)
        .collect::<Vec<_>>();
    if !stale.is_empty() {
        links
            .update_many_with_session(doc! { "_id": { "$in": stale } }, soft_delete(now), None, session)
            .await?;
    }

    let fresh = wanted
        .difference(&linked)
        .map(|tag_id| NewTagSurvey::new(*tag_id, survey_id))
        .collect::<Vec<_>>();
    if !fresh.is_empty() {
        new_links
            .insert_many_with_session(fresh, None, session)
            .await?;
    }

    let mut sorted = names.to_vec();
    sorted.sort();
    Ok(sorted)
}

/// Times a tag-writing transaction is attempted before giving up.
const TRANSACTION_ATTEMPTS: u32 = 5;

/// Run `transaction` again while it loses races with concurrent writes, such
/// as two requests creating the same new tag at once. Each attempt must start
/// its own session.
pub async fn retry_transaction<T, F, Fut>(mut transaction: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match transaction().await {
            Err(Error::Db(err)) if is_transaction_race(&err) => {
                if attempt >= TRANSACTION_ATTEMPTS {
                    warn!("Transaction still conflicting after {attempt} attempts: {err}");
                    return Err(Error::Status(
                        Status::Conflict,
                        "Conflicting change in progress, please try again".to_string(),
                    ));
                }
                debug!("Transaction conflicted on attempt {attempt}, retrying: {err}");
                sleep(Duration::from_millis(20 * u64::from(attempt))).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
pub mod test_util {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::{
        api::{
            auth::LoginRequest,
            survey::{SurveyDescription, SurveySpec},
        },
        db::user::NewUser,
        mongodb::Coll,
    };

    /// Create a survey through the API as the signed-in user.
    pub async fn create_survey(client: &Client, spec: &SurveySpec) -> SurveyDescription {
        let response = client
            .post(uri!(crate::api::surveys::create_survey))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    /// Sign the client in as a second user, creating the account.
    pub async fn switch_to_second_user(client: &Client, users: &Coll<NewUser>) {
        users.insert_one(NewUser::example2(), None).await.unwrap();
        let response = client
            .post(uri!(crate::api::auth::login))
            .header(ContentType::JSON)
            .body(json!(LoginRequest::example2()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }
}
