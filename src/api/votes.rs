use mongodb::bson::{doc, DateTime};
use rocket::{http::Status, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            validation::FieldErrors,
            vote::{VoteDescription, VoteDetail, VoteSpec},
        },
        common::survey::SurveyId,
        db::{
            live, soft_delete,
            survey::Survey,
            vote::{NewVote, Vote},
        },
        mongodb::{is_duplicate_key, u32_id_filter, Coll, Id},
    },
    moderation::{Moderator, Verdict},
};

use super::common::{survey_results, visible_survey};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, my_vote, get_vote, withdraw_vote]
}

fn already_voted() -> Error {
    Error::Status(
        Status::Conflict,
        "You have already voted on this survey.".to_string(),
    )
}

/// The user's active vote on a survey, if any.
async fn active_vote(votes: &Coll<Vote>, user_id: Id, survey_id: SurveyId) -> Result<Option<Vote>> {
    let mut filter = doc! { "user_id": user_id, "survey_id": survey_id };
    filter.extend(live());
    Ok(votes.find_one(filter, None).await?)
}

/// A live vote cast by `voter`.
async fn own_vote(votes: &Coll<Vote>, vote_id: Id, voter: Id) -> Result<Vote> {
    let mut filter = vote_id.as_doc();
    filter.extend(live());
    let vote = votes
        .find_one(filter, None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Vote {vote_id}")))?;
    if vote.user_id != voter {
        return Err(Error::Status(
            Status::Forbidden,
            format!("Vote {vote_id} was cast by another user"),
        ));
    }
    Ok(vote)
}

#[post("/surveys/<survey_id>/votes", data = "<spec>", format = "json")]
#[allow(clippy::too_many_arguments)]
pub async fn cast_vote(
    token: AuthToken,
    survey_id: SurveyId,
    spec: Json<VoteSpec>,
    surveys: Coll<Survey>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
    moderator: &State<Moderator>,
) -> Result<Json<VoteDetail>> {
    let survey = visible_survey(&surveys, survey_id, Some(token.id)).await?;
    survey
        .check_accepts_votes(DateTime::now())
        .map_err(|blocked| Error::Status(Status::Conflict, blocked.message().to_string()))?;

    let VoteSpec { option_id, comment } = spec.0;
    if survey.live_option(option_id).is_none() {
        let mut errors = FieldErrors::default();
        errors.add("option_id", "Select one of the survey's options.");
        return Err(Error::Validation(errors));
    }

    if active_vote(&votes, token.id, survey_id).await?.is_some() {
        return Err(already_voted());
    }

    // Moderation calls out to external services, so do it last.
    if let Some(text) = &comment {
        if let Verdict::Blocked(reason) = moderator.check(text).await? {
            let mut errors = FieldErrors::default();
            errors.add("comment", reason.message());
            return Err(Error::Validation(errors));
        }
    }

    let vote = NewVote::new(token.id, survey_id, option_id, comment);
    // The unique index catches a concurrent second vote.
    let vote_id: Id = match new_votes.insert_one(&vote, None).await {
        Ok(result) => result
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB
            .into(),
        Err(e) if is_duplicate_key(&e) => return Err(already_voted()),
        Err(e) => return Err(e.into()),
    };
    info!("Vote {vote_id} cast on survey {survey_id}");

    let results = survey_results(&votes, &survey).await?;
    let vote = Vote { id: vote_id, vote };
    Ok(Json(VoteDetail {
        vote: VoteDescription::new(vote, &survey),
        results,
    }))
}

#[get("/surveys/<survey_id>/votes/mine")]
pub async fn my_vote(
    token: AuthToken,
    survey_id: SurveyId,
    surveys: Coll<Survey>,
    votes: Coll<Vote>,
) -> Result<Json<VoteDescription>> {
    let survey = visible_survey(&surveys, survey_id, Some(token.id)).await?;
    let vote = active_vote(&votes, token.id, survey_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Your vote on survey {survey_id}")))?;
    Ok(Json(VoteDescription::new(vote, &survey)))
}

#[get("/votes/<vote_id>")]
pub async fn get_vote(
    token: AuthToken,
    vote_id: Id,
    surveys: Coll<Survey>,
    votes: Coll<Vote>,
) -> Result<Json<VoteDetail>> {
    let vote = own_vote(&votes, vote_id, token.id).await?;
    let survey = visible_survey(&surveys, vote.survey_id, Some(token.id)).await?;
    let results = survey_results(&votes, &survey).await?;
    Ok(Json(VoteDetail {
        vote: VoteDescription::new(vote, &survey),
        results,
    }))
}

/// Withdraw a vote. Only possible while the survey is still accepting votes.
#[delete("/votes/<vote_id>")]
pub async fn withdraw_vote(
    token: AuthToken,
    vote_id: Id,
    surveys: Coll<Survey>,
    votes: Coll<Vote>,
) -> Result<()> {
    let vote = own_vote(&votes, vote_id, token.id).await?;
    let now = DateTime::now();
    let survey = surveys
        .find_one(u32_id_filter(vote.survey_id), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Survey {}", vote.survey_id)))?;
    survey
        .check_accepts_votes(now)
        .map_err(|blocked| Error::Status(Status::Conflict, blocked.message().to_string()))?;

    votes
        .update_one(vote_id.as_doc(), soft_delete(now), None)
        .await?;
    info!("Vote {vote_id} withdrawn from survey {}", vote.survey_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use rocket::{http::ContentType, local::asynchronous::Client, serde::json::serde_json::json};

    use crate::api::common::test_util::{create_survey, switch_to_second_user};
    use crate::model::{
        api::survey::{SurveyDescription, SurveySpec},
        common::survey::VotingStatus,
        db::user::NewUser,
    };

    use super::*;

    async fn vote(client: &Client, survey_id: SurveyId, spec: &VoteSpec) -> Status {
        client
            .post(uri!(cast_vote(survey_id)))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await
            .status()
    }

    async fn end_in_past(surveys: &Coll<Survey>, survey: &SurveyDescription) {
        let past = DateTime::from_millis(DateTime::now().timestamp_millis() - 1000);
        surveys
            .update_one(
                u32_id_filter(survey.id),
                doc! { "$set": { "end_at": past } },
                None,
            )
            .await
            .unwrap();
    }

    #[backend_test(user)]
    async fn cast_and_view(client: Client) {
        let survey = create_survey(&client, &SurveySpec::example()).await;

        let response = client
            .post(uri!(cast_vote(survey.id)))
            .header(ContentType::JSON)
            .body(json!(VoteSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let detail: VoteDetail = response.into_json().await.unwrap();
        assert_eq!(detail.vote.option_label.as_deref(), Some("Chashu"));
        assert_eq!(detail.vote.comment.as_deref(), Some("Thick slices please"));
        assert_eq!(detail.results.total_votes, 1);
        assert_eq!(detail.results.options[0].votes, 1);

        let response = client.get(uri!(my_vote(survey.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let mine: VoteDescription = response.into_json().await.unwrap();
        assert_eq!(mine, detail.vote);

        let response = client.get(uri!(get_vote(*detail.vote.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let fetched: VoteDetail = response.into_json().await.unwrap();
        assert_eq!(fetched, detail);
    }

    #[backend_test(user)]
    async fn one_vote_per_survey(client: Client, votes: Coll<Vote>) {
        let survey = create_survey(&client, &SurveySpec::example()).await;
        assert_eq!(Status::Ok, vote(&client, survey.id, &VoteSpec::silent(1)).await);
        assert_eq!(
            Status::Conflict,
            vote(&client, survey.id, &VoteSpec::silent(2)).await
        );
        assert_eq!(1, votes.count_documents(None, None).await.unwrap());
    }

    #[backend_test(user)]
    async fn simultaneous_votes_keep_one(client: Client, votes: Coll<Vote>) {
        let survey = create_survey(&client, &SurveySpec::example()).await;
        let first_spec = VoteSpec::silent(1);
        let second_spec = VoteSpec::silent(2);
        let (first, second) = rocket::tokio::join!(
            vote(&client, survey.id, &first_spec),
            vote(&client, survey.id, &second_spec),
        );
        let mut statuses = vec![first, second];
        statuses.sort_by_key(|status| status.code);
        assert_eq!(statuses, vec![Status::Ok, Status::Conflict]);
        assert_eq!(1, votes.count_documents(None, None).await.unwrap());
    }

    #[backend_test(user)]
    async fn revote_after_withdrawal(client: Client, votes: Coll<Vote>) {
        let survey = create_survey(&client, &SurveySpec::example()).await;
        assert_eq!(Status::Ok, vote(&client, survey.id, &VoteSpec::silent(1)).await);
        let first = votes.find_one(None, None).await.unwrap().unwrap();

        let response = client.delete(uri!(withdraw_vote(first.id))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let response = client.get(uri!(my_vote(survey.id))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        assert_eq!(Status::Ok, vote(&client, survey.id, &VoteSpec::silent(2)).await);
        let live = votes
            .count_documents(doc! { "is_deleted": false }, None)
            .await
            .unwrap();
        assert_eq!(live, 1);
        assert_eq!(2, votes.count_documents(None, None).await.unwrap());

        // The withdrawn vote is gone for good.
        let response = client.delete(uri!(withdraw_vote(first.id))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(user)]
    async fn option_must_be_live(client: Client) {
        let survey = create_survey(&client, &SurveySpec::example()).await;
        let response = client
            .post(uri!(cast_vote(survey.id)))
            .header(ContentType::JSON)
            .body(json!(VoteSpec::silent(3)).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());
        let body: rocket::serde::json::Value = response.into_json().await.unwrap();
        assert!(body["fields"]["option_id"].is_array());
    }

    #[backend_test(user)]
    async fn comments_are_moderated(client: Client, votes: Coll<Vote>) {
        let survey = create_survey(&client, &SurveySpec::example()).await;

        for comment in ["お前はバカだ", "this is awful [flag]", "quietly [rude]"] {
            let spec = VoteSpec {
                option_id: 1,
                comment: Some(comment.to_string()),
            };
            let response = client
                .post(uri!(cast_vote(survey.id)))
                .header(ContentType::JSON)
                .body(json!(spec).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::UnprocessableEntity, response.status());
            let body: rocket::serde::json::Value = response.into_json().await.unwrap();
            assert!(body["fields"]["comment"].is_array());
        }
        assert_eq!(0, votes.count_documents(None, None).await.unwrap());

        // Blank comments are stored as no comment at all.
        let spec = VoteSpec {
            option_id: 1,
            comment: Some("   ".to_string()),
        };
        assert_eq!(Status::Ok, vote(&client, survey.id, &spec).await);
        let stored = votes.find_one(None, None).await.unwrap().unwrap();
        assert_eq!(stored.comment, None);
    }

    #[backend_test(user)]
    async fn closed_surveys_reject_votes(client: Client) {
        let survey = create_survey(&client, &SurveySpec::example()).await;
        client
            .post(uri!(crate::api::surveys::close_survey(survey.id)))
            .dispatch()
            .await;
        assert_eq!(
            Status::Conflict,
            vote(&client, survey.id, &VoteSpec::silent(1)).await
        );
    }

    #[backend_test(user)]
    async fn expired_surveys_reject_votes(client: Client, surveys: Coll<Survey>) {
        let survey = create_survey(&client, &SurveySpec::example()).await;
        end_in_past(&surveys, &survey).await;

        // Still open according to its flag, but past the end time.
        let stored = surveys
            .find_one(u32_id_filter(survey.id), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, VotingStatus::Open);
        assert_eq!(
            Status::Conflict,
            vote(&client, survey.id, &VoteSpec::silent(1)).await
        );
    }

    #[backend_test(user)]
    async fn drafts_and_deleted_surveys_reject_votes(client: Client, users: Coll<NewUser>) {
        let draft = create_survey(&client, &SurveySpec::draft_example()).await;
        assert_eq!(
            Status::Conflict,
            vote(&client, draft.id, &VoteSpec::silent(1)).await
        );

        let deleted = create_survey(&client, &SurveySpec::example()).await;
        client
            .delete(uri!(crate::api::surveys::delete_survey(deleted.id)))
            .dispatch()
            .await;

        switch_to_second_user(&client, &users).await;
        assert_eq!(
            Status::NotFound,
            vote(&client, draft.id, &VoteSpec::silent(1)).await
        );
        assert_eq!(
            Status::NotFound,
            vote(&client, deleted.id, &VoteSpec::silent(1)).await
        );
    }

    #[backend_test(user)]
    async fn votes_are_private(client: Client, users: Coll<NewUser>, votes: Coll<Vote>) {
        let survey = create_survey(&client, &SurveySpec::example()).await;
        assert_eq!(Status::Ok, vote(&client, survey.id, &VoteSpec::silent(1)).await);
        let first = votes.find_one(None, None).await.unwrap().unwrap();

        switch_to_second_user(&client, &users).await;
        let response = client.get(uri!(get_vote(first.id))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
        let response = client.delete(uri!(withdraw_vote(first.id))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());

        // Other users vote independently.
        assert_eq!(Status::Ok, vote(&client, survey.id, &VoteSpec::silent(2)).await);
    }

    #[backend_test(user)]
    async fn withdrawal_needs_open_voting(client: Client, votes: Coll<Vote>) {
        let survey = create_survey(&client, &SurveySpec::example()).await;
        assert_eq!(Status::Ok, vote(&client, survey.id, &VoteSpec::silent(1)).await);
        let first = votes.find_one(None, None).await.unwrap().unwrap();

        client
            .post(uri!(crate::api::surveys::close_survey(survey.id)))
            .dispatch()
            .await;
        let response = client.delete(uri!(withdraw_vote(first.id))).dispatch().await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test]
    async fn voting_requires_login(client: Client) {
        assert_eq!(
            Status::Unauthorized,
            vote(&client, 1, &VoteSpec::silent(1)).await
        );
    }
}
