use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    survey::Survey,
    tag::{NewTag, NewTagSurvey, Tag, TagSurvey},
    user::{NewUser, User},
    vote::{NewVote, Vote},
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

// User collections
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for NewUser {
    const NAME: &'static str = USERS;
}

// Survey collection; options are embedded.
const SURVEYS: &str = "surveys";
impl MongoCollection for Survey {
    const NAME: &'static str = SURVEYS;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

// Tag collections
const TAGS: &str = "tags";
impl MongoCollection for Tag {
    const NAME: &'static str = TAGS;
}
impl MongoCollection for NewTag {
    const NAME: &'static str = TAGS;
}

// Tag-survey link collections
const TAG_SURVEYS: &str = "tag_surveys";
impl MongoCollection for TagSurvey {
    const NAME: &'static str = TAG_SURVEYS;
}
impl MongoCollection for NewTagSurvey {
    const NAME: &'static str = TAG_SURVEYS;
}

// Counter collection
const COUNTERS: &str = "counters";
impl MongoCollection for Counter {
    const NAME: &'static str = COUNTERS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// Uniqueness only ever applies to live documents: soft-deleted documents are
/// excluded by a partial filter, so they never block a fresh insert.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique_live = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {"is_deleted": false})
        .build();

    // User collection: one live account per email.
    let user_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique_live.clone())
        .build();
    Coll::<User>::from_db(db)
        .create_index(user_index, None)
        .await?;

    // Survey collection: owner listings, newest first.
    let survey_index = IndexModel::builder()
        .keys(doc! {"owner_id": 1, "created_at": -1})
        .build();
    Coll::<Survey>::from_db(db)
        .create_index(survey_index, None)
        .await?;

    // Vote collection: at most one live vote per user per survey.
    let vote_index = IndexModel::builder()
        .keys(doc! {"user_id": 1, "survey_id": 1})
        .options(unique_live.clone())
        .build();
    let vote_survey_index = IndexModel::builder()
        .keys(doc! {"survey_id": 1, "option_id": 1})
        .build();
    Coll::<Vote>::from_db(db)
        .create_indexes(vec![vote_index, vote_survey_index], None)
        .await?;

    // Tag collection: one live tag per name.
    let tag_index = IndexModel::builder()
        .keys(doc! {"name": 1})
        .options(unique_live.clone())
        .build();
    Coll::<Tag>::from_db(db)
        .create_index(tag_index, None)
        .await?;

    // Tag-survey links: no duplicate live links.
    let link_index = IndexModel::builder()
        .keys(doc! {"tag_id": 1, "survey_id": 1})
        .options(unique_live)
        .build();
    let link_survey_index = IndexModel::builder()
        .keys(doc! {"survey_id": 1})
        .build();
    Coll::<TagSurvey>::from_db(db)
        .create_indexes(vec![link_index, link_survey_index], None)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use mongodb::bson::DateTime;

    use crate::model::{
        db::soft_delete,
        mongodb::{is_duplicate_key, Id},
    };

    use super::*;

    #[backend_test]
    async fn one_live_vote_per_user_and_survey(votes: Coll<NewVote>) {
        let voter = Id::new();
        votes
            .insert_one(NewVote::new(voter, 1, 1, None), None)
            .await
            .unwrap();

        let err = votes
            .insert_one(NewVote::new(voter, 1, 2, None), None)
            .await
            .unwrap_err();
        assert!(is_duplicate_key(&err));

        // Other voters and other surveys are unaffected.
        votes
            .insert_one(NewVote::new(Id::new(), 1, 1, None), None)
            .await
            .unwrap();
        votes
            .insert_one(NewVote::new(voter, 2, 1, None), None)
            .await
            .unwrap();
    }

    #[backend_test]
    async fn withdrawn_votes_leave_room_for_a_new_one(votes: Coll<NewVote>) {
        let voter = Id::new();
        let live_vote = doc! { "user_id": voter, "survey_id": 1, "is_deleted": false };

        for option_id in 1..=3 {
            votes
                .insert_one(NewVote::new(voter, 1, option_id, None), None)
                .await
                .unwrap();
            votes
                .update_one(live_vote.clone(), soft_delete(DateTime::now()), None)
                .await
                .unwrap();
        }
        votes
            .insert_one(NewVote::new(voter, 1, 1, None), None)
            .await
            .unwrap();

        let all = votes
            .count_documents(doc! { "user_id": voter }, None)
            .await
            .unwrap();
        assert_eq!(all, 4);
        let live = votes.count_documents(live_vote, None).await.unwrap();
        assert_eq!(live, 1);
    }

    #[backend_test]
    async fn one_live_account_per_email(users: Coll<NewUser>) {
        users.insert_one(NewUser::example(), None).await.unwrap();
        let err = users
            .insert_one(NewUser::example(), None)
            .await
            .unwrap_err();
        assert!(is_duplicate_key(&err));

        users
            .update_one(
                doc! { "email": &NewUser::example().email },
                soft_delete(DateTime::now()),
                None,
            )
            .await
            .unwrap();
        users.insert_one(NewUser::example(), None).await.unwrap();
    }
}
