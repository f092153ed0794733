#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
mod config;
pub mod error;
mod logging;
pub mod model;
pub mod moderation;
mod scheduled_task;
mod voting;

pub use config::{Config, ModerationConfig};
pub use logging::RequestId;
pub use voting::VotingClosers;

use config::{ConfigFairing, DatabaseFairing, ModerationFairing};
use logging::LoggerFairing;
use voting::VotingCloserFairing;

/// Build the server: routes, catchers and every fairing it needs.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(ModerationFairing)
        .attach(VotingCloserFairing)
}

/// A fresh database name, so tests never collide.
#[cfg(test)]
fn database() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Connect to the database configured for tests.
#[cfg(test)]
async fn db_client() -> mongodb::Client {
    let db_uri = rocket::Config::figment()
        .extract::<config::DbConfig>()
        .expect("`db_uri` not set")
        .db_uri;
    mongodb::Client::with_uri_str(db_uri)
        .await
        .expect("Could not connect to test database")
}

/// A test server on the given database, with the given moderator in place
/// of the external language services.
#[cfg(test)]
async fn rocket_for_db_and_moderator(
    db_client: mongodb::Client,
    db_name: &str,
    moderator: moderation::Moderator,
) -> Rocket<Build> {
    let db = db_client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();
    model::mongodb::ensure_survey_id_counter_exists(&model::mongodb::Coll::from_db(&db))
        .await
        .unwrap();

    rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(ConfigFairing)
        .manage(db_client)
        .manage(db)
        .manage(moderator)
        .manage(VotingClosers::new())
}
