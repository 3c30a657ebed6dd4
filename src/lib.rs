#[macro_use]
extern crate rocket;

pub mod api;
pub mod auth;
pub mod config;
pub mod cors;
pub mod db;
pub mod error;
pub mod models;
pub mod telemetry;
pub mod validation;
#[cfg(test)]
mod test;

use api::{
    api_admin_create_challenge, api_admin_delete_challenge, api_admin_get_challenges,
    api_admin_update_challenge, api_get_challenge, api_get_challenges,
    api_get_completed_challenges, api_get_pathways, api_login, api_logout,
    api_mark_challenge_completed, api_me, api_register_user, api_unmark_challenge_completed,
    health,
};
use auth::{
    bad_request_api, forbidden_api, internal_error_api, not_found_api, unauthorized_api,
    unprocessable_api,
};
use config::AppConfig;
use cors::{CorsFairing, preflight};
use error::AppError;
use rocket::figment::Figment;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use telemetry::TelemetryFairing;
use thiserror::Error;
use tracing::info;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("Launch error: {0}")]
    Launch(String),
}

/// Opens the pool with foreign keys enforced, creating the database file if needed.
pub async fn connect(database_url: &str) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    Ok(SqlitePoolOptions::new().connect_with(options).await?)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    info!("Running database migrations...");
    MIGRATOR.run(pool).await?;
    info!("Migrations completed successfully");
    Ok(())
}

pub fn init_rocket(pool: SqlitePool, config: AppConfig, figment: Figment) -> Rocket<Build> {
    info!("Starting challenge tracker");

    let cors = CorsFairing::new(&config.cors_origin);

    rocket::custom(figment)
        .manage(pool)
        .manage(config)
        .mount(
            "/api",
            routes![
                api_get_challenges,
                api_get_challenge,
                api_get_pathways,
                api_admin_get_challenges,
                api_admin_create_challenge,
                api_admin_update_challenge,
                api_admin_delete_challenge,
                api_register_user,
                api_login,
                api_logout,
                api_me,
                api_get_completed_challenges,
                api_mark_challenge_completed,
                api_unmark_challenge_completed,
                health,
                preflight,
            ],
        )
        .register(
            "/",
            catchers![
                bad_request_api,
                unauthorized_api,
                forbidden_api,
                not_found_api,
                unprocessable_api,
                internal_error_api,
            ],
        )
        .attach(TelemetryFairing)
        .attach(cors)
}
