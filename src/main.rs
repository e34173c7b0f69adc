#[macro_use]
extern crate rocket;

mod api;
mod db;
mod env;
mod error;
mod models;
mod schedule;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use api::{
    api_create_class, api_create_section, api_create_subject, api_create_teacher,
    api_delete_schedule, api_get_classes, api_get_schedule, api_get_sections, api_get_subjects,
    api_get_teacher_schedule, api_get_teachers, api_list_school_schedules, api_upsert_schedule,
    health, json_catcher,
};
use db::connect_pool;
use env::{AppConfig, load_environment};
use error::AppError;
use rocket::{Build, Rocket};
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;

use sqlx::{Pool, Sqlite};
use tracing::info;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{0}")]
    Launch(#[from] rocket::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let loaded_env = load_environment()?;
    init_tracing()?;
    loaded_env.log();

    let result = run().await;

    shutdown_telemetry();
    result
}

async fn run() -> Result<(), Error> {
    let config = AppConfig::load()?;
    let pool = connect_pool(&config).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed successfully");

    init_rocket(pool).await.launch().await?;

    Ok(())
}

pub async fn init_rocket(pool: Pool<Sqlite>) -> Rocket<Build> {
    info!("Starting class timetable service");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_upsert_schedule,
                api_get_schedule,
                api_get_teacher_schedule,
                api_delete_schedule,
                api_list_school_schedules,
                api_create_class,
                api_get_classes,
                api_create_section,
                api_get_sections,
                api_create_subject,
                api_get_subjects,
                api_create_teacher,
                api_get_teachers,
                health,
            ],
        )
        .register("/api", catchers![json_catcher])
        .attach(TelemetryFairing)
}
