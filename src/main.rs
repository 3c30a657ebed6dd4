use challenge_tracker::config::{AppConfig, load_environment};
use challenge_tracker::telemetry::init_tracing;
use challenge_tracker::{Error, connect, init_rocket, run_migrations};
use tracing::info;

#[rocket::main]
async fn main() -> Result<(), Error> {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    init_tracing();

    let config = AppConfig::from_env()?;
    let pool = connect(&config.database_url).await?;

    if config.auto_migrate {
        run_migrations(&pool).await?;
    } else {
        info!("AUTO_MIGRATE is off; run `challenge-admin migrate` to create the schema");
    }

    info!(address = %config.address, port = config.port, "Launching server");

    let figment = config.figment();
    init_rocket(pool, config, figment)
        .launch()
        .await
        .map_err(|e| Error::Launch(e.to_string()))?;

    Ok(())
}
