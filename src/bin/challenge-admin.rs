use anyhow::{Context, Result};
use challenge_tracker::auth::Role;
use challenge_tracker::config::{AppConfig, load_environment};
use challenge_tracker::db::{clean_expired_sessions, create_pathway, create_user, update_user_role};
use challenge_tracker::telemetry::init_tracing;
use challenge_tracker::{connect, run_migrations};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "challenge-admin",
    about = "Out-of-band administration for the challenge tracker database"
)]
struct Cli {
    /// Overrides DATABASE_URL from the environment.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending schema migrations.
    Migrate,
    /// Create an account with the admin role.
    CreateAdmin {
        username: String,
        #[arg(long, env = "ADMIN_PASSWORD")]
        password: String,
    },
    /// Change the role of an existing account.
    SetRole { username: String, role: Role },
    /// Add a pathway made of the given challenge ids, in order.
    AddPathway {
        name: String,
        #[arg(
            required = true,
            value_delimiter = ',',
            value_parser = clap::value_parser!(i64).range(1..)
        )]
        challenge_ids: Vec<i64>,
    },
    /// Delete expired sessions.
    PruneSessions,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    init_tracing();

    let cli = Cli::parse();
    let database_url = match cli.database_url {
        Some(url) => url,
        None => AppConfig::from_env()?.database_url,
    };

    let pool = connect(&database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))?;

    match cli.command {
        Command::Migrate => {
            run_migrations(&pool).await?;
            println!("Schema is up to date ✓");
        }
        Command::CreateAdmin { username, password } => {
            let id = create_user(&pool, &username, &password, Role::Admin).await?;
            println!("Created admin {} with id {}", username, id);
        }
        Command::SetRole { username, role } => {
            update_user_role(&pool, &username, role).await?;
            println!("{} is now {}", username, role);
        }
        Command::AddPathway {
            name,
            challenge_ids,
        } => {
            let id = create_pathway(&pool, &name, &challenge_ids).await?;
            println!("Created pathway {} with id {}", name, id);
        }
        Command::PruneSessions => {
            let count = clean_expired_sessions(&pool).await?;
            println!("Removed {} expired sessions", count);
        }
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_pathway_parses_ids_in_order() {
        let cli = Cli::try_parse_from(["challenge-admin", "add-pathway", "Starter", "3,1,2"])
            .expect("Valid ids should parse");

        match cli.command {
            Command::AddPathway {
                name,
                challenge_ids,
            } => {
                assert_eq!(name, "Starter");
                assert_eq!(challenge_ids, vec![3, 1, 2]);
            }
            _ => panic!("Expected add-pathway"),
        }
    }

    #[test]
    fn test_add_pathway_rejects_non_positive_ids() {
        for ids in ["0", "4,-1", "2,0,3"] {
            assert!(
                Cli::try_parse_from(["challenge-admin", "add-pathway", "Starter", ids]).is_err(),
                "ids {} should be rejected",
                ids
            );
        }

        assert!(Cli::try_parse_from(["challenge-admin", "add-pathway", "Starter"]).is_err());
    }
}
