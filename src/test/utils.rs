#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::db::{create_challenge, create_pathway, create_user};
    use crate::error::AppError;
    use crate::models::NewChallenge;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        challenges: Vec<NewChallenge>,
        pathways: Vec<TestPathway>,
    }

    pub struct TestUser {
        pub username: String,
        pub role: Role,
        pub password: String,
    }

    pub struct TestPathway {
        pub name: String,
        pub challenge_titles: Vec<String>,
    }

    /// A single-connection in-memory database with the schema applied.
    pub async fn test_pool() -> Result<Pool<Sqlite>, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        crate::MIGRATOR.run(&pool).await?;

        Ok(pool)
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role: Role::User,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn admin(mut self, username: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role: Role::Admin,
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn user_with_password(mut self, username: &str, role: Role, password: &str) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                role,
                password: password.to_string(),
            });
            self
        }

        pub fn challenge(self, title: &str, difficulty: &str, subcategory: &str) -> Self {
            self.challenge_with(NewChallenge::new(title, difficulty, subcategory))
        }

        pub fn challenge_with(mut self, challenge: NewChallenge) -> Self {
            self.challenges.push(challenge);
            self
        }

        pub fn pathway(mut self, name: &str, challenge_titles: &[&str]) -> Self {
            self.pathways.push(TestPathway {
                name: name.to_string(),
                challenge_titles: challenge_titles.iter().map(|t| t.to_string()).collect(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .parse_filters("debug")
                    .is_test(true)
                    .try_init();
            });

            let pool = test_pool().await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut challenge_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id = create_user(&pool, &user.username, &user.password, user.role).await?;
                user_id_map.insert(user.username.clone(), user_id);
            }

            for challenge in &self.challenges {
                let created = create_challenge(&pool, challenge).await?;
                challenge_id_map.insert(created.title.clone(), created.id);
            }

            for pathway in &self.pathways {
                let ids: Vec<i64> = pathway
                    .challenge_titles
                    .iter()
                    .filter_map(|title| challenge_id_map.get(title).copied())
                    .collect();
                create_pathway(&pool, &pathway.name, &ids).await?;
            }

            Ok(TestDb {
                pool,
                user_id_map,
                challenge_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub challenge_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn challenge_id(&self, title: &str) -> Option<i64> {
            self.challenge_id_map.get(title).copied()
        }

        pub async fn completion_count(&self, user_id: i64, challenge_id: i64) -> i64 {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM completed_challenges WHERE user_id = ? AND challenge_id = ?",
            )
            .bind(user_id)
            .bind(challenge_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count completions");

            count
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    pub use super::test_db::*;

    use crate::config::AppConfig;
    use crate::init_rocket;
    use rocket::figment::Figment;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    const TEST_SECRET_KEY: &str = "rlvbRn+O+a69MZq1A/eg1XsRINgpMbegF+pcV0x9vpw=";

    pub fn test_figment() -> Figment {
        rocket::Config::figment()
            .merge(("secret_key", TEST_SECRET_KEY))
            .merge(("log_level", "off"))
    }

    /// Two accounts and a couple of challenges; every password is `STANDARD_PASSWORD`.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin_user")
            .user("regular_user")
            .challenge("Clean a dataset", "easy", "data-wrangling")
            .challenge("Train a classifier", "hard", "machine-learning")
            .pathway("Starter", &["Train a classifier", "Clean a dataset"])
            .build()
            .await
            .expect("Failed to build test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with_config(test_db, AppConfig::default()).await
    }

    pub async fn setup_test_client_with_config(
        test_db: TestDb,
        config: AppConfig,
    ) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), config, test_figment());

        let client = Client::tracked(rocket)
            .await
            .expect("Failed to build rocket client");

        (client, test_db)
    }

    /// Logs in through the API. The tracked client keeps the session cookie.
    pub async fn login_test_user(client: &Client, username: &str, password: &str) {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": username,
                    "password": password
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(
            response.status(),
            Status::Ok,
            "Login failed for {}",
            username
        );
    }

    pub async fn logout_test_user(client: &Client) {
        let response = client.post("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }
}
