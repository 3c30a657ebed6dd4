use chrono::{NaiveDateTime, Utc};
use sqlx::{Executor, Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{DbUser, DbUserSession, Role, User, UserSession};
use crate::error::AppError;
use crate::models::{
    Challenge, ChallengePatch, DbPathway, NewChallenge, Pathway, encode_challenge_ids,
};

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

// Users

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>("SELECT id, username, role FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => User::try_from(user),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Finding user by username");
    let row =
        sqlx::query_as::<_, DbUser>("SELECT id, username, role FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    row.map(User::try_from).transpose()
}

/// Inserts a user with a bcrypt hash of `password`. A taken username surfaces
/// as `Conflict` straight from the UNIQUE constraint.
#[instrument(skip_all, fields(username = %username, role = %role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: Role,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let hashed_password = bcrypt::hash(password, HASH_COST)?;

    let mut tx = pool.begin().await?;
    let res = sqlx::query("INSERT INTO users (username, password, role) VALUES (?, ?, ?)")
        .bind(username)
        .bind(&hashed_password)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_unique_violation(e, "Username already exists"))?;
    tx.commit().await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(username = %username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    #[derive(sqlx::FromRow)]
    struct Credentials {
        id: i64,
        username: String,
        password: String,
        role: String,
    }

    let row = sqlx::query_as::<_, Credentials>(
        "SELECT id, username, password, role FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            // A malformed stored hash counts as a failed login.
            if !bcrypt::verify(password, &row.password).unwrap_or(false) {
                return Ok(None);
            }

            let user = User::try_from(DbUser {
                id: Some(row.id),
                username: Some(row.username),
                role: Some(row.role),
            })?;
            Ok(Some(user))
        }
        _ => Ok(None),
    }
}

#[instrument(skip(pool))]
pub async fn update_user_role(
    pool: &Pool<Sqlite>,
    username: &str,
    role: Role,
) -> Result<(), AppError> {
    info!("Updating user role");

    let mut tx = pool.begin().await?;
    let result = sqlx::query("UPDATE users SET role = ? WHERE username = ?")
        .bind(role.as_str())
        .bind(username)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "User {} not found",
            username
        )));
    }
    tx.commit().await?;

    Ok(())
}

// Sessions

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let mut tx = pool.begin().await?;

    let purged = clean_expired_sessions(&mut *tx).await?;
    if purged > 0 {
        info!("Cleaned up {} expired sessions", purged);
    }

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<Option<UserSession>, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(session.map(UserSession::from))
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(executor))]
pub async fn clean_expired_sessions<'e, E>(executor: E) -> Result<u64, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

// Challenges

#[instrument(skip(pool))]
pub async fn get_all_challenges(pool: &Pool<Sqlite>) -> Result<Vec<Challenge>, AppError> {
    info!("Getting all challenges");
    let rows = sqlx::query_as::<_, Challenge>("SELECT * FROM challenges ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

#[instrument(skip(pool))]
pub async fn get_challenge(pool: &Pool<Sqlite>, id: i64) -> Result<Challenge, AppError> {
    info!("Getting challenge");
    let row = sqlx::query_as::<_, Challenge>("SELECT * FROM challenges WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", id)))
}

/// Inserts a validated challenge and returns the stored row.
#[instrument(skip(pool))]
pub async fn create_challenge(
    pool: &Pool<Sqlite>,
    challenge: &NewChallenge,
) -> Result<Challenge, AppError> {
    info!("Creating challenge");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO challenges
         (title, description, difficulty, subcategory, technology, dataset_url,
          dataset_description, overview, task, outcomes, image_1, image_2, sample_sol)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(challenge.title.as_deref().unwrap_or_default())
    .bind(&challenge.description)
    .bind(challenge.difficulty.as_deref().unwrap_or_default())
    .bind(challenge.subcategory.as_deref().unwrap_or_default())
    .bind(&challenge.technology)
    .bind(&challenge.dataset_url)
    .bind(&challenge.dataset_description)
    .bind(&challenge.overview)
    .bind(&challenge.task)
    .bind(&challenge.outcomes)
    .bind(&challenge.image_1)
    .bind(&challenge.image_2)
    .bind(&challenge.sample_sol)
    .execute(&mut *tx)
    .await?;

    let created = sqlx::query_as::<_, Challenge>("SELECT * FROM challenges WHERE id = ?")
        .bind(res.last_insert_rowid())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(created)
}

#[instrument(skip(pool))]
pub async fn update_challenge(
    pool: &Pool<Sqlite>,
    id: i64,
    patch: &ChallengePatch,
) -> Result<Challenge, AppError> {
    info!("Updating challenge");
    let mut tx = pool.begin().await?;

    let mut challenge = sqlx::query_as::<_, Challenge>("SELECT * FROM challenges WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Challenge {} not found", id)))?;

    patch.apply_to(&mut challenge)?;

    sqlx::query(
        "UPDATE challenges
         SET title = ?, description = ?, difficulty = ?, subcategory = ?, technology = ?,
             dataset_url = ?, dataset_description = ?, overview = ?, task = ?, outcomes = ?,
             image_1 = ?, image_2 = ?, sample_sol = ?
         WHERE id = ?",
    )
    .bind(&challenge.title)
    .bind(&challenge.description)
    .bind(&challenge.difficulty)
    .bind(&challenge.subcategory)
    .bind(&challenge.technology)
    .bind(&challenge.dataset_url)
    .bind(&challenge.dataset_description)
    .bind(&challenge.overview)
    .bind(&challenge.task)
    .bind(&challenge.outcomes)
    .bind(&challenge.image_1)
    .bind(&challenge.image_2)
    .bind(&challenge.sample_sol)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(challenge)
}

#[instrument(skip(pool))]
pub async fn delete_challenge(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting challenge");
    let mut tx = pool.begin().await?;

    let result = sqlx::query("DELETE FROM challenges WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Challenge {} not found", id)));
    }

    tx.commit().await?;

    Ok(())
}

// Pathways

#[instrument(skip(pool))]
pub async fn get_all_pathways(pool: &Pool<Sqlite>) -> Result<Vec<Pathway>, AppError> {
    info!("Getting all pathways");
    let rows = sqlx::query_as::<_, DbPathway>(
        "SELECT id, name, challenge_ids FROM pathways ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Pathway::from).collect())
}

#[instrument(skip(pool))]
pub async fn create_pathway(
    pool: &Pool<Sqlite>,
    name: &str,
    challenge_ids: &[i64],
) -> Result<i64, AppError> {
    info!("Creating pathway");
    let res = sqlx::query("INSERT INTO pathways (name, challenge_ids) VALUES (?, ?)")
        .bind(name)
        .bind(encode_challenge_ids(challenge_ids))
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

// Completions

#[instrument(skip(pool))]
pub async fn get_completed_challenges(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<Challenge>, AppError> {
    info!("Getting completed challenges");
    let rows = sqlx::query_as::<_, Challenge>(
        "SELECT c.* FROM challenges c
         JOIN completed_challenges cc ON c.id = cc.challenge_id
         WHERE cc.user_id = ?
         ORDER BY cc.completed_at, cc.rowid",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

async fn ensure_challenge_exists<'e, E>(executor: E, challenge_id: i64) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM challenges WHERE id = ?")
        .bind(challenge_id)
        .fetch_optional(executor)
        .await?;

    match exists {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!(
            "Challenge {} not found",
            challenge_id
        ))),
    }
}

/// Records a completion. Returns `false` when the pair was already present.
#[instrument(skip(pool))]
pub async fn mark_challenge_completed(
    pool: &Pool<Sqlite>,
    user_id: i64,
    challenge_id: i64,
) -> Result<bool, AppError> {
    info!("Marking challenge completed");
    let mut tx = pool.begin().await?;

    ensure_challenge_exists(&mut *tx, challenge_id).await?;

    let result = sqlx::query(
        "INSERT OR IGNORE INTO completed_challenges (user_id, challenge_id) VALUES (?, ?)",
    )
    .bind(user_id)
    .bind(challenge_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

/// Removes a completion. Returns `false` when there was nothing to remove.
#[instrument(skip(pool))]
pub async fn unmark_challenge_completed(
    pool: &Pool<Sqlite>,
    user_id: i64,
    challenge_id: i64,
) -> Result<bool, AppError> {
    info!("Unmarking challenge completed");
    let mut tx = pool.begin().await?;

    ensure_challenge_exists(&mut *tx, challenge_id).await?;

    let result =
        sqlx::query("DELETE FROM completed_challenges WHERE user_id = ? AND challenge_id = ?")
            .bind(user_id)
            .bind(challenge_id)
            .execute(&mut *tx)
            .await?;

    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}
