use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{AdminUser, Permission, Role, SESSION_COOKIE, User, UserSession};
use crate::config::AppConfig;
use crate::db::{
    authenticate_user, create_challenge, create_user, create_user_session, delete_challenge,
    get_all_challenges, get_all_pathways, get_challenge, get_completed_challenges,
    invalidate_session, mark_challenge_completed, unmark_challenge_completed, update_challenge,
};
use crate::error::AppError;
use crate::models::{Challenge, ChallengePatch, NewChallenge, Pathway};
use crate::validation::{JsonBody, JsonValidateExt, USERNAME_PATTERN, parse_body};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
        }
    }
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserData,
}

#[derive(Deserialize, Validate)]
pub struct UserRegistrationRequest {
    #[validate(regex(
        path = *USERNAME_PATTERN,
        message = "Username must be 1-64 characters without spaces"
    ))]
    username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct MeResponse {
    pub username: Option<String>,
    pub role: Option<Role>,
}

// Challenges

#[get("/challenges")]
pub async fn api_get_challenges(db: &State<Pool<Sqlite>>) -> Result<Json<Vec<Challenge>>, AppError> {
    Ok(Json(get_all_challenges(db).await?))
}

#[get("/challenges/<id>")]
pub async fn api_get_challenge(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Challenge>, AppError> {
    Ok(Json(get_challenge(db, id).await?))
}

#[get("/pathways")]
pub async fn api_get_pathways(db: &State<Pool<Sqlite>>) -> Result<Json<Vec<Pathway>>, AppError> {
    Ok(Json(get_all_pathways(db).await?))
}

// Admin

#[get("/admin/challenges")]
pub async fn api_admin_get_challenges(
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Challenge>>, AppError> {
    Ok(Json(get_all_challenges(db).await?))
}

#[post("/admin/challenges", data = "<challenge>")]
pub async fn api_admin_create_challenge(
    admin: AdminUser,
    challenge: JsonBody<'_, NewChallenge>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Challenge>>, AppError> {
    let validated = challenge.validated()?;

    let created = create_challenge(db, &validated).await?;
    info!(challenge_id = created.id, admin = %admin.0.username, "Challenge created");

    Ok(Custom(Status::Created, Json(created)))
}

#[put("/admin/challenges/<id>", data = "<patch>")]
pub async fn api_admin_update_challenge(
    id: i64,
    admin: AdminUser,
    patch: JsonBody<'_, ChallengePatch>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Challenge>, AppError> {
    let patch = parse_body(patch)?;
    let updated = update_challenge(db, id, &patch).await?;
    info!(challenge_id = id, admin = %admin.0.username, "Challenge updated");

    Ok(Json(updated))
}

#[delete("/admin/challenges/<id>")]
pub async fn api_admin_delete_challenge(
    id: i64,
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    delete_challenge(db, id).await?;
    info!(challenge_id = id, admin = %admin.0.username, "Challenge deleted");

    Ok(MessageResponse::new(format!(
        "Challenge {} deleted successfully",
        id
    )))
}

// Accounts

#[post("/register", data = "<registration>")]
pub async fn api_register_user(
    registration: JsonBody<'_, UserRegistrationRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    let validated = registration.validated()?;

    create_user(db, &validated.username, &validated.password, Role::User).await?;

    Ok(MessageResponse::new("User registered successfully"))
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: JsonBody<'_, LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<LoginResponse>, AppError> {
    let validated = login.validated()?;

    let user = authenticate_user(db, &validated.username, &validated.password)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

    if let Some(previous) = cookies.get_private(SESSION_COOKIE) {
        invalidate_session(db, previous.value()).await?;
    }

    let token = UserSession::generate_token();
    let expires_at = chrono::Duration::try_hours(config.session_ttl_hours)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| {
            AppError::Internal(format!(
                "Session TTL of {} hours is out of range",
                config.session_ttl_hours
            ))
        })?;

    create_user_session(db, user.id, &token, expires_at.naive_utc()).await?;

    cookies.add_private(
        Cookie::build((SESSION_COOKIE, token))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(config.session_ttl_hours)),
    );

    info!(username = %user.username, "Login successful");

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user: UserData::from(user),
    }))
}

#[post("/logout")]
pub async fn api_logout(
    user: User,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    if let Some(cookie) = cookies.get_private(SESSION_COOKIE) {
        invalidate_session(db, cookie.value()).await?;
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));
    info!(username = %user.username, "Logged out");

    Ok(MessageResponse::new("Logged out"))
}

#[get("/me")]
pub async fn api_me(user: Option<User>) -> Result<Json<MeResponse>, Custom<Json<MeResponse>>> {
    match user {
        Some(user) => Ok(Json(MeResponse {
            username: Some(user.username),
            role: Some(user.role),
        })),
        None => Err(Custom(
            Status::Unauthorized,
            Json(MeResponse {
                username: None,
                role: None,
            }),
        )),
    }
}

// Completion tracking

#[get("/completed-challenges")]
pub async fn api_get_completed_challenges(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Challenge>>, AppError> {
    user.require_permission(Permission::TrackOwnCompletions)?;

    Ok(Json(get_completed_challenges(db, user.id).await?))
}

#[post("/completed-challenges/<id>")]
pub async fn api_mark_challenge_completed(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<MessageResponse>>, AppError> {
    user.require_permission(Permission::TrackOwnCompletions)?;

    if mark_challenge_completed(db, user.id, id).await? {
        info!(challenge_id = id, username = %user.username, "Challenge marked completed");
    }

    Ok(Custom(
        Status::Created,
        MessageResponse::new(format!("Challenge {} marked as completed", id)),
    ))
}

#[delete("/completed-challenges/<id>")]
pub async fn api_unmark_challenge_completed(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::TrackOwnCompletions)?;

    if unmark_challenge_completed(db, user.id, id).await? {
        info!(challenge_id = id, username = %user.username, "Challenge unmarked");
    }

    Ok(MessageResponse::new(format!(
        "Challenge {} unmarked as completed",
        id
    )))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
