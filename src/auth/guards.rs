use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;
use tracing::Instrument;

use crate::db::{get_session_by_token, get_user};
use crate::error::{AppError, ErrorResponse};

use super::{Permission, User};

pub const SESSION_COOKIE: &str = "session_token";

/// Outcome of resolving the session cookie, cached per request so stacked
/// guards only hit the database once.
#[derive(Clone)]
enum SessionState {
    Anonymous,
    Authenticated(User),
    Failed,
}

async fn resolve_session(request: &Request<'_>) -> SessionState {
    let token = match request.cookies().get_private(SESSION_COOKIE) {
        Some(cookie) => cookie.value().to_string(),
        None => return SessionState::Anonymous,
    };

    let db = match request.rocket().state::<SqlitePool>() {
        Some(pool) => pool,
        _ => {
            tracing::error!("Database pool not found in managed state");
            return SessionState::Failed;
        }
    };

    let session = match get_session_by_token(db, &token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::warn!("Unknown session token");
            return SessionState::Anonymous;
        }
        Err(err) => {
            err.log_and_record("session lookup");
            return SessionState::Failed;
        }
    };

    if !session.is_valid() {
        tracing::warn!(user_id = %session.user_id, "Session token expired");
        return SessionState::Anonymous;
    }

    match get_user(db, session.user_id).await {
        Ok(user) => {
            tracing::info!(username = %user.username, role = %user.role.as_str(), "User authenticated via session token");
            SessionState::Authenticated(user)
        }
        Err(AppError::NotFound(_)) => SessionState::Anonymous,
        Err(err) => {
            err.log_and_record("session user lookup");
            SessionState::Failed
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let state = request
            .local_cache_async(
                resolve_session(request).instrument(tracing::info_span!("user_auth_guard")),
            )
            .await;

        match state {
            SessionState::Authenticated(user) => Outcome::Success(user.clone()),
            SessionState::Anonymous => Outcome::Error((Status::Unauthorized, ())),
            SessionState::Failed => Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

/// A session user holding `ManageChallenges`. Rejects with 401 when there is
/// no session and 403 when the role falls short.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let user = match request.guard::<User>().await {
            Outcome::Success(user) => user,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(status) => return Outcome::Forward(status),
        };

        match user.require_permission(Permission::ManageChallenges) {
            Ok(()) => Outcome::Success(AdminUser(user)),
            Err(_) => Outcome::Error((Status::Forbidden, ())),
        }
    }
}

fn json_error(status: Status, message: &str) -> Custom<Json<ErrorResponse>> {
    Custom(status, Json(ErrorResponse::new(message)))
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    json_error(Status::BadRequest, "Malformed request")
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    tracing::warn!("Unauthorized access attempt");
    json_error(Status::Unauthorized, "Authentication required")
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    tracing::warn!("Forbidden access attempt");
    json_error(Status::Forbidden, "Admin privileges required")
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    json_error(Status::NotFound, "Resource not found")
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    json_error(Status::UnprocessableEntity, "Malformed request body")
}

#[catch(500)]
pub fn internal_error_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    json_error(Status::InternalServerError, "Internal server error")
}
