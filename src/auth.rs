// ABOUTME: Account handlers for signup, password login, logout and session lookup
// ABOUTME: Passwords are stored as Argon2 PHC strings; login issues an HttpOnly session cookie

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::auth_helpers::AuthUser;
use crate::error::{AppError, Result};
use crate::types::{
    created, ok, ApiResponse, AppJson, LoginRequest, MessageResponse, SignupRequest, UserSummary,
};
use crate::validation::validate_signup;
use crate::{session, AppState};

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Internal(format!("Failed to hash password: {}", err)))
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::error!("Stored password hash is unreadable: {}", err);
            false
        }
    }
}

pub async fn signup(
    State(state): State<AppState>,
    AppJson(req): AppJson<SignupRequest>,
) -> Result<impl IntoResponse> {
    validate_signup(&req)?;

    let password_hash = hash_password(&req.password)?;
    let user = state
        .storage
        .create_user(&req.email, &req.name, &password_hash)
        .await?;

    tracing::info!("Registered user {} ({})", user.id, user.email);
    Ok(created(UserSummary::from(user)))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<UserSummary>>)> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = state
        .storage
        .find_user_by_email(&req.email)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    let session_id = state
        .sessions
        .create_session(user.id, user.email.clone(), user.name.clone());
    let cookie = session::create_session_cookie(
        session_id,
        state.config.secure_cookies,
        state.sessions.max_age_seconds(),
    );

    tracing::info!("User {} signed in", user.id);
    Ok((jar.add(cookie), ok(UserSummary::from(user))))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<ApiResponse<MessageResponse>>) {
    if let Some(cookie) = jar.get(session::SESSION_COOKIE_NAME) {
        state.sessions.remove_session(cookie.value());
    }

    let jar = jar.add(session::create_logout_cookie(state.config.secure_cookies));
    (jar, ok(MessageResponse::new("Signed out")))
}

pub async fn current_session(user: AuthUser) -> Json<ApiResponse<UserSummary>> {
    ok(UserSummary {
        id: user.user_id,
        name: user.name,
        email: user.email,
    })
}
