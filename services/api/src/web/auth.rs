//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user registration, login, and logout, plus
//! the password hash/verify routines they are built on.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::web::middleware::session_id_from_headers;
use crate::web::state::{AppState, SessionState};
use tutor_core::domain::UserProfile;
use tutor_core::page::{Page, PageEvent};
use tutor_core::ports::PortError;

//=========================================================================================
// Credential Service
//=========================================================================================

/// Salts and hashes a password. The salt is random, so two hashes of the
/// same password differ.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Verifies a password against a stored hash. Failure is binary; there are
/// no retries.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub username: String,
    /// Render instruction for the client.
    pub page: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub username: String,
    pub tokens: i64,
    pub page: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new student account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created successfully", body = RegisterResponse),
        (status = 400, description = "Invalid form input"),
        (status = 409, description = "Username already exists"),
        (status = 503, description = "User database not configured"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let store = state.store()?;

    // 1. Validate the form
    if req.username.is_empty()
        || req.password.is_empty()
        || req.first_name.is_empty()
        || req.last_name.is_empty()
        || req.email.is_empty()
    {
        return Err((StatusCode::BAD_REQUEST, "All fields are required.".to_string()));
    }
    if req.password != req.confirm_password {
        return Err((StatusCode::BAD_REQUEST, "Passwords do not match.".to_string()));
    }

    // 2. Hash the password
    let password_hash = hash_password(&req.password).map_err(|e| {
        error!("Failed to hash password: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
    })?;

    // 3. Create the user document (duplicates never touch the stored record)
    let profile = UserProfile::new_registration(
        req.username.clone(),
        req.first_name,
        req.last_name,
        req.email,
        password_hash,
    );
    store.create(&profile).await.map_err(|e| match e {
        PortError::AlreadyExists(_) => (
            StatusCode::CONFLICT,
            "Username already exists. Please choose a different one.".to_string(),
        ),
        e => {
            error!("Failed to create user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user".to_string())
        }
    })?;

    // 4. Send the client back to the login page
    let response = RegisterResponse {
        username: profile.username,
        page: Page::Register
            .transition(false, PageEvent::RegisterSucceeded)
            .as_str()
            .to_string(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "User database not configured")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let store = state.store()?;

    // 1. Fetch the user document
    let profile = store
        .get(&req.username)
        .await
        .map_err(|e| {
            error!("Failed to get user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load user".to_string())
        })?
        .ok_or((StatusCode::UNAUTHORIZED, "Username not found.".to_string()))?;

    // 2. Verify the password
    if !verify_password(&req.password, &profile.password_hash) {
        return Err((StatusCode::UNAUTHORIZED, "Incorrect password.".to_string()));
    }

    // 3. Create the in-memory session, mirroring the stored transcript
    let session_id = state
        .create_session(SessionState::new(
            profile.username.clone(),
            profile.chat_history.clone(),
        ))
        .await;

    // 4. Session cookie without Max-Age: lives exactly as long as the
    //    browser session.
    let cookie = format!("session={}; HttpOnly; SameSite=Lax; Path=/", session_id);

    let response = LoginResponse {
        username: profile.username,
        tokens: profile.tokens,
        page: Page::Login
            .transition(true, PageEvent::LoginSucceeded)
            .as_str()
            .to_string(),
    };

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and drop the session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Extract the session id from the cookie
    let session_id = session_id_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?
        .to_string();

    // 2. Drop the in-memory session
    if !state.remove_session(&session_id).await {
        return Err((StatusCode::UNAUTHORIZED, "No session found".to_string()));
    }

    // 3. Clear the cookie
    let cookie = "session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0";

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_the_original_password() {
        let hash = hash_password("pw1").unwrap();
        assert!(verify_password("pw1", &hash));
    }

    #[test]
    fn verify_rejects_any_other_password() {
        let hash = hash_password("pw1").unwrap();
        assert!(!verify_password("pw2", &hash));
        assert!(!verify_password("", &hash));
    }

    #[test]
    fn hashing_is_salted_and_non_deterministic() {
        let a = hash_password("pw1").unwrap();
        let b = hash_password("pw1").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("pw1", &a));
        assert!(verify_password("pw1", &b));
    }

    #[test]
    fn garbage_stored_hash_never_verifies() {
        assert!(!verify_password("pw1", "not-a-phc-string"));
    }
}
