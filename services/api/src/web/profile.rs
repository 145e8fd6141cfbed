//! services/api/src/web/profile.rs
//!
//! Profile endpoints: personal information, learning preferences, and the
//! subject list. Preference and subject values are validated at this
//! boundary before anything reaches the store.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::web::state::{AppState, SessionHandle};
use tutor_core::domain::{
    validate_subjects, DifficultyLevel, LearningPace, LearningPreferences, LearningStyle,
    UserPatch, UserProfile,
};
use tutor_core::page::{Page, PageEvent};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PreferencesDto {
    pub style: String,
    pub pace: String,
    pub difficulty: String,
}

impl PreferencesDto {
    fn from_domain(preferences: &LearningPreferences) -> Self {
        Self {
            style: preferences.style.as_str().to_string(),
            pace: preferences.pace.as_str().to_string(),
            difficulty: preferences.difficulty.as_str().to_string(),
        }
    }

    /// Boundary validation: every value must name a known option.
    fn to_domain(&self) -> Result<LearningPreferences, String> {
        Ok(LearningPreferences {
            style: LearningStyle::from_name(&self.style)
                .ok_or_else(|| format!("Unknown learning style: {}", self.style))?,
            pace: LearningPace::from_name(&self.pace)
                .ok_or_else(|| format!("Unknown learning pace: {}", self.pace))?,
            difficulty: DifficultyLevel::from_name(&self.difficulty)
                .ok_or_else(|| format!("Unknown difficulty level: {}", self.difficulty))?,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub tokens: i64,
    pub preferences: PreferencesDto,
    pub subjects: Vec<String>,
    pub page: String,
}

impl ProfileResponse {
    fn from_profile(profile: UserProfile, page: Page) -> Self {
        Self {
            username: profile.username,
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            tokens: profile.tokens,
            preferences: PreferencesDto::from_domain(&profile.preferences),
            subjects: profile.subjects,
            page: page.as_str().to_string(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubjectsRequest {
    pub subjects: Vec<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

async fn load_profile(
    state: &AppState,
    username: &str,
) -> Result<UserProfile, (StatusCode, String)> {
    state
        .store()?
        .get(username)
        .await
        .map_err(|e| {
            error!("Failed to load profile: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load profile".to_string())
        })?
        .ok_or((StatusCode::NOT_FOUND, "Username not found.".to_string()))
}

/// GET /profile - Personal information and current settings
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The profile of the logged-in user", body = ProfileResponse),
        (status = 401, description = "Not logged in"),
        (status = 503, description = "User database not configured")
    )
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut session = session.lock().await;
    let profile = load_profile(&state, &session.username).await?;

    session.page = session.page.transition(true, PageEvent::GoProfile);
    Ok(Json(ProfileResponse::from_profile(profile, session.page)))
}

/// PUT /profile/preferences - Update learning preferences
#[utoipa::path(
    put,
    path = "/profile/preferences",
    request_body = PreferencesDto,
    responses(
        (status = 200, description = "Preferences updated", body = PreferencesDto),
        (status = 422, description = "Unknown preference value"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn update_preferences_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<PreferencesDto>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let preferences = req
        .to_domain()
        .map_err(|reason| (StatusCode::UNPROCESSABLE_ENTITY, reason))?;

    let session = session.lock().await;
    let patch = UserPatch { preferences: Some(preferences), ..Default::default() };
    state
        .store()?
        .update(&session.username, &patch)
        .await
        .map_err(|e| {
            error!("Failed to update preferences: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update learning preferences.".to_string(),
            )
        })?;

    Ok(Json(PreferencesDto::from_domain(&preferences)))
}

/// PUT /profile/subjects - Replace the profile subject list (max 5)
#[utoipa::path(
    put,
    path = "/profile/subjects",
    request_body = SubjectsRequest,
    responses(
        (status = 200, description = "Subjects updated"),
        (status = 422, description = "Too many or unknown subjects; stored list unchanged"),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn update_subjects_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<SubjectsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // Rejection happens before any write, so the stored list is unchanged.
    validate_subjects(&req.subjects)
        .map_err(|reason| (StatusCode::UNPROCESSABLE_ENTITY, reason))?;

    let session = session.lock().await;
    let patch = UserPatch { subjects: Some(req.subjects.clone()), ..Default::default() };
    state
        .store()?
        .update(&session.username, &patch)
        .await
        .map_err(|e| {
            error!("Failed to update subjects: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update subjects.".to_string())
        })?;

    Ok(Json(req.subjects))
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_dto_round_trips() {
        let preferences = LearningPreferences::default();
        let dto = PreferencesDto::from_domain(&preferences);
        assert_eq!(dto.to_domain().unwrap(), preferences);
    }

    #[test]
    fn unknown_preference_values_are_rejected() {
        let dto = PreferencesDto {
            style: "Osmosis".to_string(),
            pace: "Moderate".to_string(),
            difficulty: "Beginner".to_string(),
        };
        assert!(dto.to_domain().is_err());
    }
}
