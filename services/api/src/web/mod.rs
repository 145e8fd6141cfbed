pub mod auth;
pub mod middleware;
pub mod profile;
pub mod state;
pub mod tutor;

use utoipa::OpenApi;

pub use middleware::require_auth;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        profile::get_profile_handler,
        profile::update_preferences_handler,
        profile::update_subjects_handler,
        tutor::get_tutor_handler,
        tutor::start_session_handler,
        tutor::send_message_handler,
        tutor::change_subject_handler,
        tutor::illustration_handler,
        tutor::speech_handler,
    ),
    components(schemas(
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::RegisterResponse,
        auth::LoginResponse,
        profile::PreferencesDto,
        profile::ProfileResponse,
        profile::SubjectsRequest,
        tutor::MessageDto,
        tutor::TutorStateResponse,
        tutor::StartSessionRequest,
        tutor::SendMessageRequest,
        tutor::SendMessageResponse,
        tutor::IllustrationResponse,
        tutor::SpeechRequest,
    )),
    tags(
        (name = "AI Tutor API", description = "API endpoints for the AI tutoring platform.")
    )
)]
pub struct ApiDoc;
