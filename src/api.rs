//! HTTP API for the AQI tracker.
//!
//! Each endpoint is a thin wrapper over one [`ViewController`] operation. The
//! controller decides what is allowed; handlers only translate outcomes into
//! status codes.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /session` - Current view, profile and in-flight flags
//! - `POST /login`, `POST /logout`
//! - `POST /onboarding` - Submit the first profile
//! - `POST /view` - Switch tab or open the profile editor
//! - `PUT /profile` - Save the edited profile
//! - `DELETE /profile/editor` - Close the profile editor
//! - `POST /credential` - Connect an API key
//! - `GET /dashboard` - Dashboard data, fetching it on first visit
//! - `POST /dashboard/refresh` - Fetch the dashboard again
//! - `GET /simulation/messages`, `POST /simulation/messages` - Simulation chat
//!
//! Health conditions and the API key never appear in logs.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::controller::{BlockReason, ControllerError, FetchOutcome, SessionSnapshot, ViewController};
use crate::model::{AppView, AqiCategory, ChatMessage, DashboardData, UserProfile};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: ViewController,
}

/// Build the router with all routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/session", get(get_session))
        .route("/login", post(post_login))
        .route("/logout", post(post_logout))
        .route("/onboarding", post(post_onboarding))
        .route("/view", post(post_view))
        .route("/profile", put(put_profile))
        .route("/profile/editor", delete(close_profile_editor))
        .route("/credential", post(post_credential))
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/refresh", post(post_dashboard_refresh))
        .route("/simulation/messages", get(get_messages).post(post_message))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// A rejected request.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn credential_missing() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "CREDENTIAL_MISSING",
            "Connect a Gemini API key to use the tracker",
        )
    }
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        match &err {
            ControllerError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string())
            }
            ControllerError::NoProfile => Self::new(StatusCode::CONFLICT, "NO_PROFILE", err.to_string()),
            ControllerError::Busy => Self::new(StatusCode::CONFLICT, "BUSY", err.to_string()),
            ControllerError::InvalidProfile(_) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_PROFILE", err.to_string())
            }
            ControllerError::EmptyMessage => {
                Self::new(StatusCode::BAD_REQUEST, "EMPTY_MESSAGE", err.to_string())
            }
            ControllerError::CredentialMissing => Self::credential_missing(),
            ControllerError::Storage(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE",
                "Profile storage is unavailable",
            ),
        }
    }
}

impl From<BlockReason> for ApiError {
    fn from(reason: BlockReason) -> Self {
        match reason {
            BlockReason::NoCredential => Self::credential_missing(),
            BlockReason::NoProfile => Self::new(StatusCode::CONFLICT, "NO_PROFILE", "no profile is loaded"),
            BlockReason::NotOnDashboard => Self::new(
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                "the dashboard is not the current view",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn rejected(action: &'static str, err: ControllerError) -> ApiError {
    warn!(action, error = %err, "Request rejected");
    ApiError::from(err)
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub view: AppView,
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub view: AppView,
}

#[derive(Debug, Serialize)]
pub struct ProfileSavedResponse {
    pub profile: Option<UserProfile>,
    pub city_changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub credential_ready: bool,
    /// Result of the dashboard entry action, re-run now that a key is present.
    pub dashboard: FetchOutcome,
}

/// Dashboard state after running the entry action or a refresh.
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub outcome: FetchOutcome,
    pub loading: bool,
    /// `null` when nothing has been fetched or the last fetch failed.
    pub data: Option<DashboardData>,
    pub category: Option<AqiCategory>,
    pub category_label: Option<&'static str>,
    /// `current.timestamp` in UTC, when the model produced a valid RFC 3339 time.
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
    pub loading: bool,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /session - Snapshot of the session.
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.controller.snapshot())
}

/// POST /login - Leave the login screen.
///
/// Responds with the new view: `dashboard` if a profile was saved earlier,
/// `onboarding` otherwise.
#[instrument(skip(state))]
pub async fn post_login(State(state): State<AppState>) -> Result<Json<ViewResponse>, ApiError> {
    let view = state.controller.login().await.map_err(|e| rejected("login", e))?;
    Ok(Json(ViewResponse { view }))
}

/// POST /logout - Forget the profile and return to the login screen.
#[instrument(skip(state))]
pub async fn post_logout(State(state): State<AppState>) -> Result<Json<ViewResponse>, ApiError> {
    state.controller.logout().await.map_err(|e| rejected("logout", e))?;
    Ok(Json(ViewResponse { view: AppView::Login }))
}

/// POST /onboarding - Submit the first profile.
///
/// # Request Body
///
/// ```json
/// {
///     "name": "Asha",
///     "city": "Delhi",
///     "sensitivity": "high",
///     "commuteMode": "bike",
///     "healthConditions": ["Asthma"]
/// }
/// ```
#[instrument(skip_all)]
pub async fn post_onboarding(
    State(state): State<AppState>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<ViewResponse>, ApiError> {
    state
        .controller
        .complete_onboarding(profile)
        .await
        .map_err(|e| rejected("onboarding", e))?;
    Ok(Json(ViewResponse { view: state.controller.view() }))
}

/// POST /view - Switch between `dashboard` and `simulation`, or open `profile`.
#[instrument(skip(state))]
pub async fn post_view(
    State(state): State<AppState>,
    Json(request): Json<ViewRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    state
        .controller
        .select_view(request.view)
        .map_err(|e| rejected("select view", e))?;
    Ok(Json(state.controller.snapshot()))
}

/// PUT /profile - Save an edited profile and close the editor.
#[instrument(skip_all)]
pub async fn put_profile(
    State(state): State<AppState>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<ProfileSavedResponse>, ApiError> {
    let city_changed = state
        .controller
        .save_profile(profile)
        .await
        .map_err(|e| rejected("save profile", e))?;

    Ok(Json(ProfileSavedResponse {
        profile: state.controller.snapshot().profile,
        city_changed,
    }))
}

/// DELETE /profile/editor - Close the editor without saving.
pub async fn close_profile_editor(State(state): State<AppState>) -> StatusCode {
    state.controller.close_profile_editor();
    StatusCode::NO_CONTENT
}

/// POST /credential - Connect an API key.
///
/// If the dashboard is open and empty, it is fetched right away.
#[instrument(skip_all)]
pub async fn post_credential(
    State(state): State<AppState>,
    Json(request): Json<CredentialRequest>,
) -> Result<Json<CredentialResponse>, ApiError> {
    if request.api_key.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "EMPTY_CREDENTIAL",
            "api_key must not be empty",
        ));
    }

    let credential_ready = state.controller.connect_credential(request.api_key);
    let dashboard = state.controller.ensure_dashboard().await;

    Ok(Json(CredentialResponse {
        credential_ready,
        dashboard,
    }))
}

/// GET /dashboard - Dashboard data, fetched on first visit and cached after.
///
/// `data` is `null` when the last fetch failed. Rendering again does not
/// retry (`outcome` is `idle`); use `POST /dashboard/refresh` to try again.
#[instrument(skip(state))]
pub async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let outcome = state.controller.ensure_dashboard().await;
    dashboard_response(&state, outcome)
}

/// POST /dashboard/refresh - Fetch the dashboard again.
#[instrument(skip(state))]
pub async fn post_dashboard_refresh(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let outcome = state.controller.refresh().await;
    dashboard_response(&state, outcome)
}

fn dashboard_response(state: &AppState, outcome: FetchOutcome) -> Result<Json<DashboardResponse>, ApiError> {
    if let FetchOutcome::Blocked(reason) = outcome {
        warn!(reason = ?reason, "Dashboard fetch blocked");
        return Err(reason.into());
    }

    let data = state.controller.dashboard();
    let category = data.as_ref().map(|d| AqiCategory::from_aqi(d.current.aqi));
    let observed_at = data.as_ref().and_then(|d| d.current.observed_at());

    info!(outcome = ?outcome, has_data = data.is_some(), "Dashboard queried");

    Ok(Json(DashboardResponse {
        outcome,
        loading: state.controller.dashboard_loading(),
        data,
        category,
        category_label: category.map(|c| c.label()),
        observed_at,
    }))
}

/// GET /simulation/messages - The simulation transcript, oldest first.
pub async fn get_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    Json(MessagesResponse {
        messages: state.controller.messages(),
        loading: state.controller.snapshot().chat_loading,
    })
}

/// POST /simulation/messages - Ask a what-if question.
///
/// # Request Body
///
/// ```json
/// { "text": "What if the temperature rises by 2°C next month?" }
/// ```
///
/// # Response
///
/// The model's reply. A failed generation still answers `200` with an
/// apology as the reply text.
#[instrument(skip_all)]
pub async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<ChatMessage>, ApiError> {
    let reply = state
        .controller
        .send_message(&request.text)
        .await
        .map_err(|e| rejected("send message", e))?;
    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generative::GeminiClient;
    use crate::generative::gemini::DEFAULT_MODEL;
    use crate::storage::ProfileStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = ProfileStore::new("sqlite::memory:").await.unwrap();
        let client = Arc::new(GeminiClient::new(DEFAULT_MODEL, None));
        router(AppState {
            controller: ViewController::new(store, client),
        })
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_from_login_conflicts() {
        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/dashboard/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ControllerError::Busy, StatusCode::CONFLICT),
            (ControllerError::EmptyMessage, StatusCode::BAD_REQUEST),
            (ControllerError::InvalidProfile("x".to_string()), StatusCode::BAD_REQUEST),
            (ControllerError::CredentialMissing, StatusCode::SERVICE_UNAVAILABLE),
            (ControllerError::Storage(anyhow::anyhow!("disk full")), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
        assert_eq!(
            ApiError::from(BlockReason::NoCredential).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
