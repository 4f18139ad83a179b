//! View controller: the application's single owner of session state.
//!
//! All mutable state (current view, profile, cached dashboard, transcript and
//! the two in-flight flags) lives in one [`Session`] behind a mutex. It is
//! only changed through the transition methods on [`ViewController`], and the
//! lock is never held across an `.await`.
//!
//! # Views
//!
//! ```text
//! LOGIN --login(saved profile)--> DASHBOARD
//! LOGIN --login(no profile)-----> ONBOARDING --complete(profile)--> DASHBOARD
//! DASHBOARD <--select tab--> SIMULATION
//! DASHBOARD / SIMULATION --logout--> LOGIN
//! ```
//!
//! `PROFILE` is an overlay: selecting it opens the editor without leaving the
//! current view.
//!
//! # Fetching
//!
//! At most one dashboard generation and one simulation generation run at a
//! time. A second trigger while one is pending is a no-op.
//!
//! The entry action fetches at most once per arming. Entering the dashboard,
//! changing the city and connecting a key while on the dashboard arm it;
//! dispatching any fetch disarms it. There is no automatic retry:
//! [`ViewController::refresh`] is the only way to fetch again once data is
//! cached or a fetch failed.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::decoder::{self, DecodeError};
use crate::generative::{GenerationError, GenerativeClient};
use crate::model::{AppView, ChatMessage, DashboardData, UserProfile};
use crate::prompt;
use crate::storage::ProfileStore;

/// Transcript id of the locally generated greeting.
pub const WELCOME_ID: &str = "welcome";

/// Inline reply appended when a simulation request fails.
pub const SIMULATION_ERROR_REPLY: &str =
    "I encountered an error running that simulation. Please try again.";

/// Errors from controller transitions.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("cannot {action} from the {from:?} view")]
    InvalidTransition { from: AppView, action: &'static str },

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("no profile is loaded")]
    NoProfile,

    #[error("no API key is connected")]
    CredentialMissing,

    #[error("a simulation is already running")]
    Busy,

    #[error("message must not be empty")]
    EmptyMessage,

    #[error("profile storage failed: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Why a dashboard fetch was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    NotOnDashboard,
    NoProfile,
    NoCredential,
}

/// Result of a dashboard fetch trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// New data was decoded and cached.
    Updated,
    /// Another fetch is pending; this trigger did nothing.
    InFlight,
    /// Data is already cached for the current city.
    Cached,
    /// Nothing cached and no entry fetch armed; only a refresh fetches.
    Idle,
    /// Generation or decoding failed; cached data was cleared.
    Failed,
    /// The result arrived after the city changed or the user logged out.
    Discarded,
    Blocked(BlockReason),
}

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug)]
struct Session {
    view: AppView,
    profile: Option<UserProfile>,
    profile_editor_open: bool,
    dashboard: Option<DashboardData>,
    dashboard_loading: bool,
    /// The next entry action may fetch.
    dashboard_armed: bool,
    messages: Vec<ChatMessage>,
    chat_loading: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            view: AppView::Login,
            profile: None,
            profile_editor_open: false,
            dashboard: None,
            dashboard_loading: false,
            dashboard_armed: false,
            messages: Vec::new(),
            chat_loading: false,
        }
    }

    fn in_main_views(&self) -> bool {
        matches!(self.view, AppView::Dashboard | AppView::Simulation) && self.profile.is_some()
    }

    fn enter_dashboard(&mut self) {
        self.view = AppView::Dashboard;
        self.dashboard_armed = true;
    }
}

/// Read-only view of the session for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub view: AppView,
    pub profile: Option<UserProfile>,
    pub profile_editor_open: bool,
    pub credential_ready: bool,
    pub dashboard_loading: bool,
    pub has_dashboard_data: bool,
    pub chat_loading: bool,
}

/// Owner of the session and orchestrator of fetches.
#[derive(Clone)]
pub struct ViewController {
    session: Arc<Mutex<Session>>,
    store: ProfileStore,
    client: Arc<dyn GenerativeClient>,
}

impl ViewController {
    pub fn new(store: ProfileStore, client: Arc<dyn GenerativeClient>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            store,
            client,
        }
    }

    /// Resume a previous session at start-up: with a saved profile the user
    /// lands on the dashboard instead of the login screen.
    pub async fn restore(&self) -> Result<AppView, ControllerError> {
        let saved = self.store.load().await?;

        let mut s = self.session.lock();
        if s.view == AppView::Login
            && let Some(profile) = saved
        {
            info!(city = %profile.city, "Restored saved profile");
            s.profile = Some(profile);
            s.enter_dashboard();
        }
        Ok(s.view)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let s = self.session.lock();
        SessionSnapshot {
            view: s.view,
            profile: s.profile.clone(),
            profile_editor_open: s.profile_editor_open,
            credential_ready: self.client.has_credential(),
            dashboard_loading: s.dashboard_loading,
            has_dashboard_data: s.dashboard.is_some(),
            chat_loading: s.chat_loading,
        }
    }

    pub fn view(&self) -> AppView {
        self.session.lock().view
    }

    pub fn dashboard(&self) -> Option<DashboardData> {
        self.session.lock().dashboard.clone()
    }

    pub fn dashboard_loading(&self) -> bool {
        self.session.lock().dashboard_loading
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.session.lock().messages.clone()
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Leave the login screen: dashboard with a saved profile, onboarding without.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<AppView, ControllerError> {
        let from = self.view();
        if from != AppView::Login {
            return Err(ControllerError::InvalidTransition { from, action: "log in" });
        }

        let saved = self.store.load().await?;

        let mut s = self.session.lock();
        if s.view != AppView::Login {
            return Err(ControllerError::InvalidTransition { from: s.view, action: "log in" });
        }
        match saved {
            Some(profile) => {
                info!(city = %profile.city, "Logged in with saved profile");
                s.profile = Some(profile);
                s.enter_dashboard();
            }
            None => {
                info!("No saved profile, starting onboarding");
                s.view = AppView::Onboarding;
            }
        }
        Ok(s.view)
    }

    /// Finish onboarding: validate, persist and move to the dashboard.
    #[instrument(skip_all)]
    pub async fn complete_onboarding(&self, profile: UserProfile) -> Result<(), ControllerError> {
        let from = self.view();
        if from != AppView::Onboarding {
            return Err(ControllerError::InvalidTransition { from, action: "complete onboarding" });
        }

        let profile = profile.normalized().map_err(ControllerError::InvalidProfile)?;
        self.store.save(&profile).await?;

        info!(city = %profile.city, "Onboarding complete");

        let mut s = self.session.lock();
        s.profile = Some(profile);
        s.dashboard = None;
        s.enter_dashboard();
        Ok(())
    }

    /// Switch between dashboard and simulation, or open the profile editor.
    #[instrument(skip(self))]
    pub fn select_view(&self, target: AppView) -> Result<AppView, ControllerError> {
        let mut s = self.session.lock();
        if !s.in_main_views() {
            return Err(ControllerError::InvalidTransition { from: s.view, action: "switch tabs" });
        }

        match target {
            AppView::Dashboard => {
                if s.view != AppView::Dashboard {
                    s.enter_dashboard();
                }
            }
            AppView::Simulation => {
                s.view = AppView::Simulation;
                if s.messages.is_empty() {
                    let name = s.profile.as_ref().map(|p| p.name.clone()).unwrap_or_default();
                    s.messages.push(welcome_message(&name));
                }
            }
            AppView::Profile => s.profile_editor_open = true,
            AppView::Login | AppView::Onboarding => {
                return Err(ControllerError::InvalidTransition {
                    from: s.view,
                    action: "select this view",
                });
            }
        }
        Ok(s.view)
    }

    pub fn close_profile_editor(&self) {
        self.session.lock().profile_editor_open = false;
    }

    /// Save an edited profile. Returns whether the city changed, in which case
    /// cached dashboard data is dropped so the next render fetches again.
    #[instrument(skip_all)]
    pub async fn save_profile(&self, profile: UserProfile) -> Result<bool, ControllerError> {
        {
            let s = self.session.lock();
            if !s.in_main_views() {
                return Err(ControllerError::InvalidTransition { from: s.view, action: "edit the profile" });
            }
        }

        let profile = profile.normalized().map_err(ControllerError::InvalidProfile)?;
        self.store.save(&profile).await?;

        let mut s = self.session.lock();
        let city_changed = s.profile.as_ref().is_none_or(|old| old.city != profile.city);
        if city_changed {
            info!(city = %profile.city, "City changed, dropping cached dashboard");
            s.dashboard = None;
            s.dashboard_armed = true;
        }
        s.profile = Some(profile);
        s.profile_editor_open = false;
        Ok(city_changed)
    }

    /// Clear the persisted and in-memory profile, cached data and transcript.
    ///
    /// In-flight flags are left alone; a pending request still owns them.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ControllerError> {
        {
            let s = self.session.lock();
            if !matches!(s.view, AppView::Dashboard | AppView::Simulation) {
                return Err(ControllerError::InvalidTransition { from: s.view, action: "log out" });
            }
        }

        self.store.clear().await?;

        let mut s = self.session.lock();
        s.profile = None;
        s.dashboard = None;
        s.dashboard_armed = false;
        s.messages.clear();
        s.profile_editor_open = false;
        s.view = AppView::Login;
        info!("Logged out");
        Ok(())
    }

    /// Install an API key. Returns whether a usable key is now present.
    ///
    /// A usable key arms the entry fetch when the dashboard is open.
    pub fn connect_credential(&self, api_key: String) -> bool {
        self.client.connect(api_key);
        let ready = self.client.has_credential();
        if ready {
            let mut s = self.session.lock();
            if s.view == AppView::Dashboard {
                s.dashboard_armed = true;
            }
        }
        info!(ready, "API key connected");
        ready
    }

    // ========================================================================
    // Dashboard
    // ========================================================================

    /// Entry action of the dashboard: fetch only when armed and nothing is cached.
    pub async fn ensure_dashboard(&self) -> FetchOutcome {
        self.fetch_dashboard(false).await
    }

    /// User-initiated refetch; still suppressed while a fetch is pending.
    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch_dashboard(true).await
    }

    #[instrument(skip(self))]
    async fn fetch_dashboard(&self, force: bool) -> FetchOutcome {
        let profile = {
            let mut s = self.session.lock();
            if s.view != AppView::Dashboard {
                return FetchOutcome::Blocked(BlockReason::NotOnDashboard);
            }
            let Some(profile) = s.profile.clone() else {
                return FetchOutcome::Blocked(BlockReason::NoProfile);
            };
            if !self.client.has_credential() {
                return FetchOutcome::Blocked(BlockReason::NoCredential);
            }
            if s.dashboard_loading {
                return FetchOutcome::InFlight;
            }
            if !force && s.dashboard.is_some() {
                return FetchOutcome::Cached;
            }
            if !force && !s.dashboard_armed {
                return FetchOutcome::Idle;
            }
            s.dashboard_loading = true;
            s.dashboard_armed = false;
            profile
        };

        info!(city = %profile.city, "Fetching dashboard");
        let request = prompt::dashboard_request(&profile);
        let result: Result<DashboardData, FetchError> = match self.client.generate(&request).await {
            Ok(raw) => decoder::decode_dashboard(&raw).map_err(FetchError::from),
            Err(e) => Err(FetchError::from(e)),
        };

        let mut s = self.session.lock();
        s.dashboard_loading = false;

        let same_city = s.profile.as_ref().is_some_and(|p| p.city == profile.city);
        if !same_city {
            info!(city = %profile.city, "Discarding dashboard result for a stale profile");
            return FetchOutcome::Discarded;
        }

        match result {
            Ok(data) => {
                info!(
                    city = %profile.city,
                    aqi = data.current.aqi,
                    forecast_points = data.forecast.len(),
                    "Dashboard updated"
                );
                s.dashboard = Some(data);
                FetchOutcome::Updated
            }
            Err(e) => {
                warn!(city = %profile.city, error = %e, "Failed to fetch dashboard");
                s.dashboard = None;
                FetchOutcome::Failed
            }
        }
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Send a what-if query and append both sides to the transcript.
    ///
    /// Generation failures do not surface as errors; they become an inline
    /// model reply.
    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn send_message(&self, text: &str) -> Result<ChatMessage, ControllerError> {
        if text.trim().is_empty() {
            return Err(ControllerError::EmptyMessage);
        }

        let (profile, history, user_id) = {
            let mut s = self.session.lock();
            if s.view != AppView::Simulation {
                return Err(ControllerError::InvalidTransition {
                    from: s.view,
                    action: "send a simulation message",
                });
            }
            let profile = s.profile.clone().ok_or(ControllerError::NoProfile)?;
            if !self.client.has_credential() {
                return Err(ControllerError::CredentialMissing);
            }
            if s.chat_loading {
                return Err(ControllerError::Busy);
            }
            s.chat_loading = true;

            let history: Vec<ChatMessage> = s
                .messages
                .iter()
                .filter(|m| m.id != WELCOME_ID)
                .cloned()
                .collect();
            let user_message = ChatMessage::user(text);
            let user_id = user_message.id.clone();
            s.messages.push(user_message);
            (profile, history, user_id)
        };

        let request = prompt::simulation_request(&profile, text, &history);
        let reply = match self.client.generate(&request).await {
            Ok(raw) => ChatMessage::simulation_reply(decoder::simulation_reply(raw)),
            Err(e) => {
                warn!(error = %e, "Simulation request failed");
                ChatMessage::local_reply(SIMULATION_ERROR_REPLY)
            }
        };

        let mut s = self.session.lock();
        s.chat_loading = false;
        // The transcript may have been cleared by a logout in the meantime.
        if s.messages.iter().any(|m| m.id == user_id) {
            s.messages.push(reply.clone());
        }
        Ok(reply)
    }
}

fn welcome_message(name: &str) -> ChatMessage {
    let mut message = ChatMessage::local_reply(format!(
        "Hello {name}. I am your Personal AQI Tracker agent.\n\n\
         I can simulate air quality scenarios based on climate trends or give personalized advice.\n\
         Try asking: \"What if the temperature rises by 2°C next month?\" or \
         \"Is it safe to bike to work tomorrow morning?\""
    ));
    message.id = WELCOME_ID.to_string();
    message
}
