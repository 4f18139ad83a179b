//! Data models for the AQI tracker.
//!
//! The types here mirror two external shapes:
//!
//! - the persisted [`UserProfile`] record, and
//! - the JSON object the generative backend is asked to return for the
//!   dashboard ([`DashboardData`]).
//!
//! Both use camelCase field names on the wire. Request/response envelopes for
//! the HTTP surface live next to the handlers in [`crate::api`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How strongly the user reacts to poor air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Moderate,
    High,
}

impl Sensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensitivity::Low => "low",
            Sensitivity::Moderate => "moderate",
            Sensitivity::High => "high",
        }
    }
}

/// How the user usually gets around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommuteMode {
    Car,
    Bike,
    PublicTransport,
    Walk,
}

impl CommuteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommuteMode::Car => "car",
            CommuteMode::Bike => "bike",
            CommuteMode::PublicTransport => "public_transport",
            CommuteMode::Walk => "walk",
        }
    }
}

/// The single profile that personalizes every prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub city: String,
    pub sensitivity: Sensitivity,
    pub commute_mode: CommuteMode,
    #[serde(default)]
    pub health_conditions: Vec<String>,
}

impl UserProfile {
    /// Validate and tidy a profile coming out of onboarding or the editor.
    ///
    /// Name and city are trimmed and must be non-empty. Health conditions are
    /// trimmed and blank entries dropped, keeping their order.
    pub fn normalized(mut self) -> Result<Self, String> {
        self.name = self.name.trim().to_string();
        self.city = self.city.trim().to_string();

        if self.name.is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.city.is_empty() {
            return Err("city must not be empty".to_string());
        }

        self.health_conditions = self
            .health_conditions
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        Ok(self)
    }
}

/// Current conditions as reported by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AqiSnapshot {
    pub aqi: u32,
    pub pm25: f64,
    pub pm10: f64,
    pub temp: f64,
    pub humidity: f64,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub location: String,
    /// ISO-8601 string exactly as the model produced it.
    #[serde(default)]
    pub timestamp: String,
}

impl AqiSnapshot {
    /// Parse the reported timestamp, if the model produced a valid RFC 3339 one.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.timestamp.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// One point of the forecast curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Label such as "14:00" or "Tomorrow 6 AM".
    pub time: String,
    pub aqi: u32,
}

/// Everything the dashboard shows, produced by one generation call.
///
/// Forecast and advisory order is the model's order; nothing is re-sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub current: AqiSnapshot,
    #[serde(default)]
    pub forecast: Vec<ForecastPoint>,
    #[serde(default)]
    pub health_risk: String,
    #[serde(default)]
    pub advisory: Vec<String>,
    #[serde(default)]
    pub climate_insight: String,
}

/// Who wrote a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// A single entry in the simulation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_simulating: Option<bool>,
}

impl ChatMessage {
    fn new(role: ChatRole, text: impl Into<String>, is_simulating: Option<bool>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
            is_simulating,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text, None)
    }

    /// A model reply produced by an actual simulation run.
    pub fn simulation_reply(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Model, text, Some(true))
    }

    /// A locally generated model-side message (greeting, inline error).
    pub fn local_reply(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Model, text, None)
    }
}

/// Screens the controller can be on.
///
/// `Profile` is the editor overlay; it never becomes the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppView {
    Login,
    Onboarding,
    Dashboard,
    Simulation,
    Profile,
}

/// Severity band of an AQI value (Indian/US style six-band scale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    /// 0-50
    Good,
    /// 51-100
    Moderate,
    /// 101-150
    UnhealthyForSensitive,
    /// 151-200
    Unhealthy,
    /// 201-300
    VeryUnhealthy,
    /// Above 300
    Hazardous,
}

impl AqiCategory {
    /// Classify an AQI reading.
    ///
    /// # Thresholds
    ///
    /// - `good`: aqi <= 50
    /// - `moderate`: aqi <= 100
    /// - `unhealthy_for_sensitive`: aqi <= 150
    /// - `unhealthy`: aqi <= 200
    /// - `very_unhealthy`: aqi <= 300
    /// - `hazardous`: anything above
    pub fn from_aqi(aqi: u32) -> Self {
        match aqi {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitive,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitive => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }
}
