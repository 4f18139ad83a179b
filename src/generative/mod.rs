//! Generative backend boundary.
//!
//! Everything the application knows about air quality comes out of one call
//! to a generative language model. [`GenerativeClient`] is the port the
//! controller talks to; [`gemini`] is the HTTP adapter used in production.
//!
//! The client returns raw text and does not interpret failures: there is no
//! retry, no application timeout and no streaming.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::ChatRole;

pub mod gemini;

pub use gemini::GeminiClient;

/// One turn of conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: ChatRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }
}

/// Everything needed for a single generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Persona and response rules.
    pub system_instruction: String,
    /// Conversation turns, oldest first. The last one is the current prompt.
    pub contents: Vec<Turn>,
    /// Let the backend consult live web search before answering.
    pub search_grounding: bool,
}

/// Errors from the generative backend.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("no API key is connected")]
    MissingCredential,

    #[error("request to generative backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generative backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generative backend returned an unreadable envelope: {0}")]
    Envelope(String),

    #[error("generative backend returned no text")]
    EmptyOutput,
}

/// Port for the external text generation service.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Send one request and wait for the complete response text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Whether an API credential is available.
    fn has_credential(&self) -> bool;

    /// Install (or replace) the API credential.
    fn connect(&self, api_key: String);
}
