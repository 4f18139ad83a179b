//! Gemini `generateContent` client.
//!
//! Sends the persona as `systemInstruction`, the conversation as `contents`
//! and, when grounding is requested, enables the `google_search` tool.
//!
//! # API Reference
//!
//! See: <https://ai.google.dev/api/generate-content>

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{GenerationError, GenerationRequest, GenerativeClient};
use crate::model::ChatRole;

/// Base URL for the Gemini REST API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Client for the Gemini generative language API.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Arc<RwLock<Option<String>>>,
}

impl GeminiClient {
    /// Create a client for the public endpoint.
    pub fn new(model: &str, api_key: Option<String>) -> Self {
        Self::with_base_url(GEMINI_API_BASE, model, api_key)
    }

    /// Create a client with a custom base URL (for testing).
    pub fn with_base_url(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: Arc::new(RwLock::new(api_key)),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    #[instrument(skip_all, fields(model = %self.model, turns = request.contents.len()))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .read()
            .clone()
            .ok_or(GenerationError::MissingCredential)?;

        let body = GenerateContentBody::from(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| GenerationError::Envelope(e.to_string()))?;

        let output = parsed.output_text();
        debug!(bytes = output.len(), "Generation completed");

        if output.trim().is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        Ok(output)
    }

    fn has_credential(&self) -> bool {
        self.api_key.read().is_some()
    }

    fn connect(&self, api_key: String) {
        let api_key = api_key.trim().to_string();
        if !api_key.is_empty() {
            *self.api_key.write() = Some(api_key);
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

impl From<&GenerationRequest> for GenerateContentBody {
    fn from(request: &GenerationRequest) -> Self {
        let contents = request
            .contents
            .iter()
            .map(|turn| GeminiContent {
                role: Some(match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Model => "model",
                }),
                parts: vec![GeminiPart {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        let tools = if request.search_grounding {
            vec![GeminiTool {
                google_search: GoogleSearch {},
            }]
        } else {
            vec![]
        };

        Self {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: request.system_instruction.clone(),
                }],
            },
            contents,
            tools,
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiTool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn output_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generative::Turn;
    use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, http::Uri};
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    #[derive(Debug, Clone)]
    struct Recorded {
        path: String,
        api_key: Option<String>,
        body: Value,
    }

    #[derive(Clone)]
    struct Backend {
        status: StatusCode,
        reply: Value,
        seen: Arc<Mutex<Vec<Recorded>>>,
    }

    async fn handle(
        State(backend): State<Backend>,
        uri: Uri,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        backend.seen.lock().push(Recorded {
            path: uri.path().to_string(),
            api_key: headers
                .get("x-goog-api-key")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });
        (backend.status, Json(backend.reply.clone()))
    }

    async fn spawn_backend(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<Recorded>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let backend = Backend {
            status,
            reply,
            seen: seen.clone(),
        };
        let app = Router::new().fallback(handle).with_state(backend);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{addr}/v1beta"), seen)
    }

    fn request(grounding: bool) -> GenerationRequest {
        GenerationRequest {
            system_instruction: "You are an AQI assistant.".to_string(),
            contents: vec![
                Turn::user("Is it safe to run?"),
                Turn {
                    role: ChatRole::Model,
                    text: "Not before 9 AM.".to_string(),
                },
                Turn::user("What about cycling?"),
            ],
            search_grounding: grounding,
        }
    }

    fn reply(parts: &[&str]) -> Value {
        let parts: Vec<Value> = parts.iter().map(|t| json!({ "text": t })).collect();
        json!({
            "candidates": [
                { "content": { "role": "model", "parts": parts } }
            ]
        })
    }

    #[test]
    fn test_body_shape() {
        let body = serde_json::to_value(GenerateContentBody::from(&request(true))).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are an AQI assistant.");
        assert!(body["systemInstruction"].get("role").is_none());
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "What about cycling?");
        assert_eq!(body["tools"][0]["google_search"], json!({}));
    }

    #[test]
    fn test_body_without_grounding_has_no_tools() {
        let body = serde_json::to_value(GenerateContentBody::from(&request(false))).unwrap();

        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_output_text_joins_parts() {
        let parsed: GenerateContentResponse =
            serde_json::from_value(reply(&["{\"a\":", " 1}"])).unwrap();
        assert_eq!(parsed.output_text(), "{\"a\": 1}");

        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.output_text(), "");
    }

    #[tokio::test]
    async fn test_generate_success() {
        let (base, seen) = spawn_backend(StatusCode::OK, reply(&["Cycling is fine after noon."])).await;
        let client = GeminiClient::with_base_url(&base, "gemini-2.5-flash", Some("k-123".to_string()));

        let text = client.generate(&request(true)).await.unwrap();

        assert_eq!(text, "Cycling is fine after noon.");
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, "/v1beta/models/gemini-2.5-flash:generateContent");
        assert_eq!(seen[0].api_key.as_deref(), Some("k-123"));
        assert_eq!(seen[0].body["contents"][0]["parts"][0]["text"], "Is it safe to run?");
    }

    #[tokio::test]
    async fn test_generate_error_status() {
        let (base, _) = spawn_backend(StatusCode::TOO_MANY_REQUESTS, json!({ "error": "quota" })).await;
        let client = GeminiClient::with_base_url(&base, DEFAULT_MODEL, Some("k".to_string()));

        let err = client.generate(&request(true)).await.unwrap_err();

        assert!(matches!(err, GenerationError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_generate_empty_output() {
        let (base, _) = spawn_backend(StatusCode::OK, json!({ "candidates": [] })).await;
        let client = GeminiClient::with_base_url(&base, DEFAULT_MODEL, Some("k".to_string()));

        let err = client.generate(&request(false)).await.unwrap_err();

        assert!(matches!(err, GenerationError::EmptyOutput));
    }

    #[tokio::test]
    async fn test_generate_without_credential() {
        let (base, seen) = spawn_backend(StatusCode::OK, reply(&["unused"])).await;
        let client = GeminiClient::with_base_url(&base, DEFAULT_MODEL, None);

        assert!(!client.has_credential());
        let err = client.generate(&request(false)).await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingCredential));
        assert!(seen.lock().is_empty());

        client.connect("  fresh-key ".to_string());
        assert!(client.has_credential());
        client.generate(&request(false)).await.unwrap();
        assert_eq!(seen.lock()[0].api_key.as_deref(), Some("fresh-key"));
    }

    #[test]
    fn test_blank_key_is_not_a_credential() {
        let client = GeminiClient::new(DEFAULT_MODEL, Some("   ".to_string()));
        assert!(!client.has_credential());

        client.connect(String::new());
        assert!(!client.has_credential());
    }
}
