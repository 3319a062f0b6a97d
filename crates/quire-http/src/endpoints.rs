//! Endpoint paths and request/response types.

use serde::{Deserialize, Serialize};

// ============================================================================
// Endpoint Paths
// ============================================================================

/// POST, `{email, password}` -> [`LoginResponse`]
pub const LOGIN: &str = "auth/login";

/// POST, `{refresh_token}` -> [`TokenResponse`]
pub const REFRESH: &str = "auth/refresh";

/// GET -> [`User`]
pub const ME: &str = "auth/me";

/// POST, [`GenerateRequest`] -> `text/event-stream`
pub const GENERATE_STREAM: &str = "ai/generate/stream";

// ============================================================================
// Auth
// ============================================================================

/// Request body for login.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Request body for refresh.
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

impl std::fmt::Debug for RefreshRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Token pair returned by login and refresh.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("tokens", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Response from login.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub tokens: TokenResponse,
}

/// An account as returned by login and `auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub last_login_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Errors
// ============================================================================

/// Error body returned by the API: `{"detail": ...}`.
///
/// `detail` is usually a string, but validation failures send a list of
/// objects, so it is kept as raw JSON.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Extract a human-readable message from a raw error body.
    pub fn detail_from_slice(body: &[u8]) -> Option<String> {
        let parsed: ErrorResponse = serde_json::from_slice(body).ok()?;
        match parsed.detail? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
            serde_json::Value::String(_) | serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

// ============================================================================
// AI generation
// ============================================================================

/// Request body for streaming generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub section_level: String,
    pub generation_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
}

impl GenerateRequest {
    /// A request with the server's defaults: level `L3`, mode `generate`,
    /// 4096 max tokens.
    pub fn new(project_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            section_id: None,
            prompt: prompt.into(),
            context: None,
            template: None,
            section_level: "L3".to_string(),
            generation_mode: "generate".to_string(),
            model_override: None,
            temperature: None,
            max_tokens: 4096,
            persona_id: None,
        }
    }

    pub fn with_section(mut self, section_id: impl Into<String>) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}
