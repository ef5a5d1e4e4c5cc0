//! Chat-completion backends.
//!
//! Defines the core `ChatBackend` trait and error types, plus the
//! OpenAI-compatible HTTP implementation and the fixed three-slot registry
//! (math-optimized, general-purpose, creative) the router selects among.

pub mod openai;
pub mod registry;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub use self::registry::BackendRegistry;

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

/// Errors that can occur when invoking a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("All backends failed: {0}")]
    AllFailed(String),
}

// ---------------------------------------------------------------------------
// BackendKind
// ---------------------------------------------------------------------------

/// The three fixed backend slots a routing decision can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Math,
    General,
    Creative,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::General => "general",
            Self::Creative => "creative",
        }
    }

    /// Human-readable label used in logs and audit rows.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Math => "math-optimized",
            Self::General => "general-purpose",
            Self::Creative => "creative",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One chat-completion call: exactly one system turn and one user turn, with
/// the sampling parameters already resolved by the executor.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
}

/// The part of a backend response the router cares about.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// ChatBackend trait
// ---------------------------------------------------------------------------

/// Trait all backends implement.
///
/// Async methods return boxed futures so the trait is dyn-compatible (can be
/// used as `Arc<dyn ChatBackend>`). No `async_trait` macro is needed.
pub trait ChatBackend: Send + Sync {
    /// Unique identifier for this backend (e.g. "general", "math").
    fn id(&self) -> &str;

    /// Model name this backend sends upstream.
    fn model(&self) -> &str;

    /// Non-streaming chat completion.
    fn chat(
        &self,
        request: &CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, BackendError>> + Send + '_>>;

    /// Lightweight reachability check.
    fn health_check(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}
