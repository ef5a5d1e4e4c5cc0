//! Backend registry.
//!
//! Holds the three fixed backend slots and the per-slot sampling defaults
//! that apply when neither the persona nor the config overrides them.

use std::sync::Arc;

use serde::Serialize;

use crate::backends::{BackendError, BackendKind, ChatBackend};
use crate::backends::openai::OpenAiBackend;
use crate::config::{BackendConfig, BackendsConfig};

/// Built-in top_p default for a backend slot.
const fn default_top_p(kind: BackendKind) -> f32 {
    match kind {
        BackendKind::General => 0.9,
        BackendKind::Math => 0.85,
        BackendKind::Creative => 0.95,
    }
}

/// Built-in system prompt for a backend slot.
fn default_system_prompt(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Math => {
            "You are a precise assistant for mathematical and quantitative \
             questions. Show your work and state the final answer clearly."
        }
        BackendKind::Creative => {
            "You are an imaginative writing assistant. Respond with vivid, \
             original prose."
        }
        BackendKind::General => {
            "You are a knowledgeable, helpful assistant. Answer clearly and \
             concisely."
        }
    }
}

/// One registered slot: the backend plus its resolved defaults.
pub struct RegisteredBackend {
    pub backend: Arc<dyn ChatBackend>,
    pub top_p: f32,
    pub system_prompt: String,
}

impl RegisteredBackend {
    fn from_config(kind: BackendKind, config: &BackendConfig) -> Result<Self, BackendError> {
        let top_p = config.top_p.unwrap_or(default_top_p(kind));
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(kind).to_string());
        let backend = Arc::new(OpenAiBackend::new(kind.as_str(), config.clone())?);
        Ok(Self {
            backend,
            top_p,
            system_prompt,
        })
    }
}

/// Per-backend status row surfaced by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub backend: String,
    pub model: String,
    pub healthy: bool,
}

/// Fixed three-slot registry the model selector resolves against.
pub struct BackendRegistry {
    general: RegisteredBackend,
    math: RegisteredBackend,
    creative: RegisteredBackend,
}

impl BackendRegistry {
    /// Build all three slots from config. API keys and timeouts are baked in
    /// here; nothing downstream touches the process environment.
    pub fn from_config(config: &BackendsConfig) -> Result<Self, BackendError> {
        Ok(Self {
            general: RegisteredBackend::from_config(BackendKind::General, &config.general)?,
            math: RegisteredBackend::from_config(BackendKind::Math, &config.math)?,
            creative: RegisteredBackend::from_config(BackendKind::Creative, &config.creative)?,
        })
    }

    /// Build a registry from pre-constructed backends with built-in defaults.
    /// Used by tests to substitute stub backends.
    pub fn from_backends(
        general: Arc<dyn ChatBackend>,
        math: Arc<dyn ChatBackend>,
        creative: Arc<dyn ChatBackend>,
    ) -> Self {
        let slot = |kind: BackendKind, backend: Arc<dyn ChatBackend>| RegisteredBackend {
            backend,
            top_p: default_top_p(kind),
            system_prompt: default_system_prompt(kind).to_string(),
        };
        Self {
            general: slot(BackendKind::General, general),
            math: slot(BackendKind::Math, math),
            creative: slot(BackendKind::Creative, creative),
        }
    }

    pub fn get(&self, kind: BackendKind) -> &RegisteredBackend {
        match kind {
            BackendKind::General => &self.general,
            BackendKind::Math => &self.math,
            BackendKind::Creative => &self.creative,
        }
    }

    pub fn kinds(&self) -> [BackendKind; 3] {
        [BackendKind::Math, BackendKind::General, BackendKind::Creative]
    }

    /// Run reachability checks against every slot.
    pub async fn health_check_all(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::with_capacity(3);
        for kind in self.kinds() {
            let slot = self.get(kind);
            let healthy = slot.backend.health_check().await;
            statuses.push(BackendStatus {
                backend: kind.as_str().to_string(),
                model: slot.backend.model().to_string(),
                healthy,
            });
        }
        statuses
    }
}
