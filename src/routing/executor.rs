//! Backend invocation with single-fallback policy.
//!
//! The executor resolves sampling parameters, calls the selected backend,
//! and on any primary failure retries exactly once against the
//! general-purpose slot with the same resolved parameters. Every call emits
//! exactly one audit entry, whether it succeeded or both attempts failed.

use std::time::Instant;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audit::AuditEntry;
use crate::backends::{
    BackendError, BackendKind, BackendRegistry, ChatMessage, Completion, CompletionRequest,
};
use crate::db::Database;
use crate::error::AppError;
use crate::personas::{self, Persona};
use crate::routing::classify::QueryAnalysis;
use crate::routing::select::select_backend;

/// Per-call inputs the executor needs beyond the analysis itself.
pub struct RouteParams<'a> {
    pub user_id: &'a str,
    pub request_id: &'a str,
    pub query: &'a str,
    pub persona: Option<&'a Persona>,
    /// Caller-supplied system prompt override from the request context.
    pub context_system_prompt: Option<&'a str>,
}

/// The outcome of one routing call.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub response_text: String,
    /// Model name that produced the response, with a " (fallback)" suffix
    /// when the primary slot failed.
    pub model_used: String,
    pub token_count: u32,
    pub latency_ms: u64,
    pub temperature: f32,
}

pub struct Executor {
    registry: Arc<BackendRegistry>,
    db: Database,
    audit_tx: mpsc::UnboundedSender<AuditEntry>,
}

impl Executor {
    pub fn new(
        registry: Arc<BackendRegistry>,
        db: Database,
        audit_tx: mpsc::UnboundedSender<AuditEntry>,
    ) -> Self {
        Self {
            registry,
            db,
            audit_tx,
        }
    }

    /// Invoke the backend the analysis selects, falling back once to the
    /// general-purpose slot. Errors only when both attempts fail.
    pub async fn execute(
        &self,
        params: RouteParams<'_>,
        analysis: &QueryAnalysis,
    ) -> Result<RoutingDecision, AppError> {
        let selected = select_backend(analysis);
        let primary = self.registry.get(selected);

        // Parameter precedence: persona beats the classifier for temperature,
        // persona beats the slot default for top_p, and the system prompt
        // resolves persona, then request context, then slot default.
        let temperature = params
            .persona
            .and_then(|p| p.temperature)
            .unwrap_or(analysis.suggested_temperature);
        let top_p = params
            .persona
            .and_then(|p| p.top_p)
            .unwrap_or(primary.top_p);
        let system_prompt = params
            .persona
            .and_then(|p| p.system_prompt.as_deref())
            .or(params.context_system_prompt)
            .unwrap_or(&primary.system_prompt);

        let mut request = CompletionRequest {
            model: primary.backend.model().to_string(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(params.query),
            ],
            temperature,
            top_p,
        };

        let started = Instant::now();

        let attempt = match primary.backend.chat(&request).await {
            Ok(completion) => Ok((completion, primary.backend.model().to_string())),
            Err(primary_err) => {
                tracing::warn!(
                    backend = selected.label(),
                    error = %primary_err,
                    "Primary backend failed, retrying against general-purpose"
                );
                let fallback = self.registry.get(BackendKind::General);
                request.model = fallback.backend.model().to_string();
                match fallback.backend.chat(&request).await {
                    Ok(completion) => Ok((
                        completion,
                        format!("{} (fallback)", fallback.backend.model()),
                    )),
                    Err(fallback_err) => Err(BackendError::AllFailed(format!(
                        "primary ({}): {primary_err}; fallback (general): {fallback_err}",
                        selected
                    ))),
                }
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;

        // usage_count moves once per call that resolved a persona, even when
        // both backends failed. The increment never fails the request.
        if let Some(persona) = params.persona {
            if let Err(e) = personas::increment_usage(&self.db, &persona.id) {
                tracing::warn!(persona_id = %persona.id, error = %e, "Failed to bump persona usage");
            }
        }

        match attempt {
            Ok((completion, model_used)) => {
                self.audit(
                    &params,
                    analysis,
                    &model_used,
                    temperature,
                    latency_ms,
                    Some(&completion),
                    "success".to_string(),
                );
                Ok(RoutingDecision {
                    response_text: completion.text,
                    model_used,
                    token_count: completion.total_tokens,
                    latency_ms,
                    temperature,
                })
            }
            Err(err) => {
                self.audit(
                    &params,
                    analysis,
                    primary.backend.model(),
                    temperature,
                    latency_ms,
                    None,
                    format!("error: {err}"),
                );
                Err(err.into())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn audit(
        &self,
        params: &RouteParams<'_>,
        analysis: &QueryAnalysis,
        model_used: &str,
        temperature: f32,
        latency_ms: u64,
        completion: Option<&Completion>,
        status: String,
    ) {
        let entry = AuditEntry {
            user_id: params.user_id.to_string(),
            request_id: params.request_id.to_string(),
            query: params.query.to_string(),
            response: completion.map(|c| c.text.clone()).unwrap_or_default(),
            persona: params.persona.map(|p| p.name.clone()),
            model_used: model_used.to_string(),
            query_type: analysis.query_type.to_string(),
            complexity: analysis.complexity.to_string(),
            reasoning: analysis.reasoning.clone(),
            temperature,
            token_count: completion.map(|c| c.total_tokens).unwrap_or(0),
            latency_ms,
            status,
            created_at: AuditEntry::now(),
        };
        if self.audit_tx.send(entry).is_err() {
            tracing::warn!("Audit channel closed, dropping entry");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::personas::{create_persona, get_persona, PersonaInput};
    use crate::routing::classify::classify;

    struct StubBackend {
        id: &'static str,
        model: &'static str,
        fail: bool,
        calls: AtomicUsize,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl StubBackend {
        fn ok(id: &'static str, model: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                model,
                fail: false,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(id: &'static str, model: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                model,
                fail: true,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> CompletionRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl crate::backends::ChatBackend for StubBackend {
        fn id(&self) -> &str {
            self.id
        }

        fn model(&self) -> &str {
            self.model
        }

        fn chat(
            &self,
            request: &CompletionRequest,
        ) -> Pin<Box<dyn Future<Output = Result<Completion, BackendError>> + Send + '_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(BackendError::Api {
                        status: 500,
                        message: "stub failure".into(),
                    })
                } else {
                    Ok(Completion {
                        text: "stub response".into(),
                        total_tokens: 7,
                    })
                }
            })
        }

        fn health_check(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
            Box::pin(async move { true })
        }
    }

    struct Harness {
        executor: Executor,
        db: Database,
        rx: mpsc::UnboundedReceiver<AuditEntry>,
        general: Arc<StubBackend>,
        math: Arc<StubBackend>,
    }

    fn harness(general: Arc<StubBackend>, math: Arc<StubBackend>) -> Harness {
        let creative = StubBackend::ok("creative", "stub-creative");
        let registry = Arc::new(BackendRegistry::from_backends(
            general.clone(),
            math.clone(),
            creative,
        ));
        let db = Database::open_in_memory().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        Harness {
            executor: Executor::new(registry, db.clone(), tx),
            db,
            rx,
            general,
            math,
        }
    }

    fn params<'a>(query: &'a str, persona: Option<&'a Persona>) -> RouteParams<'a> {
        RouteParams {
            user_id: "user1",
            request_id: "req1",
            query,
            persona,
            context_system_prompt: None,
        }
    }

    #[tokio::test]
    async fn test_math_query_hits_math_backend() {
        let mut h = harness(
            StubBackend::ok("general", "stub-general"),
            StubBackend::ok("math", "stub-math"),
        );
        let query = "Quanto \u{e9} 45 * 12?";
        let analysis = classify(query, None);

        let decision = h.executor.execute(params(query, None), &analysis).await.unwrap();

        assert_eq!(decision.model_used, "stub-math");
        assert_eq!(h.math.call_count(), 1);
        assert_eq!(h.general.call_count(), 0);
        assert!((h.math.last_request().temperature - 0.3).abs() < f32::EPSILON);
        assert!((h.math.last_request().top_p - 0.85).abs() < f32::EPSILON);

        let entry = h.rx.recv().await.unwrap();
        assert_eq!(entry.status, "success");
        assert_eq!(entry.query_type, "mathematical");
    }

    #[tokio::test]
    async fn test_fallback_is_attempted_exactly_once() {
        let mut h = harness(
            StubBackend::ok("general", "stub-general"),
            StubBackend::failing("math", "stub-math"),
        );
        let query = "What is 45 * 12?";
        let analysis = classify(query, None);

        let decision = h.executor.execute(params(query, None), &analysis).await.unwrap();

        assert_eq!(decision.model_used, "stub-general (fallback)");
        assert_eq!(h.math.call_count(), 1);
        assert_eq!(h.general.call_count(), 1);

        let entry = h.rx.recv().await.unwrap();
        assert_eq!(entry.status, "success");
        assert!(entry.model_used.contains("(fallback)"));
    }

    #[tokio::test]
    async fn test_fallback_keeps_resolved_parameters() {
        let h = harness(
            StubBackend::ok("general", "stub-general"),
            StubBackend::failing("math", "stub-math"),
        );
        let query = "calculate 2 + 2";
        let analysis = classify(query, None);

        h.executor.execute(params(query, None), &analysis).await.unwrap();

        let fallback_req = h.general.last_request();
        // Math slot parameters carry over; only the model name changes.
        assert!((fallback_req.temperature - 0.3).abs() < f32::EPSILON);
        assert!((fallback_req.top_p - 0.85).abs() < f32::EPSILON);
        assert_eq!(fallback_req.model, "stub-general");
    }

    #[tokio::test]
    async fn test_both_backends_failing_propagates_and_audits() {
        let mut h = harness(
            StubBackend::failing("general", "stub-general"),
            StubBackend::failing("math", "stub-math"),
        );
        let query = "solve this equation";
        let analysis = classify(query, None);

        let result = h.executor.execute(params(query, None), &analysis).await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert_eq!(h.math.call_count(), 1);
        assert_eq!(h.general.call_count(), 1);

        let entry = h.rx.recv().await.unwrap();
        assert!(entry.status.starts_with("error:"));
        assert!(entry.response.is_empty());
    }

    #[tokio::test]
    async fn test_classifier_temperature_reaches_backend_unchanged() {
        let h = harness(
            StubBackend::ok("general", "stub-general"),
            StubBackend::ok("math", "stub-math"),
        );
        let query = "thoughts on my day";
        let analysis = classify(query, None);

        h.executor.execute(params(query, None), &analysis).await.unwrap();

        let req = h.general.last_request();
        assert!((req.temperature - analysis.suggested_temperature).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_persona_overrides_sampling_and_prompt() {
        let h = harness(
            StubBackend::ok("general", "stub-general"),
            StubBackend::ok("math", "stub-math"),
        );
        let persona = create_persona(
            &h.db,
            &PersonaInput {
                name: "Quant".to_string(),
                role: String::new(),
                focus_areas: vec![],
                temperature: Some(0.11),
                top_p: Some(0.42),
                system_prompt: Some("Answer in one line.".to_string()),
            },
        )
        .unwrap();
        let query = "calculate the median of 1 2 3";
        let analysis = classify(query, Some(&persona));

        h.executor
            .execute(params(query, Some(&persona)), &analysis)
            .await
            .unwrap();

        let req = h.math.last_request();
        assert!((req.temperature - 0.11).abs() < f32::EPSILON);
        assert!((req.top_p - 0.42).abs() < f32::EPSILON);
        assert_eq!(req.messages[0].content, "Answer in one line.");
    }

    #[tokio::test]
    async fn test_context_prompt_beats_slot_default_not_persona() {
        let h = harness(
            StubBackend::ok("general", "stub-general"),
            StubBackend::ok("math", "stub-math"),
        );
        let query = "hello there";
        let analysis = classify(query, None);

        let mut p = params(query, None);
        p.context_system_prompt = Some("Reply in French.");
        h.executor.execute(p, &analysis).await.unwrap();

        assert_eq!(h.general.last_request().messages[0].content, "Reply in French.");
    }

    #[tokio::test]
    async fn test_usage_count_moves_once_per_call() {
        let h = harness(
            StubBackend::ok("general", "stub-general"),
            StubBackend::ok("math", "stub-math"),
        );
        let persona = create_persona(
            &h.db,
            &PersonaInput {
                name: "Analyst".to_string(),
                role: String::new(),
                focus_areas: vec!["markets".to_string()],
                temperature: None,
                top_p: None,
                system_prompt: None,
            },
        )
        .unwrap();
        let query = "how are markets doing";
        let analysis = classify(query, Some(&persona));

        h.executor
            .execute(params(query, Some(&persona)), &analysis)
            .await
            .unwrap();
        h.executor
            .execute(params(query, Some(&persona)), &analysis)
            .await
            .unwrap();

        let fetched = get_persona(&h.db, &persona.id).unwrap();
        assert_eq!(fetched.usage_count, 2);
    }

    #[tokio::test]
    async fn test_usage_count_moves_even_when_both_backends_fail() {
        let h = harness(
            StubBackend::failing("general", "stub-general"),
            StubBackend::failing("math", "stub-math"),
        );
        let persona = create_persona(
            &h.db,
            &PersonaInput {
                name: "Analyst".to_string(),
                role: String::new(),
                focus_areas: vec!["markets".to_string()],
                temperature: None,
                top_p: None,
                system_prompt: None,
            },
        )
        .unwrap();
        let query = "how are markets doing";
        let analysis = classify(query, Some(&persona));

        let result = h
            .executor
            .execute(params(query, Some(&persona)), &analysis)
            .await;
        assert!(result.is_err());

        // The call resolved a persona, so the counter moves regardless.
        let fetched = get_persona(&h.db, &persona.id).unwrap();
        assert_eq!(fetched.usage_count, 1);
    }

    #[tokio::test]
    async fn test_one_audit_entry_per_call() {
        let mut h = harness(
            StubBackend::ok("general", "stub-general"),
            StubBackend::ok("math", "stub-math"),
        );
        let query = "write a poem about rivers";
        let analysis = classify(query, None);

        h.executor.execute(params(query, None), &analysis).await.unwrap();
        h.executor.execute(params(query, None), &analysis).await.unwrap();

        assert!(h.rx.recv().await.is_some());
        assert!(h.rx.recv().await.is_some());
        assert!(h.rx.try_recv().is_err());
    }
}
