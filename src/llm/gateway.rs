//! Backend registry and dispatch.

use super::{
    BackendRequest, CancelToken, ChatBackend, FAN_OUT_ID, RetryPolicy, Turn, parse_structured,
    response_schema,
};
use crate::context::ComposedContext;
use crate::models::{FanOutResult, Provenance, StructuredResponse};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A registered backend.
#[derive(Clone)]
pub struct BackendEntry {
    /// Configured id (`gemini-flash`, `gpt`, ...).
    pub id: String,
    /// Name the backend is told to answer as.
    pub display_name: String,
    /// Disabled backends fail locally without a network attempt.
    pub enabled: bool,
    /// The client.
    pub backend: Arc<dyn ChatBackend>,
}

impl BackendEntry {
    /// Creates an enabled entry.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            enabled: true,
            backend,
        }
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl std::fmt::Debug for BackendEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendEntry")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("enabled", &self.enabled)
            .field("provider", &self.backend.name())
            .field("model", &self.backend.model())
            .finish()
    }
}

/// Listing view of a registered backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSummary {
    /// Configured id.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Provider family.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Whether the backend accepts requests.
    pub enabled: bool,
}

impl From<&ComposedContext> for BackendRequest {
    fn from(context: &ComposedContext) -> Self {
        Self::new(context.instructions.clone(), context.message.clone())
            .with_history(context.history.iter().map(Turn::from).collect())
            .with_creativity(context.creativity)
    }
}

/// Routes requests to registered backends and repairs their output.
#[derive(Debug, Default)]
pub struct BackendGateway {
    entries: BTreeMap<String, BackendEntry>,
    retry: RetryPolicy,
}

impl BackendGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            retry,
        }
    }

    /// Registers a backend, replacing any entry with the same id.
    pub fn register(&mut self, entry: BackendEntry) {
        tracing::debug!(
            backend = %entry.id,
            provider = entry.backend.name(),
            model = %entry.backend.model(),
            enabled = entry.enabled,
            "Registered backend"
        );
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_backend(mut self, entry: BackendEntry) -> Self {
        self.register(entry);
        self
    }

    /// Looks up a backend.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&BackendEntry> {
        self.entries.get(id)
    }

    /// Whether `id` names a backend or the fan-out id.
    #[must_use]
    pub fn is_known(&self, id: &str) -> bool {
        id == FAN_OUT_ID || self.entries.contains_key(id)
    }

    /// Display names of every registered backend.
    #[must_use]
    pub fn display_names(&self) -> Vec<String> {
        self.entries
            .values()
            .map(|entry| entry.display_name.clone())
            .collect()
    }

    /// Lists registered backends, sorted by id.
    #[must_use]
    pub fn list(&self) -> Vec<BackendSummary> {
        self.entries
            .values()
            .map(|entry| BackendSummary {
                id: entry.id.clone(),
                display_name: entry.display_name.clone(),
                provider: entry.backend.name().to_string(),
                model: entry.backend.model().to_string(),
                enabled: entry.enabled,
            })
            .collect()
    }

    fn enabled_entry(&self, id: &str) -> Result<&BackendEntry> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("backend '{id}'")))?;
        if !entry.enabled {
            return Err(Error::OperationFailed {
                operation: "backend_dispatch".to_string(),
                cause: format!("backend '{id}' is disabled"),
            });
        }
        Ok(entry)
    }

    /// Sends raw text generation to one backend under the retry policy.
    ///
    /// The request is passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id, `OperationFailed` for a
    /// disabled backend, and the last backend error once retries are spent.
    pub fn generate_raw(
        &self,
        id: &str,
        request: &BackendRequest,
        cancel: &CancelToken,
    ) -> Result<String> {
        let entry = self.enabled_entry(id)?;
        self.retry
            .execute(id, "generate", cancel, || entry.backend.generate(request))
    }

    /// Dispatches to one backend and repairs the reply.
    ///
    /// The backend's display name is prefixed to the instructions and the
    /// structured-response schema is attached. Malformed output never fails:
    /// it is wrapped as a parse failure.
    ///
    /// # Errors
    ///
    /// Same as [`generate_raw`](Self::generate_raw).
    pub fn dispatch(
        &self,
        id: &str,
        request: &BackendRequest,
        cancel: &CancelToken,
    ) -> Result<StructuredResponse> {
        let entry = self.enabled_entry(id)?;

        let mut named = request.clone();
        named.instructions = format!(
            "Your name: {}\n\n{}",
            entry.display_name, request.instructions
        );
        named.schema = Some(response_schema());

        let raw = self
            .retry
            .execute(id, "generate", cancel, || entry.backend.generate(&named))?;
        Ok(parse_structured(
            &raw,
            Provenance::new(id, entry.backend.model()),
        ))
    }

    /// Calls every enabled backend independently and collects the results.
    ///
    /// No consensus is computed; each result is keyed by backend id.
    #[must_use]
    pub fn fan_out(&self, request: &BackendRequest, cancel: &CancelToken) -> StructuredResponse {
        let mut results = BTreeMap::new();
        for entry in self.entries.values().filter(|entry| entry.enabled) {
            let result = match self.dispatch(&entry.id, request, cancel) {
                Ok(response) => FanOutResult::Response(response),
                Err(e) => {
                    tracing::warn!(backend = %entry.id, error = %e, "Fan-out backend failed");
                    FanOutResult::Error {
                        error: e.to_string(),
                    }
                },
            };
            results.insert(entry.id.clone(), result);
        }
        metrics::counter!("backend_fan_out_total").increment(1);
        StructuredResponse::fan_out(results)
    }

    /// Answers a request without ever failing.
    ///
    /// `all` fans out; any other id is dispatched, and every error becomes a
    /// degraded response with `provenance.error` set.
    #[must_use]
    pub fn respond(
        &self,
        id: &str,
        request: &BackendRequest,
        cancel: &CancelToken,
    ) -> StructuredResponse {
        if id == FAN_OUT_ID {
            return self.fan_out(request, cancel);
        }
        match self.dispatch(id, request, cancel) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(backend = %id, error = %e, "Backend failed, returning degraded answer");
                metrics::counter!("backend_degraded_total", "backend" => id.to_string())
                    .increment(1);
                StructuredResponse::degraded(id, &e.to_string())
            },
        }
    }
}
