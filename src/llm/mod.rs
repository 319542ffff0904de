//! LLM client abstraction, audit capture, and the concrete HTTP
//! implementation (§4.4, §4.4.1).

mod http;
mod stub;

pub use http::HttpLlmClient;
pub use stub::StubLlmClient;

use crate::context::LLMAgentContext;
use crate::domain::now_iso8601;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// The contract every concrete LLM backend implements.
///
/// Both methods take the already-built [`LLMAgentContext`] — prompt
/// construction from that context is the caller's responsibility, so this
/// trait stays free of provider-specific templating concerns.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Request a structured policy proposal for one agent's context.
    async fn generate_structured(&self, context: &LLMAgentContext) -> Result<serde_json::Value>;

    /// Request free-form text for one agent's context (used for rationale
    /// capture and debugging prompts, not for policy proposals).
    async fn generate_text(&self, context: &LLMAgentContext) -> Result<String>;
}

/// One recorded call to an [`LLMClient`], captured regardless of whether it
/// succeeded, so failed calls are as replayable/auditable as successful ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMInteraction {
    pub sequence: u64,
    pub agent_id: String,
    pub iteration: u32,
    pub timestamp: String,
    pub request_context: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Wraps any [`LLMClient`] and records every call as an [`LLMInteraction`],
/// without altering the wrapped client's observable behavior (§4.4: audit
/// capture must be transparent on both the success and failure paths).
pub struct AuditCaptureLLMClient<C: LLMClient> {
    inner: C,
    sequence: AtomicU64,
    interactions: Mutex<Vec<LLMInteraction>>,
}

impl<C: LLMClient> AuditCaptureLLMClient<C> {
    /// Wrap `inner` with audit capture.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            sequence: AtomicU64::new(0),
            interactions: Mutex::new(Vec::new()),
        }
    }

    /// Drain and return every interaction recorded so far.
    pub fn take_interactions(&self) -> Vec<LLMInteraction> {
        let mut guard = self.interactions.lock().expect("audit log lock poisoned");
        std::mem::take(&mut *guard)
    }

    async fn record<T, F>(&self, context: &LLMAgentContext, call: F) -> Result<T>
    where
        T: Serialize + Clone,
        F: std::future::Future<Output = Result<T>>,
    {
        let started = std::time::Instant::now();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let request_context = serde_json::to_value(context)?;
        let result = call.await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (response, error) = match &result {
            Ok(value) => (Some(serde_json::to_value(value)?), None),
            Err(e) => (None, Some(e.to_string())),
        };

        self.interactions
            .lock()
            .expect("audit log lock poisoned")
            .push(LLMInteraction {
                sequence,
                agent_id: context.agent_id.clone(),
                iteration: context.iteration,
                timestamp: now_iso8601(),
                request_context,
                response,
                error,
                latency_ms,
            });

        result
    }
}

#[async_trait]
impl<C: LLMClient> LLMClient for AuditCaptureLLMClient<C> {
    async fn generate_structured(&self, context: &LLMAgentContext) -> Result<serde_json::Value> {
        self.record(context, self.inner.generate_structured(context))
            .await
    }

    async fn generate_text(&self, context: &LLMAgentContext) -> Result<String> {
        self.record(context, self.inner.generate_text(context))
            .await
    }
}
