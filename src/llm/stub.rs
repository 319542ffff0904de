//! A scripted [`LLMClient`] for tests: returns a fixed response or error
//! without making any network call.

use super::LLMClient;
use crate::context::LLMAgentContext;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Mutex;

enum Script {
    Structured(serde_json::Value),
    Text(String),
    Error(String),
}

/// A non-networked [`LLMClient`] that always returns the same scripted
/// response or error, recording how many times it was called.
pub struct StubLlmClient {
    script: Script,
    calls: Mutex<u32>,
}

impl StubLlmClient {
    /// Always succeed `generate_structured` with `value`.
    pub fn with_structured_response(value: serde_json::Value) -> Self {
        Self {
            script: Script::Structured(value),
            calls: Mutex::new(0),
        }
    }

    /// Always succeed `generate_text` with `text`.
    pub fn with_text_response(text: impl Into<String>) -> Self {
        Self {
            script: Script::Text(text.into()),
            calls: Mutex::new(0),
        }
    }

    /// Always fail both methods with an `LlmTransport` error.
    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            script: Script::Error(message.into()),
            calls: Mutex::new(0),
        }
    }

    /// Number of calls made to either method so far.
    pub fn call_count(&self) -> u32 {
        *self.calls.lock().expect("stub lock poisoned")
    }
}

#[async_trait]
impl LLMClient for StubLlmClient {
    async fn generate_structured(&self, _context: &LLMAgentContext) -> Result<serde_json::Value> {
        *self.calls.lock().expect("stub lock poisoned") += 1;
        match &self.script {
            Script::Structured(v) => Ok(v.clone()),
            Script::Text(t) => Ok(serde_json::json!({"text": t})),
            Script::Error(message) => Err(Error::llm_transport(message.clone())),
        }
    }

    async fn generate_text(&self, _context: &LLMAgentContext) -> Result<String> {
        *self.calls.lock().expect("stub lock poisoned") += 1;
        match &self.script {
            Script::Structured(v) => Ok(v.to_string()),
            Script::Text(t) => Ok(t.clone()),
            Script::Error(message) => Err(Error::llm_transport(message.clone())),
        }
    }
}
