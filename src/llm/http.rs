//! Concrete HTTP-backed [`LLMClient`], dispatching on the `provider:`
//! prefix of `LlmConfig::model` (SPEC_FULL.md §4.4.1).
//!
//! Grounded on the pack's Claude HTTP client: a minimal embedded request/
//! response shape per provider, categorizing transport/5xx/429 failures as
//! retryable and leaving parse/4xx failures to propagate immediately.

use super::LLMClient;
use crate::config::LlmConfig;
use crate::context::LLMAgentContext;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com";
const GOOGLE_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Anthropic,
    OpenAi,
    Google,
}

impl Provider {
    fn parse(prefix: &str) -> Result<Self> {
        match prefix {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "google" => Ok(Provider::Google),
            other => Err(Error::config_field(
                format!("unsupported llm provider '{other}'"),
                "llm.model",
            )),
        }
    }
}

/// An [`LLMClient`] that talks to a real provider over HTTP.
pub struct HttpLlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: String,
    provider: Provider,
    model_name: String,
    system_prompt: Option<String>,
}

impl HttpLlmClient {
    /// Build a client from a validated [`LlmConfig`], an API key read from
    /// the environment by the caller, and the resolved system prompt text
    /// (inline or from `system_prompt_file`).
    pub fn new(config: LlmConfig, api_key: String, system_prompt: Option<String>) -> Result<Self> {
        let (provider_str, model_name) = config.provider_and_name()?;
        let provider = Provider::parse(provider_str)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            model_name: model_name.to_string(),
            provider,
            config,
            api_key,
            system_prompt,
        })
    }

    /// The provider's API origin, overridable via the `base_url` pass-
    /// through field in `llm.extra` — the same mechanism `LlmConfig`
    /// already uses for provider-specific settings (§4.4), repurposed here
    /// so tests can point the client at a local mock server without any
    /// test-only constructor.
    fn base_url(&self, default: &str) -> String {
        match self.config.extra.get("base_url") {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    async fn send_with_retries(&self, prompt: String) -> Result<String> {
        let mut attempt = 0;
        loop {
            let result = match self.provider {
                Provider::Anthropic => self.send_anthropic(&prompt).await,
                Provider::OpenAi => self.send_openai(&prompt).await,
                Provider::Google => self.send_google(&prompt).await,
            };
            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff_ms = 200u64.saturating_mul(1 << attempt.min(10));
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_anthropic(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<Message<'a>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            system: Option<&'a str>,
            #[serde(skip_serializing_if = "Option::is_none")]
            temperature: Option<f64>,
        }
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Deserialize)]
        struct Response {
            content: Vec<ContentBlock>,
        }
        #[derive(Deserialize)]
        struct ContentBlock {
            text: Option<String>,
        }

        let request = Request {
            model: &self.model_name,
            max_tokens: 4096,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            system: self.system_prompt.as_deref(),
            temperature: Some(self.config.temperature),
        };

        let url = format!("{}/v1/messages", self.base_url(ANTHROPIC_DEFAULT_BASE_URL));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&request)
            .send()
            .await;
        let body: Response = classify_and_decode(response).await?;
        body.content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| Error::policy_parse("anthropic response contained no text block"))
    }

    async fn send_openai(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f64,
        }
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }
        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let mut messages = Vec::new();
        if let Some(system) = &self.system_prompt {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });

        let request = Request {
            model: &self.model_name,
            messages,
            temperature: self.config.temperature,
        };

        let url = format!(
            "{}/v1/chat/completions",
            self.base_url(OPENAI_DEFAULT_BASE_URL)
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await;
        let body: Response = classify_and_decode(response).await?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::policy_parse("openai response contained no choices"))
    }

    async fn send_google(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            contents: Vec<Content<'a>>,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Deserialize)]
        struct Response {
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: CandidateContent,
        }
        #[derive(Deserialize)]
        struct CandidateContent {
            parts: Vec<ResponsePart>,
        }
        #[derive(Deserialize)]
        struct ResponsePart {
            text: String,
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url(GOOGLE_DEFAULT_BASE_URL),
            self.model_name
        );
        let request = Request {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await;
        let body: Response = classify_and_decode(response).await?;
        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::policy_parse("google response contained no candidates"))
    }
}

async fn classify_and_decode<T: for<'de> Deserialize<'de>>(
    response: reqwest::Result<reqwest::Response>,
) -> Result<T> {
    let response = response.map_err(|e| {
        if e.is_connect() || e.is_timeout() {
            Error::llm_transport(e.to_string())
        } else {
            Error::llm_transport(format!("request error: {e}"))
        }
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return if status.as_u16() == 429 || status.is_server_error() {
            Err(Error::llm_transport(format!("{status}: {body}")))
        } else {
            Err(Error::config(format!("llm request rejected ({status}): {body}")))
        };
    }

    response
        .json::<T>()
        .await
        .map_err(|e| Error::policy_parse(format!("failed to decode llm response: {e}")))
}

/// Render an [`LLMAgentContext`] as the user-turn prompt text. The context
/// is embedded as canonical JSON so the model sees exactly what was
/// persisted for replay, with no separate natural-language summarization
/// step to drift out of sync.
fn render_prompt(context: &LLMAgentContext) -> Result<String> {
    let json = serde_json::to_string_pretty(context)?;
    Ok(format!(
        "Propose an updated decision policy for agent '{}' (iteration {}).\n\n\
         Respond with a single JSON object matching the policy document schema.\n\n\
         Context:\n{json}",
        context.agent_id, context.iteration
    ))
}

#[async_trait]
impl LLMClient for HttpLlmClient {
    async fn generate_structured(&self, context: &LLMAgentContext) -> Result<serde_json::Value> {
        let prompt = render_prompt(context)?;
        let text = self.send_with_retries(prompt).await?;
        extract_json(&text)
    }

    async fn generate_text(&self, context: &LLMAgentContext) -> Result<String> {
        let prompt = render_prompt(context)?;
        self.send_with_retries(prompt).await
    }
}

/// Parse a model's raw text reply as JSON, tolerating a fenced ```json
/// code block around the object (a common completion habit across
/// providers that plain `serde_json::from_str` would otherwise reject).
fn extract_json(text: &str) -> Result<serde_json::Value> {
    let trimmed = text.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(candidate)
        .map_err(|e| Error::policy_parse(format!("could not parse llm output as JSON: {e}")))
}
