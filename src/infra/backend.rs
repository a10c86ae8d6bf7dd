//! OpenAI-compatible text-generation backend.

use crate::infra::config::{Backend, Config, OpenAiConfig};
use anyhow::{Context, bail};
use log::{debug, info};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const COMPLETION_ENDPOINT: &str = "completions";
pub const EDIT_ENDPOINT: &str = "edits";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
pub const USER_AGENT: &str = concat!("copilot-ops/", env!("CARGO_PKG_VERSION"));

/// Text in, candidate texts out.
pub trait TextBackend {
    fn generate(&self, prompt: &str) -> anyhow::Result<Vec<String>>;
    fn edit(&self, input: &str, instruction: &str) -> anyhow::Result<Vec<String>>;
}

/// Builds the client for the backend named in `config`.
pub fn create_backend(config: &Config) -> anyhow::Result<Box<dyn TextBackend>> {
    info!("Using backend {}", config.backend);
    match config.backend {
        Backend::Gpt3 => Ok(Box::new(OpenAiClient::new(config.gpt3.clone())?)),
    }
}

#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub n: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub stop: &'a [String],
    #[serde(skip_serializing_if = "str::is_empty")]
    pub user: &'a str,
}

#[derive(Debug, Serialize)]
pub struct EditRequest<'a> {
    pub model: &'a str,
    pub input: &'a str,
    pub instruction: &'a str,
    pub n: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ChoicesResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl ChoicesResponse {
    pub fn into_texts(self) -> Vec<String> {
        self.choices.into_iter().map(|choice| choice.text).collect()
    }
}

pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("No API key configured; set COPILOT_OPS_GPT3_APIKEY or gpt3.apiKey");
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), name)
    }

    fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> anyhow::Result<Vec<String>> {
        let url = self.endpoint(endpoint);
        debug!("POST {}", url);

        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body);
        if let Some(org_id) = &self.config.org_id {
            request = request.header("OpenAI-Organization", org_id);
        }

        let response = request
            .send()
            .with_context(|| format!("Could not reach {}", url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("{} returned {}: {}", url, status, body.trim());
        }

        let parsed: ChoicesResponse = response
            .json()
            .with_context(|| format!("Unexpected response body from {}", url))?;
        let texts = parsed.into_texts();
        info!("Received {} choice(s) from {}", texts.len(), endpoint);
        Ok(texts)
    }
}

impl TextBackend for OpenAiClient {
    fn generate(&self, prompt: &str) -> anyhow::Result<Vec<String>> {
        let params = &self.config.generate_params;
        let body = CompletionRequest {
            model: &params.model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            n: params.n,
            stop: &params.stop,
            user: &params.user,
        };
        self.post(COMPLETION_ENDPOINT, &body)
    }

    fn edit(&self, input: &str, instruction: &str) -> anyhow::Result<Vec<String>> {
        let params = &self.config.edit_params;
        let body = EditRequest {
            model: &params.model,
            input,
            instruction,
            n: params.n,
            temperature: params.temperature,
            top_p: (params.top_p > 0.0).then_some(params.top_p),
        };
        self.post(EDIT_ENDPOINT, &body)
    }
}
