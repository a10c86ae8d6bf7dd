//! Configuration file, environment and flag handling.
//!
//! Lookup order: the first `.copilot-ops.yaml` found in the working root,
//! the home directory and `/etc`, then `.copilot-ops.local.yaml` from the
//! working root merged on top, then `COPILOT_OPS_*` environment variables,
//! then command-line flags.

use crate::domain::models::OutputFormat;
use anyhow::{Context, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_FILE: &str = ".copilot-ops.yaml";
pub const CONFIG_FILE_LOCAL: &str = ".copilot-ops.local.yaml";
pub const ENV_PREFIX: &str = "COPILOT_OPS";

pub const OPENAI_URL: &str = "https://api.openai.com/v1";
pub const CODE_DAVINCI_V2: &str = "code-davinci-002";
pub const CODE_DAVINCI_EDIT_V1: &str = "code-davinci-edit-001";
pub const COMPLETION_END_OF_SEQUENCE: &str = "EOF";
pub const DEFAULT_MAX_TOKENS: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fileset {
    pub name: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    #[default]
    #[serde(rename = "gpt-3")]
    Gpt3,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gpt-3" | "gpt3" => Ok(Backend::Gpt3),
            other => bail!("unsupported backend: {} (expected gpt-3)", other),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Gpt3 => write!(f, "gpt-3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub n: u32,
    pub stop: Vec<String>,
    pub user: String,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            model: CODE_DAVINCI_V2.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.0,
            n: 1,
            stop: vec![COMPLETION_END_OF_SEQUENCE.to_string()],
            user: "copilot-ops".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditParams {
    pub model: String,
    pub n: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for EditParams {
    fn default() -> Self {
        Self {
            model: CODE_DAVINCI_EDIT_V1.to_string(),
            n: 1,
            temperature: 0.0,
            top_p: 0.0,
        }
    }
}

/// Settings for the OpenAI-compatible backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "orgID", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub url: String,
    #[serde(rename = "generateParams")]
    pub generate_params: GenerateParams,
    #[serde(rename = "editParams")]
    pub edit_params: EditParams,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            org_id: None,
            url: OPENAI_URL.to_string(),
            generate_params: GenerateParams::default(),
            edit_params: EditParams::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filesets: Vec<Fileset>,
    pub backend: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputFormat>,
    pub gpt3: OpenAiConfig,
}

/// Flag values that override file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub backend: Option<String>,
    pub ntokens: Option<u32>,
    pub ncompletions: Option<u32>,
    pub url: Option<String>,
}

impl Config {
    /// Loads configuration for a working root. Missing files are fine,
    /// malformed ones are not.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let mut search = vec![root.to_path_buf()];
        if let Some(home) = dirs::home_dir() {
            search.push(home);
        }
        search.push(PathBuf::from("/etc"));

        let mut merged = Value::Mapping(Default::default());
        if let Some(path) = search
            .iter()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|path| path.is_file())
        {
            merge_values(&mut merged, read_yaml(&path)?);
        }

        let local = root.join(CONFIG_FILE_LOCAL);
        if local.is_file() {
            merge_values(&mut merged, read_yaml(&local)?);
        }

        let config: Config =
            serde_yaml::from_value(merged).context("Invalid configuration values")?;
        debug!("Loaded {} filesets from configuration", config.filesets.len());
        Ok(config)
    }

    /// Applies `COPILOT_OPS_*` overrides. `lookup` is usually
    /// `|key| std::env::var(key).ok()`.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}_{}", ENV_PREFIX, suffix));

        if let Some(api_key) = var("GPT3_APIKEY") {
            self.gpt3.api_key = api_key;
        }
        if let Some(org_id) = var("GPT3_ORGID") {
            self.gpt3.org_id = Some(org_id);
        }
        if let Some(url) = var("GPT3_URL") {
            self.gpt3.url = url;
        }
        if let Some(backend) = var("BACKEND") {
            self.backend = backend.parse()?;
        }
        Ok(())
    }

    pub fn apply_flags(&mut self, flags: &FlagOverrides) -> anyhow::Result<()> {
        if let Some(backend) = &flags.backend {
            self.backend = backend.parse()?;
        }
        if let Some(ntokens) = flags.ntokens.filter(|&n| n > 0) {
            self.gpt3.generate_params.max_tokens = ntokens;
        }
        if let Some(ncompletions) = flags.ncompletions.filter(|&n| n > 0) {
            self.gpt3.generate_params.n = ncompletions;
            self.gpt3.edit_params.n = ncompletions;
        }
        if let Some(url) = &flags.url {
            self.gpt3.url = url.clone();
        }
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn find_fileset(&self, name: &str) -> Option<&Fileset> {
        self.filesets.iter().find(|fileset| fileset.name == name)
    }

    pub fn log_as_json(&self) {
        let mut redacted = self.clone();
        if !redacted.gpt3.api_key.is_empty() {
            redacted.gpt3.api_key = "<redacted>".to_string();
        }
        match serde_json::to_string_pretty(&redacted) {
            Ok(json) => debug!("config:\n{}", json),
            Err(e) => debug!("config could not be rendered: {}", e),
        }
    }
}

fn read_yaml(path: &Path) -> anyhow::Result<Value> {
    info!("Reading configuration from {}", path.display());
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(Value::Mapping(Default::default()));
    }
    serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Deep-merges `overlay` into `base`; mappings merge key by key, anything
/// else is replaced.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
