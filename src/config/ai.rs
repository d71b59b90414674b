// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_ms() -> u64 {
    8000
}

/// Remote model provider settings. When disabled, the service runs on the
/// built-in deterministic capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" is the only wire format supported; any OpenAI-compatible
    /// endpoint works through `base_url`.
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> anyhow::Result<Self> {
        let mut cfg: AiConfig = serde_json::from_str(data)?;

        cfg.provider = cfg.provider.to_lowercase();
        if cfg.provider != "openai" {
            anyhow::bail!("Unsupported provider in config: {}", cfg.provider);
        }

        // Resolve api key if "ENV"; only required when the provider is on.
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match env::var("OPENAI_API_KEY") {
                Ok(k) => k,
                Err(_) if cfg.enabled => anyhow::bail!("Missing OPENAI_API_KEY env var"),
                Err(_) => String::new(),
            };
        }

        cfg.base_url = cfg.base_url.trim_end_matches('/').to_string();
        if cfg.timeout_ms == 0 {
            cfg.timeout_ms = default_timeout_ms();
        }

        Ok(cfg)
    }

    /// Load `config/ai.json`; a missing or broken file disables the provider.
    pub fn load_default() -> Self {
        match Self::load_from_file(DEFAULT_AI_CONFIG_PATH) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::debug!(error = %e, "ai config unavailable, remote provider disabled");
                Self::default()
            }
        }
    }
}
