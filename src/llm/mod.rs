pub mod chat;
use serde::{ Deserialize, Serialize };
use std::collections::HashMap;
use std::str::FromStr;
use std::fmt;
use std::sync::Arc;
use reqwest::Client as HttpClient;
use thiserror::Error;
use crate::cli::Args;
use self::chat::{ ChatModel, new_client };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Ollama,
    OpenAI,
    DeepSeek,
    XAI,
    Groq,
}

impl LlmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmType::Ollama => "ollama",
            LlmType::OpenAI => "openai",
            LlmType::DeepSeek => "deepseek",
            LlmType::XAI => "xai",
            LlmType::Groq => "groq",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmType::Ollama)
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LlmType {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(LlmType::Ollama),
            "openai" => Ok(LlmType::OpenAI),
            "deepseek" => Ok(LlmType::DeepSeek),
            "xai" => Ok(LlmType::XAI),
            "groq" => Ok(LlmType::Groq),
            _ => Err(LlmError::UnsupportedProvider(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unsupported LLM provider: '{0}'")]
    UnsupportedProvider(String),
    #[error("invalid model '{0}', expected provider/model")]
    InvalidModel(String),
    #[error("{0} API key is required")]
    MissingApiKey(LlmType),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid API key format: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unexpected provider response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Ollama,
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}

/// A `provider/model` pair such as `openai/gpt-4o-mini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: LlmType,
    pub model: String,
}

impl FromStr for ModelSpec {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model) = s
            .split_once('/')
            .filter(|(p, m)| !p.trim().is_empty() && !m.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidModel(s.to_string()))?;
        Ok(Self {
            provider: provider.trim().parse()?,
            model: model.trim().to_string(),
        })
    }
}

/// Resolves a per-request model name into a client.
pub trait ModelProvider: Send + Sync {
    fn resolve(&self, model: &str) -> Result<Arc<dyn ChatModel>, LlmError>;

    /// Whether at least one provider can serve requests.
    fn is_configured(&self) -> bool;
}

/// Holds provider credentials from the command line. Every model client
/// shares one HTTP connection pool; nothing is kept per model name.
pub struct ProviderRegistry {
    providers: HashMap<LlmType, LlmConfig>,
    http: HttpClient,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<LlmConfig>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|config| (config.llm_type, config))
                .collect(),
            http: HttpClient::new(),
        }
    }

    pub fn from_args(args: &Args) -> Self {
        let non_empty = |key: &str| Some(key.to_string()).filter(|k| !k.trim().is_empty());
        let provider = |llm_type, api_key: &str, base_url: &Option<String>| LlmConfig {
            llm_type,
            api_key: non_empty(api_key),
            completion_model: None,
            base_url: base_url.clone(),
        };

        let mut providers = vec![
            provider(LlmType::OpenAI, &args.openai_api_key, &args.openai_base_url),
            provider(LlmType::DeepSeek, &args.deepseek_api_key, &args.deepseek_base_url),
            provider(LlmType::Groq, &args.groq_api_key, &args.groq_base_url),
            provider(LlmType::XAI, &args.xai_api_key, &args.xai_base_url)
        ];
        // Ollama needs no key, so it only counts once a server is named.
        if args.ollama_base_url.as_deref().is_some_and(|url| !url.trim().is_empty()) {
            providers.push(provider(LlmType::Ollama, "", &args.ollama_base_url));
        }
        Self::new(providers)
    }

    /// Providers that have what they need to make calls.
    pub fn configured_providers(&self) -> Vec<LlmType> {
        let mut ready: Vec<LlmType> = self.providers
            .values()
            .filter(|c| !c.llm_type.requires_api_key() || c.api_key.is_some())
            .map(|c| c.llm_type)
            .collect();
        ready.sort_by_key(|t| t.as_str());
        ready
    }
}

impl ModelProvider for ProviderRegistry {
    fn resolve(&self, model: &str) -> Result<Arc<dyn ChatModel>, LlmError> {
        let spec: ModelSpec = model.parse()?;
        let mut config = self.providers
            .get(&spec.provider)
            .cloned()
            .unwrap_or(LlmConfig { llm_type: spec.provider, ..LlmConfig::default() });
        config.completion_model = Some(spec.model);
        new_client(&config, &self.http)
    }

    fn is_configured(&self) -> bool {
        !self.configured_providers().is_empty()
    }
}
