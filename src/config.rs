//! Configuration types and the settings loader.
//!
//! Every field is resolved in this order, first hit wins:
//! explicit override, process environment (upper-cased field name), `.env`
//! file, managed secret store, hard-coded default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::secrets::{FileSecretStore, SecretsClient};
use crate::tools::ToolsMode;

pub const DEFAULT_BM_API_BASE: &str = "https://api.bettermeals.in";
pub const DEFAULT_SECRET_NAME: &str = "bettermeals/config";
pub const DEFAULT_GROQ_MODEL: &str = "openai/gpt-oss-20b";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Copy and links that appear in conversational replies.
#[derive(Debug, Clone)]
pub struct ReplyConfig {
    pub onboarding_form_url: String,
    pub dashboard_base_url: String,
    pub upi_id: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            onboarding_form_url: "https://bettermeals.in/onboarding".to_string(),
            dashboard_base_url: "https://bettermeals.in/app/dashboard".to_string(),
            upi_id: "9639293454@ybl".to_string(),
        }
    }
}

impl ReplyConfig {
    /// Dashboard link for a household's weekly plan.
    pub fn dashboard_url(&self, household_id: &str) -> String {
        format!(
            "{}/{}",
            self.dashboard_base_url.trim_end_matches('/'),
            household_id
        )
    }
}

/// Resolved service settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm_backend: LlmBackend,
    pub groq_api_key: Option<SecretString>,
    pub claude_api_key: Option<SecretString>,
    pub supervisor_model: String,
    pub worker_model: String,
    pub bm_api_base: String,
    pub bm_backend_api_base: String,
    pub tools_mode: ToolsMode,
    pub env: String,
    pub db_path: PathBuf,
    pub port: u16,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub replies: ReplyConfig,
}

impl Settings {
    /// LLM configuration for the routing supervisor.
    pub fn supervisor_llm(&self) -> Result<LlmConfig, ConfigError> {
        self.llm_config(&self.supervisor_model)
    }

    /// LLM configuration for workers and the cook assistant.
    pub fn worker_llm(&self) -> Result<LlmConfig, ConfigError> {
        self.llm_config(&self.worker_model)
    }

    fn llm_config(&self, model: &str) -> Result<LlmConfig, ConfigError> {
        let (key, field) = match self.llm_backend {
            LlmBackend::Groq => (&self.groq_api_key, "groq_api_key"),
            LlmBackend::Anthropic => (&self.claude_api_key, "claude_api_key"),
        };
        let api_key = key.clone().ok_or_else(|| ConfigError::MissingRequired {
            key: field.to_string(),
            hint: format!(
                "Set {} in the environment, .env, or the secret store",
                field.to_uppercase()
            ),
        })?;
        Ok(LlmConfig {
            backend: self.llm_backend,
            api_key,
            model: model.to_string(),
            temperature: 0.0,
        })
    }
}

/// Builder that resolves `Settings` from layered sources.
pub struct SettingsLoader {
    overrides: HashMap<String, String>,
    env: HashMap<String, String>,
    dotenv_path: Option<PathBuf>,
    secrets: Option<SecretsClient>,
}

impl SettingsLoader {
    /// A loader with no sources. Only defaults apply until sources are added.
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            env: HashMap::new(),
            dotenv_path: None,
            secrets: None,
        }
    }

    /// Loader over the current process environment and `./.env`.
    pub fn from_process_env() -> Self {
        Self::new()
            .with_env(std::env::vars().collect())
            .with_dotenv(".env")
    }

    /// Set an explicit value for a field. Takes precedence over everything.
    pub fn with_override(mut self, field: &str, value: impl Into<String>) -> Self {
        self.overrides.insert(field.to_string(), value.into());
        self
    }

    /// Replace the environment snapshot.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_dotenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv_path = Some(path.into());
        self
    }

    pub fn with_secrets(mut self, secrets: SecretsClient) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Resolve every field. Fails only on malformed values or a missing API
    /// key for the selected backend.
    pub async fn load(self) -> Result<Settings, ConfigError> {
        let dotenv = match &self.dotenv_path {
            Some(path) => read_dotenv(path)?,
            None => HashMap::new(),
        };
        let mut sources = Sources {
            overrides: &self.overrides,
            env: &self.env,
            dotenv: &dotenv,
            secret: None,
        };

        // The secret store location itself can only come from local sources.
        let secrets = match self.secrets.clone() {
            Some(client) => Some(client),
            None => sources.local("secrets_file").map(|path| {
                SecretsClient::new(Arc::new(FileSecretStore::new(PathBuf::from(path))))
            }),
        };
        if let Some(client) = secrets {
            let name = sources
                .local("secret_name")
                .unwrap_or_else(|| DEFAULT_SECRET_NAME.to_string());
            sources.secret = client.get_secret(&name).await;
            if sources.secret.is_none() {
                tracing::warn!(secret = %name, "Secret store configured but secret not available");
            }
        }

        let llm_backend: LlmBackend = sources
            .get("llm_backend")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(LlmBackend::Groq);
        let default_model = match llm_backend {
            LlmBackend::Groq => DEFAULT_GROQ_MODEL,
            LlmBackend::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        };
        let bm_api_base = sources
            .get("bm_api_base")
            .unwrap_or_else(|| DEFAULT_BM_API_BASE.to_string());
        let bm_api_base = validate_url("bm_api_base", bm_api_base)?;
        let bm_backend_api_base = match sources.get("bm_backend_api_base") {
            Some(v) => validate_url("bm_backend_api_base", v)?,
            None => bm_api_base.clone(),
        };
        let port = match sources.get("port") {
            Some(v) => v.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "port".to_string(),
                message: e.to_string(),
            })?,
            None => 8000,
        };
        let tools_mode: ToolsMode = sources
            .get("tools_mode")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();

        let reply_defaults = ReplyConfig::default();
        let settings = Settings {
            llm_backend,
            groq_api_key: sources.get("groq_api_key").map(SecretString::from),
            claude_api_key: sources.get("claude_api_key").map(SecretString::from),
            supervisor_model: sources
                .get("supervisor_model")
                .unwrap_or_else(|| default_model.to_string()),
            worker_model: sources
                .get("worker_model")
                .unwrap_or_else(|| default_model.to_string()),
            bm_api_base,
            bm_backend_api_base,
            tools_mode,
            env: sources.get("env").unwrap_or_else(|| "dev".to_string()),
            db_path: sources
                .get("db_path")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/bettermeals.db")),
            port,
            log_level: sources
                .get("log_level")
                .unwrap_or_else(|| "info".to_string()),
            log_dir: sources.get("log_dir").map(PathBuf::from),
            replies: ReplyConfig {
                onboarding_form_url: sources
                    .get("onboarding_form_url")
                    .unwrap_or(reply_defaults.onboarding_form_url),
                dashboard_base_url: sources
                    .get("dashboard_base_url")
                    .unwrap_or(reply_defaults.dashboard_base_url),
                upi_id: sources.get("upi_id").unwrap_or(reply_defaults.upi_id),
            },
        };

        // Fail at startup rather than on the first LLM call.
        settings.supervisor_llm()?;
        Ok(settings)
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

struct Sources<'a> {
    overrides: &'a HashMap<String, String>,
    env: &'a HashMap<String, String>,
    dotenv: &'a HashMap<String, String>,
    secret: Option<serde_json::Value>,
}

impl Sources<'_> {
    /// Override, environment or `.env`. An empty value at one layer falls
    /// through to the next.
    fn local(&self, field: &str) -> Option<String> {
        let upper = field.to_uppercase();
        let non_empty = |v: &&String| !v.is_empty();
        self.overrides
            .get(field)
            .filter(non_empty)
            .or_else(|| self.env.get(&upper).filter(non_empty))
            .or_else(|| self.dotenv.get(&upper).filter(non_empty))
            .or_else(|| self.dotenv.get(field).filter(non_empty))
            .cloned()
    }

    fn get(&self, field: &str) -> Option<String> {
        self.local(field).or_else(|| {
            let value = self.secret.as_ref()?.get(field)?;
            match value {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                _ => None,
            }
        })
    }
}

/// Parse a `.env` file without touching the process environment.
/// A missing file is not an error.
fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) =
            item.map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        vars.insert(key, value);
    }
    Ok(vars)
}

fn validate_url(key: &str, value: String) -> Result<String, ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an http(s) URL, got {value:?}"),
        })
    }
}
