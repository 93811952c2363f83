//! Server configuration, loaded from environment variables at startup.
//!
//! A `.env` file (searched from the working directory upward) fills in any
//! variable the process environment does not set.

use std::collections::HashMap;

use gridchat_core::ReasoningEffort;
use gridchat_core::openai::DEFAULT_BASE_URL;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY is not set; the chat proxy cannot reach the model provider")]
    MissingApiKey,

    #[error("{key}='{value}' is not valid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read .env file: {0}")]
    EnvFile(String),
}

/// Runtime configuration for gridchat-server.
///
/// Everything except the API key has a default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind (default: `"0.0.0.0"`).
    pub host: String,

    /// TCP port to bind (default: `4000`).
    pub port: u16,

    /// Provider API key. Required.
    pub openai_api_key: String,

    /// Provider base URL (default: the public OpenAI API).
    pub openai_base_url: String,

    /// Reasoning effort requested for every generation; `None` omits it.
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,
}

impl Config {
    /// Build [`Config`] from the process environment, falling back to `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match dotenvy::dotenv_iter() {
            Ok(entries) => read_env_file(entries)?,
            Err(e) if e.not_found() => HashMap::new(),
            Err(e) => return Err(ConfigError::EnvFile(e.to_string())),
        };
        Self::from_layers(|key| std::env::var(key).ok(), &file)
    }

    /// Build [`Config`] from `lookup`, then `file` for keys `lookup` lacks.
    fn from_layers(
        lookup: impl Fn(&str) -> Option<String>,
        file: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        Self::from_vars(|key| lookup(key).or_else(|| file.get(key).cloned()))
    }

    /// Build [`Config`] from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let openai_api_key = lookup("OPENAI_API_KEY")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let port = match lookup("PORT").filter(|v| !v.trim().is_empty()) {
            Some(v) => v.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: "PORT",
                    value: v.clone(),
                    reason: e.to_string(),
                }
            })?,
            None => 4000,
        };

        let reasoning_effort = match lookup("GRIDCHAT_REASONING_EFFORT") {
            None => Some(ReasoningEffort::Low),
            Some(v) if v.trim().eq_ignore_ascii_case("none") => None,
            Some(v) => Some(v.trim().parse().map_err(|e: strum::ParseError| {
                ConfigError::Invalid {
                    key: "GRIDCHAT_REASONING_EFFORT",
                    value: v.clone(),
                    reason: e.to_string(),
                }
            })?),
        };

        Ok(Self {
            host: env_or(&lookup, "GRIDCHAT_HOST", "0.0.0.0"),
            port,
            openai_api_key,
            openai_base_url: env_or(&lookup, "OPENAI_BASE_URL", DEFAULT_BASE_URL),
            reasoning_effort,
            cors_allowed_origins: lookup("GRIDCHAT_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            log_level: env_or(&lookup, "GRIDCHAT_LOG", "info"),
            log_json: flag(&lookup, "GRIDCHAT_LOG_JSON", false),
            enable_swagger: flag(&lookup, "GRIDCHAT_ENABLE_SWAGGER", true),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn read_env_file<R: std::io::Read>(
    entries: dotenvy::Iter<R>,
) -> Result<HashMap<String, String>, ConfigError> {
    entries
        .collect::<Result<HashMap<_, _>, _>>()
        .map_err(|e| ConfigError::EnvFile(e.to_string()))
}

fn env_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_api_key_is_fatal() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::MissingApiKey);
        assert_eq!(
            config(&[("OPENAI_API_KEY", "  ")]).unwrap_err(),
            ConfigError::MissingApiKey
        );
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let cfg = config(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.bind_address(), "0.0.0.0:4000");
        assert_eq!(cfg.openai_base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.reasoning_effort, Some(ReasoningEffort::Low));
        assert_eq!(cfg.cors_allowed_origins, None);
        assert!(cfg.enable_swagger);
        assert!(!cfg.log_json);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "8080"),
            ("GRIDCHAT_REASONING_EFFORT", "none"),
            ("GRIDCHAT_LOG_JSON", "true"),
            ("GRIDCHAT_ENABLE_SWAGGER", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.reasoning_effort, None);
        assert!(cfg.log_json);
        assert!(!cfg.enable_swagger);
    }

    #[test]
    fn bad_port_is_reported() {
        let err = config(&[("OPENAI_API_KEY", "sk-test"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    fn env_file(contents: &str) -> HashMap<String, String> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        read_env_file(dotenvy::from_path_iter(file.path()).unwrap()).unwrap()
    }

    #[test]
    fn env_file_fills_unset_variables() {
        let file = env_file("# local secrets\nOPENAI_API_KEY=sk-from-file\nPORT=5000\n");
        let cfg = Config::from_layers(
            |key| (key == "PORT").then(|| "6000".to_owned()),
            &file,
        )
        .unwrap();

        assert_eq!(cfg.openai_api_key, "sk-from-file");
        assert_eq!(cfg.port, 6000);
    }

    #[test]
    fn malformed_env_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"OPENAI_API_KEY='unterminated\n").unwrap();
        let err = read_env_file(dotenvy::from_path_iter(file.path()).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFile(_)));
    }
}
