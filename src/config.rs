//! Command-line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::agent::AgentConfig;
use crate::gemini::DEFAULT_MODEL;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "codecanvas")]
#[command(author, version, about = "Terminal code editor with a tool-calling AI assistant")]
pub struct Cli {
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub model_api_key: Option<String>,

    /// Tavily API key used by the web_search tool
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    pub search_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "CODECANVAS_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Maximum model calls per chat message
    #[arg(long, default_value_t = 10)]
    pub max_iterations: usize,

    /// Wall-clock limit for one code run, compile step included
    #[arg(long, default_value_t = 10)]
    pub exec_timeout_secs: u64,

    /// Sandbox root for the file tools (created if missing)
    #[arg(long, env = "CODECANVAS_WORKSPACE", default_value = "./workspace")]
    pub workspace: PathBuf,

    /// Default number of web search results
    #[arg(long, default_value_t = 5)]
    pub search_results: usize,

    /// Timeout for each HTTP request to the model or search API
    #[arg(long, default_value_t = 60)]
    pub http_timeout_secs: u64,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {name}: pass {flag} or set the {env} environment variable")]
    MissingSecret {
        name: &'static str,
        flag: &'static str,
        env: &'static str,
    },
    #[error("invalid value for {flag}: {reason}")]
    Invalid { flag: &'static str, reason: String },
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub model_api_key: String,
    pub search_api_key: String,
    pub model: String,
    pub max_iterations: usize,
    pub exec_timeout: Duration,
    pub workspace: PathBuf,
    pub search_results: usize,
    pub http_timeout: Duration,
    pub log_format: LogFormat,
}

fn secret(
    value: Option<String>,
    name: &'static str,
    flag: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingSecret { name, flag, env })
}

impl Config {
    /// Check required secrets and value ranges
    pub fn validate(cli: Cli) -> Result<Self, ConfigError> {
        let model_api_key = secret(cli.model_api_key, "model API key", "--model-api-key", "GEMINI_API_KEY")?;
        let search_api_key = secret(
            cli.search_api_key,
            "search API key",
            "--search-api-key",
            "TAVILY_API_KEY",
        )?;

        if cli.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                flag: "--model",
                reason: "model name is empty".to_string(),
            });
        }
        if cli.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                flag: "--max-iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if cli.exec_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                flag: "--exec-timeout-secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if cli.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                flag: "--http-timeout-secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=10).contains(&cli.search_results) {
            return Err(ConfigError::Invalid {
                flag: "--search-results",
                reason: "must be between 1 and 10".to_string(),
            });
        }

        Ok(Self {
            model_api_key,
            search_api_key,
            model: cli.model.trim().to_string(),
            max_iterations: cli.max_iterations,
            exec_timeout: Duration::from_secs(cli.exec_timeout_secs),
            workspace: cli.workspace,
            search_results: cli.search_results,
            http_timeout: Duration::from_secs(cli.http_timeout_secs),
            log_format: cli.log_format,
        })
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_iterations: self.max_iterations,
            system_prompt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["codecanvas"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--model-api-key", "g", "--search-api-key", "t", "--model", "gemini-2.0-flash"]);
        let config = Config::validate(cli).unwrap();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.exec_timeout, Duration::from_secs(10));
        assert_eq!(config.search_results, 5);
        assert_eq!(config.http_timeout, Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.agent_config().max_iterations, 10);
    }

    #[test]
    fn test_missing_secret() {
        let mut cli = parse(&["--model-api-key", "g", "--search-api-key", "t"]);
        cli.search_api_key = Some("   ".to_string());
        let err = Config::validate(cli).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret { env: "TAVILY_API_KEY", .. }));
        assert!(err.to_string().contains("--search-api-key"));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let cli = parse(&[
            "--model-api-key", "g",
            "--search-api-key", "t",
            "--model", "m",
            "--search-results", "50",
        ]);
        assert!(matches!(
            Config::validate(cli),
            Err(ConfigError::Invalid { flag: "--search-results", .. })
        ));
    }

    #[test]
    fn test_log_format_flag() {
        let cli = parse(&["--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
