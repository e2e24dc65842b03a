use clap::{Parser, ValueEnum};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::schema::TableSchema;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub title: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "gemini" or "remote"
    pub model: String,   // Model name
    pub api_url: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WarehouseConfig {
    pub api_url: String,
    pub location: Option<String>,
    pub timeout_secs: u64,
    /// Server-side wait per BigQuery request, in milliseconds
    pub job_timeout_ms: u64,
    pub max_polls: u32,
    pub max_rows: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub max_greeting_attempts: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub warehouse: WarehouseConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    /// Replaces the built-in `inv_transaction` data dictionary when present
    pub schema: Option<TableSchema>,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log output format
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-warehouse/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NLW__WEB__PORT=8080 and friends
        config_builder = config_builder.add_source(
            Environment::with_prefix("NLW")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(format) = args.log_format {
            config.logging.format = format;
        }

        if config.session.max_greeting_attempts == 0 {
            return Err(ConfigError::Message(
                "session.max_greeting_attempts must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            title: "Chatbot ABC SQL Test".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "gemini".to_string(),
            model: "gemini-pro".to_string(),
            api_url: None,
            timeout_secs: 60,
            temperature: 0.1,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            api_url: "https://bigquery.googleapis.com/bigquery/v2".to_string(),
            location: None,
            timeout_secs: 120,
            job_timeout_ms: 10_000,
            max_polls: 30,
            max_rows: 1000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60 * 60,
            max_greeting_attempts: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
        }
    }
}
