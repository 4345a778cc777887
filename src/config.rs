use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::path::PathBuf;

use crate::auth::AuthSettings;

/// Largest accepted TOKEN_REFRESH_MARGIN, in seconds (one day)
const MAX_REFRESH_MARGIN: u64 = 86_400;

/// GraphQL authentication link - token-refreshing client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// GraphQL endpoint URL
    #[arg(short = 'e', long, env = "GRAPHQL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Path to the SQLite credential database
    #[arg(short = 'd', long, env = "AUTH_DB_FILE")]
    pub db_file: Option<String>,

    /// Seconds before expiry at which the token is refreshed proactively
    #[arg(long, env = "TOKEN_REFRESH_MARGIN", default_value = "60")]
    pub refresh_margin: u64,

    /// Authorization header scheme
    #[arg(long, env = "AUTH_SCHEME", default_value = "JWT")]
    pub auth_scheme: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Store a token obtained from a login flow
    Login {
        #[arg(long)]
        token: String,
    },

    /// Forget the stored token
    Logout,

    /// Show the stored token's claims
    Status,

    /// Exchange the stored token for a new one now
    Refresh,

    /// Send one GraphQL operation through the link
    Send {
        #[arg(long)]
        operation_name: String,

        #[arg(long)]
        query: String,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Endpoint
    pub endpoint: String,

    // Credentials
    pub db_file: PathBuf,

    // Token lifecycle
    pub refresh_margin: u64,
    pub auth_scheme: String,
    pub refresh_operation_name: String,
    pub refresh_query: String,
    pub refresh_token_pointer: String,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    /// Build config from parsed arguments, filling env-only settings
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let defaults = AuthSettings::default();

        let config = Config {
            endpoint: args
                .endpoint
                .context("GRAPHQL_ENDPOINT is required (use -e or set GRAPHQL_ENDPOINT env var)")?,

            db_file: args
                .db_file
                .map(|s| expand_tilde(&s))
                .or_else(default_db_path)
                .context("Could not determine AUTH_DB_FILE (use -d or set AUTH_DB_FILE env var)")?,

            refresh_margin: args.refresh_margin,
            auth_scheme: args.auth_scheme,

            refresh_operation_name: std::env::var("REFRESH_OPERATION_NAME")
                .unwrap_or(defaults.refresh_operation_name),

            refresh_query: std::env::var("REFRESH_QUERY").unwrap_or(defaults.refresh_query),

            refresh_token_pointer: std::env::var("REFRESH_TOKEN_POINTER")
                .unwrap_or(defaults.refresh_token_pointer),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
            log_format: parse_log_format(&args.log_format),
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)
            .with_context(|| format!("GRAPHQL_ENDPOINT is not a valid URL: {}", self.endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("GRAPHQL_ENDPOINT must use http or https: {}", self.endpoint);
        }

        if self.refresh_margin > MAX_REFRESH_MARGIN {
            anyhow::bail!(
                "TOKEN_REFRESH_MARGIN must be at most {} seconds, got {}",
                MAX_REFRESH_MARGIN,
                self.refresh_margin
            );
        }

        if self.auth_scheme.trim().is_empty() {
            anyhow::bail!("AUTH_SCHEME cannot be empty");
        }

        if self.refresh_operation_name.trim().is_empty() {
            anyhow::bail!("REFRESH_OPERATION_NAME cannot be empty");
        }

        if !self.refresh_token_pointer.starts_with('/') {
            anyhow::bail!(
                "REFRESH_TOKEN_POINTER must be a JSON pointer starting with '/': {}",
                self.refresh_token_pointer
            );
        }

        Ok(())
    }

    /// Settings handed to the link and refresh coordinator
    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            auth_scheme: self.auth_scheme.clone(),
            refresh_margin: i64::try_from(self.refresh_margin)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(chrono::Duration::MAX),
            refresh_operation_name: self.refresh_operation_name.clone(),
            refresh_query: self.refresh_query.clone(),
            refresh_token_pointer: self.refresh_token_pointer.clone(),
        }
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Default credential database under the user's data directory
fn default_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("gql-auth-link").join("auth.sqlite3"))
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}
