use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

use gql_auth_link::auth::{needs_refresh, CredentialStore, Token};
use gql_auth_link::config::{Command, Config, LogFormat};
use gql_auth_link::graphql::GraphQLRequest;
use gql_auth_link::http_client::HttpTransport;
use gql_auth_link::link::AuthLink;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let (config, command) = Config::load()?;
    config.validate()?;

    init_logging(&config);

    tracing::debug!(
        endpoint = %config.endpoint,
        db_file = %config.db_file.display(),
        "Configuration loaded"
    );

    let store = CredentialStore::open(&config.db_file)?;

    match command {
        Command::Login { token } => {
            let token = Token::parse(token).context("Refusing to store an invalid token")?;
            store.set_token(Some(token.raw.clone()))?;
            tracing::info!(
                "✅ Logged in as '{}' (token: {}...)",
                token.claims.subject,
                token.preview()
            );
            println!(
                "Logged in as '{}', token expires {}",
                token.claims.subject,
                token.claims.expires_at.to_rfc3339()
            );
        }

        Command::Logout => {
            store.clear()?;
            println!("Logged out");
        }

        Command::Status => print_status(&store, &config),

        Command::Refresh => {
            let link = build_link(&config, store)?;
            let token = link.coordinator().refresh().await?;
            println!(
                "Token refreshed for '{}', expires {}",
                token.claims.subject,
                token.claims.expires_at.to_rfc3339()
            );
        }

        Command::Send {
            operation_name,
            query,
            variables,
        } => {
            let variables = match variables {
                Some(raw) => serde_json::from_str::<Map<String, Value>>(&raw)
                    .context("--variables must be a JSON object")?,
                None => Map::new(),
            };

            let link = build_link(&config, store)?;
            let request = GraphQLRequest::new(operation_name, query).with_variables(variables);

            match link.send(request).await {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response.to_body())?);
                }
                Err(e) => {
                    tracing::error!("❌ Request failed: {}", e);
                    if link.store().get_token().is_none() {
                        tracing::warn!("Session has no credential, log in again");
                    }
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

/// Initialize logging with a configured level
fn init_logging(config: &Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn build_link(config: &Config, store: CredentialStore) -> Result<AuthLink> {
    let transport = HttpTransport::new(
        &config.endpoint,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?;
    tracing::debug!(url = %transport.endpoint(), "HTTP transport initialized");

    AuthLink::builder(config.auth_settings())
        .store(store)
        .transport(Arc::new(transport))
        .build()
}

/// Print the stored credential and how close it is to expiry
fn print_status(store: &CredentialStore, config: &Config) {
    let Some(raw) = store.get_token() else {
        println!("Not logged in");
        return;
    };

    let token = match Token::parse(raw) {
        Ok(token) => token,
        Err(e) => {
            println!("Stored token cannot be decoded: {}", e);
            return;
        }
    };

    let now = Utc::now();
    let claims = &token.claims;
    let state = if claims.is_expired(now) {
        "expired"
    } else if needs_refresh(claims, now, config.auth_settings().refresh_margin) {
        "expiring soon"
    } else {
        "valid"
    };

    println!("  Subject:     {}", claims.subject);
    println!("  Issued:      {}", claims.issued_at.to_rfc3339());
    println!("  Expires:     {}", claims.expires_at.to_rfc3339());
    println!(
        "  Remaining:   {}s ({})",
        claims.remaining(now).num_seconds(),
        state
    );
    if let Some(path) = store.path() {
        println!("  Database:    {}", path.display());
    }
}
