//! CareConnect intake server.
//!
//! Accepts patient requests, volunteer applications, contact messages and
//! chat, triages them and serves the admin reports over a JSON API.

mod config;
mod error;
mod extract;
mod notify;
mod routes;
mod state;
mod storage;

use std::sync::Arc;

use database::Database;
use openai_triage::{OpenAiTriage, OpenAiTriageConfig};
use tracing::info;
use triage_core::{GuardedTriage, KeywordTriage, Triage, TriageError};

use crate::config::{Config, TriageStrategy};
use crate::notify::LogNotifier;
use crate::state::AppState;
use crate::storage::LocalFileStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    info!(addr = %config.addr, env = ?config.app_env, "Starting intake server");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let strategy: Arc<dyn Triage> = match config.triage_strategy {
        TriageStrategy::Local => Arc::new(KeywordTriage::new()),
        TriageStrategy::OpenAi => {
            Arc::new(remote_strategy(OpenAiTriageConfig::from_env()?, &config)?)
        }
    };
    info!(strategy = strategy.name(), timeout = ?config.triage_timeout, "Triage ready");

    let triage = GuardedTriage::new(strategy, config.triage_timeout);
    let files = Arc::new(LocalFileStore::new(&config.upload_dir));
    let addr = config.addr;
    let state = AppState::new(db, triage, files, Arc::new(LogNotifier), config);

    let app = routes::app(state);

    info!(addr = %addr, "Intake server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The remote strategy, bounded by the server's triage timeout.
fn remote_strategy(
    mut remote: OpenAiTriageConfig,
    config: &Config,
) -> Result<OpenAiTriage, TriageError> {
    remote.timeout = config.triage_timeout;
    OpenAiTriage::new(remote)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_remote_strategy_uses_server_timeout() {
        let config = Config::from_lookup(|key| {
            (key == "TRIAGE_TIMEOUT_SECS").then(|| "4".to_string())
        })
        .unwrap();
        let remote = OpenAiTriageConfig::builder().api_key("test-key").build();
        assert_eq!(remote.timeout, Duration::from_secs(10));

        let strategy = remote_strategy(remote, &config).unwrap();
        assert_eq!(strategy.config().timeout, Duration::from_secs(4));
    }
}
