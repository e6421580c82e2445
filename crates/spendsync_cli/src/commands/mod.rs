//! CLI command implementations.

pub mod add;
pub mod list;
pub mod pending;
pub mod sync;

use crate::client::ReqwestClient;
use spendsync_core::ClientState;
use spendsync_storage::{FileBackend, StorageBackend};
use spendsync_sync::{
    AuthProvider, HttpTransport, ManualConnectivity, StaticToken, SyncConfig, SyncEngine,
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Result type for commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn Error>>;

/// Engine over the real HTTP API.
pub type CliEngine = SyncEngine<HttpTransport<ReqwestClient>>;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Local data directory.
    pub data_dir: PathBuf,
    /// API base URL.
    pub api_url: String,
    /// Bearer token.
    pub token: Option<String>,
    /// Whether to stay offline.
    pub offline: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Settings {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(&self.api_url).with_timeout(self.timeout)
    }
}

/// Hydrates client state from the data directory.
pub fn open_state(settings: &Settings) -> CommandResult<Arc<ClientState>> {
    let backend: Arc<dyn StorageBackend> = Arc::new(FileBackend::open(&settings.data_dir)?);
    Ok(Arc::new(ClientState::hydrate(backend)?))
}

/// Hydrates client state and wires a sync engine to it.
pub fn open_engine(settings: &Settings, config: SyncConfig) -> CommandResult<Arc<CliEngine>> {
    let state = open_state(settings)?;
    let transport = HttpTransport::new(&config, ReqwestClient::new()?);
    let auth: Arc<dyn AuthProvider> = Arc::new(match &settings.token {
        Some(token) => StaticToken::new(token.clone()),
        None => StaticToken::none(),
    });
    let connectivity = Arc::new(ManualConnectivity::new(!settings.offline));
    if settings.token.is_none() && !settings.offline {
        tracing::warn!("no token configured, submissions will fail until one is provided");
    }

    Ok(Arc::new(SyncEngine::new(
        config,
        transport,
        state,
        auth,
        connectivity,
    )))
}

fn print_json<T: serde::Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn settings(dir: &std::path::Path) -> Settings {
        Settings {
            data_dir: dir.to_path_buf(),
            api_url: "http://127.0.0.1:9".into(),
            token: None,
            offline: true,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn open_state_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");
        let state = open_state(&settings(&data_dir)).unwrap();
        assert_eq!(state.queue_len(), 0);
        assert!(data_dir.exists());
    }

    #[test]
    fn second_open_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let _first = open_state(&settings(dir.path())).unwrap();
        assert!(open_state(&settings(dir.path())).is_err());
    }
}
