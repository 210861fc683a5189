use iptv_proto::protocol::SessionState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// What survives a restart.  The channel list itself is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistentState {
    pub last_good_url: Option<String>,
}

/// Shared, read-mostly snapshot of the session.  The session core is the only
/// writer; socket and HTTP handlers read from it.
pub struct StateManager {
    state: Arc<RwLock<SessionState>>,
    state_file: Option<PathBuf>,
}

impl StateManager {
    pub fn new(state_file: PathBuf) -> Self {
        let persistent = Self::load_persistent(&state_file);
        let state = SessionState {
            rev: 1,
            last_good_url: persistent.last_good_url,
            ..SessionState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            state_file: Some(state_file),
        }
    }

    /// In-memory only; nothing is read or written on disk.
    pub fn ephemeral() -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState {
                rev: 1,
                ..SessionState::default()
            })),
            state_file: None,
        }
    }

    pub async fn get_state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn rev(&self) -> u64 {
        self.state.read().await.rev
    }

    /// Replace the snapshot, bumping `rev`.  Returns the new revision.
    pub async fn publish(&self, mut next: SessionState) -> u64 {
        let mut state = self.state.write().await;
        next.rev = state.rev + 1;
        *state = next;
        state.rev
    }

    pub async fn save_last_good(&self, url: &str) {
        let Some(path) = self.state_file.as_ref() else {
            return;
        };
        let persistent = PersistentState {
            last_good_url: Some(url.to_string()),
        };
        if let Err(e) = Self::save(path, &persistent).await {
            warn!("state: failed to save {}: {}", path.display(), e);
        }
    }

    async fn save(path: &Path, persistent: &PersistentState) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(persistent)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    fn load_persistent(state_file: &Path) -> PersistentState {
        std::fs::read_to_string(state_file)
            .ok()
            .and_then(|content| serde_json::from_str::<PersistentState>(&content).ok())
            .unwrap_or_default()
    }
}
