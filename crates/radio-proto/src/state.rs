use crate::protocol::PlayerStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// What survives a restart.  The station is not remembered: every start is a
/// refresh, which plays the first station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistentState {
    pub volume: u8,
}

/// Holds the latest published `PlayerStatus` for readers (socket clients, HTTP
/// API) and persists the user volume.  Only the control loop writes to it.
pub struct StateManager {
    status: Arc<RwLock<PlayerStatus>>,
    state_file: PathBuf,
    saved: std::sync::Mutex<Option<PersistentState>>,
}

impl StateManager {
    pub fn new(state_file: PathBuf) -> Self {
        let saved = Self::load_persistent(&state_file);
        Self {
            status: Arc::new(RwLock::new(PlayerStatus::default())),
            state_file,
            saved: std::sync::Mutex::new(saved),
        }
    }

    /// Volume persisted by a previous run, if any.
    pub fn saved_volume(&self) -> Option<u8> {
        self.saved
            .lock()
            .ok()
            .and_then(|saved| saved.as_ref().map(|s| s.volume.min(100)))
    }

    pub async fn get_status(&self) -> PlayerStatus {
        self.status.read().await.clone()
    }

    /// Replace the published snapshot, bumping `rev`.  Persists the volume when
    /// it differs from what is on disk.
    pub async fn publish(&self, mut status: PlayerStatus) -> anyhow::Result<()> {
        let volume = status.volume;
        {
            let mut current = self.status.write().await;
            status.rev = current.rev + 1;
            *current = status;
        }
        self.save_volume(volume).await
    }

    async fn save_volume(&self, volume: u8) -> anyhow::Result<()> {
        let persistent = PersistentState { volume };
        {
            let mut saved = self
                .saved
                .lock()
                .map_err(|_| anyhow::anyhow!("persistent state lock poisoned"))?;
            if saved.as_ref() == Some(&persistent) {
                return Ok(());
            }
            *saved = Some(persistent.clone());
        }

        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&persistent)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }

    fn load_persistent(state_file: &Path) -> Option<PersistentState> {
        let content = std::fs::read_to_string(state_file).ok()?;
        serde_json::from_str::<PersistentState>(&content).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_bumps_rev_and_persists_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let manager = StateManager::new(path.clone());
        assert_eq!(manager.saved_volume(), None);

        manager
            .publish(PlayerStatus {
                volume: 62,
                ..Default::default()
            })
            .await
            .unwrap();
        manager
            .publish(PlayerStatus {
                volume: 62,
                muted: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let status = manager.get_status().await;
        assert_eq!(status.rev, 2);
        assert!(status.muted);

        let reloaded = StateManager::new(path);
        assert_eq!(reloaded.saved_volume(), Some(62));
    }

    #[test]
    fn test_corrupt_state_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(StateManager::new(path).saved_volume(), None);
    }
}
