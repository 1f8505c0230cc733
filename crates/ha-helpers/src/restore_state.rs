//! Last-known states for entities that restore themselves at startup

use std::path::Path;

use dashmap::DashMap;
use ha_core::State;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Storage key, relative to the `.storage` directory
pub const STORAGE_KEY: &str = "core.restore_state";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredStates {
    version: u32,
    data: Vec<State>,
}

/// Last known state per entity id
#[derive(Default)]
pub struct RestoreStateStore {
    states: DashMap<String, State>,
}

impl RestoreStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a previously saved store; a missing file yields an empty store
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let store = Self::new();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(err) => return Err(err),
        };

        let stored: StoredStates = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        info!("Loaded {} restore states from {:?}", stored.data.len(), path);
        for state in stored.data {
            store.remember(state);
        }
        Ok(store)
    }

    /// Save every remembered state
    pub async fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut data: Vec<State> = self.states.iter().map(|s| s.value().clone()).collect();
        data.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        let stored = StoredStates { version: 1, data };
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        debug!("Saved {} restore states", stored.data.len());
        Ok(())
    }

    /// Record the latest state of an entity
    pub fn remember(&self, state: State) {
        self.states.insert(state.entity_id.to_string(), state);
    }

    /// The last known state of an entity
    pub fn last_state(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::Context;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".storage").join(STORAGE_KEY);

        let store = RestoreStateStore::new();
        store.remember(State::new(
            "sensor.energy".parse().unwrap(),
            "12.345",
            HashMap::new(),
            Context::new(),
        ));
        store.save(&path).await.unwrap();

        let loaded = RestoreStateStore::load(&path).await.unwrap();
        assert_eq!(loaded.last_state("sensor.energy").unwrap().state, "12.345");
        assert!(loaded.last_state("sensor.other").is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RestoreStateStore::load(&dir.path().join("absent")).await.unwrap();
        assert!(store.last_state("sensor.energy").is_none());
    }
}
