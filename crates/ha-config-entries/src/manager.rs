//! Config Entries Manager
//!
//! In-memory index of the configured integration instances.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config Entries Manager
#[derive(Default)]
pub struct ConfigEntries {
    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: domain -> entry_ids (ordered by ULID, i.e. creation)
    by_domain: DashMap<String, BTreeSet<String>>,

    /// Index: (domain, unique_id) -> entry_id
    by_unique_id: DashMap<(String, String), String>,
}

impl ConfigEntries {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    fn index_entry(&self, entry: &ConfigEntry) {
        self.entries.insert(entry.entry_id.clone(), entry.clone());
        self.by_domain
            .entry(entry.domain.clone())
            .or_default()
            .insert(entry.entry_id.clone());
        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id.insert(
                (entry.domain.clone(), unique_id.clone()),
                entry.entry_id.clone(),
            );
        }
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        if let Some(mut ids) = self.by_domain.get_mut(&entry.domain) {
            ids.remove(&entry.entry_id);
        }
        if let Some(unique_id) = &entry.unique_id {
            self.by_unique_id
                .remove(&(entry.domain.clone(), unique_id.clone()));
        }
        self.entries.remove(&entry.entry_id);
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain, oldest first
    pub fn entries(&self, domain: &str) -> Vec<ConfigEntry> {
        self.by_domain
            .get(domain)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    /// Get entry by unique_id
    pub fn find_by_unique_id(&self, domain: &str, unique_id: &str) -> Option<ConfigEntry> {
        let entry_id = self
            .by_unique_id
            .get(&(domain.to_string(), unique_id.to_string()))?
            .clone();
        self.get(&entry_id)
    }

    /// Add a new config entry
    pub fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if let Some(unique_id) = &entry.unique_id {
            if self.find_by_unique_id(&entry.domain, unique_id).is_some() {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain.clone(),
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.index_entry(&entry);
        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    /// Update an existing entry
    pub fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&entry);
        if let Some(title) = update.title {
            entry.title = title;
        }
        if let Some(data) = update.data {
            entry.data = data;
        }
        if let Some(options) = update.options {
            entry.options = options;
        }
        if let Some(unique_id) = update.unique_id {
            entry.unique_id = Some(unique_id);
        }
        entry.modified_at = Utc::now();
        self.index_entry(&entry);

        debug!("Updated config entry: {}", entry_id);
        Ok(entry)
    }

    /// Replace an entry's options
    pub fn update_options(
        &self,
        entry_id: &str,
        options: HashMap<String, serde_json::Value>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        self.update(entry_id, ConfigEntryUpdate::new().options(options))
    }

    /// Retitle an entry
    pub fn update_title(
        &self,
        entry_id: &str,
        title: impl Into<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        self.update(entry_id, ConfigEntryUpdate::new().title(title))
    }

    /// Remove an entry
    pub fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&entry);
        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );
        Ok(entry)
    }

    /// Set entry state
    pub fn set_state(&self, entry_id: &str, state: ConfigEntryState, reason: Option<String>) {
        if let Some(mut entry) = self.entries.get_mut(entry_id) {
            entry.state = state;
            entry.reason = reason;
            debug!("Entry {} state changed to {:?}", entry_id, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_and_lookup() {
        let entries = ConfigEntries::new();
        let entry = entries
            .add(ConfigEntry::new("eero", "Home").with_unique_id("42-n1"))
            .unwrap();

        assert_eq!(entries.get(&entry.entry_id).unwrap().title, "Home");
        assert_eq!(entries.entries("eero").len(), 1);
        assert!(entries.find_by_unique_id("eero", "42-n1").is_some());
        assert!(entries.find_by_unique_id("nest", "42-n1").is_none());
    }

    #[test]
    fn test_duplicate_unique_id_rejected() {
        let entries = ConfigEntries::new();
        entries
            .add(ConfigEntry::new("sony_bravia", "TV").with_unique_id("192.168.1.20"))
            .unwrap();

        let err = entries
            .add(ConfigEntry::new("sony_bravia", "TV 2").with_unique_id("192.168.1.20"))
            .unwrap_err();
        assert!(matches!(err, ConfigEntriesError::AlreadyExists { .. }));
    }

    #[test]
    fn test_update_options_and_title() {
        let entries = ConfigEntries::new();
        let entry = entries.add(ConfigEntry::new("integration", "integration")).unwrap();

        let updated = entries
            .update(
                &entry.entry_id,
                ConfigEntryUpdate::new()
                    .title("Energy")
                    .options(HashMap::from([("round".to_string(), json!(2))])),
            )
            .unwrap();

        assert_eq!(updated.title, "Energy");
        assert_eq!(updated.option::<u32>("round"), Some(2));
    }

    #[test]
    fn test_remove() {
        let entries = ConfigEntries::new();
        let entry = entries
            .add(ConfigEntry::new("systemmonitor", "load_1m").with_unique_id("load_1m"))
            .unwrap();

        entries.remove(&entry.entry_id).unwrap();
        assert!(entries.find_by_unique_id("systemmonitor", "load_1m").is_none());
        assert!(matches!(
            entries.remove(&entry.entry_id),
            Err(ConfigEntriesError::NotFound(_))
        ));
    }
}
