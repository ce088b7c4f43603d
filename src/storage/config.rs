// RidiSync - RIDI Books Library Export
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Registered accounts
//!
//! # File Format (`~/.ridi_auth.json`)
//! ```json
//! {
//!   "users": [
//!     { "id": "123_abcdef01", "user_idx": "123", "device_id": "abcdef01-...", "device_name": "PC" }
//!   ],
//!   "active_user": "123_abcdef01"
//! }
//! ```
//!
//! A missing or unreadable file is treated as an empty config. Every
//! mutation is written back immediately.

use crate::error::{RidiError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Config file name inside the home directory
pub const CONFIG_FILE_NAME: &str = ".ridi_auth.json";

/// Device name stored when the API reports none
pub const UNKNOWN_DEVICE: &str = "Unknown Device";

/// Characters of the device id used in a user id
const USER_ID_DEVICE_CHARS: usize = 8;

/// One registered account/device pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    pub user_idx: String,
    pub device_id: String,
    pub device_name: Option<String>,
}

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigData {
    #[serde(default)]
    pub users: Vec<UserData>,
    #[serde(default)]
    pub active_user: Option<String>,
}

/// Default config location (`~/.ridi_auth.json`)
///
/// # Errors
/// - ConfigurationError if the home directory is unknown
pub fn default_config_path() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(CONFIG_FILE_NAME))
        .ok_or_else(|| RidiError::ConfigurationError("home directory not found".into()))
}

/// Id of a user entry: `<user_idx>_<first 8 chars of device_id>`
pub fn make_user_id(user_idx: &str, device_id: &str) -> String {
    let prefix: String = device_id.chars().take(USER_ID_DEVICE_CHARS).collect();
    format!("{}_{}", user_idx, prefix)
}

/// Config file with its loaded contents
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: ConfigData,
}

impl ConfigStore {
    /// Load the config at `path`
    pub fn load<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let config = Self::read(&path);
        Self { path, config }
    }

    fn read(path: &Path) -> ConfigData {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return ConfigData::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            ConfigData::default()
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &ConfigData {
        &self.config
    }

    /// Write the config as pretty JSON, creating parent directories
    ///
    /// # Errors
    /// - ConfigurationError if the file cannot be written
    pub fn save(&self) -> Result<()> {
        let write = || -> Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&self.config)?;
            fs::write(&self.path, json)?;
            Ok(())
        };

        write().map_err(|e| RidiError::ConfigurationError(format!("Failed to save config: {}", e)))?;
        debug!(path = %self.path.display(), "config saved");
        Ok(())
    }

    /// Register a device (or rename a known one) and make it active
    pub fn add_user(&mut self, user_idx: &str, device_id: &str, device_name: Option<&str>) -> Result<()> {
        let id = make_user_id(user_idx, device_id);
        let device_name = Some(
            device_name
                .filter(|n| !n.is_empty())
                .unwrap_or(UNKNOWN_DEVICE)
                .to_string(),
        );

        match self
            .config
            .users
            .iter_mut()
            .find(|u| u.user_idx == user_idx && u.device_id == device_id)
        {
            Some(existing) => existing.device_name = device_name,
            None => self.config.users.push(UserData {
                id: id.clone(),
                user_idx: user_idx.to_string(),
                device_id: device_id.to_string(),
                device_name,
            }),
        }

        self.config.active_user = Some(id);
        self.save()
    }

    /// The active user, if it still exists
    pub fn active_user(&self) -> Option<&UserData> {
        let active = self.config.active_user.as_deref()?;
        self.config.users.iter().find(|u| u.id == active)
    }

    /// Make `user_id` active
    ///
    /// # Returns
    /// `false` if no such user exists
    pub fn switch_user(&mut self, user_id: &str) -> Result<bool> {
        if !self.config.users.iter().any(|u| u.id == user_id) {
            return Ok(false);
        }
        self.config.active_user = Some(user_id.to_string());
        self.save()?;
        Ok(true)
    }

    /// Remove a user; the first remaining user becomes active if needed
    ///
    /// # Returns
    /// `false` if no such user exists
    pub fn remove_user(&mut self, user_id: &str) -> Result<bool> {
        let before = self.config.users.len();
        self.config.users.retain(|u| u.id != user_id);
        if self.config.users.len() == before {
            return Ok(false);
        }

        if self.config.active_user.as_deref() == Some(user_id) {
            self.config.active_user = self.config.users.first().map(|u| u.id.clone());
        }
        self.save()?;
        Ok(true)
    }

    pub fn list_users(&self) -> &[UserData] {
        &self.config.users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("nested").join("auth.json"));
        (dir, store)
    }

    #[test]
    fn test_make_user_id() {
        assert_eq!(make_user_id("123", "abcdef0123456789"), "123_abcdef01");
        assert_eq!(make_user_id("123", "abc"), "123_abc");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let (_dir, store) = store();
        assert!(store.list_users().is_empty());
        assert!(store.active_user().is_none());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(ConfigStore::load(&path).data(), &ConfigData::default());
    }

    #[test]
    fn test_add_user_persists_and_activates() {
        let (_dir, mut store) = store();
        store.add_user("123", "abcdef0123456789", Some("My PC")).unwrap();
        store.add_user("456", "fedcba9876543210", None).unwrap();

        let reloaded = ConfigStore::load(store.path());
        assert_eq!(reloaded.list_users().len(), 2);
        let active = reloaded.active_user().unwrap();
        assert_eq!(active.id, "456_fedcba98");
        assert_eq!(active.device_name.as_deref(), Some(UNKNOWN_DEVICE));
    }

    #[test]
    fn test_add_existing_user_updates_name() {
        let (_dir, mut store) = store();
        store.add_user("123", "abcdef0123456789", Some("Old")).unwrap();
        store.add_user("456", "fedcba9876543210", None).unwrap();
        store.add_user("123", "abcdef0123456789", Some("New")).unwrap();

        assert_eq!(store.list_users().len(), 2);
        let active = store.active_user().unwrap();
        assert_eq!(active.id, "123_abcdef01");
        assert_eq!(active.device_name.as_deref(), Some("New"));
    }

    #[test]
    fn test_switch_user() {
        let (_dir, mut store) = store();
        store.add_user("1", "aaaaaaaaaaaa", None).unwrap();
        store.add_user("2", "bbbbbbbbbbbb", None).unwrap();

        assert!(store.switch_user("1_aaaaaaaa").unwrap());
        assert_eq!(store.active_user().unwrap().user_idx, "1");
        assert!(!store.switch_user("nobody").unwrap());
    }

    #[test]
    fn test_remove_active_user_falls_back_to_first() {
        let (_dir, mut store) = store();
        store.add_user("1", "aaaaaaaaaaaa", None).unwrap();
        store.add_user("2", "bbbbbbbbbbbb", None).unwrap();

        assert!(store.remove_user("2_bbbbbbbb").unwrap());
        assert_eq!(store.active_user().unwrap().id, "1_aaaaaaaa");
        assert!(store.remove_user("1_aaaaaaaa").unwrap());
        assert!(store.active_user().is_none());
        assert!(store.data().active_user.is_none());
        assert!(!store.remove_user("1_aaaaaaaa").unwrap());
    }

    #[test]
    fn test_file_layout_is_snake_case() {
        let (_dir, mut store) = store();
        store.add_user("7", "0011223344", Some("Tab")).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"active_user\": \"7_00112233\""));
        assert!(raw.contains("\"device_name\": \"Tab\""));
    }
}
