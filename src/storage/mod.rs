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


//! Local persistence
//!
//! Only registered accounts are stored. Keys, tokens and decrypted content
//! are never written here.
//!
//! # Usage Example
//! ```no_run
//! use ridi_core::storage::ConfigStore;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let path = ridi_core::storage::default_config_path()?;
//! let mut store = ConfigStore::load(path);
//! store.add_user("12345", "0a1b2c3d-4e5f-6789-abcd-ef0123456789", Some("Desktop"))?;
//! assert!(store.active_user().is_some());
//! # Ok(())
//! # }
//! ```

pub mod config;

// Re-export commonly used types
pub use config::{default_config_path, ConfigData, ConfigStore, UserData};
