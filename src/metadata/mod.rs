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


//! Book metadata from decrypted content
//!
//! Metadata is best effort. Every public function returns `Option` and a
//! missing title or cover never fails an export.

pub mod cover;
pub mod epub;
pub mod title;

// Re-export commonly used types
pub use cover::extract_cover;
pub use epub::ManifestItem;
pub use title::{extract_title, extract_title_async};
