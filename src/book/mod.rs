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


//! Books in the local RIDI library
//!
//! - [`asset`] - one downloaded book folder (payload + `.dat` key file)
//! - [`library`] - platform library location and folder scan
//! - [`service`] - listing, filtering and metadata summaries

pub mod asset;
pub mod library;
pub mod service;

// Re-export commonly used types
pub use asset::{BookAsset, BookFormat, FileKind};
pub use library::{discover_books, library_path};
pub use service::{BookService, BookSummary};
