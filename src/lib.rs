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

//! Export of DRM-protected books from a local RIDI Books library
//!
//! # Pipeline
//! 1. [`book::discover_books`] finds the downloaded books of an account
//! 2. [`crypto::derive_session_key`] decrypts a book's `.dat` key file
//!    with the device id
//! 3. [`crypto::decrypt_content`] decrypts the payload (PDFs stored in
//!    plain form pass through)
//! 4. [`metadata::extract_title`] names the output file, sanitized by
//!    [`file::sanitize_filename`]
//!
//! The device id comes from a registered account ([`storage::ConfigStore`]),
//! from the installed app's settings ([`crypto::recover_vault_credentials`])
//! or from the account API ([`api::AuthClient`]).

pub mod api;
pub mod book;
pub mod crypto;
pub mod error;
pub mod file;
pub mod metadata;
pub mod storage;

pub use book::{BookAsset, BookFormat, FileKind};
pub use crypto::{decrypt_content, derive_session_key, recover_vault_credentials, SessionKey};
pub use error::{Result, RidiError};
pub use file::sanitize_filename;
pub use metadata::{extract_cover, extract_title};
