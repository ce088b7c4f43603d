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


//! On-disk book assets
//!
//! A downloaded RIDI book lives in its own folder named after the book id:
//!
//! ```text
//! <library>/_<user_idx>/
//!   1234567890/
//!     1234567890.epub   <- payload (encrypted book)
//!     1234567890.dat    <- auxiliary file (wrapped session key)
//! ```
//!
//! The format is taken from the payload extension once, at construction,
//! and never re-derived from decrypted bytes.

use crate::error::{RidiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of the auxiliary key file
const DATA_EXTENSION: &str = "dat";

/// Book container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Epub,
    Pdf,
}

impl BookFormat {
    /// Detect the format from a file path extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "epub" => Some(BookFormat::Epub),
            "pdf" => Some(BookFormat::Pdf),
            _ => None,
        }
    }

    /// File extension without the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            BookFormat::Epub => "epub",
            BookFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Which of the two files of a book to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// The payload file (`.epub` / `.pdf`)
    Book,
    /// The auxiliary key file (`.dat`)
    Data,
}

/// A book folder inside the RIDI library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookAsset {
    path: PathBuf,
    id: String,
    format: BookFormat,
}

impl BookAsset {
    /// Build an asset from its folder
    ///
    /// # Errors
    /// - UnsupportedFormat if no regular file with a `.epub`/`.pdf` extension exists
    /// - IoError if the folder cannot be read
    pub fn new<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let id = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RidiError::UnsupportedFormat(path.display().to_string()))?
            .to_string();
        let format = Self::detect_format(&path)?;

        Ok(Self { path, id, format })
    }

    fn detect_format(path: &Path) -> Result<BookFormat> {
        for entry in fs::read_dir(path)? {
            let entry_path = entry?.path();
            if !entry_path.is_file() {
                continue;
            }
            if let Some(format) = BookFormat::from_path(&entry_path) {
                return Ok(format);
            }
        }

        Err(RidiError::UnsupportedFormat(format!(
            "Valid book file not found in: {}",
            path.display()
        )))
    }

    /// Book id (the folder name)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Book folder
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> BookFormat {
        self.format
    }

    /// Resolve one of the book's files
    ///
    /// Picks a regular file whose name starts with the book id and ends with
    /// the expected extension. Falls back to `<id>.<ext>`, which may not exist.
    pub fn file(&self, kind: FileKind) -> PathBuf {
        let ext = self.kind_extension(kind);
        let suffix = format!(".{}", ext);

        if let Ok(entries) = fs::read_dir(&self.path) {
            for entry in entries.flatten() {
                let entry_path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                if entry_path.is_file()
                    && name.starts_with(&self.id)
                    && name.to_lowercase().ends_with(&suffix)
                {
                    return entry_path;
                }
            }
        }

        self.path.join(format!("{}.{}", self.id, ext))
    }

    /// File name used for display and as the untitled export name
    pub fn file_name(&self, kind: FileKind) -> String {
        match kind {
            FileKind::Book => format!("{}.{}", self.id, self.format.extension()),
            FileKind::Data => self
                .file(kind)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("{}.{}", self.id, DATA_EXTENSION)),
        }
    }

    fn kind_extension(&self, kind: FileKind) -> &'static str {
        match kind {
            FileKind::Book => self.format.extension(),
            FileKind::Data => DATA_EXTENSION,
        }
    }
}
