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


//! Local library location and scanning
//!
//! # Library Roots
//! - macOS: `~/Library/Application Support/Ridibooks/library/_<user_idx>`
//! - Windows: `%APPDATA%/Ridibooks/library/_<user_idx>`

use crate::book::BookAsset;
use crate::error::{RidiError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Library folder of one RIDI account
///
/// # Errors
/// - PlatformNotSupported outside Windows and macOS
/// - FileNotFound if the user's application data directory is unknown
pub fn library_path(user_idx: &str) -> Result<PathBuf> {
    if !cfg!(any(target_os = "windows", target_os = "macos")) {
        return Err(RidiError::PlatformNotSupported("Library discovery".into()));
    }

    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| RidiError::FileNotFound("application data directory".into()))?;

    Ok(dirs
        .config_dir()
        .join("Ridibooks")
        .join("library")
        .join(format!("_{}", user_idx)))
}

/// Every book folder under `root`, sorted by id
///
/// Folders without a payload file are skipped. A missing root is an empty library.
pub fn discover_books(root: &Path) -> Vec<BookAsset> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut books: Vec<BookAsset> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter_map(|path| match BookAsset::new(&path) {
            Ok(book) => Some(book),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping folder");
                None
            }
        })
        .collect();

    books.sort_by(|a, b| a.id().cmp(b.id()));
    books
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BookFormat;

    #[test]
    fn test_discover_books() {
        let root = tempfile::tempdir().unwrap();
        for (id, file) in [("300", "300.pdf"), ("100", "100.epub"), ("200", "notes.txt")] {
            let dir = root.path().join(id);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join(file), b"x").unwrap();
        }
        fs::write(root.path().join("stray.epub"), b"x").unwrap();

        let books = discover_books(root.path());
        let ids: Vec<&str> = books.iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec!["100", "300"]);
        assert_eq!(books[0].format(), BookFormat::Epub);
        assert_eq!(books[1].format(), BookFormat::Pdf);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let root = tempfile::tempdir().unwrap();
        assert!(discover_books(&root.path().join("nope")).is_empty());
    }

    #[cfg(any(target_os = "windows", target_os = "macos"))]
    #[test]
    fn test_library_path_suffix() {
        let path = library_path("12345").unwrap();
        assert!(path.ends_with("Ridibooks/library/_12345"));
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    #[test]
    fn test_library_path_unsupported() {
        assert!(matches!(
            library_path("12345"),
            Err(RidiError::PlatformNotSupported(_))
        ));
    }
}
