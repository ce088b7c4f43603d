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


//! Output file naming
//!
//! # Rules
//! - Characters invalid on Windows (`\ / : * ? " < > |`) become spaces
//! - Whitespace runs collapse to one space
//! - Names are capped at 120 characters
//! - Windows device names (`CON`, `COM1`, ...) get a `_` prefix on every
//!   platform, so exports stay portable between machines
//! - Collisions get ` (1)`, ` (2)`, ... before the extension

use crate::error::{RidiError, Result};
use std::path::{Path, PathBuf};

/// Default cap on a sanitized name, in characters
pub const MAX_FILENAME_CHARS: usize = 120;

/// Collision suffixes tried before giving up
pub const MAX_COLLISION_ATTEMPTS: usize = 1000;

const UNSAFE_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Fallback for names that sanitize to nothing
const UNTITLED: &str = "untitled";

/// Turn a book title into a safe file name (without extension)
pub fn sanitize_filename(name: &str) -> String {
    sanitize_filename_with_limit(name, MAX_FILENAME_CHARS)
}

/// [`sanitize_filename`] with an explicit character cap
pub fn sanitize_filename_with_limit(name: &str, max_chars: usize) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    let mut sanitized = replaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if sanitized.chars().count() > max_chars {
        sanitized = sanitized.chars().take(max_chars).collect::<String>();
        sanitized.truncate(sanitized.trim_end().len());
    }

    sanitized = handle_reserved_names(&sanitized);

    if sanitized.is_empty() {
        UNTITLED.to_string()
    } else {
        sanitized
    }
}

/// Prefix Windows device names with `_`
fn handle_reserved_names(name: &str) -> String {
    let upper = name.to_uppercase();
    if RESERVED_NAMES.contains(&upper.as_str()) {
        format!("_{}", name)
    } else {
        name.to_string()
    }
}

/// Find a free path by appending ` (1)`, ` (2)`, ... to the stem
///
/// # Errors
/// - FileAlreadyExists if every candidate up to ` (999)` is taken
pub fn avoid_collision(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Ok(path.to_path_buf());
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for counter in 1..MAX_COLLISION_ATTEMPTS {
        let candidate = parent.join(format!("{} ({}){}", stem, counter, extension));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(RidiError::FileAlreadyExists(path.display().to_string()))
}
