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


//! EPUB container access
//!
//! Vendor EPUBs are frequently malformed, so the package document is
//! scanned with regular expressions rather than an XML parser. Attribute
//! values may use single or double quotes.
//!
//! # Entry Lookup
//! Exact name first, then case-insensitive. A leading `/` is ignored.

use crate::error::{RidiError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

/// Location of the container document inside every EPUB
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Largest entry read into memory
pub const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Upper bound on the buffer reserved from a declared entry size
const MAX_PREALLOC_BYTES: u64 = 1024 * 1024;

lazy_static! {
    static ref FULL_PATH: Regex = Regex::new(r#"full-path=["']([^"']+)["']"#).unwrap();
    static ref MANIFEST_ITEM: Regex = Regex::new(r"(?i)<item\s[^>]+>").unwrap();
    static ref ID_ATTR: Regex = attr_regex("id");
    static ref HREF_ATTR: Regex = attr_regex("href");
    static ref MEDIA_TYPE_ATTR: Regex = attr_regex("media-type");
    static ref CONTENT_ATTR: Regex = attr_regex("content");
    static ref SRC_ATTR: Regex = attr_regex("src");
}

fn attr_regex(name: &str) -> Regex {
    Regex::new(&format!(r#"{}=["']([^"']+)["']"#, regex::escape(name))).unwrap()
}

/// One `<item>` of the OPF manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    /// Empty when the attribute is missing
    pub media_type: String,
}

impl ManifestItem {
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// An EPUB opened from memory
pub struct EpubArchive<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    names: Vec<String>,
}

impl<'a> EpubArchive<'a> {
    /// Open decrypted EPUB bytes
    ///
    /// # Errors
    /// - MetadataUnavailable if the bytes are not a ZIP archive
    pub fn open(data: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| RidiError::MetadataUnavailable(format!("not a zip archive: {}", e)))?;
        let names = archive.file_names().map(str::to_string).collect();
        Ok(Self { archive, names })
    }

    /// All entry names, in archive order
    pub fn entry_names(&self) -> &[String] {
        &self.names
    }

    /// Resolve a path to the stored entry name
    pub fn find_entry(&self, path: &str) -> Option<String> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if let Some(name) = self.names.iter().find(|n| n.as_str() == path) {
            return Some(name.clone());
        }

        let lower = path.to_lowercase();
        self.names.iter().find(|n| n.to_lowercase() == lower).cloned()
    }

    /// Read an entry's bytes
    ///
    /// Entries declaring or inflating to more than [`MAX_ENTRY_BYTES`] are
    /// refused. The declared size is never trusted for allocation.
    pub fn read(&mut self, path: &str) -> Option<Vec<u8>> {
        let name = self.find_entry(path)?;
        let file = self.archive.by_name(&name).ok()?;

        let declared = file.size();
        if declared > MAX_ENTRY_BYTES {
            debug!(entry = %name, declared, "entry too large");
            return None;
        }

        let mut buf = Vec::with_capacity(declared.min(MAX_PREALLOC_BYTES) as usize);
        file.take(MAX_ENTRY_BYTES + 1).read_to_end(&mut buf).ok()?;
        if buf.len() as u64 > MAX_ENTRY_BYTES {
            debug!(entry = %name, "entry inflates past limit");
            return None;
        }
        Some(buf)
    }

    /// Read an entry as text (invalid UTF-8 replaced)
    pub fn read_text(&mut self, path: &str) -> Option<String> {
        self.read(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Path of the OPF package document, from `META-INF/container.xml`
    pub fn package_path(&mut self) -> Option<String> {
        let container = self.read_text(CONTAINER_PATH)?;
        FULL_PATH
            .captures(&container)
            .map(|caps| caps[1].to_string())
    }
}

/// Value of `name="..."` (or single-quoted) inside one tag
pub fn attr(tag: &str, name: &str) -> Option<String> {
    let cached: &Regex = match name {
        "id" => &ID_ATTR,
        "href" => &HREF_ATTR,
        "media-type" => &MEDIA_TYPE_ATTR,
        "content" => &CONTENT_ATTR,
        "src" => &SRC_ATTR,
        _ => return capture(&attr_regex(name), tag),
    };
    capture(cached, tag)
}

fn capture(re: &Regex, tag: &str) -> Option<String> {
    re.captures(tag).map(|caps| caps[1].to_string())
}

/// Manifest items in document order
///
/// Items without an id or href are skipped.
pub fn parse_manifest(opf: &str) -> Vec<ManifestItem> {
    MANIFEST_ITEM
        .find_iter(opf)
        .filter_map(|m| {
            let tag = m.as_str();
            Some(ManifestItem {
                id: attr(tag, "id")?,
                href: attr(tag, "href")?,
                media_type: attr(tag, "media-type").unwrap_or_default(),
            })
        })
        .collect()
}

/// Directory part of an entry path, with trailing `/` (empty at the root)
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    }
}

/// Resolve an href against a base directory
///
/// An href starting with `/` is archive-absolute. Query and fragment are
/// dropped and `.`/`..` segments are folded.
pub fn resolve_path(base_dir: &str, href: &str) -> String {
    if let Some(absolute) = href.strip_prefix('/') {
        return absolute.to_string();
    }
    if base_dir.is_empty() {
        return href.to_string();
    }

    let clean = href.split(['?', '#']).next().unwrap_or_default();
    let joined = format!("{}{}", base_dir, clean);

    let mut resolved: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            ".." => {
                resolved.pop();
            }
            "." => {}
            _ => resolved.push(segment),
        }
    }
    resolved.join("/")
}
