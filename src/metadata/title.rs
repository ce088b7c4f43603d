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


//! Display title extraction
//!
//! - EPUB: `<dc:title>` of the package document, else the first `<title>`
//! - PDF: the `/Title` entry of the document information dictionary only

use crate::book::BookFormat;
use crate::metadata::epub::EpubArchive;
use lazy_static::lazy_static;
use lopdf::{Document, Object};
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref DC_TITLE: Regex = Regex::new(r"(?i)<dc:title[^>]*>([^<]+)</dc:title>").unwrap();
    static ref PLAIN_TITLE: Regex = Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").unwrap();
}

/// Extract a display title from decrypted book bytes
///
/// Never fails; `None` means the caller should use its own label.
pub fn extract_title(format: BookFormat, data: &[u8]) -> Option<String> {
    let title = match format {
        BookFormat::Epub => epub_title(data),
        BookFormat::Pdf => pdf_title(data),
    };
    if title.is_none() {
        debug!(%format, "no title found");
    }
    title
}

/// Same as [`extract_title`], off the async runtime
///
/// PDF parsing loads the whole object graph, so it runs on the blocking pool.
pub async fn extract_title_async(format: BookFormat, data: Vec<u8>) -> Option<String> {
    tokio::task::spawn_blocking(move || extract_title(format, &data))
        .await
        .ok()
        .flatten()
}

fn epub_title(data: &[u8]) -> Option<String> {
    let mut archive = EpubArchive::open(data).ok()?;
    let opf_path = archive.package_path()?;
    let opf = archive.read_text(&opf_path)?;

    DC_TITLE
        .captures(&opf)
        .or_else(|| PLAIN_TITLE.captures(&opf))
        .and_then(|caps| non_empty(&caps[1]))
}

fn pdf_title(data: &[u8]) -> Option<String> {
    let doc = Document::load_mem(data).ok()?;
    let info = resolve(&doc, doc.trailer.get(b"Info").ok()?)?;
    let title = resolve(&doc, info.as_dict().ok()?.get(b"Title").ok()?)?;

    match title {
        Object::String(bytes, _) => non_empty(&decode_text_string(bytes)),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Decode a PDF text string (UTF-16BE or UTF-8 with BOM, else PDFDocEncoding)
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(utf8) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(utf8).into_owned();
    }
    // PDFDocEncoding agrees with Latin-1 for printable text
    bytes.iter().map(|&b| b as char).collect()
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
