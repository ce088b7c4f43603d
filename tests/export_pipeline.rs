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

//! End-to-end export of a fake RIDI library
//!
//! Books are encrypted the way the RIDI app stores them: a `.dat` key
//! record under the device id and a payload under the session key.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use ridi_core::book::{BookFormat, BookService};
use ridi_core::file::{ExportService, ExportStatus};
use ridi_core::RidiError;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const DEVICE_ID: &str = "0123456789abcdef-4e5f-6789-abcd-ef0123456789";
const SESSION_KEY: &[u8; 16] = b"SESSIONKEY123456";

fn encrypt(key: &[u8; 16], iv: [u8; 16], plaintext: &[u8]) -> Vec<u8> {
    let len = plaintext.len();
    let mut buf = plaintext.to_vec();
    buf.resize(len + 16 - len % 16, 0);
    let ciphertext = cbc::Encryptor::<Aes128>::new(key.into(), (&iv).into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, len)
        .unwrap()
        .to_vec();

    let mut out = iv.to_vec();
    out.extend(ciphertext);
    out
}

fn key_record() -> Vec<u8> {
    let mut record = vec![b'x'; 68];
    record.extend_from_slice(SESSION_KEY);
    record.extend_from_slice(b"trailing-record-data");
    record
}

fn device_key() -> [u8; 16] {
    DEVICE_ID.as_bytes()[..16].try_into().unwrap()
}

fn epub_with_title(title: &str) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    zip.start_file("mimetype", options).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    zip.start_file("META-INF/container.xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#,
    )
    .unwrap();
    zip.start_file("OEBPS/content.opf", options).unwrap();
    write!(
        zip,
        r#"<package xmlns:dc="http://purl.org/dc/elements/1.1/"><metadata><dc:title>{}</dc:title></metadata></package>"#,
        title
    )
    .unwrap();

    zip.finish().unwrap().into_inner()
}

/// Write one book folder with a valid key file
fn add_book(root: &Path, id: &str, ext: &str, payload: &[u8], encrypt_payload: bool) {
    let dir = root.join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{}.dat", id)), encrypt(&device_key(), [7u8; 16], &key_record())).unwrap();

    let stored = if encrypt_payload {
        encrypt(SESSION_KEY, [9u8; 16], payload)
    } else {
        payload.to_vec()
    };
    fs::write(dir.join(format!("{}.{}", id, ext)), stored).unwrap();
}

#[tokio::test]
async fn test_exports_epub_under_its_title() {
    let library = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    add_book(library.path(), "100", "epub", &epub_with_title("Night: Watch?"), true);

    let books = BookService::new().available_books_in(library.path()).unwrap();
    let exporter = ExportService::new(output.path());

    let mut statuses = Vec::new();
    let summary = exporter
        .export_books(&books, DEVICE_ID, |p| statuses.push(p.status.clone()))
        .await;

    assert!(summary.all_succeeded());
    let expected = output.path().join("Night Watch.epub");
    assert_eq!(fs::read(&expected).unwrap(), epub_with_title("Night: Watch?"));
    assert!(matches!(statuses[0], ExportStatus::Processing));
    assert!(matches!(&statuses[1], ExportStatus::Success(path) if path == &expected));

    // Exporting again never overwrites
    let again = exporter.export_books(&books, DEVICE_ID, |_| {}).await;
    assert!(again.all_succeeded());
    assert!(output.path().join("Night Watch (1).epub").exists());
}

#[tokio::test]
async fn test_plain_pdf_is_copied_under_book_id() {
    let library = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let pdf = b"%PDF-1.4\nnot really a document\n%%EOF".to_vec();
    add_book(library.path(), "200", "pdf", &pdf, false);

    let books = BookService::new().available_books_in(library.path()).unwrap();
    assert_eq!(books[0].format(), BookFormat::Pdf);

    let summary = ExportService::new(output.path())
        .export_books(&books, DEVICE_ID, |_| {})
        .await;

    assert!(summary.all_succeeded());
    assert_eq!(fs::read(output.path().join("200.pdf")).unwrap(), pdf);
}

#[tokio::test]
async fn test_wrong_device_fails_only_that_batch_entry() {
    let library = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    add_book(library.path(), "300", "epub", &epub_with_title("Kept"), true);
    fs::create_dir_all(library.path().join("301")).unwrap();
    fs::write(library.path().join("301").join("301.epub"), b"orphan").unwrap();

    let service = BookService::new();
    let books = service.available_books_in(library.path()).unwrap();
    assert_eq!(books.len(), 1);

    let summary = ExportService::new(output.path())
        .export_books(&books, "ffffffffffffffff-other-device", |_| {})
        .await;
    assert_eq!(summary.success, 0);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].id, "300");
    assert!(fs::read_dir(output.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_listing_and_filters() {
    let library = tempfile::tempdir().unwrap();
    add_book(library.path(), "400", "epub", &epub_with_title("Alpha Story"), true);
    add_book(library.path(), "401", "epub", &epub_with_title("Beta Story"), true);

    let service = BookService::new();
    let books = service.available_books_in(library.path()).unwrap();

    let summaries = service.books_with_metadata(&books, DEVICE_ID, |_, _, _| {}).await;
    let titles: Vec<&str> = summaries.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Alpha Story", "Beta Story"]);

    let beta = service.filter_by_name(books.clone(), DEVICE_ID, Some("Beta")).await;
    assert_eq!(beta.len(), 1);
    assert_eq!(beta[0].id(), "401");

    assert!(matches!(
        service.filter_by_id(books, Some("999")),
        Err(RidiError::NoBooksFound(_))
    ));
}
