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


//! Book payload decryption
//!
//! # Payload Layout
//! - `[0..16)` IV
//! - `[16..)` AES-128-CBC ciphertext under the book's session key, PKCS7 padded
//!
//! A payload that already starts with the magic bytes of its declared
//! format is returned as-is. The cipher is never touched in that case.

use crate::book::{BookAsset, FileKind};
use crate::crypto::padding::{is_valid_output, remove_pkcs7};
use crate::crypto::{aes_128_cbc_decrypt, SessionKey, AES_BLOCK_SIZE};
use crate::error::{RidiError, Result};
use std::fs;
use tracing::debug;

/// Decrypt a book's payload file
///
/// # Arguments
/// * `asset` - The book to decrypt
/// * `key` - Session key from [`crate::crypto::derive_session_key`]
///
/// # Returns
/// Raw book bytes. No validation beyond the padding check is done here.
///
/// # Errors
/// - MissingFile if the payload does not exist
/// - DecryptionFailed if the payload is shorter than an IV or not block aligned
/// - InvalidPadding if the PKCS7 check fails (usually a wrong key)
pub fn decrypt_content(asset: &BookAsset, key: &SessionKey) -> Result<Vec<u8>> {
    let book_path = asset.file(FileKind::Book);
    if !book_path.exists() {
        return Err(RidiError::missing_book(book_path));
    }

    let data = fs::read(&book_path)?;
    debug!(book_id = asset.id(), size = data.len(), "read payload");

    if is_valid_output(asset.format(), &data) {
        debug!(book_id = asset.id(), format = %asset.format(), "payload already plaintext");
        return Ok(data);
    }

    decrypt_payload(&data, key)
}

/// Decrypt raw payload bytes (IV prefixed)
pub fn decrypt_payload(data: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
    if data.len() < AES_BLOCK_SIZE {
        return Err(RidiError::DecryptionFailed(format!(
            "Payload too small to contain IV: {} bytes",
            data.len()
        )));
    }

    let (iv, ciphertext) = data.split_at(AES_BLOCK_SIZE);
    let decrypted = aes_128_cbc_decrypt(key.as_bytes(), iv, ciphertext)?;
    let content = remove_pkcs7(&decrypted)?;

    Ok(content.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::padding::pad_pkcs7;
    use crate::crypto::tests::aes_128_cbc_encrypt;
    use std::path::Path;

    const BOOK_ID: &str = "111000111";

    fn write_book(root: &Path, ext: &str, payload: &[u8]) -> BookAsset {
        let dir = root.join(BOOK_ID);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.{}", BOOK_ID, ext)), payload).unwrap();
        BookAsset::new(&dir).unwrap()
    }

    fn encrypt_payload(key: &SessionKey, plaintext: &[u8]) -> Vec<u8> {
        let iv = [0x42u8; 16];
        let mut out = iv.to_vec();
        out.extend(aes_128_cbc_encrypt(key.as_bytes(), &iv, &pad_pkcs7(plaintext, 16)));
        out
    }

    #[test]
    fn test_decrypts_epub_payload() {
        let root = tempfile::tempdir().unwrap();
        let key = SessionKey::new(*b"0123456789ABCDEF");
        let plaintext = b"PK\x03\x04 pretend this is a zip archive".to_vec();
        let asset = write_book(root.path(), "epub", &encrypt_payload(&key, &plaintext));

        let content = decrypt_content(&asset, &key).unwrap();
        assert_eq!(content, plaintext);
    }

    #[test]
    fn test_plaintext_pdf_passes_through_untouched() {
        let root = tempfile::tempdir().unwrap();
        // 21 bytes: not block aligned, so any AES attempt would fail
        let payload = b"%PDF-1.7\n%decoy bytes".to_vec();
        let asset = write_book(root.path(), "pdf", &payload);

        let decoy = SessionKey::new([0u8; 16]);
        assert_eq!(decrypt_content(&asset, &decoy).unwrap(), payload);
    }

    #[test]
    fn test_magic_is_checked_against_declared_format() {
        let root = tempfile::tempdir().unwrap();
        // PDF magic inside an .epub asset is not a passthrough
        let payload = b"%PDF-1.7\n%decoy bytes".to_vec();
        let asset = write_book(root.path(), "epub", &payload);

        let result = decrypt_content(&asset, &SessionKey::new([0u8; 16]));
        assert!(matches!(result, Err(RidiError::DecryptionFailed(_))));
    }

    #[test]
    fn test_wrong_key_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let key = SessionKey::new(*b"0123456789ABCDEF");
        let asset = write_book(root.path(), "pdf", &encrypt_payload(&key, b"%PDF-1.4 body"));

        let result = decrypt_content(&asset, &SessionKey::new(*b"FEDCBA9876543210"));
        assert!(result.map_or(true, |content| content != b"%PDF-1.4 body"));
    }

    #[test]
    fn test_payload_shorter_than_iv() {
        let result = decrypt_payload(&[1, 2, 3], &SessionKey::new([0u8; 16]));
        assert!(matches!(result, Err(RidiError::DecryptionFailed(msg)) if msg.contains("IV")));
    }

    #[test]
    fn test_iv_only_payload_has_no_padding() {
        let result = decrypt_payload(&[9u8; 16], &SessionKey::new([0u8; 16]));
        assert!(matches!(result, Err(RidiError::InvalidPadding)));
    }

    #[test]
    fn test_missing_payload() {
        let root = tempfile::tempdir().unwrap();
        let key = SessionKey::new([0u8; 16]);
        let asset = write_book(root.path(), "epub", b"PK\x03\x04");
        fs::remove_file(asset.file(FileKind::Book)).unwrap();

        assert!(matches!(
            decrypt_content(&asset, &key),
            Err(RidiError::MissingFile { kind: "book", .. })
        ));
    }
}
