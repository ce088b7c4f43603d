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


//! Per-book session key recovery
//!
//! # `.dat` Layout
//! ```text
//! [0..16)   IV
//! [16..)    AES-128-CBC ciphertext, key = first 16 bytes of the device id
//! ```
//!
//! # Key Record (decrypted, PKCS7 stripped)
//! - At least 84 bytes long
//! - Bytes `[68..84)` hold the session key as 16 ASCII characters
//!
//! The key bytes go through a UTF-8 decode/encode round trip that drops
//! invalid sequences, as the vendor does. A record whose key slice is not
//! clean UTF-8 therefore comes out short and is rejected.

use crate::book::{BookAsset, FileKind};
use crate::crypto::{aes_128_cbc_decrypt, padding::remove_pkcs7, AES_BLOCK_SIZE};
use crate::error::{RidiError, Result};
use std::fmt;
use std::fs;
use tracing::debug;

/// Length of an AES-128 session key
pub const SESSION_KEY_LEN: usize = 16;

/// Start of the session key inside the decrypted key record
pub const SESSION_KEY_OFFSET: usize = 68;

/// Minimum decrypted key record length (end of the session key slice)
pub const MIN_KEY_RECORD_LEN: usize = SESSION_KEY_OFFSET + SESSION_KEY_LEN;

/// Newtype wrapper around a book's 16-byte AES session key
///
/// Never persisted. `Debug` output is redacted.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Create a SessionKey from a 16-byte array
    pub fn new(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a SessionKey from a slice
    ///
    /// # Errors
    /// - InvalidKeyLength if the slice is not exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SESSION_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| RidiError::InvalidKeyLength { len: bytes.len() })?;
        Ok(Self(array))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }

    /// Lowercase hex string, for debugging only
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// Derive the session key of a book from its `.dat` file
///
/// # Arguments
/// * `asset` - The book whose auxiliary file is read
/// * `device_id` - Registered device id; its first 16 UTF-8 bytes are the AES key
///
/// # Errors
/// - MissingFile if the `.dat` file does not exist
/// - InvalidKeyLength if the device id is shorter than 16 bytes, or the
///   recovered key is not 16 bytes
/// - DecryptionFailed if the file has no IV or a partial trailing block
/// - InvalidPadding if the PKCS7 check fails
/// - ShortPlaintext if the key record is below 84 bytes
pub fn derive_session_key(asset: &BookAsset, device_id: &str) -> Result<SessionKey> {
    let data_path = asset.file(FileKind::Data);
    if !data_path.exists() {
        return Err(RidiError::missing_data(data_path));
    }

    let data = fs::read(&data_path)?;
    debug!(book_id = asset.id(), path = %data_path.display(), size = data.len(), "read data file");

    derive_session_key_from_bytes(&data, device_id)
}

/// Derive a session key from raw `.dat` contents
pub fn derive_session_key_from_bytes(data: &[u8], device_id: &str) -> Result<SessionKey> {
    let device_key = device_key(device_id)?;

    if data.len() < AES_BLOCK_SIZE {
        return Err(RidiError::DecryptionFailed(format!(
            "Data file too small to contain IV: {} bytes",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(AES_BLOCK_SIZE);

    let decrypted = aes_128_cbc_decrypt(&device_key, iv, ciphertext)?;
    let record = remove_pkcs7(&decrypted)?;

    if record.len() < MIN_KEY_RECORD_LEN {
        return Err(RidiError::ShortPlaintext { len: record.len() });
    }

    let key_bytes = utf8_round_trip(&record[SESSION_KEY_OFFSET..MIN_KEY_RECORD_LEN]);
    SessionKey::from_slice(&key_bytes)
}

/// First 16 UTF-8 bytes of the device id
fn device_key(device_id: &str) -> Result<[u8; SESSION_KEY_LEN]> {
    let bytes = device_id.as_bytes();
    if bytes.len() < SESSION_KEY_LEN {
        return Err(RidiError::InvalidKeyLength { len: bytes.len() });
    }

    let mut key = [0u8; SESSION_KEY_LEN];
    key.copy_from_slice(&bytes[..SESSION_KEY_LEN]);
    Ok(key)
}

/// Decode as UTF-8 dropping invalid sequences, then encode again
fn utf8_round_trip(bytes: &[u8]) -> Vec<u8> {
    bytes
        .utf8_chunks()
        .map(|chunk| chunk.valid())
        .collect::<String>()
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::padding::pad_pkcs7;
    use crate::crypto::tests::aes_128_cbc_encrypt;

    const DEVICE_ID: &str = "0123456789abcdef-device-uuid";
    const IV: [u8; 16] = [7u8; 16];

    fn key_record(session_key: &[u8]) -> Vec<u8> {
        let mut record = vec![b'x'; SESSION_KEY_OFFSET];
        record.extend_from_slice(session_key);
        record.extend_from_slice(b"trailer");
        record
    }

    fn dat_file(record: &[u8]) -> Vec<u8> {
        let key: [u8; 16] = DEVICE_ID.as_bytes()[..16].try_into().unwrap();
        let mut out = IV.to_vec();
        out.extend(aes_128_cbc_encrypt(&key, &IV, &pad_pkcs7(record, 16)));
        out
    }

    #[test]
    fn test_derive_recovers_key_at_offset_68() {
        let data = dat_file(&key_record(b"SESSIONKEY123456"));
        let key = derive_session_key_from_bytes(&data, DEVICE_ID).unwrap();
        assert_eq!(key.as_bytes(), b"SESSIONKEY123456");
    }

    #[test]
    fn test_derive_is_deterministic() {
        let data = dat_file(&key_record(b"abcdefghijklmnop"));
        let first = derive_session_key_from_bytes(&data, DEVICE_ID).unwrap();
        let second = derive_session_key_from_bytes(&data, DEVICE_ID).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_exact_minimum_record_length() {
        let mut record = vec![b'x'; SESSION_KEY_OFFSET];
        record.extend_from_slice(b"0000111122223333");
        assert_eq!(record.len(), MIN_KEY_RECORD_LEN);
        let key = derive_session_key_from_bytes(&dat_file(&record), DEVICE_ID).unwrap();
        assert_eq!(key.as_bytes(), b"0000111122223333");
    }

    #[test]
    fn test_83_byte_record_is_short_plaintext() {
        // 83 bytes pad to 96, plus the IV the file is 112 bytes
        let record = vec![b'x'; 83];
        let data = dat_file(&record);
        match derive_session_key_from_bytes(&data, DEVICE_ID) {
            Err(RidiError::ShortPlaintext { len }) => assert_eq!(len, 83),
            other => panic!("expected ShortPlaintext, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_device_id_fails_padding_or_layout() {
        let data = dat_file(&key_record(b"SESSIONKEY123456"));
        let result = derive_session_key_from_bytes(&data, "ffffffffffffffff-other");
        assert!(result.map_or(true, |key| key.as_bytes() != b"SESSIONKEY123456"));
    }

    #[test]
    fn test_invalid_utf8_in_key_slice_is_rejected() {
        let mut session = *b"SESSIONKEY123456";
        session[3] = 0xFF;
        let data = dat_file(&key_record(&session));
        match derive_session_key_from_bytes(&data, DEVICE_ID) {
            Err(RidiError::InvalidKeyLength { len }) => assert_eq!(len, 15),
            other => panic!("expected InvalidKeyLength, got {:?}", other),
        }
    }

    #[test]
    fn test_short_device_id_is_rejected() {
        let data = dat_file(&key_record(b"SESSIONKEY123456"));
        assert!(matches!(
            derive_session_key_from_bytes(&data, "short"),
            Err(RidiError::InvalidKeyLength { len: 5 })
        ));
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        assert!(matches!(
            derive_session_key_from_bytes(&[0u8; 10], DEVICE_ID),
            Err(RidiError::DecryptionFailed(_))
        ));
        assert!(matches!(
            derive_session_key_from_bytes(&[0u8; 40], DEVICE_ID),
            Err(RidiError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SessionKey::new(*b"SESSIONKEY123456");
        assert_eq!(format!("{:?}", key), "SessionKey([REDACTED])");
        assert_eq!(key.to_hex().len(), 32);
    }

    #[test]
    fn test_missing_data_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("42");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("42.epub"), b"PK\x03\x04").unwrap();
        let asset = BookAsset::new(&dir).unwrap();
        assert!(matches!(
            derive_session_key(&asset, DEVICE_ID),
            Err(RidiError::MissingFile { kind: "data", .. })
        ));
    }
}
