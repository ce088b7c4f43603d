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


//! RIDI app settings store (login state recovery)
//!
//! The desktop app keeps its login state in an encrypted JSON document:
//!
//! ```text
//! Windows: %APPDATA%/Ridibooks/datastores/global/Settings
//! macOS:   ~/Library/Application Support/Ridibooks/datastores/global/Settings
//! ```
//!
//! # File Layout
//! - `[0..256)` header, ignored
//! - `[256..)` AES-ECB ciphertext, PKCS7 padded JSON
//!
//! # Keys (tried in order, first valid JSON wins)
//! 1. The keychain password (`com.ridi.books` / `global`). Older app versions
//!    store a base64-wrapped UUID, newer ones the key itself; both are
//!    accepted. Keys that are not a multiple of 16 bytes get one PKCS7 pass
//!    with a 4-word block, so a 36-byte UUID becomes a 48-byte key.
//! 2. `hex(SHA1("Settings-global"))[2..18]`, used as-is.
//!
//! # Outcomes
//! - `Full` - refresh token, device id and username all present
//! - `DeviceOnly` - device id present, login fields missing
//! - nothing - no device id, or any step failed

use crate::crypto::padding::{pad_pkcs7, remove_pkcs7};
use crate::crypto::rijndael::Rijndael;
use crate::error::{RidiError, Result};
use aes::cipher::{block_padding::NoPadding, BlockCipher, BlockDecrypt, BlockDecryptMut, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keychain service the RIDI app stores its settings key under
pub const KEYCHAIN_SERVICE: &str = "com.ridi.books";

/// Keychain account the RIDI app stores its settings key under
pub const KEYCHAIN_ACCOUNT: &str = "global";

/// Bytes of unencrypted header before the ciphertext
pub const SETTINGS_PAYLOAD_OFFSET: usize = 256;

/// Seed of the fallback key
const DERIVED_KEY_SOURCE: &str = "Settings-global";

/// Character range of the SHA1 hex digest used as the fallback key
const DERIVED_KEY_RANGE: std::ops::Range<usize> = 2..18;

/// Block size (in 32-bit words) the app pads short keys to
const KEY_PAD_BLOCK_WORDS: usize = 4;

/// Source of the raw settings key password
///
/// The production source is the OS keychain; tests supply a fixed string.
pub trait KeySource {
    /// Fetch the stored password
    ///
    /// # Errors
    /// - VaultUnavailable if the secret store has no entry or cannot be reached
    fn password(&self) -> Result<String>;
}

/// OS keychain entry (Keychain on macOS, Credential Manager on Windows)
#[derive(Debug, Clone)]
pub struct KeychainKeySource {
    service: String,
    account: String,
}

impl KeychainKeySource {
    pub fn new<S: Into<String>>(service: S, account: S) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl Default for KeychainKeySource {
    fn default() -> Self {
        Self::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
    }
}

impl KeySource for KeychainKeySource {
    fn password(&self) -> Result<String> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| RidiError::VaultUnavailable(format!("keyring init: {}", e)))?;
        entry
            .get_password()
            .map_err(|e| RidiError::VaultUnavailable(format!("keyring read: {}", e)))
    }
}

/// Login state recovered from the settings store
#[derive(Clone, PartialEq, Eq)]
pub struct VaultCredentials {
    pub refresh_token: String,
    pub device_id: String,
    pub username: String,
}

impl fmt::Debug for VaultCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultCredentials")
            .field("refresh_token", &"[REDACTED]")
            .field("device_id", &self.device_id)
            .field("username", &self.username)
            .finish()
    }
}

/// Result of a successful settings recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultOutcome {
    /// Everything needed for automatic login
    Full(VaultCredentials),
    /// Only the device could be identified
    DeviceOnly { device_id: String },
}

impl VaultOutcome {
    /// Device id, present in both outcomes
    pub fn device_id(&self) -> &str {
        match self {
            VaultOutcome::Full(creds) => &creds.device_id,
            VaultOutcome::DeviceOnly { device_id } => device_id,
        }
    }

    /// Full credentials, if recovered
    pub fn credentials(&self) -> Option<&VaultCredentials> {
        match self {
            VaultOutcome::Full(creds) => Some(creds),
            VaultOutcome::DeviceOnly { .. } => None,
        }
    }
}

/// Encrypted settings store of the RIDI app
pub struct SettingsVault<K: KeySource = KeychainKeySource> {
    key_source: K,
    settings_path: PathBuf,
}

impl SettingsVault<KeychainKeySource> {
    /// Vault at the platform settings path, keyed from the OS keychain
    ///
    /// # Errors
    /// - VaultUnavailable on platforms other than Windows and macOS
    pub fn system() -> Result<Self> {
        let settings_path = settings_path().ok_or_else(|| {
            RidiError::VaultUnavailable("settings store is only known on Windows and macOS".into())
        })?;
        Ok(Self::new(KeychainKeySource::default(), settings_path))
    }
}

impl<K: KeySource> SettingsVault<K> {
    pub fn new<P: Into<PathBuf>>(key_source: K, settings_path: P) -> Self {
        Self {
            key_source,
            settings_path: settings_path.into(),
        }
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Decrypt the settings file to its JSON text
    ///
    /// # Errors
    /// - VaultUnavailable if the key, the file or every decryption strategy fails
    pub fn decrypt_settings(&self) -> Result<String> {
        let password = self.key_source.password()?;
        if password.is_empty() {
            return Err(RidiError::VaultUnavailable("keychain entry is empty".into()));
        }
        let candidate = key_candidate(&password);

        if !self.settings_path.exists() {
            return Err(RidiError::VaultUnavailable(format!(
                "settings file not found: {}",
                self.settings_path.display()
            )));
        }
        let blob = fs::read(&self.settings_path)
            .map_err(|e| RidiError::VaultUnavailable(format!("settings read: {}", e)))?;

        decrypt_settings_blob(&blob, &candidate)
    }

    /// Decrypt and classify the settings
    ///
    /// # Errors
    /// - VaultUnavailable if decryption fails or no device id is stored
    pub fn recover(&self) -> Result<VaultOutcome> {
        let json = self.decrypt_settings()?;
        parse_settings(&json)
    }
}

/// Recover login state from the local RIDI app
///
/// Never fails: any problem yields `None`.
pub fn recover_vault_credentials() -> Option<VaultOutcome> {
    let result = SettingsVault::system().and_then(|vault| vault.recover());
    match result {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            debug!(error = %e, "vault recovery failed");
            None
        }
    }
}

/// Platform settings file location
pub fn settings_path() -> Option<PathBuf> {
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        directories::BaseDirs::new().map(|dirs| {
            dirs.config_dir()
                .join("Ridibooks")
                .join("datastores")
                .join("global")
                .join("Settings")
        })
    } else {
        None
    }
}

/// Turn a keychain password into the first-strategy key
///
/// A base64-wrapped hyphenated UUID is unwrapped; anything else is used as-is.
pub fn key_candidate(password: &str) -> String {
    STANDARD
        .decode(password)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .filter(|decoded| decoded.len() == 36 && uuid::Uuid::try_parse(decoded).is_ok())
        .unwrap_or_else(|| password.to_string())
}

/// Fallback key: `hex(SHA1("Settings-global"))[2..18]`
pub fn derived_key() -> String {
    let digest = hex::encode(Sha1::digest(DERIVED_KEY_SOURCE.as_bytes()));
    digest[DERIVED_KEY_RANGE].to_string()
}

type KeyStrategy = (&'static str, fn(&str) -> Vec<u8>);

/// Decryption strategies, in priority order
const STRATEGIES: [KeyStrategy; 2] = [
    ("uuid-key", uuid_strategy_key),
    ("derived-key", derived_strategy_key),
];

fn uuid_strategy_key(candidate: &str) -> Vec<u8> {
    let bytes = candidate.as_bytes();
    let block = KEY_PAD_BLOCK_WORDS * 4;
    if bytes.len() % block != 0 {
        pad_pkcs7(bytes, block)
    } else {
        bytes.to_vec()
    }
}

fn derived_strategy_key(_candidate: &str) -> Vec<u8> {
    derived_key().into_bytes()
}

/// Decrypt a raw settings file (header included)
///
/// # Errors
/// - VaultUnavailable if the file has no payload or no strategy yields settings JSON
pub fn decrypt_settings_blob(blob: &[u8], candidate: &str) -> Result<String> {
    if blob.len() <= SETTINGS_PAYLOAD_OFFSET {
        return Err(RidiError::VaultUnavailable(format!(
            "settings file too small: {} bytes",
            blob.len()
        )));
    }
    let payload = &blob[SETTINGS_PAYLOAD_OFFSET..];

    for (name, make_key) in STRATEGIES {
        let key = make_key(candidate);
        match decrypt_with_key(payload, &key) {
            Ok(json) => {
                debug!(strategy = name, "settings decrypted");
                return Ok(json);
            }
            Err(e) => debug!(strategy = name, error = %e, "settings strategy failed"),
        }
    }

    Err(RidiError::VaultUnavailable(
        "no key strategy produced settings JSON".into(),
    ))
}

fn decrypt_with_key(payload: &[u8], key: &[u8]) -> Result<String> {
    let decrypted = ecb_decrypt(key, payload)?;
    let unpadded = remove_pkcs7(&decrypted)?;
    let text = std::str::from_utf8(unpadded)
        .map_err(|_| RidiError::VaultUnavailable("settings are not UTF-8".into()))?;

    if !looks_like_settings(text) {
        return Err(RidiError::VaultUnavailable("settings are not JSON".into()));
    }
    Ok(text.to_string())
}

/// JSON sniff, not a parse
fn looks_like_settings(text: &str) -> bool {
    text.starts_with('{') && ["data", "user", "schema"].iter().any(|marker| text.contains(marker))
}

/// AES-ECB without padding removal, any word-aligned key size
fn ecb_decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(RidiError::DecryptionFailed(format!(
            "ECB input length {} is not a positive multiple of 16",
            ciphertext.len()
        )));
    }

    match key.len() {
        16 => ecb_decrypt_with::<Aes128>(key, ciphertext),
        24 => ecb_decrypt_with::<Aes192>(key, ciphertext),
        32 => ecb_decrypt_with::<Aes256>(key, ciphertext),
        _ => Rijndael::new(key)?.decrypt_ecb(ciphertext),
    }
}

fn ecb_decrypt_with<C>(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: BlockCipher + BlockDecrypt + KeyInit,
{
    let decryptor = ecb::Decryptor::<C>::new_from_slice(key)
        .map_err(|e| RidiError::DecryptionFailed(format!("Invalid key: {}", e)))?;
    let mut buf = ciphertext.to_vec();
    decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| RidiError::DecryptionFailed(format!("AES-ECB: {}", e)))?;
    Ok(buf)
}

#[derive(Deserialize)]
struct SettingsDocument {
    data: Option<SettingsData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsData {
    auto_login: Option<AutoLogin>,
    device: Option<DeviceInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoLogin {
    refresh_token: Option<String>,
    username: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceInfo {
    device_id: Option<String>,
}

/// Classify decrypted settings JSON
///
/// # Errors
/// - VaultUnavailable if the JSON is malformed or has no device id
pub fn parse_settings(json: &str) -> Result<VaultOutcome> {
    let doc: SettingsDocument = serde_json::from_str(json)
        .map_err(|e| RidiError::VaultUnavailable(format!("settings JSON: {}", e)))?;
    let data = doc
        .data
        .ok_or_else(|| RidiError::VaultUnavailable("settings have no data section".into()))?;

    let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

    let device_id = non_empty(data.device.and_then(|d| d.device_id))
        .ok_or_else(|| RidiError::VaultUnavailable("settings have no device id".into()))?;

    let (refresh_token, username) = match data.auto_login {
        Some(login) => (non_empty(login.refresh_token), non_empty(login.username)),
        None => (None, None),
    };

    Ok(match (refresh_token, username) {
        (Some(refresh_token), Some(username)) => VaultOutcome::Full(VaultCredentials {
            refresh_token,
            device_id,
            username,
        }),
        _ => VaultOutcome::DeviceOnly { device_id },
    })
}
