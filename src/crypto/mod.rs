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


//! Cryptography and DRM removal
//!
//! This module handles key recovery and decryption of RIDI's DRM-protected
//! book files.
//!
//! # Pipeline
//! 1. [`vault`] - recover the device id (and login state) from the RIDI app's
//!    encrypted settings store, once per login
//! 2. [`session`] - unwrap a book's 16-byte session key from its `.dat` file
//! 3. [`content`] - decrypt the `.epub`/`.pdf` payload with the session key
//!
//! # Ciphers
//! - `.dat` and payload: AES-128-CBC, IV prefixed, PKCS7 stripped manually
//! - Settings store: AES-ECB with a 16-byte derived key or a padded
//!   UUID key (see [`rijndael`] for non-standard key sizes)

pub mod content;
pub mod padding;
pub mod rijndael;
pub mod session;
pub mod vault;

use crate::error::{RidiError, Result};
use aes::Aes128;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

// Re-export commonly used types
pub use content::decrypt_content;
pub use padding::{is_valid_output, remove_pkcs7};
pub use session::{derive_session_key, SessionKey};
pub use vault::{recover_vault_credentials, SettingsVault, VaultCredentials, VaultOutcome};

/// AES block size (also the IV length)
pub const AES_BLOCK_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES-128-CBC decrypt without padding removal
///
/// # Errors
/// - DecryptionFailed if the ciphertext is not block aligned or the IV is malformed
pub(crate) fn aes_128_cbc_decrypt(key: &[u8; 16], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(RidiError::DecryptionFailed(format!(
            "Ciphertext length {} is not a multiple of {}",
            ciphertext.len(),
            AES_BLOCK_SIZE
        )));
    }

    let decryptor = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|e| RidiError::DecryptionFailed(format!("Invalid key/IV: {}", e)))?;

    let mut buf = ciphertext.to_vec();
    decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| RidiError::DecryptionFailed(format!("AES-CBC: {}", e)))?;

    Ok(buf)
}
