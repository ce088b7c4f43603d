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


//! Rijndael with a 128-bit block and arbitrary word-aligned keys
//!
//! The RIDI app encrypts its settings store with a JavaScript AES
//! implementation that accepts any key length in whole 32-bit words and
//! runs `Nk + 6` rounds. A padded UUID key is 48 bytes (`Nk = 12`,
//! 18 rounds), which no standard AES implementation accepts.
//!
//! The round functions come from `aes::hazmat`; only the key schedule is
//! generalized here. For 16/24/32-byte keys the output matches AES.
//!
//! # Key Schedule
//! ```text
//! w[i] = key[i]                                  i < Nk
//! w[i] = w[i-Nk] ^ SubWord(RotWord(w[i-1])) ^ Rcon   i % Nk == 0
//! w[i] = w[i-Nk] ^ SubWord(w[i-1])               Nk > 6, i % Nk == 4
//! w[i] = w[i-Nk] ^ w[i-1]                        otherwise
//! ```

use crate::error::{RidiError, Result};
use aes::hazmat::{cipher_round, equiv_inv_cipher_round, inv_mix_columns, mix_columns};
use aes::Block;

/// Round constants; index 0 is never used
const RCON: [u8; 11] = [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1b, 0x36];

/// Shortest accepted key (4 words)
pub const MIN_KEY_LEN: usize = 16;

type Word = [u8; 4];

/// Expanded Rijndael key schedule
#[derive(Clone)]
pub struct Rijndael {
    /// `Nr + 1` encryption round keys
    round_keys: Vec<Block>,
    /// Round keys for the equivalent inverse cipher (InvMixColumns applied to 1..Nr-1)
    inv_round_keys: Vec<Block>,
}

impl Rijndael {
    /// Expand a key
    ///
    /// # Errors
    /// - DecryptionFailed if the key is shorter than 16 bytes or not a whole number of words
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() < MIN_KEY_LEN || key.len() % 4 != 0 {
            return Err(RidiError::DecryptionFailed(format!(
                "Unsupported Rijndael key length: {} bytes",
                key.len()
            )));
        }

        let nk = key.len() / 4;
        let rounds = nk + 6;
        let total_words = 4 * (rounds + 1);

        let mut words: Vec<Word> = key
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();

        for i in nk..total_words {
            let mut temp = words[i - 1];
            if i % nk == 0 {
                temp.rotate_left(1);
                temp = sub_word(temp);
                temp[0] ^= RCON[i / nk];
            } else if nk > 6 && i % nk == 4 {
                temp = sub_word(temp);
            }
            let prev = words[i - nk];
            words.push([
                prev[0] ^ temp[0],
                prev[1] ^ temp[1],
                prev[2] ^ temp[2],
                prev[3] ^ temp[3],
            ]);
        }

        let round_keys: Vec<Block> = words
            .chunks_exact(4)
            .map(|chunk| {
                let mut block = Block::default();
                for (dst, word) in block.chunks_exact_mut(4).zip(chunk) {
                    dst.copy_from_slice(word);
                }
                block
            })
            .collect();

        let inv_round_keys = round_keys
            .iter()
            .enumerate()
            .map(|(round, key)| {
                let mut key = *key;
                if round != 0 && round != rounds {
                    inv_mix_columns(&mut key);
                }
                key
            })
            .collect();

        Ok(Self {
            round_keys,
            inv_round_keys,
        })
    }

    /// Number of rounds (`Nk + 6`)
    pub fn rounds(&self) -> usize {
        self.round_keys.len() - 1
    }

    /// Decrypt one block in place
    pub fn decrypt_block(&self, block: &mut Block) {
        let rounds = self.rounds();
        xor_in_place(block, &self.inv_round_keys[rounds]);

        for round in (1..rounds).rev() {
            equiv_inv_cipher_round(block, &self.inv_round_keys[round]);
        }

        // last round has no InvMixColumns
        equiv_inv_cipher_round(block, &Block::default());
        mix_columns(block);
        xor_in_place(block, &self.inv_round_keys[0]);
    }

    /// Encrypt one block in place
    pub fn encrypt_block(&self, block: &mut Block) {
        let rounds = self.rounds();
        xor_in_place(block, &self.round_keys[0]);

        for round in 1..rounds {
            cipher_round(block, &self.round_keys[round]);
        }

        // last round has no MixColumns
        cipher_round(block, &Block::default());
        inv_mix_columns(block);
        xor_in_place(block, &self.round_keys[rounds]);
    }

    /// ECB decrypt without padding removal
    ///
    /// # Errors
    /// - DecryptionFailed if the input is empty or not block aligned
    pub fn decrypt_ecb(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(RidiError::DecryptionFailed(format!(
                "ECB input length {} is not a positive multiple of 16",
                ciphertext.len()
            )));
        }

        let mut out = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.chunks_exact(16) {
            let mut block = Block::clone_from_slice(chunk);
            self.decrypt_block(&mut block);
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}

/// SubBytes on a single word
///
/// A state whose four columns are equal is unchanged by ShiftRows, so one
/// zero-key forward round followed by InvMixColumns leaves exactly SubBytes.
fn sub_word(word: Word) -> Word {
    let mut block = Block::default();
    for column in block.chunks_exact_mut(4) {
        column.copy_from_slice(&word);
    }
    cipher_round(&mut block, &Block::default());
    inv_mix_columns(&mut block);
    [block[0], block[1], block[2], block[3]]
}

fn xor_in_place(block: &mut Block, key: &Block) {
    for (b, k) in block.iter_mut().zip(key.iter()) {
        *b ^= k;
    }
}
