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


//! PKCS7 handling and output format sniffing
//!
//! All ciphers in this crate run with `NoPadding`; padding is stripped here
//! so that a malformed pad is a hard `InvalidPadding` failure instead of a
//! best-effort strip.

use crate::book::BookFormat;
use crate::error::{RidiError, Result};

/// Largest PKCS7 pad value accepted (one AES block)
pub const MAX_PKCS7_PAD: u8 = 16;

/// ZIP local-file-header, end-of-central-directory and spanned-archive markers
const EPUB_MAGICS: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check whether `data` already looks like a plaintext book of `format`
///
/// Pure magic-byte predicate on the first four bytes.
pub fn is_valid_output(format: BookFormat, data: &[u8]) -> bool {
    match format {
        BookFormat::Epub => EPUB_MAGICS.iter().any(|magic| data.starts_with(*magic)),
        BookFormat::Pdf => data.starts_with(PDF_MAGIC),
    }
}

/// Strip PKCS7 padding, validating every pad byte
///
/// # Errors
/// - InvalidPadding if the buffer is empty, the pad value is 0 or above 16,
///   exceeds the buffer, or any of the trailing pad bytes differ
pub fn remove_pkcs7(data: &[u8]) -> Result<&[u8]> {
    let pad = *data.last().ok_or(RidiError::InvalidPadding)?;
    if pad == 0 || pad > MAX_PKCS7_PAD || pad as usize > data.len() {
        return Err(RidiError::InvalidPadding);
    }

    let body_len = data.len() - pad as usize;
    if data[body_len..].iter().any(|&b| b != pad) {
        return Err(RidiError::InvalidPadding);
    }

    Ok(&data[..body_len])
}

/// Append PKCS7 padding for a block size in bytes
///
/// Always adds at least one byte; a full block when already aligned.
pub fn pad_pkcs7(data: &[u8], block_size: usize) -> Vec<u8> {
    let pad = block_size - data.len() % block_size;
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.resize(data.len() + pad, pad as u8);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epub_magics() {
        assert!(is_valid_output(BookFormat::Epub, b"PK\x03\x04rest"));
        assert!(is_valid_output(BookFormat::Epub, b"PK\x05\x06"));
        assert!(is_valid_output(BookFormat::Epub, b"PK\x07\x08\x00"));
        assert!(!is_valid_output(BookFormat::Epub, b"PK\x01\x02"));
        assert!(!is_valid_output(BookFormat::Epub, b"%PDF-1.7"));
    }

    #[test]
    fn test_pdf_magic() {
        assert!(is_valid_output(BookFormat::Pdf, b"%PDF-1.4\n"));
        assert!(!is_valid_output(BookFormat::Pdf, b"PK\x03\x04"));
        assert!(!is_valid_output(BookFormat::Pdf, b"%PD"));
        assert!(!is_valid_output(BookFormat::Pdf, b""));
    }

    #[test]
    fn test_magic_is_size_independent() {
        let mut big = vec![0u8; 1 << 16];
        assert!(!is_valid_output(BookFormat::Epub, &big));
        big[..4].copy_from_slice(b"PK\x03\x04");
        assert!(is_valid_output(BookFormat::Epub, &big));
    }

    #[test]
    fn test_pad_then_strip_restores_input() {
        for len in 0..40 {
            let data: Vec<u8> = (0..len as u8).collect();
            let padded = pad_pkcs7(&data, 16);
            assert_eq!(padded.len() % 16, 0);
            assert_eq!(remove_pkcs7(&padded).unwrap(), &data[..]);
        }
    }

    #[test]
    fn test_strip_rejects_zero_and_oversized_pad() {
        assert!(matches!(remove_pkcs7(&[1, 2, 3, 0]), Err(RidiError::InvalidPadding)));
        let mut block = vec![17u8; 32];
        assert!(matches!(remove_pkcs7(&block), Err(RidiError::InvalidPadding)));
        block[31] = 255;
        assert!(matches!(remove_pkcs7(&block), Err(RidiError::InvalidPadding)));
    }

    #[test]
    fn test_strip_rejects_inconsistent_pad_bytes() {
        let mut data = vec![0xAA; 12];
        data.extend_from_slice(&[3, 4, 4, 4]);
        // last byte says 4, but only three trailing bytes are 4
        assert!(matches!(remove_pkcs7(&data), Err(RidiError::InvalidPadding)));
    }

    #[test]
    fn test_strip_rejects_empty_and_short_buffers() {
        assert!(matches!(remove_pkcs7(&[]), Err(RidiError::InvalidPadding)));
        assert!(matches!(remove_pkcs7(&[5, 5]), Err(RidiError::InvalidPadding)));
    }

    #[test]
    fn test_strip_full_block_pad() {
        let data = [16u8; 16];
        assert_eq!(remove_pkcs7(&data).unwrap(), &[] as &[u8]);
    }
}
