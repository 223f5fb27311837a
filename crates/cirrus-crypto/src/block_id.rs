//! Block ids for staged uploads.
//!
//! A block id is the standard base64 encoding of the chunk index as an
//! 8-byte little-endian integer. All ids of one object therefore have the
//! same length, and decoding an id recovers the index so staged blocks can
//! be put back in order.

use base64::engine::general_purpose;
use base64::Engine;

use crate::error::{CryptoError, CryptoResult};

/// Decoded length of every block id.
pub const BLOCK_ID_LEN: usize = 8;

/// Encode a chunk index as a block id.
///
/// # Examples
///
/// ```
/// use cirrus_crypto::encode_block_id;
///
/// assert_eq!(encode_block_id(0), "AAAAAAAAAAA=");
/// assert_eq!(encode_block_id(1), "AQAAAAAAAAA=");
/// ```
pub fn encode_block_id(chunk_index: i64) -> String {
    general_purpose::STANDARD.encode(chunk_index.to_le_bytes())
}

/// Decode a block id back to its chunk index.
pub fn decode_block_id(block_id: &str) -> CryptoResult<i64> {
    let bytes = general_purpose::STANDARD
        .decode(block_id)
        .map_err(|e| CryptoError::InvalidBase64 {
            block_id: block_id.to_string(),
            reason: e.to_string(),
        })?;
    let raw: [u8; BLOCK_ID_LEN] =
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidBlockIdLength {
                block_id: block_id.to_string(),
                expected: BLOCK_ID_LEN,
                actual: bytes.len(),
            })?;
    Ok(i64::from_le_bytes(raw))
}
