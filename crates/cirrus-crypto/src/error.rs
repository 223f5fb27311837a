use thiserror::Error;

/// Errors from block-id decoding.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The block id is not valid base64.
    #[error("block id {block_id:?} is not valid base64: {reason}")]
    InvalidBase64 { block_id: String, reason: String },

    /// The block id decodes to the wrong number of bytes.
    #[error("block id {block_id:?} decodes to {actual} bytes, expected {expected}")]
    InvalidBlockIdLength {
        block_id: String,
        expected: usize,
        actual: usize,
    },
}

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
