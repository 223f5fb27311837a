//! Block identifiers and transport digests for cirrus chunked uploads.
//!
//! - [`block_id`]: reversible encoding of a chunk index into a block id
//! - [`digest`]: MD5 content digest sent with each block for transport
//!   verification
//!
//! Both wrap established libraries (`base64`, `md-5`); nothing here is
//! custom cryptography.

pub mod block_id;
pub mod digest;
pub mod error;

pub use block_id::{decode_block_id, encode_block_id, BLOCK_ID_LEN};
pub use digest::ContentDigest;
pub use error::{CryptoError, CryptoResult};
