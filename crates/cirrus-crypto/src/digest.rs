use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use base64::engine::general_purpose;
use base64::Engine;
use md5::{Digest, Md5};

/// MD5 digest of a block's content.
///
/// Sent alongside each staged block so the backend can verify the bytes it
/// received. Backends compare the base64 form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 16]);

impl ContentDigest {
    /// Digest of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        Self(Md5::digest(data).into())
    }

    /// Digest of everything from the reader's current position to its end.
    ///
    /// The reader is rewound to the start afterwards so the same content can
    /// be uploaded.
    pub fn from_reader<R: Read + Seek + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut hasher = Md5::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Standard base64 form, as carried in a `Content-MD5` header.
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether `expected` (base64) names this digest.
    pub fn matches_base64(&self, expected: &str) -> bool {
        self.to_base64() == expected
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.to_hex())
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}
