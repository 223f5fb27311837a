//! Blob content: the three payload shapes a caller can hand to a store.
//!
//! Every variant converts to and from a canonical byte stream:
//!
//! - [`BlobContent::to_stream`] yields a [`ContentReader`] over the content
//!   for uploads.
//! - [`BlobContent::sink`] yields a [`ContentSink`] that downloads write into.
//!
//! The `Stream` variant borrows the caller's stream. Only that one stream is
//! ever in flight and the borrow ends when the store call returns.

use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// A caller-owned, seekable, bidirectional byte stream.
pub trait BlobStream: Read + Write + Seek {}

impl<T: Read + Write + Seek + ?Sized> BlobStream for T {}

/// The representation a blob's content takes on the caller side.
pub enum BlobContent<'a> {
    /// In-memory bytes.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// A stream borrowed from the caller. Uploads read from its current
    /// position; downloads write at its current position and rewind it to
    /// the start when done.
    ///
    /// Downloads overwrite in place and never truncate: bytes already in the
    /// stream past the downloaded length are left as they were. Pass an
    /// empty stream as a download destination.
    Stream(&'a mut dyn BlobStream),
}

impl<'a> BlobContent<'a> {
    /// Borrow the content as a readable, seekable stream.
    pub fn to_stream(&mut self) -> ContentReader<'_> {
        match self {
            Self::Bytes(data) => ContentReader::Memory(Cursor::new(data.as_slice())),
            Self::Text(text) => ContentReader::Memory(Cursor::new(text.as_bytes())),
            Self::Stream(stream) => ContentReader::Stream(&mut **stream),
        }
    }

    /// Open a sink that replaces this content with downloaded bytes.
    ///
    /// `Bytes` and `Text` are cleared; a `Stream` is written at its current
    /// position without being truncated.
    pub fn sink(&mut self) -> io::Result<ContentSink<'_>> {
        let target = match self {
            Self::Bytes(data) => {
                data.clear();
                SinkTarget::Bytes(data)
            }
            Self::Text(text) => SinkTarget::Text {
                text,
                buffer: Vec::new(),
            },
            Self::Stream(stream) => {
                let start = stream.stream_position()?;
                SinkTarget::Stream {
                    stream: &mut **stream,
                    start,
                }
            }
        };
        Ok(ContentSink { target, written: 0 })
    }

    /// Number of bytes an upload would read from the current position.
    pub fn remaining_len(&mut self) -> io::Result<u64> {
        self.to_stream().remaining_len()
    }
}

impl Default for BlobContent<'_> {
    fn default() -> Self {
        Self::Bytes(Vec::new())
    }
}

impl From<Vec<u8>> for BlobContent<'_> {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(data)
    }
}

impl From<&[u8]> for BlobContent<'_> {
    fn from(data: &[u8]) -> Self {
        Self::Bytes(data.to_vec())
    }
}

impl From<String> for BlobContent<'_> {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for BlobContent<'_> {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl fmt::Debug for BlobContent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read view over a [`BlobContent`].
pub enum ContentReader<'b> {
    Memory(Cursor<&'b [u8]>),
    Stream(&'b mut dyn BlobStream),
}

impl ContentReader<'_> {
    /// Bytes between the current position and the end, leaving the position
    /// unchanged.
    pub fn remaining_len(&mut self) -> io::Result<u64> {
        let position = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(position))?;
        Ok(end.saturating_sub(position))
    }
}

impl Read for ContentReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Memory(cursor) => cursor.read(buf),
            Self::Stream(stream) => stream.read(buf),
        }
    }
}

impl Seek for ContentReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Memory(cursor) => cursor.seek(pos),
            Self::Stream(stream) => stream.seek(pos),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

enum SinkTarget<'b> {
    Bytes(&'b mut Vec<u8>),
    Text {
        text: &'b mut String,
        buffer: Vec<u8>,
    },
    Stream {
        stream: &'b mut dyn BlobStream,
        start: u64,
    },
}

/// Write view over a [`BlobContent`], used as a download destination.
///
/// Call [`ContentSink::finish`] once the download completes: it decodes text
/// content and rewinds stream content to the start.
pub struct ContentSink<'b> {
    target: SinkTarget<'b>,
    written: u64,
}

impl ContentSink<'_> {
    /// Discard everything written so far, e.g. before retrying a download.
    pub fn reset(&mut self) -> io::Result<()> {
        match &mut self.target {
            SinkTarget::Bytes(data) => data.clear(),
            SinkTarget::Text { buffer, .. } => buffer.clear(),
            SinkTarget::Stream { stream, start } => {
                stream.seek(SeekFrom::Start(*start))?;
            }
        }
        self.written = 0;
        Ok(())
    }

    /// Bytes written since the sink was opened or last reset.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Complete the download and return the number of bytes received.
    pub fn finish(self) -> io::Result<u64> {
        match self.target {
            SinkTarget::Bytes(_) => {}
            SinkTarget::Text { text, buffer } => {
                *text = String::from_utf8(buffer)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            }
            SinkTarget::Stream { stream, .. } => {
                stream.flush()?;
                stream.seek(SeekFrom::Start(0))?;
            }
        }
        Ok(self.written)
    }
}

impl Write for ContentSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match &mut self.target {
            SinkTarget::Bytes(data) => {
                data.extend_from_slice(buf);
                buf.len()
            }
            SinkTarget::Text { buffer, .. } => {
                buffer.extend_from_slice(buf);
                buf.len()
            }
            SinkTarget::Stream { stream, .. } => stream.write(buf)?,
        };
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.target {
            SinkTarget::Stream { stream, .. } => stream.flush(),
            _ => Ok(()),
        }
    }
}
