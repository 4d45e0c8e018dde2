//! Byte source abstraction consumed by every container reader.
//!
//! Containers are read through [`ByteSource`], a `Read + Seek` stream that may also know its
//! total length. Live streams report `None` from [`ByteSource::content_length`], which is what
//! makes an MP3 fall back to forward-only playback.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

pub mod bits;

pub use self::bits::BitReader;

/// A seekable stream of container bytes.
pub trait ByteSource: Read + Seek {
    /// Total length of the stream in bytes, if known.
    fn content_length(&self) -> Option<u64>;

    /// Current absolute read offset.
    #[inline]
    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    /// Moves the read offset to an absolute position.
    #[inline]
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

impl<B: ByteSource + ?Sized> ByteSource for &mut B {
    fn content_length(&self) -> Option<u64> {
        (**self).content_length()
    }
}

impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {
    fn content_length(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

impl ByteSource for File {
    fn content_length(&self) -> Option<u64> {
        self.metadata().ok().map(|metadata| metadata.len())
    }
}

/// Wraps any `Read + Seek`er as a [`ByteSource`] with an externally supplied length.
///
/// Passing `None` as the length makes the source behave like a live stream for the purpose
/// of seek strategy selection, while still allowing seeks.
pub struct ReadSeekSource<T: Read + Seek> {
    inner: T,
    byte_len: Option<u64>,
}

impl<T: Read + Seek> ReadSeekSource<T> {
    /// Instantiates a new `ReadSeekSource<T>` by taking ownership and wrapping the provided
    /// `Read + Seek`er.
    #[inline]
    pub fn new(inner: T, byte_len: Option<u64>) -> Self {
        ReadSeekSource { inner, byte_len }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek> ByteSource for ReadSeekSource<T> {
    #[inline]
    fn content_length(&self) -> Option<u64> {
        self.byte_len
    }
}

impl<T: Read + Seek> Read for ReadSeekSource<T> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<T: Read + Seek> Seek for ReadSeekSource<T> {
    #[inline]
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Runs `probe_fn` and restores the stream position afterwards, whatever the outcome.
///
/// Used for look-ahead work such as building seek tables, where the caller's read position
/// must survive. The restoring seek error is reported only if the probe itself succeeded.
pub(crate) fn probe_format<S, T, E, F>(data: &mut S, probe_fn: F) -> Result<T, E>
where
    S: ByteSource + ?Sized,
    E: From<io::Error>,
    F: FnOnce(&mut S) -> Result<T, E>,
{
    let original_pos = data.position()?;
    let result = probe_fn(data);
    let restored = data.seek_to(original_pos);
    let value = result?;
    restored?;
    Ok(value)
}

/// Reads a fixed size array.
#[inline]
pub(crate) fn read_array<const N: usize, R: Read + ?Sized>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

#[inline]
pub(crate) fn read_u8<R: Read + ?Sized>(reader: &mut R) -> io::Result<u8> {
    Ok(read_array::<1, R>(reader)?[0])
}

/// Reads until `buf` is full or the stream ends, returning the number of bytes read.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Advances the read position by `count` bytes.
#[inline]
pub(crate) fn skip<S: ByteSource + ?Sized>(source: &mut S, count: u64) -> io::Result<()> {
    source.seek(SeekFrom::Current(count as i64)).map(|_| ())
}
