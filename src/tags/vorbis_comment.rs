//! Vorbis comment block, shared by Ogg Vorbis, Ogg Opus, FLAC and Matroska codec private data.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! u32 vendor length, vendor string
//! u32 comment count
//! repeated: u32 length, "NAME=value"
//! ```
//!
//! Comment packets can be cut short by the saved-size cap of the packet reader, so a block
//! that ends in the middle of an entry yields every complete entry before it.

use super::TagMap;

/// Parsed comment block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VorbisComments {
    pub vendor: String,
    pub tags: TagMap,
    /// The block ended before the declared number of comments was read.
    pub truncated: bool,
}

/// Parses a comment block with the codec magic already stripped.
pub fn parse(data: &[u8]) -> VorbisComments {
    let mut cursor = Cursor { data, pos: 0 };
    let mut comments = VorbisComments::default();

    let Some(vendor) = cursor.length_prefixed() else {
        comments.truncated = true;
        return comments;
    };
    comments.vendor = String::from_utf8_lossy(vendor).into_owned();

    let Some(count) = cursor.u32() else {
        comments.truncated = true;
        return comments;
    };

    for _ in 0..count {
        let Some(entry) = cursor.length_prefixed() else {
            tracing::debug!("comment block truncated after {} entries", comments.tags.len());
            comments.truncated = true;
            break;
        };

        let entry = String::from_utf8_lossy(entry);
        match entry.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                comments.tags.insert(name.to_ascii_uppercase(), value)
            }
            _ => tracing::trace!("skipping comment without a name"),
        }
    }

    comments
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u32(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn length_prefixed(&mut self) -> Option<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }
}
