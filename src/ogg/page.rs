use crate::error::{ContainerError, Result};
use crate::io::{read_up_to, ByteSource};

pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Length of the fixed part of a page header.
pub const PAGE_HEADER_LEN: usize = 27;

/// Largest possible page: full header, 255 segments of 255 bytes.
pub const MAX_PAGE_SIZE: usize = PAGE_HEADER_LEN + 255 + 255 * 255;

pub const FLAG_CONTINUED: u8 = 0x01;
pub const FLAG_FIRST: u8 = 0x02;
pub const FLAG_LAST: u8 = 0x04;

const NO_GRANULE: u64 = u64::MAX;
const CHECKSUM_OFFSET: usize = 22;
const SYNC_CHUNK: usize = 8 * 1024;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

pub(crate) fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    data.iter().fold(crc, |crc, &b| {
        (crc << 8) ^ CRC_TABLE[((crc >> 24) as u8 ^ b) as usize]
    })
}

/// One Ogg page with its body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OggPage {
    pub flags: u8,
    /// `None` when no packet finishes on this page.
    pub granule_position: Option<u64>,
    pub serial: u32,
    pub sequence: u32,
    /// The lacing values of the segment table.
    pub segments: Vec<u8>,
    pub body: Vec<u8>,
    /// Absolute offset of the capture pattern.
    pub position: u64,
}

impl OggPage {
    /// Reads the page at the current position.
    ///
    /// Returns `None` if the stream ends before a complete page. A page that does not start with
    /// the capture pattern, has an unknown version or fails its checksum is
    /// [`ContainerError::MalformedHeader`].
    pub fn read<S: ByteSource + ?Sized>(source: &mut S) -> Result<Option<Self>> {
        let position = source.position()?;

        let mut header = [0u8; PAGE_HEADER_LEN];
        if read_up_to(source, &mut header)? < PAGE_HEADER_LEN {
            return Ok(None);
        }
        if &header[..4] != CAPTURE_PATTERN {
            return Err(ContainerError::malformed(format!(
                "no Ogg page at offset {position}"
            )));
        }
        if header[4] != 0 {
            return Err(ContainerError::malformed(format!(
                "unknown Ogg page version {} at offset {position}",
                header[4]
            )));
        }

        let mut segments = vec![0u8; header[26] as usize];
        if read_up_to(source, &mut segments)? < segments.len() {
            return Ok(None);
        }
        let mut body = vec![0u8; segments.iter().map(|&s| s as usize).sum()];
        if read_up_to(source, &mut body)? < body.len() {
            return Ok(None);
        }

        let checksum = le_u32(&header[CHECKSUM_OFFSET..]);
        header[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].fill(0);
        let computed = crc32_update(crc32_update(crc32_update(0, &header), &segments), &body);
        if computed != checksum {
            return Err(ContainerError::malformed(format!(
                "Ogg page checksum mismatch at offset {position}"
            )));
        }

        let mut granule = [0u8; 8];
        granule.copy_from_slice(&header[6..14]);
        let granule = u64::from_le_bytes(granule);

        Ok(Some(OggPage {
            flags: header[5],
            granule_position: (granule != NO_GRANULE).then_some(granule),
            serial: le_u32(&header[14..]),
            sequence: le_u32(&header[18..]),
            segments,
            body,
            position,
        }))
    }

    /// Finds the first valid page starting at or after `from` and before `limit`.
    ///
    /// Candidates that fail validation are skipped.
    pub fn find<S: ByteSource + ?Sized>(
        source: &mut S,
        from: u64,
        limit: u64,
    ) -> Result<Option<Self>> {
        let mut window = vec![0u8; SYNC_CHUNK];
        let mut position = from;

        while position < limit {
            source.seek_to(position)?;
            let available = read_up_to(source, &mut window)?;
            if available < CAPTURE_PATTERN.len() {
                return Ok(None);
            }

            let found = window[..available]
                .windows(CAPTURE_PATTERN.len())
                .position(|candidate| candidate == CAPTURE_PATTERN);
            let Some(offset) = found else {
                position += (available - CAPTURE_PATTERN.len() + 1) as u64;
                continue;
            };

            let candidate = position + offset as u64;
            if candidate >= limit {
                return Ok(None);
            }
            source.seek_to(candidate)?;
            match OggPage::read(source) {
                Ok(page) => return Ok(page),
                Err(ContainerError::MalformedHeader(message)) => {
                    tracing::trace!("skipping false Ogg capture: {message}");
                    position = candidate + 1;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(None)
    }

    pub fn is_continued(&self) -> bool {
        self.flags & FLAG_CONTINUED != 0
    }

    pub fn is_first(&self) -> bool {
        self.flags & FLAG_FIRST != 0
    }

    pub fn is_last(&self) -> bool {
        self.flags & FLAG_LAST != 0
    }

    /// Size of the page as stored, header included.
    pub fn len(&self) -> usize {
        PAGE_HEADER_LEN + self.segments.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Absolute offset right after this page.
    pub fn end_position(&self) -> u64 {
        self.position + self.len() as u64
    }
}

fn le_u32(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}


#[cfg(test)]
mod tests {
    use super::test_pages::*;
    use super::*;
    use std::io::Cursor;

    #[test]
    fn crc_reference_value() {
        assert_eq!(crc32_update(0, b"123456789"), 0x89A1_897F);
    }

    #[test]
    fn reads_page_fields() {
        let body = b"hello";
        let data = page_bytes(FLAG_FIRST, Some(960), 77, 3, &lacing(&[body]), body);
        let page = OggPage::read(&mut Cursor::new(data.clone())).unwrap().unwrap();

        assert!(page.is_first());
        assert!(!page.is_continued());
        assert_eq!(page.granule_position, Some(960));
        assert_eq!(page.serial, 77);
        assert_eq!(page.sequence, 3);
        assert_eq!(page.body, body);
        assert_eq!(page.len(), data.len());
    }

    #[test]
    fn missing_granule() {
        let data = page_bytes(0, None, 1, 0, &[255], &[0; 255]);
        let page = OggPage::read(&mut Cursor::new(data)).unwrap().unwrap();
        assert_eq!(page.granule_position, None);
    }

    #[test]
    fn corrupted_page_is_rejected() {
        let mut data = page_bytes(0, Some(0), 1, 0, &[3], b"abc");
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        assert!(matches!(
            OggPage::read(&mut Cursor::new(data)),
            Err(ContainerError::MalformedHeader(_))
        ));
    }

    #[test]
    fn truncated_page_ends_stream() {
        let mut data = page_bytes(0, Some(0), 1, 0, &[3], b"abc");
        data.pop();
        assert_eq!(OggPage::read(&mut Cursor::new(data)).unwrap(), None);
    }

    #[test]
    fn find_skips_garbage_and_false_captures() {
        let mut data = b"xxOggSjunk".to_vec();
        let start = data.len() as u64;
        data.extend(page_bytes(0, Some(42), 9, 1, &[1], b"z"));

        let mut source = Cursor::new(data);
        let page = OggPage::find(&mut source, 0, u64::MAX).unwrap().unwrap();
        assert_eq!(page.position, start);
        assert_eq!(page.granule_position, Some(42));
        assert_eq!(OggPage::find(&mut source, start + 1, u64::MAX).unwrap(), None);
    }
}
