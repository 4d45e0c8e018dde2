use crate::error::{ContainerError, Result};
use crate::io::ByteSource;

use super::page::OggPage;

/// A position packets can be read from again: a page and the segment to resume at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamMark {
    pub page_position: u64,
    pub segment: usize,
}

/// Outcome of reading a packet with size limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundedPacket {
    /// Full size of the packet.
    pub len: usize,
    /// Whether bytes past the saved limit were dropped.
    pub truncated: bool,
}

/// Reassembles the packets of one logical Ogg stream from its pages.
///
/// The stream locks onto the serial number of the first page it reads; pages of other logical
/// streams are skipped.
pub struct OggPacketStream<S> {
    source: S,
    serial: Option<u32>,
    page: Option<OggPage>,
    segment: usize,
    body_offset: usize,
    packet: Vec<u8>,
    skip_continuation: bool,
}

impl<S: ByteSource> OggPacketStream<S> {
    pub fn new(source: S) -> Self {
        OggPacketStream {
            source,
            serial: None,
            page: None,
            segment: 0,
            body_offset: 0,
            packet: Vec::new(),
            skip_continuation: false,
        }
    }

    /// Serial number of the logical stream, once a page has been read.
    pub fn serial(&self) -> Option<u32> {
        self.serial
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn content_length(&self) -> Option<u64> {
        self.source.content_length()
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Reads the next complete packet, or `None` at the end of the stream.
    pub fn next_packet(&mut self) -> Result<Option<&[u8]>> {
        let packet = self.read_packet(usize::MAX, usize::MAX)?;
        Ok(packet.map(|_| self.packet.as_slice()))
    }

    /// Reads the next packet keeping at most `saved_limit` bytes of it.
    ///
    /// Bytes past the saved limit are read and discarded. If the packet is still incomplete
    /// after `read_limit` bytes, the read fails with [`ContainerError::MalformedHeader`] carrying
    /// `overflow_message`.
    pub fn next_packet_bounded(
        &mut self,
        saved_limit: usize,
        read_limit: usize,
        overflow_message: &'static str,
    ) -> Result<Option<(&[u8], BoundedPacket)>> {
        match self.read_packet(saved_limit, read_limit) {
            Ok(Some(info)) => Ok(Some((self.packet.as_slice(), info))),
            Ok(None) => Ok(None),
            Err(ContainerError::MalformedHeader(message)) if message == READ_LIMIT_EXCEEDED => {
                Err(ContainerError::malformed(overflow_message))
            }
            Err(err) => Err(err),
        }
    }

    fn read_packet(&mut self, saved_limit: usize, read_limit: usize) -> Result<Option<BoundedPacket>> {
        self.packet.clear();
        let mut len = 0usize;

        loop {
            let Some(page) = self.page.as_ref() else {
                if !self.load_page()? {
                    if len > 0 {
                        tracing::trace!("Ogg stream ended inside a packet of {len} bytes");
                    }
                    return Ok(None);
                }
                continue;
            };

            while self.segment < page.segments.len() {
                let size = page.segments[self.segment] as usize;
                let data = &page.body[self.body_offset..self.body_offset + size];
                self.segment += 1;
                self.body_offset += size;

                if !self.skip_continuation {
                    let keep = saved_limit.saturating_sub(len).min(size);
                    self.packet.extend_from_slice(&data[..keep]);
                    len += size;
                }

                if size < 255 {
                    if self.skip_continuation {
                        self.skip_continuation = false;
                        continue;
                    }
                    return Ok(Some(BoundedPacket {
                        len,
                        truncated: len > saved_limit,
                    }));
                }

                if len > read_limit {
                    return Err(ContainerError::malformed(READ_LIMIT_EXCEEDED));
                }
            }

            self.page = None;
        }
    }

    /// Reads the next page of this logical stream. Returns `false` at the end of the stream.
    fn load_page(&mut self) -> Result<bool> {
        loop {
            let Some(page) = OggPage::read(&mut self.source)? else {
                return Ok(false);
            };

            match self.serial {
                None => self.serial = Some(page.serial),
                Some(serial) if serial != page.serial => {
                    tracing::trace!("skipping page of Ogg stream {}", page.serial);
                    continue;
                }
                Some(_) => {}
            }

            tracing::trace!(
                "Ogg page {} at {} ({} bytes, granule {:?})",
                page.sequence,
                page.position,
                page.len(),
                page.granule_position
            );

            // A continued page whose packet start was not seen carries nothing usable at first.
            if page.is_continued() && self.packet.is_empty() {
                self.skip_continuation = true;
            }
            self.page = Some(page);
            self.segment = 0;
            self.body_offset = 0;
            return Ok(true);
        }
    }

    /// The position the next packet will be read from.
    pub fn mark(&mut self) -> Result<StreamMark> {
        match &self.page {
            Some(page) if self.segment < page.segments.len() => Ok(StreamMark {
                page_position: page.position,
                segment: self.segment,
            }),
            _ => Ok(StreamMark {
                page_position: self.source.position()?,
                segment: 0,
            }),
        }
    }

    /// Resumes reading at a mark taken earlier with [`OggPacketStream::mark`].
    pub fn reset(&mut self, mark: StreamMark) -> Result<()> {
        self.seek_to_page(mark.page_position)?;
        if mark.segment > 0 && self.load_page()? {
            if let Some(page) = &self.page {
                let skipped = &page.segments[..mark.segment.min(page.segments.len())];
                self.segment = skipped.len();
                self.body_offset = skipped.iter().map(|&s| s as usize).sum();
            }
            self.skip_continuation = false;
        }
        Ok(())
    }

    /// Resumes reading at the page starting at `position`.
    ///
    /// A packet continued from an earlier page is dropped.
    pub fn seek_to_page(&mut self, position: u64) -> Result<()> {
        self.source.seek_to(position)?;
        self.page = None;
        self.segment = 0;
        self.body_offset = 0;
        self.packet.clear();
        self.skip_continuation = false;
        Ok(())
    }
}

const READ_LIMIT_EXCEEDED: &str = "Ogg packet exceeds read limit";
