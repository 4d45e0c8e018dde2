use crate::error::Result;
use crate::io::{read_up_to, ByteSource};

use super::header::{FrameHeader, HEADER_LEN, MAX_FRAME_SIZE};

/// Walks an MP3 stream frame by frame, keeping the current frame in a fixed buffer.
pub struct Mp3FrameReader {
    buffer: Vec<u8>,
    scan: Vec<u8>,
    header: Option<FrameHeader>,
    frame_position: u64,
    filled: bool,
}

impl Default for Mp3FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp3FrameReader {
    pub fn new() -> Self {
        Mp3FrameReader {
            buffer: vec![0; MAX_FRAME_SIZE],
            scan: Vec::new(),
            header: None,
            frame_position: 0,
            filled: false,
        }
    }

    /// Looks for a frame header within the next `bytes_to_scan` bytes.
    ///
    /// On success the source is left right after the header. Otherwise the source is restored
    /// to where the scan started and the reader is no longer on a frame.
    pub fn scan_for_frame<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
        bytes_to_scan: usize,
    ) -> Result<bool> {
        self.header = None;
        self.filled = false;

        let start = source.position()?;
        self.scan.resize(bytes_to_scan + HEADER_LEN - 1, 0);
        let available = read_up_to(source, &mut self.scan)?;

        for (offset, window) in self.scan[..available].windows(HEADER_LEN).enumerate() {
            let bytes = [window[0], window[1], window[2], window[3]];
            if let Some(header) = FrameHeader::parse(bytes) {
                let position = start + offset as u64;
                if offset > 0 {
                    tracing::trace!("skipped {offset} bytes before MP3 frame at {position}");
                }
                source.seek_to(position + HEADER_LEN as u64)?;
                self.buffer[..HEADER_LEN].copy_from_slice(&bytes);
                self.header = Some(header);
                self.frame_position = position;
                return Ok(true);
            }
        }

        source.seek_to(start)?;
        Ok(false)
    }

    /// Reads the rest of the current frame. Returns `false` if there is no current frame or the
    /// stream ends inside it.
    pub fn fill_frame_buffer<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<bool> {
        let Some(header) = self.header else {
            return Ok(false);
        };
        if self.filled {
            return Ok(true);
        }

        let body = &mut self.buffer[HEADER_LEN..header.frame_size];
        let read = read_up_to(source, body)?;
        if read < body.len() {
            tracing::trace!("MP3 stream ended inside frame at {}", self.frame_position);
            self.header = None;
            return Ok(false);
        }

        self.filled = true;
        Ok(true)
    }

    /// Moves past the current frame, if any, and scans for the one after it.
    pub fn next_frame<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<bool> {
        if let Some(header) = self.header {
            if !self.filled {
                source.seek_to(self.frame_position + header.frame_size as u64)?;
            }
        }
        self.scan_for_frame(source, MAX_FRAME_SIZE)
    }

    pub fn frame_header(&self) -> Option<&FrameHeader> {
        self.header.as_ref()
    }

    /// Absolute offset of the current frame.
    pub fn frame_position(&self) -> u64 {
        self.frame_position
    }

    /// The complete current frame, header included, once it has been filled.
    pub fn frame(&self) -> Option<&[u8]> {
        match self.header {
            Some(header) if self.filled => Some(&self.buffer[..header.frame_size]),
            _ => None,
        }
    }
}
