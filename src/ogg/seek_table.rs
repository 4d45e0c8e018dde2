//! Granule position based seeking for Ogg streams.
//!
//! Ogg has no index. The table is built once by bisecting the byte range of the audio data,
//! recording the granule position of the first page found in each probed range together with the
//! offset right after that page. Playback resumed from that offset starts at that granule.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::common::{samples_to_duration, samples_to_timecode, timecode_to_samples, Timecode};
use crate::error::{ContainerError, Result};
use crate::io::{probe_format, ByteSource};
use crate::seek::{find_seek_point, SeekPoint};

use super::packet::{OggPacketStream, StreamMark};
use super::page::{OggPage, MAX_PAGE_SIZE};

/// Seek points and size information of one logical stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OggSeekTable {
    points: Vec<SeekPoint>,
    audio_start: StreamMark,
    sample_rate: u32,
    total_samples: Option<u64>,
}

impl OggSeekTable {
    /// Builds the table for the stream read by `packets`.
    ///
    /// Must be called once the header packets are consumed: the current position is remembered
    /// as the start of the audio. `granule_offset` is subtracted from every granule position (the
    /// Opus pre-skip). Returns `None` if the stream length is unknown.
    pub fn build<S: ByteSource>(
        packets: &mut OggPacketStream<S>,
        sample_rate: u32,
        granule_offset: u64,
        max_points: usize,
    ) -> Result<Option<Self>> {
        let Some(end) = packets.content_length() else {
            return Ok(None);
        };
        let audio_start = packets.mark()?;
        let serial = packets.serial();

        let (points, last_granule) = probe_format(packets.source_mut(), |source| {
            let points = bisect(source, serial, audio_start.page_position, end, max_points)?;
            let last_granule = last_granule(source, serial, audio_start.page_position, end)?;
            Ok::<_, ContainerError>((points, last_granule))
        })?;

        let points: Vec<SeekPoint> = points
            .into_iter()
            .map(|(granule, offset)| {
                SeekPoint::new(granule.saturating_sub(granule_offset), offset)
            })
            .collect();
        let total_samples = last_granule.map(|granule| granule.saturating_sub(granule_offset));

        tracing::debug!(
            "Ogg seek table: {} points, {:?} samples at {} Hz",
            points.len(),
            total_samples,
            sample_rate
        );

        Ok(Some(OggSeekTable {
            points,
            audio_start,
            sample_rate,
            total_samples,
        }))
    }

    pub fn points(&self) -> &[SeekPoint] {
        &self.points
    }

    pub fn duration(&self) -> Option<Duration> {
        self.total_samples
            .map(|samples| samples_to_duration(samples, self.sample_rate))
    }

    /// Repositions `packets` at the latest point not past `timecode` and returns the timecode
    /// playback resumes from.
    ///
    /// Targets before the first point restart right after the header packets.
    pub fn seek<S: ByteSource>(
        &self,
        packets: &mut OggPacketStream<S>,
        timecode: Timecode,
    ) -> Result<Timecode> {
        let target = timecode_to_samples(timecode, self.sample_rate);

        match self.points.first() {
            Some(first) if first.sample_index <= target => {
                let point = find_seek_point(&self.points, target);
                packets.seek_to_page(point.byte_offset)?;
                Ok(samples_to_timecode(point.sample_index, self.sample_rate))
            }
            _ => {
                packets.reset(self.audio_start)?;
                Ok(0)
            }
        }
    }
}

/// Probes byte ranges breadth first so that a small table is spread evenly over the stream.
fn bisect<S: ByteSource + ?Sized>(
    source: &mut S,
    serial: Option<u32>,
    start: u64,
    end: u64,
    max_points: usize,
) -> Result<Vec<(u64, u64)>> {
    // Keyed by the offset after the page, so a page reached twice is only counted once.
    let mut points: BTreeMap<u64, u64> = BTreeMap::new();
    let mut ranges = VecDeque::from([(start, end)]);

    while let Some((low, high)) = ranges.pop_front() {
        if points.len() >= max_points {
            break;
        }
        if low >= high {
            continue;
        }

        let middle = low + (high - low) / 2;
        let Some(page) = next_granule_page(source, serial, middle, high)? else {
            // Nothing in the upper half; the lower half may still hold pages.
            if middle > low {
                ranges.push_back((low, middle));
            }
            continue;
        };

        if let Some(granule) = page.granule_position {
            points.entry(page.end_position()).or_insert(granule);
        }
        ranges.push_back((low, middle));
        ranges.push_back((page.end_position(), high));
    }

    let mut points: Vec<(u64, u64)> = points
        .into_iter()
        .map(|(offset, granule)| (granule, offset))
        .collect();
    points.sort_unstable();
    Ok(points)
}

/// Finds the first page of the stream with a granule position in `from..limit`.
fn next_granule_page<S: ByteSource + ?Sized>(
    source: &mut S,
    serial: Option<u32>,
    from: u64,
    limit: u64,
) -> Result<Option<OggPage>> {
    let mut position = from;
    while let Some(page) = OggPage::find(source, position, limit)? {
        let ours = serial.is_none_or(|serial| serial == page.serial);
        if ours && page.granule_position.is_some() {
            return Ok(Some(page));
        }
        position = page.end_position();
    }
    Ok(None)
}

/// Granule position of the last page of the stream.
fn last_granule<S: ByteSource + ?Sized>(
    source: &mut S,
    serial: Option<u32>,
    start: u64,
    end: u64,
) -> Result<Option<u64>> {
    let mut from = end.saturating_sub(MAX_PAGE_SIZE as u64).max(start);

    loop {
        let mut last = None;
        let mut position = from;
        while let Some(page) = next_granule_page(source, serial, position, end)? {
            last = page.granule_position;
            position = page.end_position();
        }

        if last.is_some() || from == start {
            return Ok(last);
        }
        from = from.saturating_sub(MAX_PAGE_SIZE as u64).max(start);
    }
}
