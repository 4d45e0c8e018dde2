//! Ogg container support for Vorbis and Opus.
//!
//! [`OggPacketStream`] reassembles packets from pages. [`OggTrackBlueprint::detect`] identifies
//! the codec from the first packet, after which a codec specific handler reads the remaining
//! header packets, builds an [`OggSeekTable`] and streams the audio packets.

use crate::common::Timecode;
use crate::error::{ContainerError, Result};
use crate::io::ByteSource;
use crate::provider::{TrackInfo, TrackProvider};
use crate::settings::Settings;
use crate::tags::vorbis_comment::{self, VorbisComments};
use crate::tags::TagMap;

pub mod lacing;
pub mod opus;
mod packet;
mod page;
mod seek_table;
pub mod vorbis;

pub use self::packet::{BoundedPacket, OggPacketStream, StreamMark};
pub use self::page::{OggPage, CAPTURE_PATTERN, FLAG_CONTINUED, FLAG_FIRST, FLAG_LAST};
pub use self::seek_table::OggSeekTable;

/// Identification packets longer than this are not accepted.
const FIRST_PACKET_LIMIT: usize = 512;

const COMMENTS_TOO_LONG: &str = "Vorbis comments header packet longer than allowed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OggCodec {
    Vorbis,
    Opus,
}

/// The codec of an Ogg stream and its identification packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OggTrackBlueprint {
    codec: OggCodec,
    identification: Vec<u8>,
}

impl OggTrackBlueprint {
    /// Reads the first packet and identifies the codec by its magic.
    pub fn detect<S: ByteSource>(packets: &mut OggPacketStream<S>) -> Result<Self> {
        let (packet, _) = packets
            .next_packet_bounded(
                FIRST_PACKET_LIMIT,
                FIRST_PACKET_LIMIT,
                "first Ogg packet is too long",
            )?
            .ok_or(ContainerError::TruncatedInput("first Ogg packet"))?;
        let packet = packet.to_vec();

        let codec = if packet.starts_with(vorbis::IDENTIFICATION_MAGIC) {
            OggCodec::Vorbis
        } else if packet.starts_with(opus::HEAD_MAGIC) {
            OggCodec::Opus
        } else {
            return Err(ContainerError::malformed("unsupported Ogg codec"));
        };

        tracing::debug!(
            "Ogg stream {} carries {codec:?}",
            packets.serial().unwrap_or_default()
        );
        Ok(OggTrackBlueprint {
            codec,
            identification: packet,
        })
    }

    pub fn codec(&self) -> OggCodec {
        self.codec
    }

    pub fn identification(&self) -> &[u8] {
        &self.identification
    }
}

/// Operations shared by the Ogg codec handlers.
pub trait OggTrackHandler: TrackProvider + TrackInfo {
    /// Resolves the gain, configures the decoder and reports the initial position.
    ///
    /// Frame production and seeking are rejected until this has been called.
    fn initialise(&mut self, desired: Timecode, achieved: Timecode) -> Result<()>;

    /// Tags from the comment header, names upper-cased.
    fn tags(&self) -> &TagMap;

    fn is_replay_gain_applied(&self) -> bool;
}

/// Reads the comment header packet.
///
/// A packet without the expected magic yields no tags.
fn read_comments<S: ByteSource>(
    packets: &mut OggPacketStream<S>,
    magic: &[u8],
    settings: &Settings,
) -> Result<VorbisComments> {
    let (packet, info) = packets
        .next_packet_bounded(
            settings.comment_saved_limit,
            settings.comment_read_limit,
            COMMENTS_TOO_LONG,
        )?
        .ok_or_else(|| ContainerError::malformed("No comments packet in track"))?;

    if !packet.starts_with(magic) {
        tracing::debug!("comment packet does not start with the expected magic, ignoring it");
        return Ok(VorbisComments::default());
    }
    if info.truncated {
        tracing::warn!(
            "comment packet of {} bytes truncated to {} bytes",
            info.len,
            packet.len()
        );
    }

    Ok(vorbis_comment::parse(&packet[magic.len()..]))
}

fn title(tags: &TagMap) -> Option<&str> {
    tags.get("TITLE")
}

fn author(tags: &TagMap) -> Option<&str> {
    tags.get("ARTIST")
}

fn isrc(tags: &TagMap) -> Option<&str> {
    tags.get("ISRC")
}
