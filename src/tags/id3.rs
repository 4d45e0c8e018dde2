//! ID3v2 tag skipping and text frame extraction for MP3 files.
//!
//! Only a handful of text frames are decoded: title (`TIT2`), artist (`TPE1`), ISRC (`TSRC`)
//! and user text (`TXXX`). Everything else, including the tag's padding, is skipped by seeking
//! to the end offset declared in the tag header.

use crate::error::{ContainerError, HeaderResultExt, Result};
use crate::io::{read_array, read_u8, ByteSource};
use crate::settings::TxxxGainParsing;

use super::{TagError, TagMap, REPLAYGAIN_TRACK_GAIN};

pub const TITLE: &str = "TIT2";
pub const ARTIST: &str = "TPE1";
pub const ISRC: &str = "TSRC";
pub const USER_TEXT: &str = "TXXX";

const KNOWN_TEXT_FRAMES: [&str; 4] = [TITLE, ARTIST, ISRC, USER_TEXT];

/// Maximum number of consecutive tags accepted before the file is considered invalid.
pub const MAX_CONSECUTIVE_TAGS: usize = 3;

const TAG_MAGIC: &[u8; 3] = b"ID3";
const FLAG_EXTENDED_HEADER: u8 = 0x40;

// Frame format flags. Any of them means the content is not plain text.
const FLAG_COMPRESSION: u16 = 0x0008;
const FLAG_ENCRYPTION: u16 = 0x0004;
const FLAG_UNSYNCHRONISATION: u16 = 0x0002;
const FLAG_DATA_LENGTH_INDICATOR: u16 = 0x0001;
const NOT_RAW_FLAGS: u16 =
    FLAG_COMPRESSION | FLAG_ENCRYPTION | FLAG_UNSYNCHRONISATION | FLAG_DATA_LENGTH_INDICATOR;

/// Text collected from the tags at the start of an MP3 file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Id3Tags {
    /// Known text frames by frame id.
    pub tags: TagMap,
    /// Full text of the last `TXXX` frame mentioning `REPLAYGAIN_TRACK_GAIN`.
    pub replay_gain_text: Option<String>,
    /// Number of tags skipped.
    pub tag_count: usize,
}

/// Outcome of skipping the tags at the current position.
#[derive(Debug)]
pub struct SkippedTags {
    pub tags: Id3Tags,
    /// Bytes consumed while probing for another tag that belong to the audio data.
    pub leftover: Vec<u8>,
}

/// Skips up to [`MAX_CONSECUTIVE_TAGS`] ID3v2 tags, collecting known text frames.
///
/// Fails with [`ContainerError::MalformedHeader`] if yet another tag follows.
pub fn skip_tags<S: ByteSource + ?Sized>(source: &mut S) -> Result<SkippedTags> {
    let mut tags = Id3Tags::default();

    loop {
        let magic: [u8; 3] = read_array(source).in_header("ID3 tag header")?;
        if &magic != TAG_MAGIC {
            return Ok(SkippedTags {
                tags,
                leftover: magic.to_vec(),
            });
        }

        if tags.tag_count == MAX_CONSECUTIVE_TAGS {
            return Err(ContainerError::malformed(format!(
                "read more than {MAX_CONSECUTIVE_TAGS} ID3v2 blocks, file is possibly invalid"
            )));
        }

        let [major_version, _minor_version] = read_array(source).in_header("ID3 tag header")?;
        if !(2..=5).contains(&major_version) {
            tracing::debug!("unknown ID3v2 major version {major_version}, stopping tag skip");
            return Ok(SkippedTags {
                tags,
                leftover: Vec::new(),
            });
        }

        let flags = read_u8(source).in_header("ID3 tag header")?;
        let size = read_syncsafe_u32(source)?;
        let end = source.position()? + size as u64;

        if flags & FLAG_EXTENDED_HEADER != 0 {
            let extended_size = read_syncsafe_u32(source)?;
            let position = source.position()?;
            source.seek_to((position + extended_size as u64).saturating_sub(4))?;
        }

        if major_version < 5 {
            parse_frames(source, major_version, end, &mut tags)?;
        }

        tracing::trace!("skipped ID3v2.{major_version} tag ending at {end}");
        source.seek_to(end)?;
        tags.tag_count += 1;
    }
}

struct FrameHeader {
    id: String,
    size: u32,
    flags: u16,
}

impl FrameHeader {
    fn read<S: ByteSource + ?Sized>(source: &mut S, version: u8) -> Result<Option<Self>> {
        if version == 2 {
            let id: [u8; 3] = read_array(source).in_header("ID3 frame header")?;
            if id[0] == 0 {
                return Ok(None);
            }
            let id = match &id {
                b"TT2" => TITLE.to_owned(),
                b"TP1" => ARTIST.to_owned(),
                b"TRC" => ISRC.to_owned(),
                b"TXX" => USER_TEXT.to_owned(),
                other => latin1(other),
            };
            let size = read_syncsafe_u24(source)?;
            return Ok(Some(FrameHeader { id, size, flags: 0 }));
        }

        let id: [u8; 4] = read_array(source).in_header("ID3 frame header")?;
        if id[0] == 0 {
            return Ok(None);
        }
        let size = if version == 3 {
            u32::from_be_bytes(read_array(source).in_header("ID3 frame header")?)
        } else {
            read_syncsafe_u32(source)?
        };
        let flags = u16::from_be_bytes(read_array(source).in_header("ID3 frame header")?);

        Ok(Some(FrameHeader {
            id: latin1(&id),
            size,
            flags,
        }))
    }

    /// Whether the frame content is stored as plain text that can be decoded directly.
    fn has_raw_format(&self, version: u8) -> bool {
        version == 2 || self.flags & NOT_RAW_FLAGS == 0
    }
}

fn parse_frames<S: ByteSource + ?Sized>(
    source: &mut S,
    version: u8,
    end: u64,
    tags: &mut Id3Tags,
) -> Result<()> {
    while source.position()? + 10 <= end {
        let Some(header) = FrameHeader::read(source, version)? else {
            break;
        };
        let next = source.position()? + header.size as u64;
        if next > end {
            tracing::debug!("ID3 frame {} overruns its tag", header.id);
            break;
        }

        if header.size > 0
            && header.has_raw_format(version)
            && KNOWN_TEXT_FRAMES.contains(&header.id.as_str())
        {
            let mut data = vec![0u8; header.size as usize];
            source.read_exact(&mut data).in_header("ID3 frame")?;

            match decode_text(data[0], &data[1..]) {
                Ok(text) => {
                    if header.id == USER_TEXT
                        && text.to_uppercase().contains(REPLAYGAIN_TRACK_GAIN)
                    {
                        tags.replay_gain_text = Some(text.clone());
                    }
                    tags.tags.insert(header.id, text);
                }
                Err(err) => tracing::warn!("skipping ID3 frame {}: {err}", header.id),
            }
        }

        source.seek_to(next)?;
    }
    Ok(())
}

/// Decodes the content of a text frame after its encoding byte.
///
/// One trailing NUL is dropped for single-byte encodings and two for UTF-16.
pub fn decode_text(encoding: u8, data: &[u8]) -> Result<String, TagError> {
    let short_terminator = data.last() == Some(&0);
    let wide_terminator = short_terminator && data.len() > 1 && data[data.len() - 2] == 0;

    match encoding {
        0 => Ok(latin1(trim(data, short_terminator, 1))),
        1 => Ok(utf16_with_bom(trim(data, wide_terminator, 2))),
        2 => Ok(utf16(trim(data, wide_terminator, 2), u16::from_be_bytes)),
        3 => std::str::from_utf8(trim(data, short_terminator, 1))
            .map(str::to_owned)
            .map_err(|_| TagError::InvalidText("UTF-8")),
        other => Err(TagError::UnsupportedEncoding(other)),
    }
}

fn trim(data: &[u8], terminated: bool, width: usize) -> &[u8] {
    if terminated {
        &data[..data.len() - width]
    } else {
        data
    }
}

fn latin1(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

fn utf16_with_bom(data: &[u8]) -> String {
    match data {
        [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes),
        _ => utf16(data, u16::from_be_bytes),
    }
}

fn utf16(data: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn read_syncsafe_u32<S: ByteSource + ?Sized>(source: &mut S) -> Result<u32> {
    let bytes: [u8; 4] = read_array(source).in_header("ID3 size")?;
    Ok(bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | (b & 0x7F) as u32))
}

fn read_syncsafe_u24<S: ByteSource + ?Sized>(source: &mut S) -> Result<u32> {
    let bytes: [u8; 3] = read_array(source).in_header("ID3 frame header")?;
    Ok(bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | (b & 0x7F) as u32))
}

/// Extracts the gain value from the text of a `REPLAYGAIN_TRACK_GAIN` user text frame.
///
/// The returned value still carries its `dB` suffix.
pub fn txxx_gain_value(text: &str, mode: TxxxGainParsing) -> Option<String> {
    match mode {
        TxxxGainParsing::Strict => {
            let (description, value) = text
                .split_once('\0')
                .or_else(|| text.split_once('='))?;
            let description = description.trim_matches(|c: char| c == '\u{feff}' || c.is_whitespace());
            if !description.eq_ignore_ascii_case(REPLAYGAIN_TRACK_GAIN) {
                return None;
            }
            let value = value.trim_matches(|c: char| c == '\0' || c == '\u{feff}');
            Some(value.trim().to_owned())
        }
        TxxxGainParsing::Lenient => {
            let normalized = text.replace('\0', "=");
            if !normalized.to_uppercase().contains(REPLAYGAIN_TRACK_GAIN) {
                return None;
            }
            if !matches!(normalized.find("dB"), Some(index) if index > 0) {
                return None;
            }
            normalized.split('=').nth(1).map(|value| value.trim().to_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use rstest::rstest;

    fn syncsafe(value: u32) -> [u8; 4] {
        [
            ((value >> 21) & 0x7F) as u8,
            ((value >> 14) & 0x7F) as u8,
            ((value >> 7) & 0x7F) as u8,
            (value & 0x7F) as u8,
        ]
    }

    fn v3_frame(id: &str, encoding: u8, text: &[u8]) -> Vec<u8> {
        let mut frame = id.as_bytes().to_vec();
        frame.extend_from_slice(&(text.len() as u32 + 1).to_be_bytes());
        frame.extend_from_slice(&[0, 0]);
        frame.push(encoding);
        frame.extend_from_slice(text);
        frame
    }

    fn tag(version: u8, frames: &[Vec<u8>], padding: usize) -> Vec<u8> {
        let body: Vec<u8> = frames.concat();
        let mut tag = b"ID3".to_vec();
        tag.extend_from_slice(&[version, 0, 0]);
        tag.extend_from_slice(&syncsafe((body.len() + padding) as u32));
        tag.extend_from_slice(&body);
        tag.extend(std::iter::repeat(0).take(padding));
        tag
    }

    #[rstest]
    #[case(0, b"Caf\xe9\0".as_slice(), "Café")]
    #[case(3, "Café".as_bytes(), "Café")]
    #[case(1, b"\xff\xfeH\0i\0\0\0".as_slice(), "Hi")]
    #[case(1, b"\xfe\xff\0H\0i".as_slice(), "Hi")]
    #[case(2, b"\0H\0i\0\0".as_slice(), "Hi")]
    fn text_encodings(#[case] encoding: u8, #[case] data: &[u8], #[case] expected: &str) {
        assert_eq!(decode_text(encoding, data).unwrap(), expected);
    }

    #[test]
    fn unknown_encoding_is_reported() {
        assert_eq!(
            decode_text(7, b"abc"),
            Err(TagError::UnsupportedEncoding(7))
        );
    }

    #[test]
    fn collects_frames_and_stops_at_audio() {
        let mut data = tag(
            3,
            &[
                v3_frame("TIT2", 0, b"Title"),
                v3_frame("COMM", 0, b"ignored"),
                v3_frame("TXXX", 0, b"REPLAYGAIN_TRACK_GAIN\0-4.20 dB"),
            ],
            16,
        );
        let audio_start = data.len();
        data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);

        let mut source = Cursor::new(data);
        let skipped = skip_tags(&mut source).unwrap();
        assert_eq!(skipped.tags.tag_count, 1);
        assert_eq!(skipped.tags.tags.get(TITLE), Some("Title"));
        assert!(skipped.tags.tags.get("COMM").is_none());
        assert_eq!(
            skipped.tags.replay_gain_text.as_deref(),
            Some("REPLAYGAIN_TRACK_GAIN\0-4.20 dB")
        );
        assert_eq!(skipped.leftover, vec![0xFF, 0xFB, 0x90]);
        assert_eq!(ByteSource::position(&mut source).unwrap() as usize, audio_start + 3);
    }

    #[test]
    fn v22_names_are_mapped() {
        let mut frame = b"TT2".to_vec();
        frame.extend_from_slice(&[0, 0, 4, 0]);
        frame.extend_from_slice(b"Old");
        let mut data = tag(2, &[frame], 0);
        data.extend_from_slice(b"xyz");

        let skipped = skip_tags(&mut Cursor::new(data)).unwrap();
        assert_eq!(skipped.tags.tags.get(TITLE), Some("Old"));
    }

    fn v22_frame(id: &[u8; 3], text: &[u8]) -> Vec<u8> {
        let size = text.len() as u32 + 1;
        let mut frame = id.to_vec();
        frame.extend_from_slice(&[
            ((size >> 14) & 0x7F) as u8,
            ((size >> 7) & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]);
        frame.push(0);
        frame.extend_from_slice(text);
        frame
    }

    #[test]
    fn v22_long_frame_keeps_following_frames() {
        let title = vec![b'a'; 299];
        let frames = [v22_frame(b"TT2", &title), v22_frame(b"TP1", b"Artist")];
        // A 300 byte frame is declared as [0, 2, 0x2C].
        assert_eq!(&frames[0][3..6], &[0, 2, 0x2C]);
        let mut data = tag(2, &frames, 8);
        data.extend_from_slice(b"xyz");

        let skipped = skip_tags(&mut Cursor::new(data)).unwrap();
        assert_eq!(skipped.tags.tags.get(TITLE).map(str::len), Some(299));
        assert_eq!(skipped.tags.tags.get(ARTIST), Some("Artist"));
        assert_eq!(skipped.leftover, b"xyz");
    }

    #[rstest]
    #[case(0x0000, Some("Title"))]
    #[case(0x0008, None)]
    #[case(0x0004, None)]
    #[case(0x0002, None)]
    #[case(0x0001, None)]
    // Status flags do not affect the content.
    #[case(0x4000, Some("Title"))]
    fn v3_format_flags(#[case] flags: u16, #[case] expected: Option<&str>) {
        let mut frame = v3_frame("TIT2", 0, b"Title");
        frame[8..10].copy_from_slice(&flags.to_be_bytes());
        let mut data = tag(3, &[frame, v3_frame("TPE1", 0, b"Band")], 0);
        data.extend_from_slice(b"xyz");

        let skipped = skip_tags(&mut Cursor::new(data)).unwrap();
        assert_eq!(skipped.tags.tags.get(TITLE), expected);
        assert_eq!(skipped.tags.tags.get(ARTIST), Some("Band"));
    }

    #[test]
    fn compressed_v4_frames_are_not_decoded() {
        let mut frame = b"TPE1".to_vec();
        frame.extend_from_slice(&syncsafe(4));
        frame.extend_from_slice(&FLAG_COMPRESSION.to_be_bytes());
        frame.extend_from_slice(&[0, b'a', b'b', b'c']);
        let mut data = tag(4, &[frame], 0);
        data.extend_from_slice(b"xyz");

        let skipped = skip_tags(&mut Cursor::new(data)).unwrap();
        assert!(skipped.tags.tags.is_empty());
    }

    #[test]
    fn fourth_tag_is_rejected() {
        let one = tag(3, &[v3_frame("TIT2", 0, b"x")], 0);
        let data = [one.clone(), one.clone(), one.clone(), one].concat();
        let err = skip_tags(&mut Cursor::new(data)).unwrap_err();
        assert!(matches!(err, ContainerError::MalformedHeader(_)));
    }

    #[test]
    fn three_tags_are_accepted() {
        let one = tag(3, &[v3_frame("TIT2", 0, b"x")], 0);
        let data = [one.clone(), one.clone(), one, b"abc".to_vec()].concat();
        let skipped = skip_tags(&mut Cursor::new(data)).unwrap();
        assert_eq!(skipped.tags.tag_count, 3);
        assert_eq!(skipped.leftover, b"abc");
    }

    #[test]
    fn empty_input_is_truncated() {
        let err = skip_tags(&mut Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, ContainerError::TruncatedInput(_)));
    }

    #[rstest]
    #[case("REPLAYGAIN_TRACK_GAIN\0-4.20 dB", Some("-4.20 dB"))]
    #[case("replaygain_track_gain\0+1.5 dB\0", Some("+1.5 dB"))]
    #[case("REPLAYGAIN_TRACK_GAIN=-2 dB", Some("-2 dB"))]
    #[case("MY_REPLAYGAIN_TRACK_GAIN_NOTE\0-9 dB", None)]
    #[case("REPLAYGAIN_TRACK_PEAK\00.98", None)]
    fn strict_txxx(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            txxx_gain_value(text, TxxxGainParsing::Strict).as_deref(),
            expected
        );
    }

    #[rstest]
    #[case("REPLAYGAIN_TRACK_GAIN\0-4.20 dB", Some("-4.20 dB"))]
    #[case("MY_REPLAYGAIN_TRACK_GAIN_NOTE\0-9 dB", Some("-9 dB"))]
    #[case("REPLAYGAIN_TRACK_GAIN\0-4.20", None)]
    fn lenient_txxx(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            txxx_gain_value(text, TxxxGainParsing::Lenient).as_deref(),
            expected
        );
    }
}
