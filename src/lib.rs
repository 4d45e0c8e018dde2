//! Container demultiplexing, seeking and loudness normalization for compressed audio.
//!
//! This crate locates and extracts the compressed frames of FLAC, MP3, Ogg (Vorbis, Opus) and
//! Matroska (AAC, Opus, Vorbis) tracks, hands them to a codec decoder, scales the decoded PCM by
//! the track's ReplayGain/R128 gain and forwards it to a downstream [`Pipeline`].
//!
//! Decoding and output are supplied by the embedding application through two traits:
//!
//! - [`AudioDecoder`] decodes compressed packets into a [`PcmBuffer`].
//! - [`Pipeline`] receives decoded batches and seek reports.
//!
//! Every format exposes a provider implementing [`TrackProvider`]:
//!
//! | Format       | Provider                                              |
//! |--------------|-------------------------------------------------------|
//! | FLAC         | [`flac::FlacTrackProvider`]                           |
//! | MP3          | [`mp3::Mp3TrackProvider`]                             |
//! | Ogg Vorbis   | [`ogg::vorbis::OggVorbisTrackHandler`]                |
//! | Ogg Opus     | [`ogg::opus::OggOpusTrackHandler`]                    |
//! | Matroska     | [`matroska::MatroskaTrackConsumer`] implementations   |
//!
//! A provider is created over a [`ByteSource`], has its headers parsed, then alternates
//! [`TrackProvider::provide_frames`] and [`TrackProvider::seek_to_timecode`] until it is closed.
//! Frame production stops early when the shared [`Interrupt`] is raised.
//!
//! ```no_run
//! use std::fs::File;
//!
//! use audiodemux::{
//!     AudioDecoder, FlacTrackProvider, Interrupt, Pipeline, Settings, TrackProvider,
//! };
//!
//! fn play<D, P>(decoder: D, pipeline: P) -> audiodemux::Result<()>
//! where
//!     D: AudioDecoder<Sample = i32>,
//!     P: Pipeline,
//! {
//!     let file = File::open("music.flac")?;
//!     let settings = Settings::default().with_replay_gain(true);
//!     let mut provider = FlacTrackProvider::new(file, decoder, pipeline, settings, Interrupt::new());
//!     provider.parse_headers()?;
//!     provider.seek_to_timecode(30_000)?;
//!     provider.provide_frames()?;
//!     provider.close()
//! }
//! ```
//!
//! ## Features
//!
//! No decoder is bundled by default. The `symphonia-flac`, `symphonia-mp3` and `symphonia-aac`
//! features enable [`codec::SymphoniaDecoder`] for those codecs.
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod common;
pub mod control;
pub mod error;
pub mod flac;
pub mod gain;
pub mod io;
pub mod math;
pub mod matroska;
pub mod mp3;
pub mod ogg;
pub mod pipeline;
pub mod provider;
pub mod sample;
pub mod seek;
pub mod settings;
pub mod tags;

pub use crate::codec::{AudioDecoder, CodecConfig, CodecKind, DecoderError};
pub use crate::common::{ChannelCount, SampleRate, Timecode};
pub use crate::control::Interrupt;
pub use crate::error::{ContainerError, Result};
pub use crate::flac::FlacTrackProvider;
pub use crate::gain::{GainPolicy, GainState};
pub use crate::io::{ByteSource, ReadSeekSource};
pub use crate::matroska::MatroskaTrackConsumer;
pub use crate::mp3::Mp3TrackProvider;
pub use crate::ogg::{OggPacketStream, OggTrackBlueprint, OggTrackHandler};
pub use crate::pipeline::{PacketRouter, Pipeline, PipelineError};
pub use crate::provider::{FrameOutcome, Lifecycle, TrackInfo, TrackProvider};
pub use crate::sample::{PcmBatch, PcmBuffer, Sample};
pub use crate::settings::Settings;
pub use crate::tags::TagMap;
