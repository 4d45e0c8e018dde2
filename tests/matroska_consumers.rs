use approx::assert_relative_eq;
use audiodemux::codec::CodecKind;
use audiodemux::matroska::{
    AudioDetails, MatroskaAacTrackConsumer, MatroskaAudioTrack, MatroskaCodec,
    MatroskaOpusTrackConsumer, MatroskaVorbisTrackConsumer,
};
use audiodemux::pipeline::{DecodingPacketRouter, RouterConfig, SampleFormat};
use audiodemux::tags::matroska::{collect, SimpleTag};
use audiodemux::{ContainerError, MatroskaTrackConsumer, Settings, TagMap};
use rstest::rstest;

mod test_support;
use test_support::*;

fn track(codec_id: &str, codec_private: Vec<u8>, audio: AudioDetails) -> MatroskaAudioTrack {
    MatroskaAudioTrack {
        number: 1,
        codec_id: codec_id.to_owned(),
        codec_private,
        audio,
    }
}

fn tags(entries: &[(&str, &str)]) -> TagMap {
    let simple: Vec<SimpleTag> = entries
        .iter()
        .map(|(name, value)| SimpleTag::new(*name, *value))
        .collect();
    collect(&simple)
}

/// Codec private data of a Vorbis track: lace count, two laced sizes, then the three headers.
fn vorbis_private(channels: u8, sample_rate: u32) -> Vec<u8> {
    let identification = vorbis_identification(channels, sample_rate);
    let comments = vorbis_comment_packet(&[]);
    let mut private = vec![2, identification.len() as u8, comments.len() as u8];
    private.extend(identification);
    private.extend(comments);
    private.extend(vorbis_setup_packet());
    private
}

#[test]
fn aac_payload_is_chunked() {
    let router = RecordingRouter::new();
    let log = router.log();
    let mut consumer = MatroskaAacTrackConsumer::new(
        track("A_AAC", vec![0x12, 0x10], AudioDetails::new(44100.0, 2)),
        &TagMap::new(),
        router,
        &Settings::default(),
    );
    assert_eq!(consumer.track().codec(), Some(MatroskaCodec::Aac));

    consumer.initialise().unwrap();
    let payload: Vec<u8> = (0..10_000u32).map(|n| n as u8).collect();
    consumer.consume(&payload).unwrap();
    consumer.consume(&[1, 2, 3]).unwrap();

    let log = log.borrow();
    assert_eq!(log.inputs, vec![4096, 4096, 1808, 3]);
    assert_eq!(log.packets.len(), 2);
    assert_eq!(log.packets[0], payload);
    assert_eq!(log.multiplier, None);
}

#[rstest]
#[case(&[("R128_TRACK_GAIN", "-1536")], Some(0.5012))]
#[case(&[("REPLAYGAIN_TRACK_GAIN", "-6 dB"), ("R128_TRACK_GAIN", "-1536")], Some(0.5012))]
#[case(&[("REPLAYGAIN_TRACK_GAIN", "+6.0 dB")], Some(1.9953))]
#[case(&[], None)]
fn aac_gain_from_tags(#[case] entries: &[(&str, &str)], #[case] expected: Option<f32>) {
    let router = RecordingRouter::new();
    let log = router.log();
    let consumer = MatroskaAacTrackConsumer::new(
        track("A_AAC", Vec::new(), AudioDetails::new(48000.0, 2)),
        &tags(entries),
        router,
        &Settings::default().with_replay_gain(true),
    );
    assert_eq!(consumer.is_replay_gain_applied(), expected.is_some());

    match (log.borrow().multiplier, expected) {
        (Some(actual), Some(expected)) => assert_relative_eq!(actual, expected, max_relative = 0.001),
        (actual, expected) => assert_eq!(actual, expected),
    };
}

#[test]
fn aac_through_decoding_router() {
    let pipeline = RecordingPipeline::new();
    let pipeline_log = pipeline.log();
    let decoder = ScriptedDecoder::<i16>::new(CodecKind::Aac, 1024, 0);
    let decoder_log = decoder.log();
    let private = [0x12, 0x10];
    let router = DecodingPacketRouter::new(decoder, pipeline, RouterConfig::aac(&private, 44100, 2));

    let mut consumer = MatroskaAacTrackConsumer::new(
        track("A_AAC/MPEG4/LC", private.to_vec(), AudioDetails::new(44100.0, 2)),
        &TagMap::new(),
        router,
        &Settings::default(),
    );
    consumer.initialise().unwrap();
    for marker in 1..=3u8 {
        consumer.consume(&[marker; 300]).unwrap();
    }
    consumer.seek_performed(5000, 4990).unwrap();
    consumer.flush().unwrap();
    consumer.close().unwrap();

    let pipeline_log = pipeline_log.borrow();
    assert_eq!(pipeline_log.format.unwrap().sample_format, SampleFormat::I16);
    assert_eq!(pipeline_log.leading_samples(), vec![100.0, 200.0, 300.0]);
    assert_eq!(pipeline_log.seeks, vec![(5000, 4990)]);
    assert_eq!(pipeline_log.flushes, 1);
    assert_eq!(pipeline_log.closes, 1);
    assert_eq!(decoder_log.borrow().resets, 1);
}

#[test]
fn consume_before_initialise_is_rejected() {
    let mut consumer = MatroskaAacTrackConsumer::new(
        track("A_AAC", Vec::new(), AudioDetails::new(44100.0, 2)),
        &TagMap::new(),
        RecordingRouter::new(),
        &Settings::default(),
    );
    assert!(matches!(
        consumer.consume(&[0; 10]),
        Err(ContainerError::HeadersNotParsed)
    ));
}

#[test]
fn close_twice_fails() {
    let router = RecordingRouter::new();
    let log = router.log();
    let mut consumer = MatroskaOpusTrackConsumer::new(
        track("A_OPUS", opus_head(2, 312, 0), AudioDetails::new(48000.0, 2)),
        &TagMap::new(),
        router,
        &Settings::default(),
    );
    consumer.initialise().unwrap();
    consumer.close().unwrap();
    assert!(matches!(consumer.close(), Err(ContainerError::Closed)));
    assert!(matches!(
        consumer.consume(&[1]),
        Err(ContainerError::Closed)
    ));
    drop(consumer);
    assert_eq!(log.borrow().closes, 1);
}

#[test]
fn dropped_consumer_closes_router() {
    let router = RecordingRouter::new();
    let log = router.log();
    let consumer = MatroskaAacTrackConsumer::new(
        track("A_AAC", Vec::new(), AudioDetails::new(44100.0, 2)),
        &TagMap::new(),
        router,
        &Settings::default(),
    );
    drop(consumer);
    assert_eq!(log.borrow().closes, 1);
}

#[rstest]
// Header gain alone: -1 dB.
#[case(false, &[], Some(0.8913))]
// R128 -2 dB plus header -1 dB.
#[case(true, &[("R128_TRACK_GAIN", "-512")], Some(0.7079))]
// REPLAYGAIN is used when there is no R128 tag.
#[case(true, &[("REPLAYGAIN_TRACK_GAIN", "-5 dB")], Some(0.5012))]
fn opus_gain(
    #[case] replay_gain: bool,
    #[case] entries: &[(&str, &str)],
    #[case] expected: Option<f32>,
) {
    let router = RecordingRouter::new();
    let log = router.log();
    let consumer = MatroskaOpusTrackConsumer::new(
        track("A_OPUS", opus_head(2, 312, -256), AudioDetails::new(48000.0, 2)),
        &tags(entries),
        router,
        &Settings::default().with_replay_gain(replay_gain),
    );
    assert!(consumer.is_replay_gain_applied());
    assert_relative_eq!(
        log.borrow().multiplier.unwrap(),
        expected.unwrap(),
        max_relative = 0.001
    );
}

#[test]
fn opus_skips_empty_blocks() {
    let router = RecordingRouter::new();
    let log = router.log();
    let mut consumer = MatroskaOpusTrackConsumer::new(
        track("A_OPUS", opus_head(1, 0, 0), AudioDetails::new(48000.0, 1)),
        &TagMap::new(),
        router,
        &Settings::default(),
    );
    consumer.initialise().unwrap();
    consumer.consume(&[]).unwrap();
    consumer.consume(&[0xFC, 0xFF, 0xFE]).unwrap();

    let log = log.borrow();
    assert_eq!(log.packets, vec![vec![0xFC, 0xFF, 0xFE]]);
    assert_eq!(log.multiplier, None);
}

#[test]
fn vorbis_decodes_through_pipeline() {
    let decoder = ScriptedDecoder::<f32>::new(CodecKind::Vorbis, 5000, 0);
    let decoder_log = decoder.log();
    let pipeline = RecordingPipeline::new();
    let log = pipeline.log();
    let mut consumer = MatroskaVorbisTrackConsumer::new(
        track("A_VORBIS", vorbis_private(2, 44100), AudioDetails::new(44100.0, 2)),
        &tags(&[("REPLAYGAIN_TRACK_GAIN", "-6.02 dB")]),
        decoder,
        pipeline,
        &Settings::default().with_replay_gain(true),
    )
    .unwrap();

    consumer.initialise().unwrap();
    consumer.consume(&[50; 64]).unwrap();
    consumer.seek_performed(1000, 980).unwrap();
    consumer.close().unwrap();

    let log = log.borrow();
    let format = log.format.unwrap();
    assert_eq!(format.sample_format, SampleFormat::F32);
    assert_eq!(format.sample_rate, 44100);
    // 5000 frames do not fit in one buffer.
    assert_eq!(log.batches.len(), 2);
    assert_eq!(log.total_frames(), 5000);
    assert_relative_eq!(log.batches[1].first_channel[0], 0.25, max_relative = 0.01);
    assert_eq!(log.seeks, vec![(1000, 980)]);
    assert_eq!(log.closes, 1);

    let decoder_log = decoder_log.borrow();
    assert_eq!(decoder_log.configured, Some(CodecKind::Vorbis));
    assert_eq!(decoder_log.resets, 1);
    assert_eq!(decoder_log.closes, 1);
}

#[test]
fn vorbis_channels_from_identification_header() {
    let consumer = MatroskaVorbisTrackConsumer::new(
        track("A_VORBIS", vorbis_private(6, 48000), AudioDetails::new(48000.0, 0)),
        &TagMap::new(),
        ScriptedDecoder::<f32>::new(CodecKind::Vorbis, 100, 0),
        RecordingPipeline::new(),
        &Settings::default(),
    )
    .unwrap();
    assert_eq!(consumer.details().channels, 6);
}

#[test]
fn vorbis_rejects_unexpected_lacing_count() {
    let mut private = vorbis_private(2, 44100);
    private[0] = 1;
    let result = MatroskaVorbisTrackConsumer::new(
        track("A_VORBIS", private, AudioDetails::new(44100.0, 0)),
        &TagMap::new(),
        ScriptedDecoder::<f32>::new(CodecKind::Vorbis, 100, 0),
        RecordingPipeline::new(),
        &Settings::default(),
    );
    assert!(matches!(
        result,
        Err(ContainerError::MalformedHeader(message)) if message == "Unexpected lacing count"
    ));
}
