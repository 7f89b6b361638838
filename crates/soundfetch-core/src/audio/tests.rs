use core::convert::Infallible;

use super::*;
use crate::config::PlaybackSettings;

/// MPEG-1 layer III, 128 kbps, 44.1 kHz, mono, no padding.
const SILENT_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC0];
const SILENT_FRAME_BYTES: usize = 417;
const SAMPLES_PER_FRAME: u32 = 1152;

fn silent_mp3(frames: usize) -> Vec<u8> {
    let mut frame = vec![0u8; SILENT_FRAME_BYTES];
    frame[..4].copy_from_slice(&SILENT_HEADER);
    frame.repeat(frames)
}

/// Sink that plays out `capacity` frames between services.
struct RecordingSink {
    rate: u32,
    capacity: usize,
    free: usize,
    frames: Vec<StereoFrame>,
}

impl RecordingSink {
    fn new(rate: u32, capacity: usize) -> Self {
        Self {
            rate,
            capacity,
            free: capacity,
            frames: Vec::new(),
        }
    }

    fn drain(&mut self) {
        self.free = self.capacity;
    }
}

impl PcmSink for RecordingSink {
    type Error = Infallible;

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn free_frames(&mut self) -> Result<usize, Self::Error> {
        Ok(self.free)
    }

    fn write_frames(&mut self, frames: &[StereoFrame]) -> Result<(), Self::Error> {
        assert!(frames.len() <= self.free, "sink overrun");
        self.free -= frames.len();
        self.frames.extend_from_slice(frames);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct Underrun;

struct BrokenSink;

impl PcmSink for BrokenSink {
    type Error = Underrun;

    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn free_frames(&mut self) -> Result<usize, Self::Error> {
        Ok(64)
    }

    fn write_frames(&mut self, _frames: &[StereoFrame]) -> Result<(), Self::Error> {
        Err(Underrun)
    }
}

fn play_to_end(player: &mut Mp3Player<&[u8]>, sink: &mut RecordingSink) -> u32 {
    let mut services = 0;
    while player.service(sink).unwrap() {
        sink.drain();
        services += 1;
        assert!(services < 10_000, "playback never finished");
    }
    services
}

#[test]
fn mono_downmix_averages_and_duplicates() {
    let mut frames = [[100, 300], [-4, 2], [i16::MAX, i16::MAX]];
    let settings = PlaybackSettings::new().with_mono(true);
    shape_frames(&mut frames, &settings);
    assert_eq!(frames, [[200, 200], [-1, -1], [i16::MAX, i16::MAX]]);
}

#[test]
fn gain_scales_and_saturates() {
    let mut frames = [[1000, -1000], [30_000, -30_000]];
    shape_frames(&mut frames, &PlaybackSettings::new().with_gain(2.0));
    assert_eq!(frames, [[2000, -2000], [i16::MAX, i16::MIN]]);

    let mut frames = [[1000, -1000]];
    shape_frames(&mut frames, &PlaybackSettings::new().with_gain(0.5));
    assert_eq!(frames, [[500, -500]]);
}

#[test]
fn unity_stereo_leaves_frames_untouched() {
    let mut frames = [[1, 2], [3, 4]];
    shape_frames(&mut frames, &PlaybackSettings::new());
    assert_eq!(frames, [[1, 2], [3, 4]]);
}

#[test]
fn equal_rates_pass_through() {
    let input: Vec<StereoFrame> = (0..10).map(|i| [i, -i]).collect();
    let mut output = [[0; 2]; 10];
    let mut adapter = RateAdapter::new(44_100, 44_100);
    assert!(adapter.is_passthrough());
    assert_eq!(adapter.process(&input, &mut output), (10, 10));
    assert_eq!(&output[..], &input[..]);
}

#[test]
fn upsampling_holds_each_frame() {
    let input = [[1, 1], [2, 2], [3, 3]];
    let mut output = [[0; 2]; 8];
    let mut adapter = RateAdapter::new(22_050, 44_100);
    assert_eq!(adapter.process(&input, &mut output), (3, 6));
    assert_eq!(output[..6], [[1, 1], [1, 1], [2, 2], [2, 2], [3, 3], [3, 3]]);
}

#[test]
fn downsampling_carries_phase_across_chunks() {
    let input: Vec<StereoFrame> = (0..9).map(|i| [i, i]).collect();
    let mut adapter = RateAdapter::new(48_000, 24_000);
    let mut collected = Vec::new();
    for chunk in input.chunks(3) {
        let mut output = [[0; 2]; 4];
        let (consumed, produced) = adapter.process(chunk, &mut output);
        assert_eq!(consumed, chunk.len());
        collected.extend_from_slice(&output[..produced]);
    }
    assert_eq!(collected, vec![[0, 0], [2, 2], [4, 4], [6, 6], [8, 8]]);
}

#[test]
fn small_output_leaves_input_for_next_call() {
    let input = [[1, 1], [2, 2], [3, 3]];
    let mut adapter = RateAdapter::new(22_050, 44_100);
    let mut output = [[0; 2]; 3];
    let (consumed, produced) = adapter.process(&input, &mut output);
    assert_eq!((consumed, produced), (1, 3));
    assert_eq!(output, [[1, 1], [1, 1], [2, 2]]);

    let (consumed, produced) = adapter.process(&input[consumed..], &mut output);
    assert_eq!((consumed, produced), (2, 3));
    assert_eq!(output, [[2, 2], [3, 3], [3, 3]]);
}

#[test]
fn silent_stream_plays_to_the_end() {
    let data = silent_mp3(12);
    let mut player = Mp3Player::new(PlaybackSettings::default());
    player.begin(&data[..]).unwrap();
    assert!(player.is_running());
    assert_eq!(player.report().sample_rate, 44_100);
    assert_eq!(player.report().channels, 1);

    let mut sink = RecordingSink::new(44_100, 700);
    let services = play_to_end(&mut player, &mut sink);
    assert!(services > 1);
    assert!(!player.is_running());

    let report = player.report();
    assert!(report.frames_decoded >= 10);
    assert_eq!(report.frames_written, report.frames_decoded * SAMPLES_PER_FRAME);
    assert_eq!(sink.frames.len() as u32, report.frames_written);
    assert!(sink.frames.iter().all(|frame| *frame == [0, 0]));
}

#[test]
fn slower_sink_receives_resampled_stream() {
    let data = silent_mp3(12);
    let mut player = Mp3Player::new(PlaybackSettings::new());
    player.begin(&data[..]).unwrap();

    let mut sink = RecordingSink::new(22_050, 4096);
    play_to_end(&mut player, &mut sink);

    let report = player.report();
    assert_eq!(report.frames_written, report.frames_decoded * SAMPLES_PER_FRAME / 2);
}

#[test]
fn full_sink_keeps_player_waiting() {
    let data = silent_mp3(12);
    let mut player = Mp3Player::new(PlaybackSettings::default());
    player.begin(&data[..]).unwrap();

    let mut sink = RecordingSink::new(44_100, 0);
    assert!(player.service(&mut sink).unwrap());
    assert!(sink.frames.is_empty());
    assert!(player.is_running());
}

#[test]
fn stream_without_audio_fails_to_begin() {
    let junk = vec![0u8; 1000];
    let mut player = Mp3Player::new(PlaybackSettings::default());
    assert_eq!(player.begin(&junk[..]), Err(PlaybackError::NoAudio));
    assert!(!player.is_running());
    assert_eq!(player.report().frames_decoded, 0);

    let mut sink = RecordingSink::new(44_100, 64);
    assert_eq!(player.service(&mut sink), Ok(false));
}

#[test]
fn stop_ends_playback_early() {
    let data = silent_mp3(12);
    let mut player = Mp3Player::new(PlaybackSettings::default());
    player.begin(&data[..]).unwrap();
    player.stop();
    assert!(!player.is_running());

    let mut sink = RecordingSink::new(44_100, 64);
    assert_eq!(player.service(&mut sink), Ok(false));
    assert!(sink.frames.is_empty());
}

#[test]
fn sink_failure_is_reported() {
    let data = silent_mp3(12);
    let mut player = Mp3Player::new(PlaybackSettings::default());
    player.begin(&data[..]).unwrap();
    assert_eq!(
        player.service(&mut BrokenSink),
        Err(PlaybackError::Sink(Underrun))
    );
}

#[test]
fn frame_len_follows_header_fields() {
    use super::frame::frame_len;

    assert_eq!(frame_len(&SILENT_HEADER), Some(SILENT_FRAME_BYTES));
    // Padding bit set.
    assert_eq!(frame_len(&[0xFF, 0xFB, 0x92, 0xC0]), Some(SILENT_FRAME_BYTES + 1));
    // MPEG-2 layer III, 80 kbps, 22.05 kHz.
    assert_eq!(frame_len(&[0xFF, 0xF3, 0x90, 0xC0]), Some(261));
    // MPEG-1 layer I, 288 kbps, 44.1 kHz.
    assert_eq!(frame_len(&[0xFF, 0xFF, 0x90, 0xC0]), Some(312));

    assert_eq!(frame_len(&[0xFF, 0xFB, 0x00, 0xC0]), None);
    assert_eq!(frame_len(&[0xFF, 0xFB, 0xF0, 0xC0]), None);
    assert_eq!(frame_len(b"TAG title"), None);
    assert_eq!(frame_len(&SILENT_HEADER[..3]), None);
}

#[test]
fn trailing_id3v1_tag_keeps_last_frame() {
    let mut data = silent_mp3(12);
    let mut tag = vec![0u8; 128];
    tag[..3].copy_from_slice(b"TAG");
    data.extend_from_slice(&tag);

    let mut player = Mp3Player::new(PlaybackSettings::default());
    player.begin(&data[..]).unwrap();
    let mut sink = RecordingSink::new(44_100, 4096);
    play_to_end(&mut player, &mut sink);

    let report = player.report();
    assert_eq!(report.frames_decoded, 12);
    assert_eq!(report.skipped_bytes, 128);
}

#[test]
fn junk_ahead_of_first_frame_is_counted() {
    let mut data = vec![0xFFu8; 9_000];
    data.extend_from_slice(&silent_mp3(12));

    let mut player = Mp3Player::new(PlaybackSettings::default());
    player.begin(&data[..]).unwrap();
    let mut sink = RecordingSink::new(44_100, 4096);
    play_to_end(&mut player, &mut sink);

    let report = player.report();
    assert_eq!(report.frames_decoded, 12);
    assert_eq!(report.skipped_bytes, 9_000);
}

#[test]
fn pumped_frames_are_resampled_then_shaped() {
    let input = [[100, 300], [-40, 20]];
    let mut staging = [[0; 2]; 8];
    let mut adapter = RateAdapter::new(22_050, 44_100);
    let settings = PlaybackSettings::new().with_mono(true).with_gain(0.5);
    let mut sink = RecordingSink::new(44_100, 8);

    let result = pump_frames(&mut adapter, &settings, &input, &mut staging, &mut sink);
    assert_eq!(result, Ok((2, 4)));
    assert_eq!(sink.frames, vec![[100, 100], [100, 100], [-5, -5], [-5, -5]]);
    assert_eq!(sink.free, 4);
}

#[test]
fn pump_with_no_room_writes_nothing() {
    let mut adapter = RateAdapter::new(44_100, 44_100);
    let result = pump_frames(
        &mut adapter,
        &PlaybackSettings::default(),
        &[[1, 1]],
        &mut [],
        &mut BrokenSink,
    );
    assert_eq!(result, Ok((0, 0)));
}
