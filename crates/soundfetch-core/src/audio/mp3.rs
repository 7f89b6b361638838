//! Cooperative MP3 playback from a byte reader into a [`PcmSink`].

use core::convert::Infallible;

use log::{debug, info, warn};
use rmp3::{Frame, MAX_SAMPLES_PER_FRAME, RawDecoder, Sample};

use super::{
    PcmSink, RateAdapter, StereoFrame,
    frame::{HEADER_BYTES, ID3V1_TAG_BYTES, frame_len},
    pump_frames,
};
use crate::config::PlaybackSettings;

/// Compressed input window. Larger than any layer III frame at 48 kHz/320 kbps.
const INPUT_BYTES: usize = 4096;
const MAX_FRAMES_PER_MP3_FRAME: usize = MAX_SAMPLES_PER_FRAME / 2;
const STAGING_FRAMES: usize = 256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlaybackError<ReadErr, SinkErr> {
    Read(ReadErr),
    Sink(SinkErr),
    /// The stream ended before a single audio frame decoded.
    NoAudio,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PlaybackReport {
    /// MP3 frames that produced samples.
    pub frames_decoded: u32,
    /// Stereo frames handed to the sink.
    pub frames_written: u32,
    /// Rate of the most recent decoded frame.
    pub sample_rate: u32,
    pub channels: u16,
    /// Input bytes that were not audio (tags, junk, undecodable frames).
    pub skipped_bytes: u32,
}

/// Streaming decoder with a small output pump.
///
/// [`Mp3Player::begin`] decodes the first frame; [`Mp3Player::service`] is
/// then called in a loop and pushes as many frames as the sink will take,
/// decoding further frames on demand, until the reader runs dry.
pub struct Mp3Player<R> {
    reader: Option<R>,
    settings: PlaybackSettings,
    decoder: RawDecoder,
    input: [u8; INPUT_BYTES],
    start: usize,
    filled: usize,
    eof: bool,
    tail_trimmed: bool,
    samples: [Sample; MAX_SAMPLES_PER_FRAME],
    decoded: [StereoFrame; MAX_FRAMES_PER_MP3_FRAME],
    decoded_len: usize,
    decoded_pos: usize,
    decoded_rate: u32,
    adapter: RateAdapter,
    staging: [StereoFrame; STAGING_FRAMES],
    report: PlaybackReport,
}

impl<R: embedded_io::Read> Mp3Player<R> {
    pub fn new(settings: PlaybackSettings) -> Self {
        Self {
            reader: None,
            settings,
            decoder: RawDecoder::new(),
            input: [0; INPUT_BYTES],
            start: 0,
            filled: 0,
            eof: false,
            tail_trimmed: false,
            samples: [Sample::default(); MAX_SAMPLES_PER_FRAME],
            decoded: [[0; 2]; MAX_FRAMES_PER_MP3_FRAME],
            decoded_len: 0,
            decoded_pos: 0,
            decoded_rate: 0,
            adapter: RateAdapter::new(0, 0),
            staging: [[0; 2]; STAGING_FRAMES],
            report: PlaybackReport::default(),
        }
    }

    /// Starts playing `reader` from its current position.
    ///
    /// Fails if the stream holds no decodable audio; the player is stopped
    /// in that case.
    pub fn begin(&mut self, reader: R) -> Result<(), PlaybackError<R::Error, Infallible>> {
        self.decoder = RawDecoder::new();
        self.reader = Some(reader);
        self.start = 0;
        self.filled = 0;
        self.eof = false;
        self.tail_trimmed = false;
        self.decoded_len = 0;
        self.decoded_pos = 0;
        self.decoded_rate = 0;
        self.adapter = RateAdapter::new(0, 0);
        self.report = PlaybackReport::default();

        match self.decode_next() {
            Ok(true) => {
                info!(
                    "mp3: playing {} Hz, {} channel(s), gain={} mono={}",
                    self.report.sample_rate,
                    self.report.channels,
                    self.settings.gain(),
                    self.settings.mono()
                );
                Ok(())
            }
            Ok(false) => {
                self.reader = None;
                Err(PlaybackError::NoAudio)
            }
            Err(err) => {
                self.reader = None;
                Err(PlaybackError::Read(err))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.reader.is_some()
    }

    /// Pushes decoded audio into `sink` until it is full or the stream ends.
    ///
    /// Returns whether playback is still running.
    pub fn service<S: PcmSink>(
        &mut self,
        sink: &mut S,
    ) -> Result<bool, PlaybackError<R::Error, S::Error>> {
        if self.reader.is_none() {
            return Ok(false);
        }

        loop {
            if self.decoded_pos >= self.decoded_len {
                match self.decode_next() {
                    Ok(true) => {}
                    Ok(false) => {
                        self.finish();
                        return Ok(false);
                    }
                    Err(err) => {
                        self.stop();
                        return Err(PlaybackError::Read(err));
                    }
                }
            }

            let free = sink.free_frames().map_err(PlaybackError::Sink)?;
            if free == 0 {
                return Ok(true);
            }

            let out_rate = sink.sample_rate();
            if self.adapter.input_rate() != self.decoded_rate
                || self.adapter.output_rate() != out_rate
            {
                if self.decoded_rate != out_rate {
                    debug!("mp3: resampling {} Hz -> {} Hz", self.decoded_rate, out_rate);
                }
                self.adapter = RateAdapter::new(self.decoded_rate, out_rate);
            }

            let room = free.min(STAGING_FRAMES);
            let (consumed, produced) = pump_frames(
                &mut self.adapter,
                &self.settings,
                &self.decoded[self.decoded_pos..self.decoded_len],
                &mut self.staging[..room],
                sink,
            )
            .map_err(PlaybackError::Sink)?;
            self.decoded_pos += consumed;
            self.report.frames_written = self.report.frames_written.saturating_add(produced as u32);
        }
    }

    /// Abandons playback and drops the reader.
    pub fn stop(&mut self) {
        if self.reader.take().is_some() {
            info!("mp3: stopped after {} frames", self.report.frames_decoded);
        }
        self.decoded_len = 0;
        self.decoded_pos = 0;
    }

    pub fn report(&self) -> PlaybackReport {
        self.report
    }

    fn finish(&mut self) {
        self.reader = None;
        info!(
            "mp3: end of stream, {} frames decoded, {} written, {} bytes skipped",
            self.report.frames_decoded, self.report.frames_written, self.report.skipped_bytes
        );
    }

    /// Decodes the next audio frame into `decoded`. `Ok(false)` at end of stream.
    fn decode_next(&mut self) -> Result<bool, R::Error> {
        loop {
            self.top_up()?;
            if self.eof && !self.tail_trimmed {
                self.tail_trimmed = true;
                self.trim_id3v1_tag();
            }

            let window = &self.input[self.start..self.filled];
            match self.decoder.next(window, &mut self.samples) {
                Some((Frame::Audio(audio), used)) => {
                    let channels = audio.channels();
                    let rate = audio.sample_rate();
                    let count = to_stereo(audio.samples(), channels, &mut self.decoded);
                    let junk = leading_junk(window, used);
                    if junk > 0 {
                        debug!("mp3: {} bytes skipped before frame", junk);
                        self.report.skipped_bytes =
                            self.report.skipped_bytes.saturating_add(junk as u32);
                    }
                    self.start += used;

                    self.decoded_len = count;
                    self.decoded_pos = 0;
                    self.decoded_rate = rate;
                    self.report.frames_decoded = self.report.frames_decoded.saturating_add(1);
                    self.report.sample_rate = rate;
                    self.report.channels = channels;
                    if count > 0 {
                        return Ok(true);
                    }
                }
                Some((Frame::Other(_), used)) => {
                    let used = used.max(1).min(window.len());
                    self.start += used;
                    self.report.skipped_bytes = self.report.skipped_bytes.saturating_add(used as u32);
                }
                None if self.eof => {
                    let rest = self.filled - self.start;
                    if rest > 0 {
                        debug!("mp3: {} trailing bytes ignored", rest);
                    }
                    self.report.skipped_bytes = self.report.skipped_bytes.saturating_add(rest as u32);
                    self.start = self.filled;
                    return Ok(false);
                }
                None => {
                    // A full window with no complete frame: slide past the false sync.
                    warn!("mp3: unsyncable data, skipping a byte");
                    self.start = 1;
                    self.report.skipped_bytes = self.report.skipped_bytes.saturating_add(1);
                }
            }
        }
    }

    /// Drops a trailing ID3v1 tag. Left in place it hides the last frame,
    /// whose end no longer lines up with a following header.
    fn trim_id3v1_tag(&mut self) {
        let rest = &self.input[self.start..self.filled];
        if rest.len() >= ID3V1_TAG_BYTES
            && rest[rest.len() - ID3V1_TAG_BYTES..].starts_with(b"TAG")
        {
            debug!("mp3: ID3v1 tag dropped");
            self.filled -= ID3V1_TAG_BYTES;
            self.report.skipped_bytes = self
                .report
                .skipped_bytes
                .saturating_add(ID3V1_TAG_BYTES as u32);
        }
    }

    /// Moves unread bytes to the front of the window and refills it.
    fn top_up(&mut self) -> Result<(), R::Error> {
        if self.start > 0 {
            self.input.copy_within(self.start..self.filled, 0);
            self.filled -= self.start;
            self.start = 0;
        }

        let Some(reader) = self.reader.as_mut() else {
            self.eof = true;
            return Ok(());
        };
        while !self.eof && self.filled < INPUT_BYTES {
            let n = reader.read(&mut self.input[self.filled..])?;
            if n == 0 {
                self.eof = true;
            }
            self.filled += n;
        }
        Ok(())
    }
}

/// Bytes the decoder skipped ahead of the frame that ends at `used`.
/// Zero when the frame length cannot be derived from its header.
fn leading_junk(window: &[u8], used: usize) -> usize {
    (0..=used.saturating_sub(HEADER_BYTES))
        .find(|&offset| frame_len(&window[offset..]) == Some(used - offset))
        .unwrap_or(0)
}

/// Spreads decoder output to stereo frames. Returns the frame count.
fn to_stereo(samples: &[Sample], channels: u16, out: &mut [StereoFrame]) -> usize {
    match channels {
        1 => {
            let count = samples.len().min(out.len());
            for (frame, sample) in out.iter_mut().zip(samples) {
                *frame = [*sample, *sample];
            }
            count
        }
        2 => {
            let mut count = 0;
            for (frame, pair) in out.iter_mut().zip(samples.chunks_exact(2)) {
                *frame = [pair[0], pair[1]];
                count += 1;
            }
            count
        }
        _ => 0,
    }
}
