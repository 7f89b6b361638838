//! Decoded audio path: MP3 frames in, shaped stereo PCM out.

mod frame;
mod mp3;
mod pcm;

pub use mp3::{Mp3Player, PlaybackError, PlaybackReport};
pub use pcm::{RateAdapter, shape_frames};
use pcm::pump_frames;

#[cfg(test)]
mod tests;

/// One interleaved left/right sample pair.
pub type StereoFrame = [i16; 2];

/// Hardware PCM output.
pub trait PcmSink {
    type Error: core::fmt::Debug;

    /// Rate the hardware clocks frames out at, in Hz.
    fn sample_rate(&self) -> u32;

    /// Frames that can be written right now without overrunning playback.
    fn free_frames(&mut self) -> Result<usize, Self::Error>;

    /// Queue frames for output. Callers never pass more than the last
    /// [`PcmSink::free_frames`] result.
    fn write_frames(&mut self, frames: &[StereoFrame]) -> Result<(), Self::Error>;
}
