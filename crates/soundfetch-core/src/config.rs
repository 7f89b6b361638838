//! Fixed targets and tunables for a single download-and-play run.

/// Where the clip lives.
pub const DEFAULT_HOST: &str = "storage.googleapis.com";
pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_PATH: &str = "/fallertrack-navigation-sound/speech_1747021430119.mp3";

/// Flash path the body is written to and played back from.
pub const OUTPUT_PATH: &str = "/downloaded.mp3";

const MAX_GAIN: f32 = 4.0;
const GAIN_FRACTION_BITS: u32 = 6;

/// HTTPS endpoint of the clip.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FetchTarget {
    pub host: &'static str,
    pub port: u16,
    pub path: &'static str,
}

impl FetchTarget {
    pub const fn new(host: &'static str, port: u16, path: &'static str) -> Self {
        Self { host, port, path }
    }
}

impl Default for FetchTarget {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PATH)
    }
}

/// Body copy tunables.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DownloadSettings {
    /// How long the transport waits for bytes before reporting an idle read.
    pub idle_poll_ms: u64,
    /// Give up after this many consecutive idle reads. `None` waits forever.
    pub max_idle_polls: Option<u32>,
    /// Emit a progress line every time this many more body bytes arrive.
    pub progress_log_bytes: u32,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            idle_poll_ms: 10,
            max_idle_polls: None,
            progress_log_bytes: 16 * 1024,
        }
    }
}

impl DownloadSettings {
    pub const fn with_max_idle_polls(mut self, max_idle_polls: Option<u32>) -> Self {
        self.max_idle_polls = max_idle_polls;
        self
    }
}

/// Output shaping applied before samples reach the DAC.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlaybackSettings {
    gain_q6: u8,
    mono: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self::new().with_gain(0.5).with_mono(true)
    }
}

impl PlaybackSettings {
    /// Unity gain, stereo passthrough.
    pub const fn new() -> Self {
        Self {
            gain_q6: 1 << GAIN_FRACTION_BITS,
            mono: false,
        }
    }

    /// Linear gain, clamped to `0.0..=4.0` and quantised to 1/64 steps.
    pub fn with_gain(mut self, gain: f32) -> Self {
        let clamped = if gain.is_nan() {
            0.0
        } else {
            gain.clamp(0.0, MAX_GAIN)
        };
        let scaled = clamped * (1u32 << GAIN_FRACTION_BITS) as f32;
        self.gain_q6 = if scaled >= u8::MAX as f32 {
            u8::MAX
        } else {
            scaled as u8
        };
        self
    }

    pub const fn with_mono(mut self, mono: bool) -> Self {
        self.mono = mono;
        self
    }

    /// Gain as Q2.6 fixed point.
    pub const fn gain_q6(self) -> u8 {
        self.gain_q6
    }

    pub fn gain(self) -> f32 {
        self.gain_q6 as f32 / (1u32 << GAIN_FRACTION_BITS) as f32
    }

    pub const fn mono(self) -> bool {
        self.mono
    }
}
