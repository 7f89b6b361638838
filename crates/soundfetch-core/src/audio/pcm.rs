use super::{PcmSink, StereoFrame};
use crate::config::PlaybackSettings;

const UNITY_Q6: i32 = 1 << 6;
const PHASE_BITS: u32 = 16;

/// Applies the mono downmix and gain in place.
pub fn shape_frames(frames: &mut [StereoFrame], settings: &PlaybackSettings) {
    let gain = settings.gain_q6() as i32;
    let mono = settings.mono();
    if !mono && gain == UNITY_Q6 {
        return;
    }

    for frame in frames {
        let [mut left, mut right] = frame.map(i32::from);
        if mono {
            let mixed = (left + right) >> 1;
            left = mixed;
            right = mixed;
        }
        *frame = [scale(left, gain), scale(right, gain)];
    }
}

/// Resamples `input` into `staging`, shapes the result and queues it on `sink`.
///
/// Returns `(consumed, produced)` as [`RateAdapter::process`] does. Nothing is
/// written when no frame was produced.
pub(crate) fn pump_frames<S: PcmSink>(
    adapter: &mut RateAdapter,
    settings: &PlaybackSettings,
    input: &[StereoFrame],
    staging: &mut [StereoFrame],
    sink: &mut S,
) -> Result<(usize, usize), S::Error> {
    let (consumed, produced) = adapter.process(input, staging);
    if produced > 0 {
        let staged = &mut staging[..produced];
        shape_frames(staged, settings);
        sink.write_frames(staged)?;
    }
    Ok((consumed, produced))
}

fn scale(sample: i32, gain_q6: i32) -> i16 {
    ((sample * gain_q6) >> 6).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Zero-order-hold sample rate converter.
///
/// Keeps its fractional read position between calls so a stream split into
/// decoder frames converts the same as one contiguous buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateAdapter {
    input_rate: u32,
    output_rate: u32,
    step: u64,
    phase: u64,
}

impl RateAdapter {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        let step = if input_rate == 0 || output_rate == 0 {
            1 << PHASE_BITS
        } else {
            ((input_rate as u64) << PHASE_BITS) / output_rate as u64
        };
        Self {
            input_rate,
            output_rate,
            step: step.max(1),
            phase: 0,
        }
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.step == 1 << PHASE_BITS
    }

    /// Converts as much of `input` as fits into `output`.
    ///
    /// Returns `(consumed, produced)`. Consumed input frames will not be
    /// looked at again; the rest must be passed back on the next call.
    pub fn process(&mut self, input: &[StereoFrame], output: &mut [StereoFrame]) -> (usize, usize) {
        let mut produced = 0;
        while produced < output.len() {
            let index = (self.phase >> PHASE_BITS) as usize;
            let Some(frame) = input.get(index) else {
                break;
            };
            output[produced] = *frame;
            produced += 1;
            self.phase += self.step;
        }

        let consumed = ((self.phase >> PHASE_BITS) as usize).min(input.len());
        self.phase -= (consumed as u64) << PHASE_BITS;
        (consumed, produced)
    }
}
