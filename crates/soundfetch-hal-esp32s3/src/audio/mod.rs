//! PCM output hardware.

mod i2s_dac;

pub use i2s_dac::{DAC_SAMPLE_RATE_HZ, I2S_FRAME_BYTES, I2sDacOutput};
