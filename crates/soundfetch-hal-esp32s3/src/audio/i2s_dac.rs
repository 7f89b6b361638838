use esp_hal::{
    Blocking,
    dma::{DmaError, DmaTransferTxCircular},
    i2s::master::I2sTx,
};
use log::debug;
use soundfetch_core::audio::{PcmSink, StereoFrame};

/// Rate the I2S clocks are configured for.
pub const DAC_SAMPLE_RATE_HZ: u32 = 44_100;
/// 16-bit left + 16-bit right.
pub const I2S_FRAME_BYTES: usize = 4;

const ENCODE_FRAMES: usize = 128;

/// External I2S DAC fed from a circular DMA ring.
///
/// The ring keeps replaying whatever it holds, so once playback ends it
/// must be overwritten with silence before the transfer is stopped.
pub struct I2sDacOutput<'t, 'd> {
    transfer: DmaTransferTxCircular<'t, I2sTx<'d, Blocking>>,
    ring_bytes: usize,
    silence_queued: usize,
}

impl<'t, 'd> I2sDacOutput<'t, 'd> {
    pub fn new(transfer: DmaTransferTxCircular<'t, I2sTx<'d, Blocking>>, ring_bytes: usize) -> Self {
        Self {
            transfer,
            ring_bytes,
            silence_queued: 0,
        }
    }

    /// Queues zeros into whatever ring space is free.
    ///
    /// Returns `true` once a full ring of silence has been queued since
    /// the last audio write.
    pub fn drain_silence(&mut self) -> Result<bool, DmaError> {
        let zeros = [0u8; ENCODE_FRAMES * I2S_FRAME_BYTES];
        loop {
            let free = self.transfer.available()?;
            if free == 0 || self.silence_queued >= self.ring_bytes {
                break;
            }
            let take = free.min(zeros.len());
            let pushed = self.transfer.push(&zeros[..take])?;
            if pushed == 0 {
                break;
            }
            self.silence_queued += pushed;
        }
        Ok(self.silence_queued >= self.ring_bytes)
    }

    /// Stops the DMA ring.
    pub fn stop(self) -> Result<(), DmaError> {
        debug!("i2s: stopping output");
        self.transfer.stop()
    }
}

impl PcmSink for I2sDacOutput<'_, '_> {
    type Error = DmaError;

    fn sample_rate(&self) -> u32 {
        DAC_SAMPLE_RATE_HZ
    }

    fn free_frames(&mut self) -> Result<usize, Self::Error> {
        Ok(self.transfer.available()? / I2S_FRAME_BYTES)
    }

    fn write_frames(&mut self, frames: &[StereoFrame]) -> Result<(), Self::Error> {
        let mut bytes = [0u8; ENCODE_FRAMES * I2S_FRAME_BYTES];
        for chunk in frames.chunks(ENCODE_FRAMES) {
            for (slot, [left, right]) in bytes.chunks_exact_mut(I2S_FRAME_BYTES).zip(chunk) {
                slot[..2].copy_from_slice(&left.to_le_bytes());
                slot[2..].copy_from_slice(&right.to_le_bytes());
            }

            let len = chunk.len() * I2S_FRAME_BYTES;
            let mut sent = 0;
            while sent < len {
                let pushed = self.transfer.push(&bytes[sent..len])?;
                if pushed == 0 {
                    debug!("i2s: ring full, dropping {} bytes", len - sent);
                    break;
                }
                sent += pushed;
            }
        }
        self.silence_queued = 0;
        Ok(())
    }
}
