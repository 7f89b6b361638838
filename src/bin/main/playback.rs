use core::convert::Infallible;

use embassy_time::Timer;
use esp_hal::{
    Blocking,
    dma::DmaError,
    i2s::master::{Error as I2sError, I2sTx},
};
use log::info;
use soundfetch_core::{
    audio::{Mp3Player, PlaybackError, PlaybackReport},
    config::OUTPUT_PATH,
    storage::{FileReader, VolumeError},
};
use soundfetch_hal_esp32s3::{
    audio::I2sDacOutput,
    storage::{AudioVolume, FlashStorage, FlashStorageError},
};

const SERVICE_INTERVAL_MS: u64 = 4;

pub type FilePlayer = Mp3Player<FileReader<'static, FlashStorage<'static>>>;

#[derive(Debug)]
pub enum PlaybackFailure {
    Open(VolumeError<FlashStorageError>),
    Begin(PlaybackError<VolumeError<FlashStorageError>, Infallible>),
    Start(I2sError),
    Decode(PlaybackError<VolumeError<FlashStorageError>, DmaError>),
    Output(DmaError),
}

/// Plays the stored file through the DAC until it ends, then silences it.
pub async fn play_file(
    player: &mut FilePlayer,
    volume: &'static mut AudioVolume,
    i2s_tx: &mut I2sTx<'static, Blocking>,
    ring: &'static mut [u8],
) -> Result<PlaybackReport, PlaybackFailure> {
    let file = volume.open(OUTPUT_PATH).map_err(PlaybackFailure::Open)?;
    info!("playback: opened {} ({} bytes)", OUTPUT_PATH, file.len());
    player.begin(file).map_err(PlaybackFailure::Begin)?;

    let ring_bytes = ring.len();
    let transfer = i2s_tx
        .write_dma_circular(&ring)
        .map_err(PlaybackFailure::Start)?;
    let mut output = I2sDacOutput::new(transfer, ring_bytes);
    info!("playback started");

    while player
        .service(&mut output)
        .map_err(PlaybackFailure::Decode)?
    {
        Timer::after_millis(SERVICE_INTERVAL_MS).await;
    }

    while !output.drain_silence().map_err(PlaybackFailure::Output)? {
        Timer::after_millis(SERVICE_INTERVAL_MS).await;
    }
    output.stop().map_err(PlaybackFailure::Output)?;

    Ok(player.report())
}
