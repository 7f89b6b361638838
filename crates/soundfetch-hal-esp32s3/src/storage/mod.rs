//! Flash-backed storage for the downloaded clip.

use esp_bootloader_esp_idf::partitions::{
    DataPartitionSubType, PARTITION_TABLE_MAX_LEN, PartitionType, read_partition_table,
};
use esp_hal::peripherals::FLASH;
pub use esp_storage::{FlashStorage, FlashStorageError};
use log::{info, warn};
use soundfetch_core::storage::{FlashVolume, MountState, SECTOR_SIZE, VolumeError};

pub type AudioVolume = FlashVolume<FlashStorage<'static>>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MountError {
    PartitionTable,
    PartitionMissing,
    PartitionTooSmall,
    Volume(VolumeError<FlashStorageError>),
}

/// Data partition the audio volume lives in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PartitionWindow {
    pub offset: u32,
    pub len: u32,
}

/// Finds the partition to keep the downloaded file in.
///
/// A `spiffs` data partition wins; otherwise the first writable data
/// partition with an undefined subtype is used.
pub fn find_file_partition(flash: &mut FlashStorage<'_>) -> Result<PartitionWindow, MountError> {
    let mut table_buf = [0u8; PARTITION_TABLE_MAX_LEN];
    let table =
        read_partition_table(flash, &mut table_buf).map_err(|_| MountError::PartitionTable)?;

    let mut spiffs: Option<PartitionWindow> = None;
    let mut fallback_undefined: Option<PartitionWindow> = None;

    for entry in table.iter() {
        if entry.is_read_only() {
            continue;
        }

        let window = PartitionWindow {
            offset: entry.offset(),
            len: entry.len(),
        };
        match entry.partition_type() {
            PartitionType::Data(DataPartitionSubType::Spiffs) => {
                spiffs = Some(window);
                break;
            }
            PartitionType::Data(DataPartitionSubType::Undefined) => {
                fallback_undefined.get_or_insert(window);
            }
            _ => {}
        }
    }

    let window = spiffs
        .or(fallback_undefined)
        .ok_or(MountError::PartitionMissing)?;
    if window.len < 2 * SECTOR_SIZE {
        return Err(MountError::PartitionTooSmall);
    }

    info!(
        "storage: file partition offset=0x{:x} len={}",
        window.offset, window.len
    );
    Ok(window)
}

/// Opens the file partition, formatting it when its header is unreadable.
pub fn mount_audio_volume(flash: FLASH<'static>) -> Result<AudioVolume, MountError> {
    let mut flash = FlashStorage::new(flash);
    let window = find_file_partition(&mut flash)?;

    let (volume, state) = FlashVolume::mount(flash, window.offset, window.len, true)
        .map_err(MountError::Volume)?;
    match state {
        MountState::Formatted => warn!("storage: volume header was invalid; formatted"),
        MountState::Incomplete => warn!("storage: previous download never finished"),
        MountState::Empty | MountState::FileReady => {}
    }
    info!(
        "storage: mounted state={:?} capacity={} bytes",
        state,
        volume.data_capacity()
    );
    Ok(volume)
}
