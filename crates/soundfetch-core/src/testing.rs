//! In-memory flash doubles shared by the test modules.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::storage::SECTOR_SIZE;

const CAPACITY: usize = 8 * SECTOR_SIZE as usize;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct RamFlashError(NorFlashErrorKind);

impl NorFlashError for RamFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        self.0
    }
}

/// NOR semantics: erase sets bytes to 0xFF, writes can only clear bits.
#[derive(Debug)]
pub(crate) struct RamFlash {
    pub(crate) bytes: Vec<u8>,
    pub(crate) erases: usize,
}

impl RamFlash {
    pub(crate) fn new() -> Self {
        Self {
            bytes: vec![0xFF; CAPACITY],
            erases: 0,
        }
    }
}

impl ErrorType for RamFlash {
    type Error = RamFlashError;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.bytes.len() {
            return Err(RamFlashError(NorFlashErrorKind::OutOfBounds));
        }
        bytes.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if from as usize % Self::ERASE_SIZE != 0 || to as usize % Self::ERASE_SIZE != 0 {
            return Err(RamFlashError(NorFlashErrorKind::NotAligned));
        }
        if to as usize > self.bytes.len() {
            return Err(RamFlashError(NorFlashErrorKind::OutOfBounds));
        }
        self.bytes[from as usize..to as usize].fill(0xFF);
        self.erases += 1;
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if offset as usize % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(RamFlashError(NorFlashErrorKind::NotAligned));
        }
        let start = offset as usize;
        if start + bytes.len() > self.bytes.len() {
            return Err(RamFlashError(NorFlashErrorKind::OutOfBounds));
        }
        for (cell, byte) in self.bytes[start..].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// Flash that only reads whole, aligned 4-byte words, like the chip's
/// memory-mapped driver.
#[derive(Debug)]
pub(crate) struct WordReadFlash(pub(crate) RamFlash);

impl ErrorType for WordReadFlash {
    type Error = RamFlashError;
}

impl ReadNorFlash for WordReadFlash {
    const READ_SIZE: usize = 4;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if offset as usize % Self::READ_SIZE != 0 || bytes.len() % Self::READ_SIZE != 0 {
            return Err(RamFlashError(NorFlashErrorKind::NotAligned));
        }
        self.0.read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.0.capacity()
    }
}

impl NorFlash for WordReadFlash {
    const WRITE_SIZE: usize = RamFlash::WRITE_SIZE;
    const ERASE_SIZE: usize = RamFlash::ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.0.erase(from, to)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.write(offset, bytes)
    }
}
