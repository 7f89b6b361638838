//! Single-file volume on a raw NOR flash window.
//!
//! Layout: the first sector holds a header record naming the file and its
//! committed length; the remaining sectors hold file bytes. The length and
//! header checksum are programmed last, so a write that never finished is
//! recognisable after reboot and is never played back.

use embedded_io::{ErrorKind, SeekFrom};
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use heapless::String as HeaplessString;


pub const SECTOR_SIZE: u32 = 4096;
pub const MAX_PATH_BYTES: usize = 32;

const VOLUME_MAGIC: u32 = 0x3146_4653; // "SFF1"
const VOLUME_VERSION: u8 = 1;
const HEADER_LEN: usize = 48;
const PATH_LEN_AT: usize = 5;
const PATH_AT: usize = 8;
const COMMIT_AT: usize = 40;
const CHECKSUM_AT: usize = 44;
const UNSET_WORD: u32 = 0xFFFF_FFFF;
const STAGE_BYTES: usize = 256;
const BOUNCE_BYTES: usize = 256;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VolumeError<E> {
    Flash(E),
    /// Window or flash granularity cannot host a volume.
    Geometry,
    Corrupted,
    InvalidPath,
    NotFound,
    /// The file was created but its write never finished.
    Incomplete,
    Full,
    InvalidSeek,
}

impl<E: core::fmt::Debug> embedded_io::Error for VolumeError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::InvalidPath | Self::InvalidSeek => ErrorKind::InvalidInput,
            Self::Corrupted | Self::Incomplete => ErrorKind::InvalidData,
            Self::Full => ErrorKind::OutOfMemory,
            Self::Flash(_) | Self::Geometry => ErrorKind::Other,
        }
    }
}

type VolumeResult<T, F> =
    Result<T, VolumeError<<F as embedded_storage::nor_flash::ErrorType>::Error>>;

/// What `mount` found on flash.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MountState {
    Empty,
    FileReady,
    /// A previous write was interrupted; the next `create` replaces it.
    Incomplete,
    /// Header was unreadable and the volume was wiped.
    Formatted,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileInfo {
    pub path: HeaplessString<MAX_PATH_BYTES>,
    pub len: u32,
}

enum HeaderState {
    Erased,
    Committed(FileInfo),
    Uncommitted(HeaplessString<MAX_PATH_BYTES>),
    Corrupted,
}

#[derive(Debug)]
pub struct FlashVolume<F> {
    flash: F,
    base: u32,
    data_capacity: u32,
}

impl<F: NorFlash> FlashVolume<F> {
    /// Mounts the volume living at `base..base + len` of `flash`.
    ///
    /// With `format_if_invalid` an unreadable header is wiped instead of
    /// failing the mount.
    pub fn mount(
        flash: F,
        base: u32,
        len: u32,
        format_if_invalid: bool,
    ) -> VolumeResult<(Self, MountState), F> {
        let granularity_ok = F::READ_SIZE.is_power_of_two()
            && F::READ_SIZE <= 8
            && F::WRITE_SIZE <= 8
            && 8 % F::WRITE_SIZE == 0
            && F::ERASE_SIZE as u32 <= SECTOR_SIZE
            && SECTOR_SIZE % F::ERASE_SIZE as u32 == 0;
        let sectors = len / SECTOR_SIZE;
        let window_ok = base % SECTOR_SIZE == 0
            && sectors >= 2
            && (base as u64 + len as u64) <= flash.capacity() as u64;
        if !granularity_ok || !window_ok {
            return Err(VolumeError::Geometry);
        }

        let mut volume = Self {
            flash,
            base,
            data_capacity: (sectors - 1) * SECTOR_SIZE,
        };

        let state = match volume.read_header()? {
            HeaderState::Erased => MountState::Empty,
            HeaderState::Committed(_) => MountState::FileReady,
            HeaderState::Uncommitted(_) => MountState::Incomplete,
            HeaderState::Corrupted if format_if_invalid => {
                volume.format()?;
                MountState::Formatted
            }
            HeaderState::Corrupted => return Err(VolumeError::Corrupted),
        };

        Ok((volume, state))
    }

    /// Largest file the volume can hold.
    pub fn data_capacity(&self) -> u32 {
        self.data_capacity
    }

    /// Forgets any stored file.
    pub fn format(&mut self) -> VolumeResult<(), F> {
        self.flash
            .erase(self.base, self.base + SECTOR_SIZE)
            .map_err(VolumeError::Flash)
    }

    /// Committed file, if any.
    pub fn stat(&mut self) -> VolumeResult<Option<FileInfo>, F> {
        match self.read_header()? {
            HeaderState::Committed(info) => Ok(Some(info)),
            HeaderState::Erased | HeaderState::Uncommitted(_) => Ok(None),
            HeaderState::Corrupted => Err(VolumeError::Corrupted),
        }
    }

    /// Replaces whatever the volume holds with a new, empty file.
    pub fn create(&mut self, path: &str) -> VolumeResult<FileWriter<'_, F>, F> {
        let path = checked_path::<F::Error>(path)?;

        self.format()?;
        let header = encode_header(&path, UNSET_WORD);
        self.flash
            .write(self.base, &header[..COMMIT_AT])
            .map_err(VolumeError::Flash)?;

        Ok(FileWriter {
            volume: self,
            path,
            written: 0,
            flushed: 0,
            erased_to: 0,
            stage: [0xFF; STAGE_BYTES],
            staged: 0,
        })
    }

    pub fn open(&mut self, path: &str) -> VolumeResult<FileReader<'_, F>, F> {
        let wanted = checked_path::<F::Error>(path)?;
        match self.read_header()? {
            HeaderState::Committed(info) if info.path == wanted => Ok(FileReader {
                volume: self,
                len: info.len,
                pos: 0,
            }),
            HeaderState::Uncommitted(stored) if stored == wanted => Err(VolumeError::Incomplete),
            HeaderState::Corrupted => Err(VolumeError::Corrupted),
            _ => Err(VolumeError::NotFound),
        }
    }

    pub fn remove(&mut self, path: &str) -> VolumeResult<(), F> {
        let wanted = checked_path::<F::Error>(path)?;
        let present = match self.read_header()? {
            HeaderState::Committed(info) => info.path == wanted,
            HeaderState::Uncommitted(stored) => stored == wanted,
            HeaderState::Erased | HeaderState::Corrupted => false,
        };
        if !present {
            return Err(VolumeError::NotFound);
        }
        self.format()
    }

    /// Hands the flash back.
    pub fn release(self) -> F {
        self.flash
    }

    fn data_addr(&self, offset: u32) -> u32 {
        self.base + SECTOR_SIZE + offset
    }

    /// Reads `out.len()` bytes at `addr`, bouncing through aligned reads
    /// when the flash cannot read single bytes.
    fn read_at(&mut self, addr: u32, out: &mut [u8]) -> VolumeResult<(), F> {
        let unit = F::READ_SIZE;
        if unit == 1 {
            return self.flash.read(addr, out).map_err(VolumeError::Flash);
        }

        let mut bounce = [0u8; BOUNCE_BYTES];
        let mut filled = 0usize;
        while filled < out.len() {
            let at = addr + filled as u32;
            let skip = at as usize % unit;
            let span = (skip + out.len() - filled)
                .div_ceil(unit)
                .saturating_mul(unit)
                .min(BOUNCE_BYTES);
            self.flash
                .read(at - skip as u32, &mut bounce[..span])
                .map_err(VolumeError::Flash)?;

            let take = (span - skip).min(out.len() - filled);
            out[filled..filled + take].copy_from_slice(&bounce[skip..skip + take]);
            filled += take;
        }
        Ok(())
    }

    fn read_header(&mut self) -> VolumeResult<HeaderState, F> {
        let mut buf = [0u8; HEADER_LEN];
        self.read_at(self.base, &mut buf)?;

        if buf.iter().all(|b| *b == 0xFF) {
            return Ok(HeaderState::Erased);
        }

        let magic = read_word(&buf, 0);
        if magic != VOLUME_MAGIC || buf[4] != VOLUME_VERSION {
            return Ok(HeaderState::Corrupted);
        }

        let path_len = buf[PATH_LEN_AT] as usize;
        if path_len == 0 || path_len > MAX_PATH_BYTES {
            return Ok(HeaderState::Corrupted);
        }
        let Some(path) = core::str::from_utf8(&buf[PATH_AT..PATH_AT + path_len])
            .ok()
            .and_then(|text| HeaplessString::try_from(text).ok())
        else {
            return Ok(HeaderState::Corrupted);
        };

        let len = read_word(&buf, COMMIT_AT);
        let checksum = read_word(&buf, CHECKSUM_AT);
        if len == UNSET_WORD && checksum == UNSET_WORD {
            return Ok(HeaderState::Uncommitted(path));
        }
        if checksum != checksum32(&buf[..CHECKSUM_AT]) || len > self.data_capacity {
            return Ok(HeaderState::Corrupted);
        }

        Ok(HeaderState::Committed(FileInfo { path, len }))
    }
}

/// Streaming writer returned by [`FlashVolume::create`].
///
/// Bytes are staged in RAM and programmed in flash-aligned runs; data sectors
/// are erased just before they are first written. Dropping the writer
/// without [`FileWriter::finish`] leaves the file uncommitted.
pub struct FileWriter<'a, F: NorFlash> {
    volume: &'a mut FlashVolume<F>,
    path: HeaplessString<MAX_PATH_BYTES>,
    written: u32,
    flushed: u32,
    erased_to: u32,
    stage: [u8; STAGE_BYTES],
    staged: usize,
}

impl<F: NorFlash> FileWriter<'_, F> {
    /// Programs remaining bytes and commits the file length.
    pub fn finish(mut self) -> VolumeResult<FileInfo, F> {
        self.program_stage(true)?;

        let header = encode_header(&self.path, self.written);
        let base = self.volume.base;
        self.volume
            .flash
            .write(base + COMMIT_AT as u32, &header[COMMIT_AT..])
            .map_err(VolumeError::Flash)?;

        Ok(FileInfo {
            path: self.path.clone(),
            len: self.written,
        })
    }

    fn program_stage(&mut self, last: bool) -> VolumeResult<(), F> {
        let unit = F::WRITE_SIZE;
        let run = if last {
            self.staged.div_ceil(unit) * unit
        } else {
            self.staged / unit * unit
        };
        if run == 0 {
            return Ok(());
        }

        self.erase_through(self.flushed + run as u32)?;
        let addr = self.volume.data_addr(self.flushed);
        self.volume
            .flash
            .write(addr, &self.stage[..run])
            .map_err(VolumeError::Flash)?;

        let carried = if last { 0 } else { self.staged - run };
        if carried > 0 {
            self.stage.copy_within(run..self.staged, 0);
        }
        self.stage[carried..].fill(0xFF);
        self.flushed += run as u32;
        self.staged = carried;
        Ok(())
    }

    fn erase_through(&mut self, end: u32) -> VolumeResult<(), F> {
        while self.erased_to < end {
            let from = self.volume.data_addr(self.erased_to);
            self.volume
                .flash
                .erase(from, from + SECTOR_SIZE)
                .map_err(VolumeError::Flash)?;
            self.erased_to += SECTOR_SIZE;
        }
        Ok(())
    }
}

impl<F: NorFlash> embedded_io::ErrorType for FileWriter<'_, F> {
    type Error = VolumeError<F::Error>;
}

impl<F: NorFlash> embedded_io::Write for FileWriter<'_, F> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let room = (self.volume.data_capacity - self.written) as usize;
        if room == 0 {
            return Err(VolumeError::Full);
        }

        let take = buf.len().min(room).min(STAGE_BYTES - self.staged);
        self.stage[self.staged..self.staged + take].copy_from_slice(&buf[..take]);
        self.staged += take;
        self.written += take as u32;

        if self.staged == STAGE_BYTES {
            self.program_stage(false)?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.program_stage(false)
    }
}

/// Sequential reader returned by [`FlashVolume::open`].
pub struct FileReader<'a, F: NorFlash> {
    volume: &'a mut FlashVolume<F>,
    len: u32,
    pos: u32,
}

impl<F: NorFlash> FileReader<'_, F> {
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<F: NorFlash> embedded_io::ErrorType for FileReader<'_, F> {
    type Error = VolumeError<F::Error>;
}

impl<F: NorFlash> embedded_io::Read for FileReader<'_, F> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let take = buf.len().min((self.len - self.pos) as usize);
        if take == 0 {
            return Ok(0);
        }

        let addr = self.volume.data_addr(self.pos);
        self.volume.read_at(addr, &mut buf[..take])?;
        self.pos += take as u32;
        Ok(take)
    }
}

impl<F: NorFlash> embedded_io::Seek for FileReader<'_, F> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => self.len as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(VolumeError::InvalidSeek);
        }
        self.pos = target.min(self.len as i64) as u32;
        Ok(self.pos as u64)
    }
}

fn checked_path<E>(path: &str) -> Result<HeaplessString<MAX_PATH_BYTES>, VolumeError<E>> {
    if path.is_empty() {
        return Err(VolumeError::InvalidPath);
    }
    HeaplessString::try_from(path).map_err(|_| VolumeError::InvalidPath)
}

fn encode_header(path: &str, len: u32) -> [u8; HEADER_LEN] {
    let mut buf = [0xFFu8; HEADER_LEN];
    buf[0..4].copy_from_slice(&VOLUME_MAGIC.to_le_bytes());
    buf[4] = VOLUME_VERSION;
    buf[PATH_LEN_AT] = path.len() as u8;
    buf[PATH_AT..COMMIT_AT].fill(0);
    buf[PATH_AT..PATH_AT + path.len()].copy_from_slice(path.as_bytes());
    buf[COMMIT_AT..CHECKSUM_AT].copy_from_slice(&len.to_le_bytes());
    let checksum = checksum32(&buf[..CHECKSUM_AT]);
    buf[CHECKSUM_AT..].copy_from_slice(&checksum.to_le_bytes());
    buf
}

fn read_word(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
