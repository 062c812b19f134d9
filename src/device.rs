//! Block device abstraction
//!
//! The driver core never performs raw I/O itself: every sector it touches
//! goes through [`BlockDevice`], which the embedding environment implements
//! on top of whatever transport it has. Two reference implementations are
//! provided: an in-memory device (synthetic volumes, tests) and a plain file
//! device (volume images).

use crate::error::Result;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// A random-access block device with a fixed logical block size
///
/// `block_size` and `last_block` are fixed for the lifetime of a mounted
/// volume. Reads are blocking; there is no cancellation or timeout.
pub trait BlockDevice {
    /// Logical block size in bytes
    fn block_size(&self) -> u32;

    /// Address of the last readable block
    fn last_block(&self) -> u64;

    /// Reads `buf.len()` bytes starting at the first byte of block `lba`
    ///
    /// The length does not have to be block-aligned; a single call may span
    /// several consecutive blocks.
    fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<()>;

    /// Reads one whole logical block at `lba` into a fresh buffer
    fn read_block_vec(&mut self, lba: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_size() as usize];
        self.read_block(lba, &mut buf)?;
        Ok(buf)
    }
}

fn out_of_range(lba: u64) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("read at block {lba} runs past the end of the device"),
    )
}

/// A [`BlockDevice`] over an in-memory byte buffer
pub struct MemoryBlockDevice {
    data: Vec<u8>,
    block_size: u32,
}

impl MemoryBlockDevice {
    /// Wraps `data` as a device with the given block size
    ///
    /// Trailing bytes that do not fill a whole block are not addressable.
    pub fn new(data: Vec<u8>, block_size: u32) -> Self {
        assert!(block_size > 0, "zero block size");
        Self { data, block_size }
    }

    /// Consumes the device and returns the underlying buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn last_block(&self) -> u64 {
        (self.data.len() as u64 / u64::from(self.block_size)).saturating_sub(1)
    }

    fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        let start = usize::try_from(lba * u64::from(self.block_size))
            .map_err(|_| out_of_range(lba))?;
        let end = start.checked_add(buf.len()).ok_or_else(|| out_of_range(lba))?;
        if end > self.data.len() {
            return Err(out_of_range(lba).into());
        }
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }
}

/// A [`BlockDevice`] over a volume image file
pub struct FileBlockDevice {
    file: std::fs::File,
    block_size: u32,
    last_block: u64,
}

impl FileBlockDevice {
    /// Opens `file` as a device with the given block size
    pub fn new(file: std::fs::File, block_size: u32) -> Result<Self> {
        assert!(block_size > 0, "zero block size");
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            block_size,
            last_block: (len / u64::from(block_size)).saturating_sub(1),
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn last_block(&self) -> u64 {
        self.last_block
    }

    fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<()> {
        use std::io::{Read, Seek};
        if lba > self.last_block {
            return Err(out_of_range(lba).into());
        }
        self.file
            .seek(std::io::SeekFrom::Start(lba * u64::from(self.block_size)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_device_bounds() {
        let mut dev = MemoryBlockDevice::new(vec![0xaau8; 4096], 2048);
        assert_eq!(dev.block_size(), 2048);
        assert_eq!(dev.last_block(), 1);
        let block = dev.read_block_vec(1).unwrap();
        assert!(block.iter().all(|b| *b == 0xaa));
        assert!(dev.read_block_vec(2).is_err());
    }

    #[test]
    fn memory_device_unaligned_reads() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let mut dev = MemoryBlockDevice::new(data.clone(), 2048);
        let mut buf = vec![0u8; 100];
        dev.read_block(1, &mut buf).unwrap();
        assert_eq!(buf, &data[2048..2148]);
        // A read crossing the end of the device fails
        let mut buf = vec![0u8; 4096];
        assert!(dev.read_block(1, &mut buf).is_err());
    }

    #[test]
    fn memory_device_partial_tail_is_unaddressable() {
        let mut dev = MemoryBlockDevice::new(vec![0u8; 2048 + 100], 2048);
        assert_eq!(dev.last_block(), 0);
        assert!(dev.read_block_vec(1).is_err());
    }

    #[test]
    fn file_device_round_trip() {
        use std::io::Write;
        let mut tmp = tempfile::tempfile().unwrap();
        let mut image = vec![0u8; 4096];
        image[2048] = 0x42;
        tmp.write_all(&image).unwrap();
        let mut dev = FileBlockDevice::new(tmp, 2048).unwrap();
        assert_eq!(dev.last_block(), 1);
        assert_eq!(dev.read_block_vec(1).unwrap()[0], 0x42);
        assert!(dev.read_block_vec(2).is_err());
    }
}
