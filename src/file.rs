//! File Entry access
//!
//! Reads File Entries through their ICBs and serves sized and positioned
//! content reads over inline data or allocation descriptor runs.

use crate::device::BlockDevice;
use crate::dir::DirReader;
use crate::ecma167::{ADType, FileEntry, FileIdentifierDescriptor, LongAD, TAG_LEN, UdfDate};
use crate::error::{Result, UdfError};
use crate::extent::{self, AdWalker};
use crate::volume::{self, Volume};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Reads the File Entry or Extended File Entry referenced by `icb`
///
/// The entry occupies exactly one logical block; its tag id, recorded
/// location and CRC are all validated before any field is trusted.
#[instrument(skip_all)]
pub fn read_file_entry<D: BlockDevice>(
    dev: &mut D,
    vol: &Volume,
    icb: &LongAD,
) -> Result<FileEntry> {
    if icb.is_empty() {
        return Err(UdfError::VolumeCorrupted("empty file entry icb"));
    }
    let abs = extent::resolve_long_ad(vol, icb)?;
    let (tag, block) = volume::read_tagged_block(dev, abs, &[261, 266], icb.lba)?;
    FileEntry::parse(&tag, &block[TAG_LEN..], icb, vol.block_size)
}

/// Computes the readable size of a file
///
/// Inline entries answer with their information length. For AD-recorded
/// entries the size is recomputed as the sum of the recorded extent lengths
/// over the whole (possibly chained) run: that is the only value guaranteed
/// consistent with the bytes a read can actually produce.
pub fn file_size<D: BlockDevice>(dev: &mut D, vol: &Volume, entry: &FileEntry) -> Result<u64> {
    if entry.ad_type() == ADType::Embedded {
        return Ok(entry.information_length);
    }
    let mut walker = AdWalker::new(vol, entry)?;
    let mut total = 0u64;
    while let Some(ad) = walker.next_extent(dev)? {
        total = total
            .checked_add(u64::from(ad.unmasked_length()))
            .ok_or(UdfError::VolumeCorrupted("file extent lengths overflow"))?;
    }
    Ok(total)
}

/// Reads up to `length` bytes of file content starting at `offset`
///
/// Extents wholly before `offset` are skipped without device access; each
/// contributing extent costs one ranged read. The result is shorter than
/// `length` only at end of file.
#[instrument(skip_all)]
pub fn read_file_data<D: BlockDevice>(
    dev: &mut D,
    vol: &Volume,
    entry: &FileEntry,
    offset: u64,
    length: usize,
) -> Result<Vec<u8>> {
    if entry.ad_type() == ADType::Embedded {
        let data = entry.inline_data()?;
        let Ok(start) = usize::try_from(offset) else {
            return Ok(Vec::new());
        };
        if start >= data.len() {
            return Ok(Vec::new());
        }
        let end = start + length.min(data.len() - start);
        return Ok(data[start..end].to_vec());
    }

    let mut out = Vec::new();
    let mut walker = AdWalker::new(vol, entry)?;
    let mut stream_pos = 0u64;
    let mut remaining = length;
    while remaining > 0 {
        let Some(ad) = walker.next_extent(dev)? else {
            break; // end of file
        };
        let ext_start = stream_pos;
        let ext_len = u64::from(ad.unmasked_length());
        stream_pos += ext_len;
        if offset >= stream_pos {
            continue;
        }
        let skew = offset.saturating_sub(ext_start);
        let avail = ext_len - skew;
        let take = remaining.min(usize::try_from(avail).unwrap_or(usize::MAX));
        let abs = extent::resolve_long_ad(vol, &ad)?;
        extent::read_extent_bytes(dev, abs, skew, take, &mut out)?;
        remaining -= take;
    }
    Ok(out)
}

/// Metadata snapshot of an open file
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Decoded file name (empty for the root directory)
    pub name: String,
    /// Readable content size in bytes
    pub size: u64,
    /// Whether the entry is a directory
    pub is_directory: bool,
    /// Whether the entry is a symbolic link
    pub is_symlink: bool,
    /// Whether the directory entry is flagged hidden
    pub is_hidden: bool,
    /// Owner id
    pub uid: u32,
    /// Group id
    pub gid: u32,
    /// UDF permission bits
    pub permissions: u32,
    /// Hard link count
    pub link_count: u16,
    /// Access Date and Time
    pub access_time: UdfDate,
    /// Modification Date and Time
    pub modification_time: UdfDate,
    /// Creation Date and Time
    pub creation_time: UdfDate,
    /// Attribute Date and Time
    pub attribute_time: UdfDate,
    /// Unique Id
    pub unique_id: u64,
}

/// An open file or directory
///
/// Owns the resolved File Entry / FID pair and a byte cursor; directory
/// handles additionally own their resumable enumeration state, which lives
/// until the handle is dropped or rewound.
#[derive(Debug)]
pub struct FileHandle {
    /// The resolved File Entry
    pub entry: FileEntry,
    /// The directory entry the file was resolved through
    pub fid: FileIdentifierDescriptor,
    position: u64,
    dir: DirReader,
}

impl FileHandle {
    pub(crate) fn new(entry: FileEntry, fid: FileIdentifierDescriptor) -> Self {
        Self {
            entry,
            fid,
            position: 0,
            dir: DirReader::new(),
        }
    }

    /// Whether the handle refers to a directory
    pub fn is_directory(&self) -> bool {
        self.entry.icb_tag.is_directory()
    }

    /// Current byte position (files) or enumeration progress marker
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves the cursor
    ///
    /// Directories only support rewinding to 0, which drops the cached
    /// enumeration state so the next read starts over from a fresh stream.
    pub fn set_position(&mut self, position: u64) -> Result<()> {
        if self.is_directory() {
            if position != 0 {
                return Err(UdfError::Unsupported("directory seek to a nonzero position"));
            }
            self.dir.rewind();
        }
        self.position = position;
        Ok(())
    }

    /// Reads up to `max` content bytes at the cursor and advances it
    pub fn read<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        vol: &Volume,
        max: usize,
    ) -> Result<Vec<u8>> {
        if self.is_directory() {
            return Err(UdfError::Unsupported("reading a directory as a byte stream"));
        }
        let data = read_file_data(dev, vol, &self.entry, self.position, max)?;
        self.position += data.len() as u64;
        Ok(data)
    }

    /// Produces the next directory entry, or `None` past the last one
    ///
    /// Deleted entries are never surfaced; the mandatory parent entry is.
    pub fn read_dir_entry<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        vol: &Volume,
    ) -> Result<Option<FileIdentifierDescriptor>> {
        if !self.is_directory() {
            return Err(UdfError::Unsupported("enumerating a non-directory"));
        }
        let fid = self.dir.read_next_entry(dev, vol, &self.entry)?;
        self.position = self.dir.position() as u64;
        Ok(fid)
    }

    /// Metadata for this handle
    pub fn info<D: BlockDevice>(&self, dev: &mut D, vol: &Volume) -> Result<FileInfo> {
        Ok(FileInfo {
            name: self.fid.identifier.clone(),
            size: file_size(dev, vol, &self.entry)?,
            is_directory: self.entry.icb_tag.is_directory(),
            is_symlink: self.entry.icb_tag.is_link(),
            is_hidden: self.fid.is_hidden(),
            uid: self.entry.uid,
            gid: self.entry.gid,
            permissions: self.entry.permissions,
            link_count: self.entry.file_link_count,
            access_time: self.entry.access_time.clone(),
            modification_time: self.entry.modification_time.clone(),
            creation_time: self.entry.creation_time.clone(),
            attribute_time: self.entry.attribute_time.clone(),
            unique_id: self.entry.unique_id,
        })
    }
}
