//! Directory enumeration
//!
//! A directory's data stream is a packed run of File Identifier Descriptors
//! whose record boundaries do not respect extent or block boundaries. The
//! walker therefore materializes the whole stream once per enumeration and
//! parses records at a byte cursor; rewinding drops the cached stream so a
//! fresh enumeration observes any change to the directory.

use crate::device::BlockDevice;
use crate::ecma167::{FileEntry, FileIdentifierDescriptor};
use crate::error::{Result, UdfError};
use crate::file;
use crate::volume::Volume;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Resumable enumeration state for one open directory
#[derive(Debug, Default)]
pub struct DirReader {
    stream: Option<Vec<u8>>,
    offset: usize,
}

impl DirReader {
    /// Fresh state, positioned before the first entry
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte offset of the cursor within the directory stream
    pub(crate) fn position(&self) -> usize {
        self.offset
    }

    fn ensure_stream<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        vol: &Volume,
        dir: &FileEntry,
    ) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let size = file::file_size(dev, vol, dir)?;
        let len = usize::try_from(size)
            .map_err(|_| UdfError::VolumeCorrupted("directory stream too large"))?;
        let data = file::read_file_data(dev, vol, dir, 0, len)?;
        self.stream = Some(data);
        Ok(())
    }

    /// Produces the next live entry, or `None` once the stream is exhausted
    ///
    /// Deleted entries are skipped and never surfaced. Exhaustion is a
    /// routine result, not an error.
    pub fn read_next_entry<D: BlockDevice>(
        &mut self,
        dev: &mut D,
        vol: &Volume,
        dir: &FileEntry,
    ) -> Result<Option<FileIdentifierDescriptor>> {
        if !dir.icb_tag.is_directory() {
            return Err(UdfError::VolumeCorrupted("entry is not a directory"));
        }
        self.ensure_stream(dev, vol, dir)?;
        let stream = self.stream.as_deref().unwrap(); // safe bc ensure_stream
        let mut offset = self.offset;
        let found = loop {
            if offset >= stream.len() {
                break None;
            }
            let (fid, consumed) = FileIdentifierDescriptor::parse(&stream[offset..])?;
            offset += consumed;
            if fid.is_deleted() {
                debug!("Entry \"{}\" is deleted", fid.identifier);
                continue;
            }
            break Some(fid);
        };
        self.offset = offset;
        Ok(found)
    }

    /// Resets to the start and forces a fresh stream read on the next entry
    pub fn rewind(&mut self) {
        self.stream = None;
        self.offset = 0;
    }
}
