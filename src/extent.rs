//! Extent resolution
//!
//! Translates allocation descriptors into absolute block addresses and walks
//! allocation descriptor runs, following indirect "next extent" chains
//! through Allocation Extent Descriptors transparently.

use crate::device::BlockDevice;
use crate::ecma167::{
    AllocationExtentDescriptor, ADType, DescriptorTag, ExtentAD, ExtentKind, FileEntry, LongAD,
    PartitionDescriptor, TAG_LEN,
};
use crate::error::{Result, UdfError};
use crate::volume::Volume;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Bound on AED indirections per walk, against self-referencing chains
const MAX_AED_CHAIN: u32 = 4096;

/// Resolves a Long Allocation Descriptor to an absolute block address
///
/// A zero-length descriptor resolves to LSN 0, the "no extent" sentinel.
pub fn resolve_long_ad(vol: &Volume, ad: &LongAD) -> Result<u64> {
    if ad.is_empty() {
        return Ok(0);
    }
    let pd = vol.partition(ad.part_ref)?;
    Ok(u64::from(pd.partition_starting_location) + u64::from(ad.lba))
}

/// Resolves a Short Allocation Descriptor within its owning partition
///
/// The short form carries no partition reference; the caller knows the
/// partition from the ICB the descriptor was found through.
pub fn resolve_short_ad(pd: &PartitionDescriptor, ad: &ExtentAD) -> u64 {
    u64::from(pd.partition_starting_location) + u64::from(ad.lba)
}

/// Walks the recorded extents of an allocation descriptor run
///
/// Descriptors flagged not-recorded (allocated or not) describe holes and
/// reserved space; they are invisible to the logical byte stream and are
/// skipped. Indirect descriptors are followed through their Allocation
/// Extent Descriptor block without surfacing to the caller.
pub struct AdWalker<'v> {
    vol: &'v Volume,
    ad_type: ADType,
    part_ref: u16,
    run: Vec<u8>,
    pos: usize,
    chained: u32,
}

impl<'v> AdWalker<'v> {
    /// Starts a walk over `entry`'s allocation descriptors
    pub fn new(vol: &'v Volume, entry: &FileEntry) -> Result<Self> {
        let run = entry.allocation_descriptors()?.to_vec();
        Ok(Self::from_run(vol, entry.ad_type(), entry.partition_ref(), run))
    }

    pub(crate) fn from_run(vol: &'v Volume, ad_type: ADType, part_ref: u16, run: Vec<u8>) -> Self {
        Self {
            vol,
            ad_type,
            part_ref,
            run,
            pos: 0,
            chained: 0,
        }
    }

    fn ad_size(&self) -> usize {
        match self.ad_type {
            ADType::Short => 8,
            ADType::Long => 16,
            // The constructor only admits short/long runs
            ADType::Extended | ADType::Embedded => unreachable!("invalid walker recording mode"),
        }
    }

    /// Advances to the next recorded extent, or `None` past the last one
    pub fn next_extent<D: BlockDevice>(&mut self, dev: &mut D) -> Result<Option<LongAD>> {
        loop {
            let size = self.ad_size();
            let Some(end) = self.pos.checked_add(size) else {
                return Ok(None);
            };
            if end > self.run.len() {
                return Ok(None);
            }
            let r = &mut &self.run[self.pos..end];
            let ad = match self.ad_type {
                ADType::Short => {
                    LongAD::from_short(ExtentAD::read_from(r).unwrap(), self.part_ref)
                }
                _ => LongAD::read_from(r).unwrap(), // safe bc sized slice
            };
            self.pos = end;
            if ad.is_empty() {
                // A zero extent length terminates the sequence (14.14.1.1)
                return Ok(None);
            }
            match ad.kind() {
                ExtentKind::Recorded => return Ok(Some(ad)),
                ExtentKind::NotRecorded | ExtentKind::NotAllocated => continue,
                ExtentKind::Continuation => self.follow_indirect(dev, &ad)?,
            }
        }
    }

    /// Loads the AD run embedded in the referenced Allocation Extent Descriptor
    fn follow_indirect<D: BlockDevice>(&mut self, dev: &mut D, ad: &LongAD) -> Result<()> {
        self.chained += 1;
        if self.chained > MAX_AED_CHAIN {
            return Err(UdfError::VolumeCorrupted("allocation extent chain too long"));
        }
        let lba = resolve_long_ad(self.vol, ad)?;
        debug!("Following allocation extent chain to block {lba}");
        let block = dev.read_block_vec(lba)?;
        let tag = DescriptorTag::parse(&block)?;
        if tag.identifier != 258 {
            return Err(UdfError::VolumeCorrupted(
                "expected an allocation extent descriptor",
            ));
        }
        if tag.lba != ad.lba {
            return Err(UdfError::VolumeCorrupted(
                "allocation extent descriptor location mismatch",
            ));
        }
        if !tag.body_crc_valid(&block) {
            return Err(UdfError::VolumeCorrupted(
                "allocation extent descriptor crc mismatch",
            ));
        }
        let (_aed, ads) = AllocationExtentDescriptor::parse(&block[TAG_LEN..])?;
        self.run = ads.to_vec();
        self.pos = 0;
        Ok(())
    }
}

/// Reads `len` bytes starting `skew` bytes into the extent at `abs_lba`
///
/// One device read per call, so one per contributing extent; the caller
/// guarantees the range lies within the extent.
pub(crate) fn read_extent_bytes<D: BlockDevice>(
    dev: &mut D,
    abs_lba: u64,
    skew: u64,
    len: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let bs = u64::from(dev.block_size());
    let start_lba = abs_lba + skew / bs;
    let prefix = (skew % bs) as usize;
    let mut buf = vec![0u8; prefix + len];
    dev.read_block(start_lba, &mut buf)?;
    out.extend_from_slice(&buf[prefix..]);
    Ok(())
}
