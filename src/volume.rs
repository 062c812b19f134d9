//! Volume recognition and the in-memory volume model
//!
//! Bootstraps a mounted volume: scans the Volume Recognition Sequence,
//! locates the Anchor Volume Descriptor Pointer, walks the Main Volume
//! Descriptor Sequence and loads the File Set Descriptor and root directory
//! File Entry. The resulting [`Volume`] is built once per mount and holds no
//! device reference; every subsequent operation borrows the device again.

use crate::device::BlockDevice;
use crate::ecma167::{
    AnchorVolumeDescriptorPointer, DescriptorTag, ExtentAD, FileEntry, FileIdentifierDescriptor,
    FileSetDescriptor, LogicalVolumeDescriptor, PartitionDescriptor, PrimaryVolumeDescriptor,
    TAG_LEN,
};
use crate::error::{Result, UdfError};
use crate::file::FileHandle;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Byte offset of the Volume Recognition Sequence (2.1.7)
const VRS_START_OFFSET: u64 = 32768;

/// Number of sectors scanned for the recognition descriptors
const VRS_SCAN_SECTORS: u64 = 16;

/// A mounted volume: descriptors captured from the Main Volume Descriptor
/// Sequence plus the cached root directory
#[derive(Debug)]
pub struct Volume {
    /// Logical block size, fixed for the lifetime of the mount
    pub block_size: u32,
    /// Primary Volume Descriptors
    pub pvds: Vec<PrimaryVolumeDescriptor>,
    /// Partition Descriptors
    pub pds: Vec<PartitionDescriptor>,
    /// The one prevailing Logical Volume Descriptor
    pub lvd: LogicalVolumeDescriptor,
    /// The File Set Descriptor referenced by the LVD contents use extent
    pub fsd: FileSetDescriptor,
    /// Root directory File Entry
    pub root: FileEntry,
    /// Synthesized FID for the root directory itself
    pub root_fid: FileIdentifierDescriptor,
}

impl Volume {
    /// Looks up a Partition Descriptor by partition reference number
    ///
    /// The reference indexes the LVD partition maps; the map carries the
    /// partition number the descriptor list is searched by.
    pub fn partition(&self, part_ref: u16) -> Result<&PartitionDescriptor> {
        partition_in(&self.lvd, &self.pds, part_ref)
    }

    /// Opens the file or directory at `path`, resolved from the root
    pub fn open<D: BlockDevice>(&self, dev: &mut D, path: &str) -> Result<FileHandle> {
        let (entry, fid) = crate::path::resolve(dev, self, path)?;
        Ok(FileHandle::new(entry, fid))
    }

    /// Opens `path` resolved relative to an open directory handle
    pub fn open_at<D: BlockDevice>(
        &self,
        dev: &mut D,
        parent: &FileHandle,
        path: &str,
    ) -> Result<FileHandle> {
        let (entry, fid) = crate::path::resolve_from(
            dev,
            self,
            parent.entry.clone(),
            parent.fid.clone(),
            path,
        )?;
        Ok(FileHandle::new(entry, fid))
    }
}

fn partition_in<'a>(
    lvd: &LogicalVolumeDescriptor,
    pds: &'a [PartitionDescriptor],
    part_ref: u16,
) -> Result<&'a PartitionDescriptor> {
    let map = lvd
        .partition_maps
        .get(usize::from(part_ref))
        .ok_or(UdfError::VolumeCorrupted("partition reference out of range"))?;
    pds.iter()
        .find(|p| p.partition_number == map.partition_number)
        .ok_or(UdfError::VolumeCorrupted(
            "partition map references an unknown partition",
        ))
}

/// Reads one block and validates its descriptor tag
///
/// Acceptance requires a matching tag id, a matching recorded location and a
/// valid body CRC; anything else is a corrupt structure, never silently used.
pub(crate) fn read_tagged_block<D: BlockDevice>(
    dev: &mut D,
    abs_lba: u64,
    expected_ids: &[u16],
    expected_tag_lba: u32,
) -> Result<(DescriptorTag, Vec<u8>)> {
    let block = dev.read_block_vec(abs_lba)?;
    let tag = DescriptorTag::parse(&block)?;
    if !expected_ids.contains(&tag.identifier) {
        warn!(
            "Unexpected descriptor tag (id {}, lba {})",
            tag.identifier, tag.lba
        );
        return Err(UdfError::VolumeCorrupted("unexpected descriptor tag"));
    }
    if tag.lba != expected_tag_lba {
        return Err(UdfError::VolumeCorrupted("descriptor tag location mismatch"));
    }
    if !tag.body_crc_valid(&block) {
        return Err(UdfError::VolumeCorrupted("descriptor crc mismatch"));
    }
    Ok((tag, block))
}

/// Checks whether the device carries a UDF Volume Recognition Sequence
///
/// Used by the binding layer to decide whether to attach at all; scans for
/// the BEA01, NSR02/NSR03 and TEA01 standard identifiers without touching
/// the volume descriptors proper. Never fails: unreadable devices simply
/// don't probe.
#[instrument(skip_all)]
pub fn probe<D: BlockDevice>(dev: &mut D) -> bool {
    let bs = u64::from(dev.block_size());
    if bs == 0 {
        return false;
    }
    let start = VRS_START_OFFSET / bs;
    let mut has_bea = false;
    let mut has_nsr = false;
    let mut has_tea = false;
    let mut descriptor = [0u8; 6];
    for sector in start..start + VRS_SCAN_SECTORS {
        if dev.read_block(sector, &mut descriptor).is_err() {
            break;
        }
        match &descriptor {
            b"\0BEA01" => {
                debug!("Beginning Extended Area Descriptor at sector {sector}");
                has_bea = true;
            }
            b"\0NSR02" | b"\0NSR03" => {
                debug!("NSR0{} Descriptor at sector {sector}", descriptor[5] - 0x30);
                has_nsr = true;
            }
            b"\0TEA01" => {
                debug!("TEA01 Descriptor at sector {sector}");
                has_tea = true;
                break;
            }
            _ => {}
        }
    }
    if has_bea && has_nsr && !has_tea {
        warn!("Terminating Extended Area Descriptor not found");
    }
    has_bea && has_nsr
}

/// Locates the Anchor Volume Descriptor Pointer
///
/// Probes block 256, then `last_block - 256`, then `last_block`, then block
/// 512; the first candidate with an AVDP tag and a valid checksum wins.
#[instrument(skip_all)]
pub fn find_avdp<D: BlockDevice>(dev: &mut D) -> Result<AnchorVolumeDescriptorPointer> {
    let last = dev.last_block();
    let mut candidates = vec![256u64];
    if last > 256 {
        candidates.push(last - 256);
    }
    candidates.push(last);
    candidates.push(512);
    for lba in candidates {
        if lba > last {
            continue;
        }
        if let Some(avdp) = try_avdp(dev, lba) {
            debug!("Anchor Volume Descriptor Pointer at block {lba}");
            return Ok(avdp);
        }
    }
    Err(UdfError::VolumeCorrupted(
        "anchor volume descriptor pointer not found",
    ))
}

fn try_avdp<D: BlockDevice>(dev: &mut D, lba: u64) -> Option<AnchorVolumeDescriptorPointer> {
    let block = dev.read_block_vec(lba).ok()?;
    let tag = DescriptorTag::parse(&block).ok()?;
    if tag.identifier != 2 || u64::from(tag.lba) != lba {
        return None;
    }
    if !tag.body_crc_valid(&block) {
        return None;
    }
    AnchorVolumeDescriptorPointer::parse(&block[TAG_LEN..]).ok()
}

/// Walks the Main Volume Descriptor Sequence one block at a time
///
/// Partition Descriptors and the Logical Volume Descriptor are captured;
/// the walk ends at a Terminating Descriptor or when the extent runs out.
/// A second LVD, or a second PD claiming an already seen partition number,
/// is an unsupported volume (one read-only plus one writable partition with
/// distinct numbers is the allowed dual-partition arrangement).
#[instrument(skip_all)]
fn read_volume_descriptor_sequence<D: BlockDevice>(
    dev: &mut D,
    extent: &ExtentAD,
) -> Result<(
    Vec<PrimaryVolumeDescriptor>,
    Vec<PartitionDescriptor>,
    Option<LogicalVolumeDescriptor>,
)> {
    let bs = u64::from(dev.block_size());
    let mut pvds = Vec::new();
    let mut pds: Vec<PartitionDescriptor> = Vec::new();
    let mut lvd = None;
    let nblocks = u64::from(extent.length) / bs;
    for i in 0..nblocks {
        let lba = u64::from(extent.lba) + i;
        let block = dev.read_block_vec(lba)?;
        let tag = DescriptorTag::parse(&block)?;
        if u64::from(tag.lba) != lba {
            return Err(UdfError::VolumeCorrupted("descriptor tag location mismatch"));
        }
        debug!("Sequence Tag: {tag:?}");
        if !tag.body_crc_valid(&block) {
            warn!("Descriptor crc mismatch (tag {})", tag.identifier);
        }
        let body = &block[TAG_LEN..];
        match tag.identifier {
            1 => {
                let pvd = PrimaryVolumeDescriptor::parse(body)?;
                debug!("{pvd:?}");
                pvds.push(pvd);
            }
            5 => {
                let pd = PartitionDescriptor::parse(body)?;
                debug!("{pd:?}");
                if pds
                    .iter()
                    .any(|p| p.partition_number == pd.partition_number)
                {
                    return Err(UdfError::Unsupported("duplicate partition number"));
                }
                pds.push(pd);
            }
            6 => {
                if lvd.is_some() {
                    return Err(UdfError::Unsupported("multiple logical volume descriptors"));
                }
                let parsed = LogicalVolumeDescriptor::parse(body)?;
                debug!("{parsed:?}");
                lvd = Some(parsed);
            }
            8 => {
                debug!("Terminating Descriptor found, sequence complete");
                break;
            }
            other => {
                debug!("Skipping descriptor (type {other})");
            }
        }
    }
    Ok((pvds, pds, lvd))
}

/// Builds the volume model for the device
///
/// Performed once per mounted volume; the returned model owns every captured
/// descriptor and the cached root directory entry.
#[instrument(skip_all)]
pub fn mount<D: BlockDevice>(dev: &mut D) -> Result<Volume> {
    let block_size = dev.block_size();
    let avdp = find_avdp(dev)?;
    debug!("Anchor Volume Descriptor Pointer: {avdp:?}");
    if avdp.main.length == 0 {
        return Err(UdfError::VolumeCorrupted(
            "empty main volume descriptor sequence",
        ));
    }
    let (pvds, pds, lvd) = read_volume_descriptor_sequence(dev, &avdp.main)?;
    let lvd = lvd.ok_or(UdfError::VolumeCorrupted("no logical volume descriptor"))?;
    if pds.is_empty() {
        return Err(UdfError::VolumeCorrupted("no partition descriptor"));
    }
    if !lvd.desc_charset.is_osta_cs0() {
        return Err(UdfError::VolumeCorrupted(
            "invalid logical volume descriptor charset",
        ));
    }
    if lvd.block_size != block_size {
        return Err(UdfError::VolumeCorrupted(
            "logical volume block size differs from the device",
        ));
    }
    if !lvd.domain_identifier.is_osta_udf_compliant() {
        return Err(UdfError::VolumeCorrupted(
            "logical volume domain identifier is not OSTA UDF",
        ));
    }

    // Load the File Set Descriptor through the LVD contents use extent
    let fsd_ad = lvd.fsd_location.clone();
    if fsd_ad.is_empty() {
        return Err(UdfError::VolumeCorrupted("missing file set descriptor extent"));
    }
    let pd = partition_in(&lvd, &pds, fsd_ad.part_ref)?;
    let fsd_lba = u64::from(pd.partition_starting_location) + u64::from(fsd_ad.lba);
    let (_, block) = read_tagged_block(dev, fsd_lba, &[256], fsd_ad.lba)?;
    let fsd = FileSetDescriptor::parse(&block[TAG_LEN..])?;
    debug!("Root File Set: {fsd:?}");

    // Load the root directory File Entry
    let root_icb = fsd.root_dir_icb.clone();
    if root_icb.is_empty() {
        return Err(UdfError::VolumeCorrupted("missing root directory icb"));
    }
    let pd = partition_in(&lvd, &pds, root_icb.part_ref)?;
    let root_lba = u64::from(pd.partition_starting_location) + u64::from(root_icb.lba);
    let (tag, block) = read_tagged_block(dev, root_lba, &[261, 266], root_icb.lba)?;
    let root = FileEntry::parse(&tag, &block[TAG_LEN..], &root_icb, block_size)?;
    if !root.icb_tag.is_directory() {
        return Err(UdfError::VolumeCorrupted("root icb is not a directory"));
    }
    debug!("Root: {root:?}");

    // The root has no FID of its own; it is its own parent
    let root_fid = FileIdentifierDescriptor {
        version_number: 1,
        characteristics: 0b1010,
        icb: root_icb,
        implementation_use: Vec::new(),
        identifier: String::new(),
        identifier_bytes: Vec::new(),
    };

    Ok(Volume {
        block_size,
        pvds,
        pds,
        lvd,
        fsd,
        root,
        root_fid,
    })
}
