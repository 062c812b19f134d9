//! Path resolution
//!
//! Resolves path strings into File Entry / FID pairs, one component at a
//! time, with `.` and `..` handling and transparent symbolic link expansion.
//! A symlink's content is a run of Path Component records, each resolved
//! against the evolving current directory exactly as a path segment is.

use crate::device::BlockDevice;
use crate::dir::DirReader;
use crate::ecma167::{decode_identifier, FileEntry, FileIdentifierDescriptor};
use crate::error::{Result, UdfError};
use crate::file;
use crate::volume::Volume;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

/// Bound on symbolic link expansions per resolution
///
/// The on-disk format permits link cycles; the bound turns them into
/// [`UdfError::TooManySymlinks`] instead of unbounded recursion.
pub const MAX_LINK_DEPTH: usize = 16;

type Located = (FileEntry, FileIdentifierDescriptor);

/// Resolves `path` from the volume root
///
/// Both `/` and `\` separate components; a leading separator is the root
/// itself (and is also where relative resolution of `path` starts).
#[instrument(skip(dev, vol))]
pub fn resolve<D: BlockDevice>(dev: &mut D, vol: &Volume, path: &str) -> Result<Located> {
    resolve_from(dev, vol, vol.root.clone(), vol.root_fid.clone(), path)
}

/// Resolves `path` against an arbitrary starting directory
pub(crate) fn resolve_from<D: BlockDevice>(
    dev: &mut D,
    vol: &Volume,
    start: FileEntry,
    start_fid: FileIdentifierDescriptor,
    path: &str,
) -> Result<Located> {
    let mut link_depth = 0usize;
    let mut cur = (start, start_fid);
    for (i, component) in path.split(['/', '\\']).enumerate() {
        match component {
            "" if i == 0 => {
                // Leading separator: restart from the root
                cur = (vol.root.clone(), vol.root_fid.clone());
            }
            "" | "." => {}
            ".." => cur = parent_of(dev, vol, &cur)?,
            name => {
                if !cur.0.icb_tag.is_directory() {
                    return Err(UdfError::NotFound);
                }
                let fid = lookup(dev, vol, &cur.0, name)?;
                let entry = file::read_file_entry(dev, vol, &fid.icb)?;
                cur = if entry.icb_tag.is_link() {
                    resolve_symlink(dev, vol, cur, &entry, &mut link_depth)?
                } else {
                    (entry, fid)
                };
            }
        }
    }
    Ok(cur)
}

/// Finds the named entry in a directory
///
/// Deleted entries never surface from the walker and the parent entry has no
/// name, so a plain comparison over the live entries suffices. The length
/// check is the cheap rejection before the full string comparison.
fn lookup<D: BlockDevice>(
    dev: &mut D,
    vol: &Volume,
    dir: &FileEntry,
    name: &str,
) -> Result<FileIdentifierDescriptor> {
    let mut rdr = DirReader::new();
    while let Some(fid) = rdr.read_next_entry(dev, vol, dir)? {
        if fid.is_parent() {
            continue;
        }
        if fid.identifier.len() == name.len() && fid.identifier == name {
            return Ok(fid);
        }
    }
    Err(UdfError::NotFound)
}

/// Steps to the containing directory via the mandatory parent entry
///
/// The root is its own parent, so `..` at the root stays at the root.
fn parent_of<D: BlockDevice>(dev: &mut D, vol: &Volume, cur: &Located) -> Result<Located> {
    if !cur.0.icb_tag.is_directory() {
        return Err(UdfError::NotFound);
    }
    let mut rdr = DirReader::new();
    while let Some(fid) = rdr.read_next_entry(dev, vol, &cur.0)? {
        if fid.is_parent() {
            let entry = file::read_file_entry(dev, vol, &fid.icb)?;
            return Ok((entry, fid));
        }
    }
    Err(UdfError::VolumeCorrupted("directory has no parent entry"))
}

/// Expands a symbolic link against the directory containing it
///
/// `base` is the link's containing directory: relative components resolve
/// from there, not from the link's own location.
fn resolve_symlink<D: BlockDevice>(
    dev: &mut D,
    vol: &Volume,
    base: Located,
    link: &FileEntry,
    link_depth: &mut usize,
) -> Result<Located> {
    *link_depth += 1;
    if *link_depth > MAX_LINK_DEPTH {
        return Err(UdfError::TooManySymlinks);
    }
    let size = file::file_size(dev, vol, link)?;
    let len = usize::try_from(size)
        .map_err(|_| UdfError::VolumeCorrupted("symbolic link content too large"))?;
    let data = file::read_file_data(dev, vol, link, 0, len)?;

    let mut cur = base;
    let mut pos = 0usize;
    while pos < data.len() {
        if pos + 4 > data.len() {
            return Err(UdfError::VolumeCorrupted("truncated path component"));
        }
        let ctype = data[pos];
        let id_len = usize::from(data[pos + 1]);
        pos += 4; // type, identifier length, component file version
        if pos + id_len > data.len() {
            return Err(UdfError::VolumeCorrupted("truncated path component"));
        }
        let id = &data[pos..pos + id_len];
        pos += id_len;
        match ctype {
            1 => cur = (vol.root.clone(), vol.root_fid.clone()),
            2 => {}
            3 => cur = parent_of(dev, vol, &cur)?,
            4 => {}
            5 => {
                let name = decode_identifier(id)?;
                if !cur.0.icb_tag.is_directory() {
                    return Err(UdfError::NotFound);
                }
                let fid = lookup(dev, vol, &cur.0, &name)?;
                let entry = file::read_file_entry(dev, vol, &fid.icb)?;
                cur = if entry.icb_tag.is_link() {
                    let containing = cur.clone();
                    resolve_symlink(dev, vol, containing, &entry, link_depth)?
                } else {
                    (entry, fid)
                };
            }
            _ => return Err(UdfError::VolumeCorrupted("invalid path component type")),
        }
    }
    Ok(cur)
}
