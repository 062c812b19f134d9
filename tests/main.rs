mod common;

use common::builder::*;
use udffs::{extent, file, mount, probe, resolve, MemoryBlockDevice, UdfError};

/// A 1400-block image with its partition at block 100, AVDP at `avdp_at`,
/// MVDS at block 40 and the FSD/root allocated as partition blocks 0/1
fn builder_with_avdp(avdp_at: u64) -> (UdfBuilder, u32, u32) {
    let mut b = UdfBuilder::new(1400, 100, 1000);
    b.write_avdp(avdp_at, 40, 8);
    let fsd = b.alloc(1);
    let root = b.alloc(1);
    b.write_vds(40, fsd);
    b.write_fsd(fsd, root);
    (b, fsd, root)
}

fn builder() -> (UdfBuilder, u32, u32) {
    builder_with_avdp(256)
}

#[test]
fn probe_recognizes_vrs() {
    let (mut b, _, root) = builder();
    b.write_dir(root, &[fid_parent(root)]);
    let mut dev = b.device();
    assert!(probe(&mut dev));

    let mut blank = MemoryBlockDevice::new(vec![0u8; 64 * BS], BS as u32);
    assert!(!probe(&mut blank));
}

#[test]
fn scenario_a_inline_resolve_and_read() {
    let (mut b, _, root) = builder();
    let hello = b.alloc(1);
    let content = b"Hello from a tiny UDF volume!\n";
    b.write_file_inline(hello, content);
    b.write_dir(root, &[fid_parent(root), fid("HELLO.TXT", hello, 0)]);
    let mut dev = b.device();

    let vol = mount(&mut dev).expect("mount failed");
    assert_eq!(vol.pvds.len(), 1, "primary volume count mismatch");
    assert_eq!(vol.pds.len(), 1, "partition count mismatch");
    assert_eq!(vol.lvd.block_size, 2048, "block size mismatch");
    assert!(vol.fsd.is_compliant(), "file set domain id mismatch");

    let (entry, f) = resolve(&mut dev, &vol, "\\HELLO.TXT").expect("resolve failed");
    assert_eq!(f.identifier, "HELLO.TXT");
    assert_eq!(
        file::file_size(&mut dev, &vol, &entry).unwrap(),
        content.len() as u64
    );
    let data = file::read_file_data(&mut dev, &vol, &entry, 0, content.len()).unwrap();
    assert_eq!(data, content);

    let mut h = vol.open(&mut dev, "/HELLO.TXT").expect("open failed");
    assert!(!h.is_directory());
    let data = h.read(&mut dev, &vol, 1024).unwrap();
    assert_eq!(data, content);
    assert!(h.read(&mut dev, &vol, 1024).unwrap().is_empty(), "read past eof");
}

#[test]
fn scenario_b_ranged_read_spans_extents() {
    let (mut b, _, root) = builder();
    let file_icb = b.alloc(1);
    let e1 = b.alloc(1);
    let e2 = b.alloc(1);
    let e3 = b.alloc(1);
    let mk = |seed: u8, n: usize| -> Vec<u8> {
        (0..n).map(|i| seed.wrapping_add(i as u8)).collect()
    };
    let c1 = mk(1, 512);
    let c2 = mk(101, 1024);
    let c3 = mk(201, 256);
    b.write_data(e1, &c1);
    b.write_data(e2, &c2);
    b.write_data(e3, &c3);
    // The recorded information length deliberately lies: size must be
    // recomputed from the extent run
    b.write_file_long_ads(file_icb, &[(512, e1), (1024, e2), (256, e3)], 9999);
    b.write_dir(root, &[fid_parent(root), fid("SPAN.BIN", file_icb, 0)]);
    let mut dev = b.device();

    let vol = mount(&mut dev).unwrap();
    let (entry, _) = resolve(&mut dev, &vol, "/SPAN.BIN").unwrap();
    assert_eq!(file::file_size(&mut dev, &vol, &entry).unwrap(), 1792);

    let reference: Vec<u8> = [c1, c2, c3].concat();
    let data = file::read_file_data(&mut dev, &vol, &entry, 600, 700).unwrap();
    assert_eq!(data.len(), 700);
    assert_eq!(data, &reference[600..1300]);

    // Oversized requests clamp to the extent stream
    let all = file::read_file_data(&mut dev, &vol, &entry, 0, 10_000).unwrap();
    assert_eq!(all, reference);
}

#[test]
fn scenario_c_avdp_fallback_at_last_block() {
    let (mut b, _, root) = builder_with_avdp(1399);
    b.write_dir(root, &[fid_parent(root)]);
    let mut dev = b.device();
    let vol = mount(&mut dev).expect("fallback probing failed");
    assert_eq!(vol.pds.len(), 1);
}

#[test]
fn avdp_fallback_at_block_512() {
    let (mut b, _, root) = builder_with_avdp(512);
    b.write_dir(root, &[fid_parent(root)]);
    let mut dev = b.device();
    mount(&mut dev).expect("block 512 probing failed");
}

#[test]
fn no_avdp_is_corrupted() {
    let mut b = UdfBuilder::new(1400, 100, 1000);
    let fsd = b.alloc(1);
    let root = b.alloc(1);
    b.write_vds(40, fsd);
    b.write_fsd(fsd, root);
    b.write_dir(root, &[fid_parent(root)]);
    let mut dev = b.device();
    assert!(matches!(
        mount(&mut dev),
        Err(UdfError::VolumeCorrupted(_))
    ));
}

#[test]
fn scenario_d_symlink_resolves_against_containing_directory() {
    let (mut b, _, root) = builder();
    let dir1 = b.alloc(1);
    let sib_outer = b.alloc(1);
    let sib_inner = b.alloc(1);
    let link = b.alloc(1);
    b.write_file_inline(sib_outer, b"outer sibling");
    b.write_file_inline(sib_inner, b"inner sibling");
    b.write_symlink(link, &[(3, ""), (5, "SIBLING.TXT")]);
    b.write_dir(
        dir1,
        &[
            fid_parent(root),
            fid("SIBLING.TXT", sib_inner, 0),
            fid("LINK", link, 0),
        ],
    );
    b.write_dir(
        root,
        &[
            fid_parent(root),
            fid("SIBLING.TXT", sib_outer, 0),
            fid("DIR1", dir1, 0b10),
        ],
    );
    let mut dev = b.device();

    let vol = mount(&mut dev).unwrap();
    // {parent}/{named} walks up from DIR1, the link's containing directory
    let (entry, _) = resolve(&mut dev, &vol, "/DIR1/LINK").unwrap();
    let data = file::read_file_data(&mut dev, &vol, &entry, 0, 64).unwrap();
    assert_eq!(data, b"outer sibling");

    let (entry, _) = resolve(&mut dev, &vol, "/DIR1/SIBLING.TXT").unwrap();
    let data = file::read_file_data(&mut dev, &vol, &entry, 0, 64).unwrap();
    assert_eq!(data, b"inner sibling");
}

#[test]
fn symlink_cycle_is_bounded() {
    let (mut b, _, root) = builder();
    let link1 = b.alloc(1);
    let link2 = b.alloc(1);
    b.write_symlink(link1, &[(5, "LINK2")]);
    b.write_symlink(link2, &[(5, "LINK1")]);
    b.write_dir(
        root,
        &[
            fid_parent(root),
            fid("LINK1", link1, 0),
            fid("LINK2", link2, 0),
        ],
    );
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();
    assert!(matches!(
        resolve(&mut dev, &vol, "/LINK1"),
        Err(UdfError::TooManySymlinks)
    ));
}

#[test]
fn symlink_with_current_and_root_components() {
    let (mut b, _, root) = builder();
    let target = b.alloc(1);
    let link = b.alloc(1);
    b.write_file_inline(target, b"target data");
    // {root}/{current}/{named}
    b.write_symlink(link, &[(1, ""), (2, ""), (5, "TARGET.TXT")]);
    b.write_dir(
        root,
        &[
            fid_parent(root),
            fid("TARGET.TXT", target, 0),
            fid("LINK", link, 0),
        ],
    );
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();
    let (entry, _) = resolve(&mut dev, &vol, "/LINK").unwrap();
    let data = file::read_file_data(&mut dev, &vol, &entry, 0, 64).unwrap();
    assert_eq!(data, b"target data");
}

#[test]
fn enumeration_skips_deleted_and_terminates() {
    let (mut b, _, root) = builder();
    let fa = b.alloc(1);
    let fb = b.alloc(1);
    let fc = b.alloc(1);
    b.write_file_inline(fa, b"a");
    b.write_file_inline(fb, b"b");
    b.write_file_inline(fc, b"c");
    b.write_dir(
        root,
        &[
            fid_parent(root),
            fid("A.TXT", fa, 0),
            fid_deleted("GONE.TXT", fa),
            fid("B.TXT", fb, 0),
            fid_deleted("LOST.TXT", fb),
            fid("C.TXT", fc, 0),
        ],
    );
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();

    let mut h = vol.open(&mut dev, "/").unwrap();
    assert!(h.is_directory());
    let mut names = Vec::new();
    while let Some(f) = h.read_dir_entry(&mut dev, &vol).unwrap() {
        if f.is_parent() {
            names.push("..".to_string());
        } else {
            names.push(f.identifier.clone());
        }
    }
    assert_eq!(names, ["..", "A.TXT", "B.TXT", "C.TXT"]);
    // Exhaustion is sticky, not an error
    assert!(h.read_dir_entry(&mut dev, &vol).unwrap().is_none());

    // Rewind forgets the cached stream and enumerates afresh
    h.set_position(0).unwrap();
    let mut count = 0;
    while h.read_dir_entry(&mut dev, &vol).unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 4);

    assert!(matches!(
        h.set_position(5),
        Err(UdfError::Unsupported(_))
    ));

    // Deleted names never resolve
    assert!(matches!(
        resolve(&mut dev, &vol, "/GONE.TXT"),
        Err(UdfError::NotFound)
    ));
}

#[test]
fn dot_and_dotdot_navigation() {
    let (mut b, _, root) = builder();
    let dir1 = b.alloc(1);
    let hello = b.alloc(1);
    b.write_file_inline(hello, b"hi");
    b.write_dir(dir1, &[fid_parent(root)]);
    b.write_dir(
        root,
        &[
            fid_parent(root),
            fid("DIR1", dir1, 0b10),
            fid("HELLO.TXT", hello, 0),
        ],
    );
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();

    let (entry, _) = resolve(&mut dev, &vol, "/DIR1/.").unwrap();
    assert_eq!(entry.unique_id, u64::from(dir1));
    let (entry, _) = resolve(&mut dev, &vol, "/DIR1/..").unwrap();
    assert_eq!(entry.unique_id, u64::from(root));
    let (entry, _) = resolve(&mut dev, &vol, "\\").unwrap();
    assert_eq!(entry.unique_id, u64::from(root));
    let (entry, _) = resolve(&mut dev, &vol, "/DIR1/../HELLO.TXT").unwrap();
    assert_eq!(entry.unique_id, u64::from(hello));
    // `..` at the root stays at the root
    let (entry, _) = resolve(&mut dev, &vol, "/..").unwrap();
    assert_eq!(entry.unique_id, u64::from(root));
}

#[test]
fn corrupt_fsd_checksum_is_rejected() {
    let (mut b, fsd, root) = builder();
    b.write_dir(root, &[fid_parent(root)]);
    let off = b.prel_offset(fsd);
    b.raw()[off + 4] ^= 0xff; // break the tag checksum, tag id stays valid
    let mut dev = b.device();
    assert!(matches!(
        mount(&mut dev),
        Err(UdfError::VolumeCorrupted(_))
    ));
}

#[test]
fn second_lvd_is_unsupported() {
    let (mut b, fsd, root) = builder();
    b.write_dir(root, &[fid_parent(root)]);
    b.write_lvd(43, fsd); // overwrites the terminator
    b.write_terminator(44);
    let mut dev = b.device();
    assert!(matches!(mount(&mut dev), Err(UdfError::Unsupported(_))));
}

#[test]
fn duplicate_partition_number_is_unsupported() {
    let (mut b, _, root) = builder();
    b.write_dir(root, &[fid_parent(root)]);
    b.write_pd(43, 1); // same partition number again
    b.write_terminator(44);
    let mut dev = b.device();
    assert!(matches!(mount(&mut dev), Err(UdfError::Unsupported(_))));
}

#[test]
fn dual_partitions_with_distinct_numbers_mount() {
    let (mut b, _, root) = builder();
    b.write_dir(root, &[fid_parent(root)]);
    b.write_pd(43, 2); // a second, writable-side partition
    b.write_terminator(44);
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();
    assert_eq!(vol.pds.len(), 2);
    // Lookup by reference still lands on partition number 1
    assert_eq!(vol.partition(0).unwrap().partition_number, 1);
}

#[test]
fn indirect_allocation_extent_chain() {
    let (mut b, _, root) = builder();
    let file_icb = b.alloc(1);
    let e1 = b.alloc(1);
    let e2 = b.alloc(1);
    let e3 = b.alloc(1);
    let aed = b.alloc(1);
    let mk = |seed: u8, n: usize| -> Vec<u8> {
        (0..n).map(|i| seed.wrapping_mul(7).wrapping_add(i as u8)).collect()
    };
    let c1 = mk(3, 512);
    let c2 = mk(5, 1024);
    let c3 = mk(9, 256);
    b.write_data(e1, &c1);
    b.write_data(e2, &c2);
    b.write_data(e3, &c3);
    b.write_aed(aed, &[(1024, e2), (256, e3)]);
    b.write_file_short_ads(
        file_icb,
        &[(512, e1), (AD_CONTINUATION | BS as u32, aed)],
        1792,
    );
    b.write_dir(root, &[fid_parent(root), fid("CHAIN.BIN", file_icb, 0)]);
    let mut dev = b.device();

    let vol = mount(&mut dev).unwrap();
    let (entry, _) = resolve(&mut dev, &vol, "/CHAIN.BIN").unwrap();
    assert_eq!(file::file_size(&mut dev, &vol, &entry).unwrap(), 1792);
    let reference: Vec<u8> = [c1, c2, c3].concat();
    let all = file::read_file_data(&mut dev, &vol, &entry, 0, 1792).unwrap();
    assert_eq!(all, reference);
    // A ranged read across the chain boundary
    let data = file::read_file_data(&mut dev, &vol, &entry, 500, 100).unwrap();
    assert_eq!(data, &reference[500..600]);
}

#[test]
fn not_recorded_extents_are_invisible() {
    let (mut b, _, root) = builder();
    let file_icb = b.alloc(1);
    let e1 = b.alloc(1);
    let e2 = b.alloc(1);
    let c1: Vec<u8> = (0..512u32).map(|i| (i % 256) as u8).collect();
    let c2: Vec<u8> = (0..256u32).map(|i| (255 - i % 256) as u8).collect();
    b.write_data(e1, &c1);
    b.write_data(e2, &c2);
    b.write_file_short_ads(
        file_icb,
        &[(512, e1), (AD_NOT_RECORDED | 1024, 0), (256, e2)],
        768,
    );
    b.write_dir(root, &[fid_parent(root), fid("HOLEY.BIN", file_icb, 0)]);
    let mut dev = b.device();

    let vol = mount(&mut dev).unwrap();
    let (entry, _) = resolve(&mut dev, &vol, "/HOLEY.BIN").unwrap();
    assert_eq!(file::file_size(&mut dev, &vol, &entry).unwrap(), 768);
    let all = file::read_file_data(&mut dev, &vol, &entry, 0, 768).unwrap();
    assert_eq!(all, [c1, c2].concat());
}

#[test]
fn directory_stream_spanning_extents() {
    let (mut b, _, root) = builder();
    let shared = b.alloc(1);
    b.write_file_inline(shared, b"shared content");
    let mut fids = vec![fid_parent(root)];
    for i in 0..60 {
        fids.push(fid(&format!("FILE{i:02}"), shared, 0));
    }
    let stream_len: usize = fids.iter().map(Vec::len).sum();
    assert!(stream_len > BS, "stream must cross a block boundary");
    let d1 = b.alloc(1);
    let d2 = b.alloc(1);
    b.write_dir_short_ads(
        root,
        &fids,
        &[(BS as u32, d1), ((stream_len - BS) as u32, d2)],
    );
    let mut dev = b.device();

    let vol = mount(&mut dev).unwrap();
    let mut h = vol.open(&mut dev, "/").unwrap();
    let mut count = 0;
    while h.read_dir_entry(&mut dev, &vol).unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 61, "one parent plus sixty files");

    let (entry, f) = resolve(&mut dev, &vol, "/FILE42").unwrap();
    assert_eq!(f.identifier, "FILE42");
    let data = file::read_file_data(&mut dev, &vol, &entry, 0, 64).unwrap();
    assert_eq!(data, b"shared content");
}

#[test]
fn sixteen_bit_names_resolve() {
    let (mut b, _, root) = builder();
    let f1 = b.alloc(1);
    b.write_file_inline(f1, b"wide named");
    b.write_dir(root, &[fid_parent(root), fid_utf16("Ðì®€µþŧ¥", f1, 0)]);
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();
    let (entry, f) = resolve(&mut dev, &vol, "/Ðì®€µþŧ¥").unwrap();
    assert_eq!(f.identifier, "Ðì®€µþŧ¥");
    let data = file::read_file_data(&mut dev, &vol, &entry, 0, 64).unwrap();
    assert_eq!(data, b"wide named");
}

#[test]
fn empty_file_reads_empty() {
    let (mut b, _, root) = builder();
    let f1 = b.alloc(1);
    b.write_file_inline(f1, b"");
    b.write_dir(root, &[fid_parent(root), fid("EMPTY", f1, 0)]);
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();
    let mut h = vol.open(&mut dev, "/EMPTY").unwrap();
    assert_eq!(h.info(&mut dev, &vol).unwrap().size, 0);
    assert!(h.read(&mut dev, &vol, 16).unwrap().is_empty());
}

#[test]
fn handle_positioning_and_info() {
    let (mut b, _, root) = builder();
    let f1 = b.alloc(1);
    let content = b"0123456789abcdef";
    b.write_file_inline(f1, content);
    b.write_dir(root, &[fid_parent(root), fid("POS.TXT", f1, 0)]);
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();

    let mut h = vol.open(&mut dev, "/POS.TXT").unwrap();
    assert_eq!(h.read(&mut dev, &vol, 4).unwrap(), b"0123");
    assert_eq!(h.position(), 4);
    assert_eq!(h.read(&mut dev, &vol, 4).unwrap(), b"4567");
    h.set_position(10).unwrap();
    assert_eq!(h.read(&mut dev, &vol, 100).unwrap(), b"abcdef");

    let info = h.info(&mut dev, &vol).unwrap();
    assert_eq!(info.name, "POS.TXT");
    assert_eq!(info.size, 16);
    assert!(!info.is_directory);
    assert!(!info.is_symlink);
    assert_eq!(info.uid, 1000);
    assert_eq!(info.gid, 100);
    assert_eq!(info.permissions, 0x14a5);
    assert_eq!(info.link_count, 1);
    assert_eq!(info.unique_id, u64::from(f1));
}

#[test]
fn mismatched_api_use_is_rejected() {
    let (mut b, _, root) = builder();
    let f1 = b.alloc(1);
    b.write_file_inline(f1, b"x");
    b.write_dir(root, &[fid_parent(root), fid("F", f1, 0)]);
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();

    let mut d = vol.open(&mut dev, "/").unwrap();
    assert!(matches!(
        d.read(&mut dev, &vol, 16),
        Err(UdfError::Unsupported(_))
    ));
    let mut f = vol.open(&mut dev, "/F").unwrap();
    assert!(matches!(
        f.read_dir_entry(&mut dev, &vol),
        Err(UdfError::Unsupported(_))
    ));
}

#[test]
fn long_ad_resolution_is_idempotent() {
    let (mut b, _, root) = builder();
    b.write_dir(root, &[fid_parent(root)]);
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();
    let first = extent::resolve_long_ad(&vol, &vol.fsd.root_dir_icb).unwrap();
    let second = extent::resolve_long_ad(&vol, &vol.fsd.root_dir_icb).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, 100 + u64::from(root));
}

#[test]
fn open_at_resolves_relative_paths() {
    let (mut b, _, root) = builder();
    let dir1 = b.alloc(1);
    let f1 = b.alloc(1);
    b.write_file_inline(f1, b"nested");
    b.write_dir(dir1, &[fid_parent(root), fid("INNER.TXT", f1, 0)]);
    b.write_dir(root, &[fid_parent(root), fid("DIR1", dir1, 0b10)]);
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();

    let d = vol.open(&mut dev, "/DIR1").unwrap();
    let mut h = vol.open_at(&mut dev, &d, "INNER.TXT").unwrap();
    assert_eq!(h.read(&mut dev, &vol, 64).unwrap(), b"nested");
    // ..-relative from the subdirectory
    let mut h = vol.open_at(&mut dev, &d, "../DIR1/INNER.TXT").unwrap();
    assert_eq!(h.read(&mut dev, &vol, 64).unwrap(), b"nested");
}

#[test]
fn missing_paths_are_not_found() {
    let (mut b, _, root) = builder();
    let f1 = b.alloc(1);
    b.write_file_inline(f1, b"x");
    b.write_dir(root, &[fid_parent(root), fid("REAL.TXT", f1, 0)]);
    let mut dev = b.device();
    let vol = mount(&mut dev).unwrap();
    assert!(matches!(
        resolve(&mut dev, &vol, "/NOPE.TXT"),
        Err(UdfError::NotFound)
    ));
    // Descending through a regular file
    assert!(matches!(
        resolve(&mut dev, &vol, "/REAL.TXT/X"),
        Err(UdfError::NotFound)
    ));
}

#[test]
fn file_backed_device_mounts() {
    use std::io::Write;

    let (mut b, _, root) = builder();
    let f1 = b.alloc(1);
    b.write_file_inline(f1, b"from a file image");
    b.write_dir(root, &[fid_parent(root), fid("IMG.TXT", f1, 0)]);
    let image = b.device().into_inner();

    let mut tmp = tempfile::tempfile().unwrap();
    tmp.write_all(&image).unwrap();
    let mut dev = udffs::FileBlockDevice::new(tmp, BS as u32).unwrap();
    assert!(probe(&mut dev));
    let vol = mount(&mut dev).unwrap();
    let mut h = vol.open(&mut dev, "/IMG.TXT").unwrap();
    assert_eq!(h.read(&mut dev, &vol, 64).unwrap(), b"from a file image");
}
