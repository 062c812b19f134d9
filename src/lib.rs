//! UDF/ECMA-167 read-only filesystem driver core
//!
//! This crate implements the device-independent half of a UDF filesystem
//! driver: volume recognition and descriptor parsing, extent resolution,
//! directory enumeration, path lookup with symbolic link expansion, and
//! content extraction from possibly-fragmented extent chains.
//!
//! Raw sector access stays outside: the embedding environment provides a
//! [`BlockDevice`] with a fixed logical block size (2048 bytes for the
//! supported profile) and every driver operation borrows it for the call.
//!
//! # Usage
//!
//! ```ignore
//! use udffs::{mount, probe, FileBlockDevice};
//!
//! let file = std::fs::File::open("image.udf")?;
//! let mut dev = FileBlockDevice::new(file, 2048)?;
//! if probe(&mut dev) {
//!     let vol = mount(&mut dev)?;
//!     let mut handle = vol.open(&mut dev, "/docs/readme.txt")?;
//!     let data = handle.read(&mut dev, &vol, 4096)?;
//! }
//! ```
//!
//! Write support is deliberately absent: [`BlockDevice`] exposes no write
//! path and every surface is read-only.

#![warn(missing_docs)]

pub mod device;
pub mod dir;
pub mod ecma167;
pub mod error;
pub mod extent;
pub mod file;
mod ioutil;
pub mod path;
pub mod volume;

pub use device::{BlockDevice, FileBlockDevice, MemoryBlockDevice};
pub use error::{Result, UdfError};
pub use file::{FileHandle, FileInfo};
pub use path::resolve;
pub use volume::{find_avdp, mount, probe, Volume};
