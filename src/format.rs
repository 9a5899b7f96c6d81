//! Shared on-disk primitives used by both patch formats.
//!
//! The streaming format (BSDIFF40) encodes sign-magnitude `int64`s
//! little-endian, matching the classical bsdiff patch file. The seekable
//! format (BSDIFFSX) encodes its outer header and segment table as plain
//! unsigned big-endian integers, with sign-magnitude big-endian `i32` only
//! for the per-record seek field. Two codec routines are kept instead of one
//! generic one so the byte layout at each call site stays unambiguous.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use zerocopy::byteorder::big_endian::{U32 as BeU32, U64 as BeU64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Write a signed 64-bit integer in sign-magnitude form, little-endian, as
/// used by the BSDIFF40 control stream and its outer header.
pub fn write_i64_sm_le(w: &mut impl Write, value: i64) -> io::Result<()> {
    w.write_u64::<LittleEndian>(encode_sm64(value))
}

/// Read a sign-magnitude little-endian `i64`.
pub fn read_i64_sm_le(r: &mut impl Read) -> io::Result<i64> {
    decode_sm64(r.read_u64::<LittleEndian>()?)
}

fn encode_sm64(value: i64) -> u64 {
    let mut y = value.unsigned_abs();
    if value < 0 {
        y |= 1u64 << 63;
    }
    y
}

fn decode_sm64(y: u64) -> io::Result<i64> {
    let magnitude = y & !(1u64 << 63);
    if magnitude > i64::MAX as u64 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "sign-magnitude i64 overflow"));
    }
    Ok(if y & (1u64 << 63) == 0 { magnitude as i64 } else { -(magnitude as i64) })
}

/// Write a signed 32-bit integer in sign-magnitude form, big-endian, as used
/// by the BSDIFFSX per-record seek field.
pub fn write_i32_sm_be(w: &mut impl Write, value: i32) -> io::Result<()> {
    w.write_u32::<BigEndian>(encode_sm32(value))
}

/// Read a sign-magnitude big-endian `i32`.
pub fn read_i32_sm_be(r: &mut impl Read) -> io::Result<i32> {
    decode_sm32(r.read_u32::<BigEndian>()?)
}

fn encode_sm32(value: i32) -> u32 {
    let mut y = value.unsigned_abs();
    if value < 0 {
        y |= 1u32 << 31;
    }
    y
}

fn decode_sm32(y: u32) -> io::Result<i32> {
    let magnitude = y & !(1u32 << 31);
    if magnitude > i32::MAX as u32 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "sign-magnitude i32 overflow"));
    }
    Ok(if y & (1u32 << 31) == 0 { magnitude as i32 } else { -(magnitude as i32) })
}

/// BSDIFF40 magic bytes.
pub const BSDIFF40_MAGIC: [u8; 8] = *b"BSDIFF40";

/// BSDIFFSX magic bytes.
pub const BSDIFFSX_MAGIC: [u8; 8] = *b"BSDIFFSX";

/// Outer header of a seekable (BSDIFFSX) patch. Fields are plain unsigned
/// big-endian; only per-record seek fields further down the file use
/// sign-magnitude encoding.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct BsdiffSxHeader {
    pub magic: [u8; 8],
    pub new_size: BeU64,
    pub blocklen: BeU32,
    pub segtab_enc_len: BeU32,
    pub patch_data_len: BeU64,
}

pub const BSDIFFSX_HEADER_LEN: usize = 32;

/// One segment-table entry: where a sub-patch's data lives and what range
/// of the old file it may touch.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SegmentTableEntry {
    pub ostart: BeU64,
    pub olen: BeU32,
    pub plen: BeU32,
}

pub const SEGMENT_TABLE_ENTRY_LEN: usize = 16;

/// Header prefixed to each per-segment mini-patch within a BSDIFFSX file.
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SegmentMiniHeader {
    pub ctrl_enc_len: BeU32,
    pub ctrl_len: BeU32,
    pub diff_enc_len: BeU32,
    pub extra_enc_len: BeU32,
}

pub const SEGMENT_MINI_HEADER_LEN: usize = 16;
