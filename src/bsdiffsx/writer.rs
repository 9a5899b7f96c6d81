//! Seekable (BSDIFFSX) patch writer: splits a global alignment into one
//! sub-alignment per `blocklen`-byte window of the new file, and writes
//! each as an independent mini-BSDIFF block so a reader can reconstruct any
//! single window without touching the rest of the patch.

use super::{BsdiffSxError, MAX_SEGMENT_OLD_LEN};
use crate::align::AlignSeg;
use crate::format::{self, BsdiffSxHeader, SegmentMiniHeader, SegmentTableEntry, BSDIFFSX_MAGIC};
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::io::Write;
use zerocopy::byteorder::big_endian::{U32 as BeU32, U64 as BeU64};
use zerocopy::IntoBytes;

struct LocalSeg {
    npos: u64,
    opos: u64,
    alen: u64,
}

/// Split a global alignment into `nsegs` per-window groups, with `npos`
/// rebased to be local to each window. A segment whose global span crosses
/// a window boundary is cut into pieces, one per window it touches.
fn split_by_windows(alignment: &[AlignSeg], blocklen: u64, nsegs: usize) -> Vec<Vec<LocalSeg>> {
    let mut windows: Vec<Vec<LocalSeg>> = (0..nsegs).map(|_| Vec::new()).collect();

    for seg in alignment {
        let mut npos = seg.npos;
        let mut opos = seg.opos;
        let mut remaining = seg.alen;
        while remaining > 0 {
            let widx = (npos / blocklen) as usize;
            let window_end = (widx as u64 + 1) * blocklen;
            let take = remaining.min(window_end - npos);
            windows[widx].push(LocalSeg { npos: npos - widx as u64 * blocklen, opos, alen: take });
            npos += take;
            opos += take;
            remaining -= take;
        }
    }

    windows
}

struct Record {
    seek: i32,
    diff_len: u32,
    extra_len: u32,
}

/// Build the (seek, diff_len, extra_len) record stream for one window's
/// segments, already rebased so `opos` is relative to that window's
/// `ostart`. Mirrors the tuple-shift construction in the streaming writer,
/// but field-ordered (seek, diff, extra) and only emitting the leading
/// zero record when the window doesn't begin aligned at local position 0.
fn build_records(segs: &[LocalSeg], block_newlen: u64) -> Vec<Record> {
    let first_idx = if segs.first().map(|s| s.npos == 0).unwrap_or(false) { 1 } else { 0 };

    let (mut prev_npos, mut prev_opos, mut prev_alen) = (0u64, 0u64, 0u64);
    let mut pending_seek = 0i64;
    let mut pending_diff = 0u64;
    if first_idx == 1 {
        pending_seek = segs[0].opos as i64;
        pending_diff = segs[0].alen;
        prev_npos = segs[0].npos;
        prev_opos = segs[0].opos;
        prev_alen = segs[0].alen;
    }

    let mut records = Vec::with_capacity(segs.len() + 1);
    for seg in &segs[first_idx..] {
        let extra = seg.npos - (prev_npos + prev_alen);
        records.push(Record { seek: pending_seek as i32, diff_len: pending_diff as u32, extra_len: extra as u32 });
        pending_seek = seg.opos as i64 - (prev_opos + prev_alen) as i64;
        pending_diff = seg.alen;
        prev_npos = seg.npos;
        prev_opos = seg.opos;
        prev_alen = seg.alen;
    }

    let final_extra = block_newlen - (prev_npos + prev_alen);
    records.push(Record { seek: pending_seek as i32, diff_len: pending_diff as u32, extra_len: final_extra as u32 });
    records
}

fn bzip2_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut enc = BzEncoder::new(Vec::new(), Compression::best());
    enc.write_all(data)?;
    enc.finish()
}

struct SegmentBuild {
    ostart: u64,
    olen: u32,
    mini_header: [u8; format::SEGMENT_MINI_HEADER_LEN],
    ctrl: Vec<u8>,
    diff: Vec<u8>,
    extra: Vec<u8>,
}

fn build_segment(
    segs: &[LocalSeg],
    new: &[u8],
    old: &[u8],
    window_start: u64,
    block_newlen: u64,
) -> Result<SegmentBuild, BsdiffSxError> {
    let (ostart, olen) = if segs.is_empty() {
        (0u64, 0u32)
    } else {
        let lo = segs.iter().map(|s| s.opos).min().unwrap();
        let hi = segs.iter().map(|s| s.opos + s.alen).max().unwrap();
        let olen = hi - lo;
        if olen > MAX_SEGMENT_OLD_LEN {
            return Err(BsdiffSxError::SegmentTooLarge(olen));
        }
        (lo, olen as u32)
    };

    let rebased: Vec<LocalSeg> =
        segs.iter().map(|s| LocalSeg { npos: s.npos, opos: s.opos - ostart, alen: s.alen }).collect();

    let records = build_records(&rebased, block_newlen);

    let mut ctrl_plain = Vec::with_capacity(records.len() * 12);
    for r in &records {
        format::write_i32_sm_be(&mut ctrl_plain, r.seek)?;
        ctrl_plain.extend_from_slice(&r.diff_len.to_be_bytes());
        ctrl_plain.extend_from_slice(&r.extra_len.to_be_bytes());
    }

    let mut diff_plain = Vec::new();
    for s in &rebased {
        let (npos, opos, alen) = (s.npos as usize, s.opos as usize, s.alen as usize);
        for k in 0..alen {
            diff_plain.push(
                new[(window_start as usize) + npos + k].wrapping_sub(old[(ostart as usize) + opos + k]),
            );
        }
    }

    let mut extra_plain = Vec::new();
    let mut npos = 0u64;
    for s in &rebased {
        let start = (window_start + npos) as usize;
        let end = (window_start + s.npos) as usize;
        extra_plain.extend_from_slice(&new[start..end]);
        npos = s.npos + s.alen;
    }
    let start = (window_start + npos) as usize;
    let end = (window_start + block_newlen) as usize;
    extra_plain.extend_from_slice(&new[start..end]);

    let ctrl = bzip2_compress(&ctrl_plain)?;
    let diff = bzip2_compress(&diff_plain)?;
    let extra = bzip2_compress(&extra_plain)?;

    let mini = SegmentMiniHeader {
        ctrl_enc_len: BeU32::new(ctrl.len() as u32),
        ctrl_len: BeU32::new(ctrl_plain.len() as u32),
        diff_enc_len: BeU32::new(diff.len() as u32),
        extra_enc_len: BeU32::new(extra.len() as u32),
    };

    Ok(SegmentBuild { ostart, olen, mini_header: mini.as_bytes().try_into().unwrap(), ctrl, diff, extra })
}

/// Write a seekable BSDIFFSX patch for `alignment` (an alignment of `new`
/// against `old`) to `out`, splitting the new file into `blocklen`-byte
/// windows.
pub fn write(
    alignment: &[AlignSeg],
    new: &[u8],
    old: &[u8],
    blocklen: u32,
    out: &mut impl Write,
) -> Result<(), BsdiffSxError> {
    if blocklen == 0 {
        return Err(BsdiffSxError::ZeroBlockLen);
    }
    let blocklen = blocklen as u64;
    let new_len = new.len() as u64;

    let nsegs = ((new_len + blocklen - 1) / blocklen) as usize;

    let windows = split_by_windows(alignment, blocklen, nsegs);

    log::info!("bsdiffsx: writing {nsegs} segment(s)");
    let mut segments = Vec::with_capacity(nsegs);
    for (i, segs) in windows.into_iter().enumerate() {
        let window_start = i as u64 * blocklen;
        let block_newlen = if i + 1 < nsegs { blocklen } else { new_len - window_start };
        log::debug!("bsdiffsx: building segment {i} ({block_newlen} bytes)");
        segments.push(build_segment(&segs, new, old, window_start, block_newlen)?);
    }

    let mut segtab_plain = Vec::with_capacity(nsegs * format::SEGMENT_TABLE_ENTRY_LEN);
    for s in &segments {
        let entry = SegmentTableEntry { ostart: BeU64::new(s.ostart), olen: BeU32::new(s.olen), plen: BeU32::new(0) };
        segtab_plain.extend_from_slice(entry.as_bytes());
    }
    // Patch length per segment (mini header + 3 streams); fill in plen now
    // that every segment has been built.
    for (i, s) in segments.iter().enumerate() {
        let plen = (format::SEGMENT_MINI_HEADER_LEN + s.ctrl.len() + s.diff.len() + s.extra.len()) as u32;
        let off = i * format::SEGMENT_TABLE_ENTRY_LEN + 12;
        segtab_plain[off..off + 4].copy_from_slice(&plen.to_be_bytes());
    }
    let segtab_enc = bzip2_compress(&segtab_plain)?;

    let patch_data_len: u64 =
        segments.iter().map(|s| (format::SEGMENT_MINI_HEADER_LEN + s.ctrl.len() + s.diff.len() + s.extra.len()) as u64).sum();

    let header = BsdiffSxHeader {
        magic: BSDIFFSX_MAGIC,
        new_size: BeU64::new(new_len),
        blocklen: BeU32::new(blocklen as u32),
        segtab_enc_len: BeU32::new(segtab_enc.len() as u32),
        patch_data_len: BeU64::new(patch_data_len),
    };
    out.write_all(header.as_bytes())?;
    out.write_all(&segtab_enc)?;

    for s in &segments {
        out.write_all(&s.mini_header)?;
        out.write_all(&s.ctrl)?;
        out.write_all(&s.diff)?;
        out.write_all(&s.extra)?;
    }

    Ok(())
}
