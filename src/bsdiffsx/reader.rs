//! Seekable (BSDIFFSX) patch reader: reads the segment table once, then
//! reconstructs any single window of the new file by decompressing only
//! that window's mini-patch block.

use super::BsdiffSxError;
use crate::format::{self, BsdiffSxHeader, SegmentMiniHeader, SegmentTableEntry, BSDIFFSX_MAGIC};
use bzip2::read::BzDecoder;
use std::io::{Cursor, Read};
use zerocopy::FromBytes;

/// A parsed BSDIFFSX patch: the outer header plus the (already
/// decompressed) segment table. Holds a borrow of the raw patch bytes so
/// [`Patch::read_segment`] can decompress a segment's streams on demand.
pub struct Patch<'a> {
    data: &'a [u8],
    new_size: u64,
    blocklen: u32,
    segments: Vec<SegmentTableEntry>,
    segments_start: usize,
}

impl<'a> Patch<'a> {
    /// Parse `data` as a BSDIFFSX patch, validating the header and
    /// decompressing the segment table.
    pub fn open(data: &'a [u8]) -> Result<Self, BsdiffSxError> {
        if data.len() < format::BSDIFFSX_HEADER_LEN {
            return Err(BsdiffSxError::Truncated);
        }
        let header = BsdiffSxHeader::read_from_bytes(&data[..format::BSDIFFSX_HEADER_LEN])
            .map_err(|_| BsdiffSxError::Truncated)?;
        if header.magic != BSDIFFSX_MAGIC {
            return Err(BsdiffSxError::BadMagic);
        }

        let new_size = header.new_size.get();
        let blocklen = header.blocklen.get();
        let segtab_enc_len = header.segtab_enc_len.get() as usize;
        let patch_data_len = header.patch_data_len.get();

        let expected_len = (format::BSDIFFSX_HEADER_LEN as u64)
            .checked_add(segtab_enc_len as u64)
            .and_then(|n| n.checked_add(patch_data_len))
            .ok_or(BsdiffSxError::Truncated)?;
        if data.len() as u64 != expected_len {
            return Err(BsdiffSxError::Truncated);
        }

        if blocklen == 0 {
            return Err(BsdiffSxError::ZeroBlockLen);
        }
        if new_size / (1 << 30) > blocklen as u64 {
            return Err(BsdiffSxError::TooManySegments);
        }

        let segtab_start = format::BSDIFFSX_HEADER_LEN;
        let segtab_end = segtab_start.checked_add(segtab_enc_len).ok_or(BsdiffSxError::Truncated)?;
        if segtab_end > data.len() {
            return Err(BsdiffSxError::Truncated);
        }

        let nsegs = ((new_size + blocklen as u64 - 1) / blocklen as u64) as usize;

        let mut segtab_plain = Vec::new();
        BzDecoder::new(&data[segtab_start..segtab_end]).read_to_end(&mut segtab_plain)?;
        if segtab_plain.len() != nsegs * format::SEGMENT_TABLE_ENTRY_LEN {
            return Err(BsdiffSxError::Truncated);
        }

        let mut segments = Vec::with_capacity(nsegs);
        let mut running_plen = 0u64;
        for i in 0..nsegs {
            let off = i * format::SEGMENT_TABLE_ENTRY_LEN;
            let entry =
                SegmentTableEntry::read_from_bytes(&segtab_plain[off..off + format::SEGMENT_TABLE_ENTRY_LEN])
                    .map_err(|_| BsdiffSxError::Truncated)?;
            if (entry.plen.get() as usize) < format::SEGMENT_MINI_HEADER_LEN {
                return Err(BsdiffSxError::Truncated);
            }
            running_plen += entry.plen.get() as u64;
            segments.push(entry);
        }
        if running_plen != patch_data_len {
            return Err(BsdiffSxError::Truncated);
        }

        Ok(Patch { data, new_size, blocklen, segments, segments_start: segtab_end })
    }

    pub fn new_size(&self) -> u64 {
        self.new_size
    }

    pub fn blocklen(&self) -> u32 {
        self.blocklen
    }

    pub fn nsegs(&self) -> usize {
        self.segments.len()
    }

    /// The `[ostart, ostart+olen)` range of `old` segment `i` may read from.
    pub fn segment_old_range(&self, i: usize) -> (u64, u32) {
        let e = &self.segments[i];
        (e.ostart.get(), e.olen.get())
    }

    fn segment_byte_range(&self, i: usize) -> Result<(usize, usize), BsdiffSxError> {
        let mut offset = self.segments_start;
        for e in &self.segments[..i] {
            offset = offset.checked_add(e.plen.get() as usize).ok_or(BsdiffSxError::Truncated)?;
        }
        let end = offset.checked_add(self.segments[i].plen.get() as usize).ok_or(BsdiffSxError::Truncated)?;
        if end > self.data.len() {
            return Err(BsdiffSxError::Truncated);
        }
        Ok((offset, end))
    }

    /// Reconstruct the bytes of the new file covered by segment `i`, given
    /// the slice of `old` that segment's table entry says it may touch.
    pub fn read_segment(&self, i: usize, old_window: &[u8]) -> Result<Vec<u8>, BsdiffSxError> {
        if i >= self.segments.len() {
            return Err(BsdiffSxError::SegmentOutOfRange(i));
        }
        let (_, olen) = self.segment_old_range(i);
        if old_window.len() != olen as usize {
            return Err(BsdiffSxError::OldWindowMismatch { expected: olen, actual: old_window.len() as u32 });
        }

        let block_newlen = if i + 1 < self.segments.len() {
            self.blocklen as u64
        } else {
            self.new_size - i as u64 * self.blocklen as u64
        };

        let (start, end) = self.segment_byte_range(i)?;
        let block = &self.data[start..end];
        if block.len() < format::SEGMENT_MINI_HEADER_LEN {
            return Err(BsdiffSxError::Truncated);
        }
        let mini = SegmentMiniHeader::read_from_bytes(&block[..format::SEGMENT_MINI_HEADER_LEN])
            .map_err(|_| BsdiffSxError::Truncated)?;

        let ctrl_start = format::SEGMENT_MINI_HEADER_LEN;
        let ctrl_end = ctrl_start.checked_add(mini.ctrl_enc_len.get() as usize).ok_or(BsdiffSxError::Truncated)?;
        let diff_end = ctrl_end.checked_add(mini.diff_enc_len.get() as usize).ok_or(BsdiffSxError::Truncated)?;
        let extra_end = diff_end.checked_add(mini.extra_enc_len.get() as usize).ok_or(BsdiffSxError::Truncated)?;
        if extra_end > block.len() {
            return Err(BsdiffSxError::Truncated);
        }

        let mut ctrl_plain = Vec::new();
        BzDecoder::new(&block[ctrl_start..ctrl_end]).read_to_end(&mut ctrl_plain)?;
        if ctrl_plain.len() != mini.ctrl_len.get() as usize {
            return Err(BsdiffSxError::Truncated);
        }
        let mut diff = Vec::new();
        BzDecoder::new(&block[ctrl_end..diff_end]).read_to_end(&mut diff)?;
        let mut extra = Vec::new();
        BzDecoder::new(&block[diff_end..extra_end]).read_to_end(&mut extra)?;

        decode_segment(&ctrl_plain, &diff, &extra, old_window, block_newlen)
    }
}

fn decode_segment(
    ctrl: &[u8],
    diff: &[u8],
    extra: &[u8],
    old: &[u8],
    block_newlen: u64,
) -> Result<Vec<u8>, BsdiffSxError> {
    if ctrl.len() % 12 != 0 {
        return Err(BsdiffSxError::Truncated);
    }

    let mut ctrl_cursor = Cursor::new(ctrl);
    let mut diff_pos = 0usize;
    let mut extra_pos = 0usize;
    let mut new = Vec::with_capacity(block_newlen as usize);
    let mut old_pos: i64 = 0;

    while (new.len() as u64) < block_newlen {
        if ctrl_cursor.position() as usize >= ctrl.len() {
            return Err(BsdiffSxError::ControlMismatch);
        }
        let seek_len = format::read_i32_sm_be(&mut ctrl_cursor)? as i64;
        let diff_len = read_u32_be(&mut ctrl_cursor)?;
        let extra_len = read_u32_be(&mut ctrl_cursor)?;

        old_pos += seek_len;
        for _ in 0..diff_len {
            if old_pos < 0 || old_pos as usize >= old.len() || diff_pos >= diff.len() {
                return Err(BsdiffSxError::Truncated);
            }
            new.push(old[old_pos as usize].wrapping_add(diff[diff_pos]));
            old_pos += 1;
            diff_pos += 1;
        }

        let extra_end = extra_pos.checked_add(extra_len as usize).ok_or(BsdiffSxError::Truncated)?;
        if extra_end > extra.len() {
            return Err(BsdiffSxError::Truncated);
        }
        new.extend_from_slice(&extra[extra_pos..extra_end]);
        extra_pos = extra_end;
    }

    if new.len() as u64 != block_newlen {
        return Err(BsdiffSxError::ControlMismatch);
    }
    Ok(new)
}

fn read_u32_be(cur: &mut Cursor<&[u8]>) -> Result<u32, BsdiffSxError> {
    let mut b = [0u8; 4];
    cur.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Reconstruct the whole new file by walking every segment in order. Real
/// callers of a seekable format would fetch single segments on demand; this
/// is provided for convenience and for testing full-file round trips.
pub fn apply_all(patch: &Patch, old: &[u8]) -> Result<Vec<u8>, BsdiffSxError> {
    let mut new = Vec::with_capacity(patch.new_size() as usize);
    for i in 0..patch.nsegs() {
        let (ostart, olen) = patch.segment_old_range(i);
        let window = &old[ostart as usize..(ostart + olen as u64) as usize];
        new.extend(patch.read_segment(i, window)?);
    }
    Ok(new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align;
    use crate::bsdiffsx::writer::write;

    fn roundtrip(old: &[u8], new: &[u8], blocklen: u32) -> Vec<u8> {
        let alignment = align(old, new).unwrap();
        let mut out = Vec::new();
        write(&alignment, new, old, blocklen, &mut out).unwrap();
        let patch = Patch::open(&out).unwrap();
        apply_all(&patch, old).unwrap()
    }

    #[test]
    fn single_window_roundtrip() {
        let old = b"the quick brown fox jumps over the lazy dog".to_vec();
        let new = old.clone();
        assert_eq!(roundtrip(&old, &new, 4096), new);
    }

    #[test]
    fn multi_window_roundtrip_with_edits() {
        let old = b"0123456789".repeat(50);
        let mut new = old.clone();
        new.splice(120..130, b"XXXXXXXXXXXXXXXXXXXX".iter().copied());
        new.truncate(new.len() - 15);
        assert_eq!(roundtrip(&old, &new, 64), new);
    }

    #[test]
    fn segments_can_be_read_independently() {
        let old = b"abcdefghijklmnopqrstuvwxyz".repeat(20);
        let mut new = old.clone();
        new.splice(200..205, b"ZZZZZ".iter().copied());

        let alignment = align(&old, &new).unwrap();
        let mut out = Vec::new();
        write(&alignment, &new, &old, 64, &mut out).unwrap();
        let patch = Patch::open(&out).unwrap();

        let mut reconstructed = Vec::new();
        for i in 0..patch.nsegs() {
            let (ostart, olen) = patch.segment_old_range(i);
            let window = &old[ostart as usize..(ostart + olen as u64) as usize];
            reconstructed.extend(patch.read_segment(i, window).unwrap());
        }
        assert_eq!(reconstructed, new);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![0u8; 64];
        bytes[0..8].copy_from_slice(b"NOTSXFMT");
        assert!(matches!(Patch::open(&bytes), Err(BsdiffSxError::BadMagic) | Err(BsdiffSxError::Truncated)));
    }
}
