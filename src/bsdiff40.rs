//! The classical streaming BSDIFF40 patch format: a 32-byte header followed
//! by three independently bzip2-compressed streams (control tuples, diff
//! bytes, extra bytes). Every alignment is implicitly framed with anchor
//! entries at the start and end, so there are always `alignment.len() + 1`
//! control tuples.

use crate::align::AlignSeg;
use crate::format::{self, BSDIFF40_MAGIC};
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Bsdiff40Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("not a BSDIFF40 patch (bad magic)")]
    BadMagic,
    #[error("patch header declares a negative stream length")]
    NegativeLength,
    #[error("patch is truncated or its stream lengths don't add up")]
    Truncated,
    #[error("patch control stream doesn't cover the declared new file size")]
    ControlMismatch,
}

struct ControlTuple {
    diff_len: u64,
    extra_len: u64,
    seek_len: i64,
}

fn build_tuples(alignment: &[AlignSeg], new_len: u64) -> Vec<ControlTuple> {
    let mut tuples = Vec::with_capacity(alignment.len() + 1);
    let (mut prev_npos, mut prev_opos, mut prev_alen) = (0u64, 0u64, 0u64);

    for seg in alignment {
        let extra_len = seg.npos - (prev_npos + prev_alen);
        let seek_len = seg.opos as i64 - (prev_opos + prev_alen) as i64;
        tuples.push(ControlTuple { diff_len: prev_alen, extra_len, seek_len });
        prev_npos = seg.npos;
        prev_opos = seg.opos;
        prev_alen = seg.alen;
    }

    let extra_len = new_len - (prev_npos + prev_alen);
    tuples.push(ControlTuple { diff_len: prev_alen, extra_len, seek_len: 0 });
    tuples
}

/// Write a streaming BSDIFF40 patch for `alignment` (an alignment of `new`
/// against `old`) to `out`.
pub fn write(alignment: &[AlignSeg], new: &[u8], old: &[u8], out: &mut (impl Write + Seek)) -> Result<(), Bsdiff40Error> {
    let new_len = new.len() as u64;
    let tuples = build_tuples(alignment, new_len);

    let mut header = [0u8; 32];
    header[0..8].copy_from_slice(&BSDIFF40_MAGIC);
    out.write_all(&header)?;

    let ctrl_start = out.stream_position()?;
    {
        let mut enc = BzEncoder::new(ByteSink(&mut *out), Compression::best());
        for t in &tuples {
            format::write_i64_sm_le(&mut enc, t.diff_len as i64)?;
            format::write_i64_sm_le(&mut enc, t.extra_len as i64)?;
            format::write_i64_sm_le(&mut enc, t.seek_len)?;
        }
        enc.finish()?;
    }
    let ctrl_end = out.stream_position()?;

    log::debug!("bsdiff40: writing diff stream ({} segments)", alignment.len());
    {
        let mut enc = BzEncoder::new(ByteSink(&mut *out), Compression::best());
        for seg in alignment {
            let (npos, opos, alen) = (seg.npos as usize, seg.opos as usize, seg.alen as usize);
            let mut buf = vec![0u8; alen];
            for k in 0..alen {
                buf[k] = new[npos + k].wrapping_sub(old[opos + k]);
            }
            enc.write_all(&buf)?;
        }
        enc.finish()?;
    }
    let diff_end = out.stream_position()?;

    log::debug!("bsdiff40: writing extra stream");
    {
        let mut enc = BzEncoder::new(ByteSink(&mut *out), Compression::best());
        let mut npos = 0u64;
        for seg in alignment {
            enc.write_all(&new[npos as usize..seg.npos as usize])?;
            npos = seg.npos + seg.alen;
        }
        enc.write_all(&new[npos as usize..])?;
        enc.finish()?;
    }

    let mut field = Vec::with_capacity(8);
    format::write_i64_sm_le(&mut field, (ctrl_end - ctrl_start) as i64)?;
    header[8..16].copy_from_slice(&field);
    field.clear();
    format::write_i64_sm_le(&mut field, (diff_end - ctrl_end) as i64)?;
    header[16..24].copy_from_slice(&field);
    field.clear();
    format::write_i64_sm_le(&mut field, new_len as i64)?;
    header[24..32].copy_from_slice(&field);

    out.seek(SeekFrom::Start(0))?;
    out.write_all(&header)?;
    Ok(())
}

/// A `Write` wrapper so `BzEncoder` can write directly into the shared
/// output stream rather than an intermediate buffer, matching how the
/// original writer appends each bzip2 stream in place.
struct ByteSink<'a, W>(&'a mut W);

impl<'a, W: Write> Write for ByteSink<'a, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Apply a BSDIFF40 `patch` to `old`, returning the reconstructed new file.
pub fn apply(patch: &[u8], old: &[u8]) -> Result<Vec<u8>, Bsdiff40Error> {
    if patch.len() < 32 || patch[0..8] != BSDIFF40_MAGIC {
        return Err(Bsdiff40Error::BadMagic);
    }

    let ctrl_len = read_header_len(&patch[8..16])?;
    let diff_len = read_header_len(&patch[16..24])?;
    let new_size = read_header_len(&patch[24..32])?;

    let ctrl_start = 32usize;
    let ctrl_end = ctrl_start.checked_add(ctrl_len as usize).ok_or(Bsdiff40Error::Truncated)?;
    let diff_end = ctrl_end.checked_add(diff_len as usize).ok_or(Bsdiff40Error::Truncated)?;
    if diff_end > patch.len() {
        return Err(Bsdiff40Error::Truncated);
    }

    let mut ctrl = Vec::new();
    BzDecoder::new(&patch[ctrl_start..ctrl_end]).read_to_end(&mut ctrl)?;
    let mut diff = Vec::new();
    BzDecoder::new(&patch[ctrl_end..diff_end]).read_to_end(&mut diff)?;
    let mut extra = Vec::new();
    BzDecoder::new(&patch[diff_end..]).read_to_end(&mut extra)?;

    let mut ctrl_cursor = Cursor::new(ctrl);
    let mut diff_pos = 0usize;
    let mut extra_pos = 0usize;
    let mut new = Vec::with_capacity(new_size as usize);
    let mut old_pos: i64 = 0;

    while (new.len() as u64) < new_size {
        let diff_len = format::read_i64_sm_le(&mut ctrl_cursor)?;
        let extra_len = format::read_i64_sm_le(&mut ctrl_cursor)?;
        let seek_len = format::read_i64_sm_le(&mut ctrl_cursor)?;

        if diff_len < 0 || extra_len < 0 {
            return Err(Bsdiff40Error::NegativeLength);
        }

        for _ in 0..diff_len {
            if old_pos < 0 || old_pos as usize >= old.len() || diff_pos >= diff.len() {
                return Err(Bsdiff40Error::Truncated);
            }
            new.push(old[old_pos as usize].wrapping_add(diff[diff_pos]));
            old_pos += 1;
            diff_pos += 1;
        }

        let extra_end = extra_pos.checked_add(extra_len as usize).ok_or(Bsdiff40Error::Truncated)?;
        if extra_end > extra.len() {
            return Err(Bsdiff40Error::Truncated);
        }
        new.extend_from_slice(&extra[extra_pos..extra_end]);
        extra_pos = extra_end;

        old_pos += seek_len;
    }

    if new.len() as u64 != new_size {
        return Err(Bsdiff40Error::ControlMismatch);
    }
    Ok(new)
}

fn read_header_len(field: &[u8]) -> Result<u64, Bsdiff40Error> {
    let mut cur = field;
    let v = format::read_i64_sm_le(&mut cur)?;
    if v < 0 {
        return Err(Bsdiff40Error::NegativeLength);
    }
    Ok(v as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::align;
    use std::io::Cursor as IoCursor;

    fn roundtrip(old: &[u8], new: &[u8]) -> Vec<u8> {
        let alignment = align(old, new).unwrap();
        let mut patch = IoCursor::new(Vec::new());
        write(&alignment, new, old, &mut patch).unwrap();
        apply(patch.get_ref(), old).unwrap()
    }

    #[test]
    fn identity_patch() {
        let buf = b"the quick brown fox jumps over the lazy dog".to_vec();
        assert_eq!(roundtrip(&buf, &buf), buf);
    }

    #[test]
    fn pure_insertion() {
        let old = b"0123456789abcdefghijklmnopqrstuvwxyz".to_vec();
        let mut new = old.clone();
        new.splice(10..10, b"INSERTED-TEXT-HERE".iter().copied());
        assert_eq!(roundtrip(&old, &new), new);
    }

    #[test]
    fn pure_deletion() {
        let old = b"abcdefghijklmnopqrstuvwxyz0123456789".to_vec();
        let mut new = old.clone();
        new.splice(5..15, std::iter::empty());
        assert_eq!(roundtrip(&old, &new), new);
    }

    #[test]
    fn empty_new_file() {
        let old = b"something that used to exist".to_vec();
        let new: Vec<u8> = Vec::new();
        assert_eq!(roundtrip(&old, &new), new);
    }

    #[test]
    fn rejects_bad_magic() {
        let patch = vec![0u8; 32];
        assert!(matches!(apply(&patch, b"old"), Err(Bsdiff40Error::BadMagic)));
    }

    #[test]
    fn rejects_truncated_patch() {
        let old = b"abcdefghijklmnopqrstuvwxyz".to_vec();
        let new = b"abcdefghijklmnopqrstuvwxyZ".to_vec();
        let alignment = align(&old, &new).unwrap();
        let mut patch = IoCursor::new(Vec::new());
        write(&alignment, &new, &old, &mut patch).unwrap();
        let mut bytes = patch.into_inner();
        bytes.truncate(bytes.len() - 4);
        assert!(apply(&bytes, &old).is_err());
    }

    #[test]
    fn conformance_scenario_2_pure_insert_control_tuple() {
        // "ABCDEF" -> "ABCDXYZEF": two segments (0,0,4), (7,4,2); the
        // control stream should carry exactly one non-trivial tuple whose
        // extra_len >= 3 (the "XYZ" insertion).
        let old = b"ABCDEF".to_vec();
        let new = b"ABCDXYZEF".to_vec();
        let alignment = align(&old, &new).unwrap();
        let tuples = build_tuples(&alignment, new.len() as u64);
        assert_eq!(tuples.len(), alignment.len() + 1);
        assert!(tuples.iter().any(|t| t.extra_len >= 3));
    }

    #[test]
    fn conformance_scenario_3_pure_delete_control_tuple() {
        // "ABCDEFGH" -> "ABGH": two segments covering A..B and G..H, with
        // a seek of 4 between them.
        let old = b"ABCDEFGH".to_vec();
        let new = b"ABGH".to_vec();
        let alignment = align(&old, &new).unwrap();
        let tuples = build_tuples(&alignment, new.len() as u64);
        assert!(tuples.iter().any(|t| t.seek_len == 4));
    }
}
