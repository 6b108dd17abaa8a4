// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `DHEADER` (delimited, `APPENDABLE`) and `EMHEADER`+`NEXTINT`
//! (parameter-list, `MUTABLE`) framing. The interpreter (`crate::interp`)
//! calls these when it walks a `DLC`/`PLC` opcode.

use super::cursor::{Cursor, CursorMut};
use crate::error::RuntimeError;

/// Length-encoding class of an `EMHEADER`'s `NEXTINT` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCode {
    /// 1/2/4/8-byte primitive: length is implied by `_d`'s low bits, no
    /// `NEXTINT` word follows.
    Implied(u8),
    /// Explicit byte length follows as a 4-byte `NEXTINT`.
    NextInt,
}

/// Writes a `DHEADER` placeholder, runs `body`, then backpatches the
/// placeholder with the number of bytes `body` wrote (`APPENDABLE`
/// struct/union framing).
pub fn encode_delimited<E>(
    cursor: &mut CursorMut,
    body: impl FnOnce(&mut CursorMut) -> Result<(), E>,
) -> Result<(), E> {
    let header_at = cursor.offset();
    cursor.write_u32(0);
    let body_start = cursor.offset();
    body(cursor)?;
    let len = (cursor.offset() - body_start) as u32;
    cursor.patch_u32(header_at, len);
    Ok(())
}

/// Reads a `DHEADER` and returns the absolute end offset of its payload, so
/// the caller can skip straight past any trailing bytes it doesn't
/// recognise (forward-compatible `APPENDABLE` decode).
pub fn decode_delimited_header(cursor: &mut Cursor<'_>) -> Result<usize, RuntimeError> {
    let len = cursor.read_u32()? as usize;
    Ok(cursor.offset() + len)
}

/// Writes one `MUTABLE` struct/union member: `EMHEADER` (member id +
/// length code) then a `NEXTINT` length placeholder, backpatched once
/// `body` has run (mirrors `pl_cdr2.rs`'s `PlMemberEncoder`).
pub fn encode_member<E>(
    cursor: &mut CursorMut,
    member_id: u32,
    must_understand: bool,
    body: impl FnOnce(&mut CursorMut) -> Result<(), E>,
) -> Result<(), E> {
    let mu_bit = if must_understand { 1u32 << 31 } else { 0 };
    // LC=3 (NEXTINT follows) is always used here: every member's length is
    // written explicitly rather than inferred from `_d`, keeping the
    // encoder simple at the cost of 4 extra bytes per member.
    let lc = 3u32 << 28;
    cursor.write_u32(mu_bit | lc | (member_id & 0x0FFF_FFFF));
    let len_at = cursor.offset();
    cursor.write_u32(0);
    let body_start = cursor.offset();
    body(cursor)?;
    let len = (cursor.offset() - body_start) as u32;
    cursor.patch_u32(len_at, len);
    Ok(())
}

/// One decoded `EMHEADER`: the member id and the exclusive end offset of
/// its payload (for skip-unknown-member decode).
pub struct DecodedMember {
    pub member_id: u32,
    pub must_understand: bool,
    pub payload_end: usize,
}

pub fn decode_member_header(cursor: &mut Cursor<'_>) -> Result<DecodedMember, RuntimeError> {
    let word = cursor.read_u32()?;
    let must_understand = word & (1 << 31) != 0;
    let member_id = word & 0x0FFF_FFFF;
    let len = cursor.read_u32()? as usize;
    Ok(DecodedMember {
        member_id,
        must_understand,
        payload_end: cursor.offset() + len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_header_roundtrips_body_length() {
        let mut w = CursorMut::new();
        encode_delimited::<()>(&mut w, |c| {
            c.write_u32(1);
            c.write_u32(2);
            Ok(())
        })
        .unwrap();
        let bytes = w.into_bytes();
        let mut r = Cursor::new(&bytes);
        let end = decode_delimited_header(&mut r).unwrap();
        assert_eq!(end, bytes.len());
    }

    #[test]
    fn member_header_roundtrips_id_and_length() {
        let mut w = CursorMut::new();
        encode_member::<()>(&mut w, 7, true, |c| {
            c.write_u32(123);
            Ok(())
        })
        .unwrap();
        let bytes = w.into_bytes();
        let mut r = Cursor::new(&bytes);
        let m = decode_member_header(&mut r).unwrap();
        assert_eq!(m.member_id, 7);
        assert!(m.must_understand);
        assert_eq!(m.payload_end, bytes.len());
    }
}
