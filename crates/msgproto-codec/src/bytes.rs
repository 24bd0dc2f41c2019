//! Little-endian byte buffer helpers.
//!
//! Every accessor is bounds-checked and reports `CodecError::OutOfBounds`
//! instead of panicking, so malformed frames surface as errors.

use std::ops::Range;

use crate::error::CodecError;

fn checked_range(len: usize, offset: usize, count: usize) -> Result<Range<usize>, CodecError> {
    offset
        .checked_add(count)
        .filter(|end| *end <= len)
        .map(|end| offset..end)
        .ok_or(CodecError::OutOfBounds { offset, count, len })
}

/// Copies `source` into `destination` starting at `offset`.
///
/// Empty sources are a no-op, even when `offset` is past the end.
pub fn write_bytes(source: &[u8], destination: &mut [u8], offset: usize) -> Result<(), CodecError> {
    if source.is_empty() {
        return Ok(());
    }
    let range = checked_range(destination.len(), offset, source.len())?;
    destination[range].copy_from_slice(source);
    Ok(())
}

/// Returns a copy of `source[offset..offset + count]`.
pub fn read_bytes(source: &[u8], offset: usize, count: usize) -> Result<Vec<u8>, CodecError> {
    let range = checked_range(source.len(), offset, count)?;
    Ok(source[range].to_vec())
}

/// Reads one byte as a signed 8-bit value widened to `i16` (RSSI fields).
pub fn read_signed_byte(source: &[u8], offset: usize) -> Result<i16, CodecError> {
    let range = checked_range(source.len(), offset, 1)?;
    Ok(i16::from(source[range.start] as i8))
}

/// Reads `width` bytes least-significant first. `width` must be at most 8.
pub fn read_lsb_number(source: &[u8], offset: usize, width: usize) -> Result<u64, CodecError> {
    if width > 8 {
        return Err(CodecError::InvalidField("lsb number width exceeds 8 bytes"));
    }
    let range = checked_range(source.len(), offset, width)?;
    let value = source[range]
        .iter()
        .enumerate()
        .fold(0_u64, |acc, (i, byte)| acc | (u64::from(*byte) << (i * 8)));
    Ok(value)
}

/// Writes `value` into `width` bytes least-significant first.
///
/// Fails with `ValueOverflow` rather than truncating when the value needs more
/// than `width` bytes. Nothing is written on failure.
pub fn write_lsb_number(
    value: u64,
    destination: &mut [u8],
    offset: usize,
    width: usize,
) -> Result<(), CodecError> {
    if width > 8 {
        return Err(CodecError::InvalidField("lsb number width exceeds 8 bytes"));
    }
    if width < 8 && value >> (width * 8) != 0 {
        return Err(CodecError::ValueOverflow { value, width });
    }
    let range = checked_range(destination.len(), offset, width)?;
    for (i, slot) in destination[range].iter_mut().enumerate() {
        *slot = (value >> (i * 8)) as u8;
    }
    Ok(())
}

pub fn read_lsb_u16(source: &[u8], offset: usize) -> Result<u16, CodecError> {
    read_lsb_number(source, offset, 2).map(|v| v as u16)
}

pub fn read_lsb_u32(source: &[u8], offset: usize) -> Result<u32, CodecError> {
    read_lsb_number(source, offset, 4).map(|v| v as u32)
}

pub fn write_lsb_u16(value: u16, destination: &mut [u8], offset: usize) -> Result<(), CodecError> {
    write_lsb_number(u64::from(value), destination, offset, 2)
}

pub fn write_lsb_u32(value: u32, destination: &mut [u8], offset: usize) -> Result<(), CodecError> {
    write_lsb_number(u64::from(value), destination, offset, 4)
}

/// Renders `count` bytes as uppercase hex pairs, joined by `delimiter` when
/// given (`AA:BB:CC:DD:EE:FF` for a BSSID with `Some(':')`).
pub fn read_delimited_hex(
    source: &[u8],
    offset: usize,
    count: usize,
    delimiter: Option<char>,
) -> Result<String, CodecError> {
    let range = checked_range(source.len(), offset, count)?;
    let pairs: Vec<String> = source[range]
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect();
    Ok(match delimiter {
        Some(d) => pairs.join(&d.to_string()),
        None => pairs.concat(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_bytes_copies_at_offset() {
        let mut dst = [0_u8; 6];
        write_bytes(&[1, 2, 3], &mut dst, 2).expect("write should fit");
        assert_eq!(dst, [0, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn write_bytes_with_empty_source_is_noop() {
        let mut dst = [7_u8; 2];
        write_bytes(&[], &mut dst, 10).expect("empty write is a no-op");
        assert_eq!(dst, [7, 7]);
    }

    #[test]
    fn write_bytes_rejects_overflow() {
        let mut dst = [0_u8; 4];
        let err = write_bytes(&[1, 2, 3], &mut dst, 2).expect_err("write past end must fail");
        assert_eq!(
            err,
            CodecError::OutOfBounds {
                offset: 2,
                count: 3,
                len: 4
            }
        );
        assert_eq!(dst, [0; 4]);
    }

    #[test]
    fn read_bytes_rejects_out_of_range() {
        let src = [1_u8, 2, 3];
        assert_eq!(read_bytes(&src, 1, 2).expect("in range"), vec![2, 3]);
        assert!(read_bytes(&src, 2, 2).is_err());
        assert!(read_bytes(&src, usize::MAX, 2).is_err());
    }

    #[test]
    fn signed_byte_maps_full_range() {
        let src = [0x80_u8, 0x00, 0x7F, 0xFF];
        assert_eq!(read_signed_byte(&src, 0).expect("byte 0"), -128);
        assert_eq!(read_signed_byte(&src, 1).expect("byte 1"), 0);
        assert_eq!(read_signed_byte(&src, 2).expect("byte 2"), 127);
        assert_eq!(read_signed_byte(&src, 3).expect("byte 3"), -1);
        assert!(read_signed_byte(&src, 4).is_err());
    }

    #[test]
    fn lsb_u16_boundaries_round_trip() {
        for value in [0_u16, 1, 0xFF, 0x100, 0xFFFF] {
            let mut buf = [0_u8; 3];
            write_lsb_u16(value, &mut buf, 1).expect("u16 fits");
            assert_eq!(read_lsb_u16(&buf, 1).expect("u16 read"), value);
        }
    }

    #[test]
    fn lsb_u32_boundaries_round_trip() {
        for value in [0_u32, 1, 0xFF, 0xFFFF, 0xFFFF_FFFF] {
            let mut buf = [0_u8; 4];
            write_lsb_u32(value, &mut buf, 0).expect("u32 fits");
            assert_eq!(read_lsb_u32(&buf, 0).expect("u32 read"), value);
        }
    }

    #[test]
    fn lsb_layout_is_least_significant_first() {
        let mut buf = [0_u8; 4];
        write_lsb_u32(0x1234_5678, &mut buf, 0).expect("u32 fits");
        assert_eq!(buf, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn write_lsb_number_detects_overflow() {
        let mut buf = [0_u8; 4];
        let err = write_lsb_number(0x1_0000, &mut buf, 0, 2).expect_err("17-bit value in 2 bytes");
        assert_eq!(
            err,
            CodecError::ValueOverflow {
                value: 0x1_0000,
                width: 2
            }
        );
        assert!(write_lsb_number(0x1_0000_0000, &mut buf, 0, 4).is_err());
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn delimited_hex_renders_bssid() {
        let src = [0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x0F, 0x99];
        assert_eq!(
            read_delimited_hex(&src, 1, 6, Some(':')).expect("bssid"),
            "AA:BB:CC:DD:EE:0F"
        );
        assert_eq!(
            read_delimited_hex(&src, 6, 2, None).expect("plain hex"),
            "0F99"
        );
    }
}
