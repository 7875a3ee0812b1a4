//! Little endian readers and writers over fixed size wire buffers

use core::{
    fmt::Debug,
    ops::{Range, RangeInclusive},
};

use alloc::string::String;
use bit_field::BitField;
use log::warn;

use crate::WireError;

/// Options controlling how strictly wire structures are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject structures whose reserved bytes are not zero.
    ///
    /// If this is `false` non-zero reserved bytes are logged and ignored.
    pub strict_reserved: bool,
}

impl DecodeOptions {
    /// Reject non-zero reserved bytes with [WireError::MalformedReserved]
    pub const STRICT: DecodeOptions = DecodeOptions {
        strict_reserved: true,
    };

    /// Ignore the content of reserved bytes
    pub const LENIENT: DecodeOptions = DecodeOptions {
        strict_reserved: false,
    };
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict_reserved: cfg!(feature = "strict-reserved"),
        }
    }
}

/// Reads little endian values from a buffer of a known size.
///
/// All offsets are relative to the start of the buffer. The length of the buffer
/// is checked once on creation, so offsets within the structure size never panic.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    options: DecodeOptions,
    /// offset of `buf` within the enclosing structure, used for error reporting
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8], size: usize, options: DecodeOptions) -> Result<Self, WireError> {
        WireError::check_len(size, buf.len())?;
        Ok(Self {
            buf,
            options,
            base: 0,
        })
    }

    /// A reader for a sub structure of `self`
    pub fn sub(&self, range: Range<usize>) -> Reader<'a> {
        Reader {
            buf: &self.buf[range.clone()],
            options: self.options,
            base: self.base + range.start,
        }
    }

    pub fn u8(&self, offset: usize) -> u8 {
        self.buf[offset]
    }

    pub fn u16(&self, offset: usize) -> u16 {
        u16::from_le_bytes(self.array(offset))
    }

    pub fn u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.array(offset))
    }

    pub fn u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.array(offset))
    }

    pub fn le128(&self, offset: usize) -> Le128 {
        Le128(self.array(offset))
    }

    pub fn array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[offset..offset + N]);
        out
    }

    pub fn slice(&self, range: Range<usize>) -> &'a [u8] {
        &self.buf[range]
    }

    /// Check that the bytes in `range` are zero.
    pub fn reserved(&self, range: Range<usize>) -> Result<(), WireError> {
        let Some(pos) = self.buf[range.clone()].iter().position(|b| *b != 0) else {
            return Ok(());
        };
        self.reject_reserved(range.start + pos)
    }

    /// Check that `bits` of the dword at `offset` are zero.
    pub fn reserved_bits(&self, offset: usize, bits: RangeInclusive<usize>) -> Result<(), WireError> {
        let value = self.u32(offset).get_bits(bits.clone());
        if value == 0 {
            return Ok(());
        }
        let bit = *bits.start() + value.trailing_zeros() as usize;
        self.reject_reserved(offset + bit / 8)
    }

    fn reject_reserved(&self, offset: usize) -> Result<(), WireError> {
        let offset = self.base + offset;
        if self.options.strict_reserved {
            return Err(WireError::MalformedReserved { offset });
        }
        warn!("ignoring non-zero reserved bits at offset {offset:#x}");
        Ok(())
    }

    /// Read a space padded ascii string.
    ///
    /// Trailing spaces and NUL bytes are removed, embedded spaces are kept.
    pub fn ascii(&self, range: Range<usize>, field: &'static str) -> Result<String, WireError> {
        let bytes = trim_padding(&self.buf[range]);
        if !bytes.is_ascii() {
            return Err(WireError::InvalidString { field });
        }
        Ok(bytes.iter().map(|b| *b as char).collect())
    }
}

/// Strip trailing space and NUL padding from a fixed width string field
pub(crate) fn trim_padding(bytes: &[u8]) -> &[u8] {
    let len = bytes
        .iter()
        .rposition(|b| *b != b' ' && *b != 0)
        .map_or(0, |p| p + 1);
    &bytes[..len]
}

/// Writes little endian values into a zero initialized buffer.
///
/// Bytes that are never written stay zero, which covers all reserved fields.
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }

    pub fn sub(&mut self, range: Range<usize>) -> Writer<'_> {
        Writer {
            buf: &mut self.buf[range],
        }
    }

    pub fn u8(&mut self, offset: usize, value: u8) {
        self.buf[offset] = value;
    }

    pub fn u16(&mut self, offset: usize, value: u16) {
        self.bytes(offset, &value.to_le_bytes());
    }

    pub fn u32(&mut self, offset: usize, value: u32) {
        self.bytes(offset, &value.to_le_bytes());
    }

    pub fn u64(&mut self, offset: usize, value: u64) {
        self.bytes(offset, &value.to_le_bytes());
    }

    pub fn bytes(&mut self, offset: usize, value: &[u8]) {
        self.buf[offset..offset + value.len()].copy_from_slice(value);
    }

    /// Write `value` into `range`, filling the rest of the range with `pad`
    pub fn padded(&mut self, range: Range<usize>, value: &[u8], pad: u8) {
        let field = &mut self.buf[range];
        field.fill(pad);
        field[..value.len()].copy_from_slice(value);
    }
}

/// A 128 bit little endian counter, as used by capacity and smart log fields
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Le128(pub [u8; 16]);

impl Le128 {
    /// The counter as a native integer
    pub fn get(self) -> u128 {
        u128::from_le_bytes(self.0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == [0; 16]
    }
}

impl From<u128> for Le128 {
    fn from(value: u128) -> Self {
        Self(value.to_le_bytes())
    }
}

impl Debug for Le128 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Le128({})", self.get())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trims_trailing_padding_only() {
        assert_eq!(b"Some Model", trim_padding(b"Some Model      "));
        assert_eq!(b"  lead", trim_padding(b"  lead\0\0"));
        assert_eq!(b"", trim_padding(b"        "));
    }

    #[test]
    fn reserved_bytes_in_strict_mode() {
        let buf = [0u8, 0, 1, 0];
        let reader = Reader::new(&buf, 4, DecodeOptions::STRICT).unwrap();
        assert_eq!(Ok(()), reader.reserved(0..2));
        assert_eq!(
            Err(WireError::MalformedReserved { offset: 2 }),
            reader.reserved(0..4)
        );

        let lenient = Reader::new(&buf, 4, DecodeOptions::LENIENT).unwrap();
        assert_eq!(Ok(()), lenient.reserved(0..4));
    }

    #[test]
    fn reserved_bits_within_dword() {
        let buf = 0x0010_0007u32.to_le_bytes();
        let reader = Reader::new(&buf, 4, DecodeOptions::STRICT).unwrap();
        assert_eq!(Ok(()), reader.reserved_bits(0, 3..=19));
        assert_eq!(Ok(()), reader.reserved_bits(0, 21..=31));
        assert_eq!(
            Err(WireError::MalformedReserved { offset: 2 }),
            reader.reserved_bits(0, 3..=31)
        );

        let lenient = Reader::new(&buf, 4, DecodeOptions::LENIENT).unwrap();
        assert_eq!(Ok(()), lenient.reserved_bits(0, 3..=31));
    }

    #[test]
    fn sub_reader_reports_absolute_offsets() {
        let mut buf = [0u8; 8];
        buf[6] = 0xff;
        let reader = Reader::new(&buf, 8, DecodeOptions::STRICT).unwrap();
        let sub = reader.sub(4..8);
        assert_eq!(
            Err(WireError::MalformedReserved { offset: 6 }),
            sub.reserved(0..4)
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        let buf = [0u8; 63];
        assert_eq!(
            Some(WireError::LengthMismatch {
                expected: 64,
                actual: 63
            }),
            Reader::new(&buf, 64, DecodeOptions::default()).err()
        );
    }

    #[test]
    fn le128_is_little_endian() {
        let mut raw = [0u8; 16];
        raw[0] = 0x01;
        raw[15] = 0x80;
        assert_eq!((1u128 << 127) | 1, Le128(raw).get());
        assert_eq!(Le128(raw), Le128::from((1u128 << 127) | 1));
    }
}
