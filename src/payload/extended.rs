//! Extended-data TLV sections appended to rotating and beacon payloads.
//!
//! Each section is `code:u8 | length:u8 | bytes`. Venue metadata uses the codes below; other
//! codes are passed through to the consumer rather than rejected, since new section kinds are
//! added without a protocol version bump.

use crate::bytes::{ByteReader, ByteWriter, ToBytes};
use crate::Error;
use heapless::Vec;

/// Premises name, UTF-8 text.
pub const TEXT_PREMISES: u8 = 0x10;
/// Location name within the premises, UTF-8 text.
pub const TEXT_LOCATION: u8 = 0x11;
/// Area name within the location, UTF-8 text.
pub const TEXT_AREA: u8 = 0x12;
/// URL with further venue information.
pub const LOCATION_URL: u8 = 0x13;

/// Builder for the extended-data portion of an outgoing payload.
///
/// Sections are encoded eagerly into a fixed buffer of `CAP` bytes; adding a section that does
/// not fit fails with `Error::Eof` and leaves the buffer unchanged.
#[derive(Default)]
pub struct ExtendedData<const CAP: usize> {
    buf: Vec<u8, CAP>,
}

impl<const CAP: usize> ExtendedData<CAP> {
    pub fn new() -> Self {
        ExtendedData { buf: Vec::new() }
    }

    /// Returns `true` when no sections have been added.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The encoded sections, ready to be appended to a payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Appends a section carrying raw bytes.
    pub fn add_section(&mut self, code: u8, data: &[u8]) -> Result<(), Error> {
        if data.len() > usize::from(u8::max_value()) {
            return Err(Error::InvalidLength);
        }
        if self.buf.len() + 2 + data.len() > CAP {
            return Err(Error::Eof);
        }
        // Infallible from here on; the capacity check above covers all three pushes.
        self.buf.push(code).ok();
        self.buf.push(data.len() as u8).ok();
        self.buf.extend_from_slice(data).ok();
        Ok(())
    }

    /// Appends a section carrying a single byte.
    pub fn add_u8_section(&mut self, code: u8, value: u8) -> Result<(), Error> {
        self.add_section(code, &[value])
    }

    /// Appends a section carrying a little-endian `u16`.
    pub fn add_u16_section(&mut self, code: u8, value: u16) -> Result<(), Error> {
        self.add_section(code, &value.to_le_bytes())
    }

    /// Appends a section carrying UTF-8 text.
    pub fn add_text_section(&mut self, code: u8, value: &str) -> Result<(), Error> {
        self.add_section(code, value.as_bytes())
    }
}

impl<const CAP: usize> ToBytes for ExtendedData<CAP> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.buf)
    }
}

/// A single decoded extended-data section, borrowing the payload bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub code: u8,
    pub data: &'a [u8],
}

impl<'a> Section<'a> {
    /// Interprets the section data as UTF-8 text.
    pub fn as_text(&self) -> Result<&'a str, Error> {
        core::str::from_utf8(self.data).map_err(|_| Error::InvalidValue)
    }
}

/// Iterator over the sections of an extended-data block.
///
/// A truncated trailing section surfaces as an `Err` item and ends iteration.
pub struct Sections<'a> {
    reader: ByteReader<'a>,
}

/// Returns an iterator over the extended-data sections in `bytes`.
pub fn sections(bytes: &[u8]) -> Sections<'_> {
    Sections {
        reader: ByteReader::new(bytes),
    }
}

impl<'a> Iterator for Sections<'a> {
    type Item = Result<Section<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.is_empty() {
            return None;
        }
        let result = (|| {
            let code = self.reader.read_u8()?;
            let length = self.reader.read_u8()?;
            let data = self.reader.read_slice(usize::from(length))?;
            Ok(Section { code, data })
        })();
        if result.is_err() {
            // Stop after a malformed section; the rest of the block is unusable.
            self.reader.read_rest();
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_walk() {
        let mut ext: ExtendedData<64> = ExtendedData::new();
        ext.add_text_section(TEXT_PREMISES, "Cafe").unwrap();
        ext.add_u8_section(TEXT_AREA, 7).unwrap();
        assert!(!ext.is_empty());

        let mut iter = sections(ext.as_bytes());
        let premises = iter.next().unwrap().unwrap();
        assert_eq!(premises.code, TEXT_PREMISES);
        assert_eq!(premises.as_text().unwrap(), "Cafe");
        let area = iter.next().unwrap().unwrap();
        assert_eq!(area, Section { code: TEXT_AREA, data: &[7] });
        assert!(iter.next().is_none());
    }

    #[test]
    fn capacity_rejection_leaves_buffer_unchanged() {
        let mut ext: ExtendedData<8> = ExtendedData::new();
        ext.add_section(LOCATION_URL, &[0; 6]).unwrap();
        let before = ext.as_bytes().len();
        assert_eq!(ext.add_u8_section(TEXT_AREA, 1), Err(Error::Eof));
        assert_eq!(ext.as_bytes().len(), before);
    }

    #[test]
    fn truncated_section_ends_iteration() {
        // Claims 5 data bytes, provides 2.
        let bytes = [TEXT_LOCATION, 5, 0xAA, 0xBB];
        let mut iter = sections(&bytes);
        assert_eq!(iter.next(), Some(Err(Error::Eof)));
        assert!(iter.next().is_none());
    }
}
