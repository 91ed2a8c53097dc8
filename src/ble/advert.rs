//! Assembly of the Herald advertisement.
//!
//! Advertising Data is a sequence of length-prefixed AD structures (`len:u8 | type:u8 |
//! data`). The Herald advertisement carries exactly three: the baseband flags, the
//! manufacturer-data segment with the 6-byte pseudo-address, and the complete 128-bit service
//! UUID list. Decoding of incoming advertisements lives in [`scanner`], which works on raw
//! segments rather than this enum.
//!
//! [`scanner`]: ../scanner/index.html

use super::{HERALD_MANUFACTURER_ID, HERALD_SERVICE_UUID};
use crate::addr::BleAddress;
use crate::bytes::{ByteWriter, ToBytes};
use crate::uuid::Uuid128;
use crate::Error;
use bitflags::bitflags;

bitflags! {
    /// BR/EDR and LE compatibility flags.
    ///
    /// This is mandatory for most devices and can only be omitted if all flags are 0.
    pub struct Flags: u8 {
        const LE_LIMITED_DISCOVERABLE = 0b00000001;
        const LE_GENERAL_DISCOVERABLE = 0b00000010;
        const BR_EDR_NOT_SUPPORTED    = 0b00000100;
        const SIMUL_LE_BR_CONTROLLER  = 0b00001000;
        const SIMUL_LE_BR_HOST        = 0b00010000;
    }
}

impl Flags {
    /// Returns flags suitable for discoverable devices that want to establish a connection.
    ///
    /// The created `Flags` value specifies that this device is not BR/EDR (classic Bluetooth)
    /// capable and is in General Discoverable mode.
    pub fn discoverable() -> Flags {
        Self::BR_EDR_NOT_SUPPORTED | Self::LE_GENERAL_DISCOVERABLE
    }

    /// Returns the raw representation of the flags.
    pub fn to_u8(self) -> u8 {
        self.bits()
    }
}

/// AD structure type constants used by this stack.
///
/// https://www.bluetooth.com/specifications/assigned-numbers/generic-access-profile
pub(crate) enum Type {}

impl Type {
    pub const FLAGS: u8 = 0x01;
    pub const INCOMPLETE_LIST_OF_128BIT_SERVICE_UUIDS: u8 = 0x06;
    pub const COMPLETE_LIST_OF_128BIT_SERVICE_UUIDS: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

/// An AD structure to be included in an outgoing advertisement.
#[derive(Debug, Copy, Clone)]
pub enum AdStructure<'a> {
    /// Device flags and baseband capabilities.
    Flags(Flags),

    /// Complete list of 128-bit service UUIDs.
    ServiceUuids128(&'a [Uuid128]),

    /// Manufacturer specific data: company identifier plus opaque payload.
    ManufacturerData {
        company_identifier: u16,
        payload: &'a [u8],
    },

    /// Radiated TX power, for path-loss estimation by observers.
    TxPowerLevel(i8),

    /// Sets the full (unabbreviated) device name.
    CompleteLocalName(&'a str),

    /// Sets the shortened device name.
    ShortenedLocalName(&'a str),
}

impl<'a> ToBytes for AdStructure<'a> {
    fn to_bytes(&self, buf: &mut ByteWriter<'_>) -> Result<(), Error> {
        // First byte = length of the record. Encoding starts at offset 1, the length is
        // backpatched afterwards.
        let first = match buf.split_next_mut() {
            None => return Err(Error::Eof),
            Some(s) => s,
        };

        let left_before = buf.space_left();
        match self {
            AdStructure::Flags(flags) => {
                buf.write_u8(Type::FLAGS)?;
                buf.write_u8(flags.to_u8())?;
            }
            AdStructure::ServiceUuids128(uuids) => {
                buf.write_u8(Type::COMPLETE_LIST_OF_128BIT_SERVICE_UUIDS)?;
                for uuid in *uuids {
                    uuid.to_bytes(buf)?;
                }
            }
            AdStructure::ManufacturerData {
                company_identifier,
                payload,
            } => {
                buf.write_u8(Type::MANUFACTURER_SPECIFIC_DATA)?;
                buf.write_u16_le(*company_identifier)?;
                buf.write_slice(payload)?;
            }
            AdStructure::TxPowerLevel(power) => {
                buf.write_u8(Type::TX_POWER_LEVEL)?;
                buf.write_u8(*power as u8)?;
            }
            AdStructure::CompleteLocalName(name) => {
                buf.write_u8(Type::COMPLETE_LOCAL_NAME)?;
                buf.write_slice(name.as_bytes())?;
            }
            AdStructure::ShortenedLocalName(name) => {
                buf.write_u8(Type::SHORTENED_LOCAL_NAME)?;
                buf.write_slice(name.as_bytes())?;
            }
        }
        let len = left_before - buf.space_left();
        if len > 255 {
            return Err(Error::InvalidLength);
        }

        *first = len as u8;
        Ok(())
    }
}

/// Encodes the Herald advertisement for the given pseudo-address into `buf`.
///
/// Layout: flags (BR/EDR off, LE General Discoverable), manufacturer data (Herald id plus the
/// pseudo-address), complete 128-bit UUID list with the Herald service. Returns the number of
/// bytes used.
pub fn herald_advertisement(pseudo: &BleAddress, buf: &mut [u8]) -> Result<usize, Error> {
    let total = buf.len();
    let mut writer = ByteWriter::new(buf);
    let structures = [
        AdStructure::Flags(Flags::discoverable()),
        AdStructure::ManufacturerData {
            company_identifier: HERALD_MANUFACTURER_ID,
            payload: pseudo.raw(),
        },
        AdStructure::ServiceUuids128(&[HERALD_SERVICE_UUID]),
    ];
    for structure in &structures {
        structure.to_bytes(&mut writer)?;
    }
    Ok(total - writer.space_left())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn herald_advertisement_layout() {
        let pseudo = BleAddress::new([1, 2, 3, 4, 5, 6]);
        let mut buf = [0; 31];
        let len = herald_advertisement(&pseudo, &mut buf).unwrap();
        // flags(3) + manufacturer(10) + uuids(18) fill a legacy advertisement completely.
        assert_eq!(len, 31);

        // Flags segment.
        assert_eq!(&buf[..3], &[2, Type::FLAGS, 0b0000_0110]);
        // Manufacturer segment: len 9, type 0xFF, id 0xFFFA little-endian, 6-byte pseudo.
        assert_eq!(&buf[3..13], &[9, 0xFF, 0xFA, 0xFF, 1, 2, 3, 4, 5, 6][..]);
        // UUID list segment: len 17, type 0x07, then the service UUID little-endian.
        assert_eq!(buf[13], 17);
        assert_eq!(buf[14], Type::COMPLETE_LIST_OF_128BIT_SERVICE_UUIDS);
        assert_eq!(buf[15], 0x9b);
        assert_eq!(buf[30], 0x42);
    }

    #[test]
    fn does_not_fit_in_tiny_buffer() {
        let pseudo = BleAddress::new([0; 6]);
        let mut buf = [0; 8];
        assert_eq!(herald_advertisement(&pseudo, &mut buf), Err(Error::Eof));
    }
}
