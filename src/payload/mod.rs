//! The Herald payload codec.
//!
//! Every Herald identity payload starts with the same packed 5-byte [`Envelope`] whose first
//! byte identifies the concrete format:
//!
//! | ID | Format | Module |
//! |----|--------|--------|
//! | `0x08` | Fixed identity (country, state, 64-bit client id) | [`fixed`] |
//! | `0x10` | Rotating contact identifier derived from a secret key | [`simple`] |
//! | `0x30` | Venue beacon (country, state, 32-bit venue code) | [`beacon`] |
//! | `0x91` | Legacy ABTT/OpenTrace envelope | [`abtt`] |
//!
//! Suppliers encode the local identity into a caller-provided [`ByteWriter`]; parsers borrow
//! from the received bytes. [`parse`] dispatches on the ID byte and is what payload consumers
//! (the `did_read` delegate path) typically call.
//!
//! [`Envelope`]: struct.Envelope.html
//! [`ByteWriter`]: ../bytes/struct.ByteWriter.html
//! [`parse`]: fn.parse.html

pub mod abtt;
pub mod beacon;
pub mod extended;
pub mod fixed;
pub mod simple;

use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::time::Timestamp;
use crate::Error;
use byteorder::LittleEndian;
use zerocopy::byteorder::U16;

/// Payload ID of the fixed identity format.
pub const FIXED_PAYLOAD_ID: u8 = 0x08;
/// Payload ID of the rotating ("simple") identity format.
pub const SIMPLE_PAYLOAD_ID: u8 = 0x10;
/// Payload ID of the venue beacon format.
pub const BEACON_PAYLOAD_ID: u8 = 0x30;
/// Payload ID of the legacy ABTT format.
pub const ABTT_PAYLOAD_ID: u8 = 0x91;

/// The packed header shared by all Herald payload formats.
///
/// Wire layout: 1 byte protocol version (doubling as the payload ID), 2 bytes country code and
/// 2 bytes state code, both little-endian. 5 bytes total.
#[derive(zerocopy::FromBytes, zerocopy::AsBytes, zerocopy::Unaligned)]
#[repr(C)]
pub struct Envelope {
    version: u8,
    country: U16<LittleEndian>,
    state: U16<LittleEndian>,
}

impl Envelope {
    /// Creates an envelope with the given payload ID and region codes.
    pub fn new(version: u8, country: u16, state: u16) -> Self {
        Envelope {
            version,
            country: U16::new(country),
            state: U16::new(state),
        }
    }

    /// The payload ID / protocol version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// ISO-3166 country code of the issuing authority.
    pub fn country(&self) -> u16 {
        self.country.get()
    }

    /// State code within the country.
    pub fn state(&self) -> u16 {
        self.state.get()
    }
}

impl ToBytes for Envelope {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_obj(self)
    }
}

impl<'a> FromBytes<'a> for &'a Envelope {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        bytes.read_obj()
    }
}

/// Supplies the local identity payload.
///
/// Implementations are owned by the platform glue and invoked whenever the advertised payload
/// needs (re)generating: at startup, and on every rotation timer tick for rotating formats.
pub trait PayloadSupplier {
    /// Encodes the payload valid at `now` into `writer`.
    fn payload(&mut self, now: Timestamp, writer: &mut ByteWriter<'_>) -> Result<(), Error>;
}

/// A Herald payload, parsed.
#[derive(Debug)]
pub enum ParsedPayload<'a> {
    Fixed(fixed::FixedPayload),
    Simple(simple::SimplePayload<'a>),
    Beacon(beacon::BeaconPayload<'a>),
    Abtt(abtt::AbttPayload<'a>),
}

/// Parses any supported Herald payload, dispatching on the leading ID byte.
pub fn parse(bytes: &[u8]) -> Result<ParsedPayload<'_>, Error> {
    match bytes.first() {
        Some(&FIXED_PAYLOAD_ID) => fixed::parse(bytes).map(ParsedPayload::Fixed),
        Some(&SIMPLE_PAYLOAD_ID) => simple::parse(bytes).map(ParsedPayload::Simple),
        Some(&BEACON_PAYLOAD_ID) => beacon::parse(bytes).map(ParsedPayload::Beacon),
        Some(&ABTT_PAYLOAD_ID) => abtt::parse(bytes).map(ParsedPayload::Abtt),
        Some(_) => Err(Error::InvalidValue),
        None => Err(Error::Eof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::new(FIXED_PAYLOAD_ID, 0x0102, 0x0003);
        let mut buf = [0; 5];
        env.to_bytes(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x08, 0x02, 0x01, 0x03, 0x00]);

        let mut reader = ByteReader::new(&buf);
        let decoded: &Envelope = FromBytes::from_bytes(&mut reader).unwrap();
        assert_eq!(decoded.version(), FIXED_PAYLOAD_ID);
        assert_eq!(decoded.country(), 0x0102);
        assert_eq!(decoded.state(), 0x0003);
        assert!(reader.is_empty());
    }

    #[test]
    fn dispatch_unknown_id() {
        assert_eq!(parse(&[0x55, 0, 0, 0, 0]).err(), Some(Error::InvalidValue));
        assert_eq!(parse(&[]).err(), Some(Error::Eof));
    }
}
