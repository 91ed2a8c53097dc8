//! The venue beacon payload (ID `0x30`).
//!
//! Fixed installations (doorway beacons, room beacons) advertise a 32-bit venue code instead of
//! a personal identifier, optionally followed by extended-data sections describing the venue.

use super::{extended::ExtendedData, Envelope, PayloadSupplier, BEACON_PAYLOAD_ID};
use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::time::Timestamp;
use crate::Error;

/// A parsed venue beacon payload.
#[derive(Debug, PartialEq, Eq)]
pub struct BeaconPayload<'a> {
    pub country: u16,
    pub state: u16,
    /// The venue code registered with the issuing authority.
    pub code: u32,
    /// Raw extended-data block; walk it with [`extended::sections`].
    ///
    /// [`extended::sections`]: ../extended/fn.sections.html
    pub extended: &'a [u8],
}

/// Parses a venue beacon payload from a complete payload read.
pub fn parse(bytes: &[u8]) -> Result<BeaconPayload<'_>, Error> {
    let mut reader = ByteReader::new(bytes);
    let envelope: &Envelope = FromBytes::from_bytes(&mut reader)?;
    if envelope.version() != BEACON_PAYLOAD_ID {
        return Err(Error::InvalidValue);
    }
    Ok(BeaconPayload {
        country: envelope.country(),
        state: envelope.state(),
        code: reader.read_u32_le()?,
        extended: reader.read_rest(),
    })
}

/// Supplies a constant venue beacon payload.
pub struct BeaconPayloadSupplier<const EXT_CAP: usize> {
    country: u16,
    state: u16,
    code: u32,
    extended: ExtendedData<EXT_CAP>,
}

impl<const EXT_CAP: usize> BeaconPayloadSupplier<EXT_CAP> {
    pub fn new(country: u16, state: u16, code: u32, extended: ExtendedData<EXT_CAP>) -> Self {
        BeaconPayloadSupplier {
            country,
            state,
            code,
            extended,
        }
    }
}

impl<const EXT_CAP: usize> PayloadSupplier for BeaconPayloadSupplier<EXT_CAP> {
    fn payload(&mut self, _now: Timestamp, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        Envelope::new(BEACON_PAYLOAD_ID, self.country, self.state).to_bytes(writer)?;
        writer.write_u32_le(self.code)?;
        self.extended.to_bytes(writer)
    }
}
