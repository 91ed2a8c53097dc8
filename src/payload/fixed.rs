//! The fixed identity payload (ID `0x08`).
//!
//! 13 bytes on the wire: the 5-byte envelope followed by a little-endian 64-bit client
//! identifier. The identifier never changes, which makes this format suitable for wearables
//! handed out by a single authority, and unsuitable where tracking resistance matters.

use super::{Envelope, PayloadSupplier, FIXED_PAYLOAD_ID};
use crate::bytes::{ByteReader, ByteWriter, FromBytes, ToBytes};
use crate::time::Timestamp;
use crate::Error;

/// Total encoded size in bytes.
pub const FIXED_PAYLOAD_SIZE: usize = 13;

/// A parsed or to-be-encoded fixed payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FixedPayload {
    pub country: u16,
    pub state: u16,
    pub client_id: u64,
}

impl ToBytes for FixedPayload {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        Envelope::new(FIXED_PAYLOAD_ID, self.country, self.state).to_bytes(writer)?;
        writer.write_u64_le(self.client_id)
    }
}

impl FromBytes<'_> for FixedPayload {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        let envelope: &Envelope = FromBytes::from_bytes(bytes)?;
        if envelope.version() != FIXED_PAYLOAD_ID {
            return Err(Error::InvalidValue);
        }
        Ok(FixedPayload {
            country: envelope.country(),
            state: envelope.state(),
            client_id: bytes.read_u64_le()?,
        })
    }
}

/// Parses a fixed payload from a complete payload read.
pub fn parse(bytes: &[u8]) -> Result<FixedPayload, Error> {
    let mut reader = ByteReader::new(bytes);
    let payload = FixedPayload::from_bytes(&mut reader)?;
    if !reader.is_empty() {
        return Err(Error::IncompleteParse);
    }
    Ok(payload)
}

/// Supplies a constant fixed payload.
pub struct FixedPayloadSupplier {
    payload: FixedPayload,
}

impl FixedPayloadSupplier {
    pub fn new(country: u16, state: u16, client_id: u64) -> Self {
        FixedPayloadSupplier {
            payload: FixedPayload {
                country,
                state,
                client_id,
            },
        }
    }
}

impl PayloadSupplier for FixedPayloadSupplier {
    fn payload(&mut self, _now: Timestamp, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        self.payload.to_bytes(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let payload = FixedPayload {
            country: 0x0102,
            state: 0x0003,
            client_id: 0x0000_0000_DEAD_BEEF,
        };
        let mut buf = [0; FIXED_PAYLOAD_SIZE];
        payload.to_bytes(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(
            buf,
            [0x08, 0x02, 0x01, 0x03, 0x00, 0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(parse(&buf).unwrap(), payload);
    }

    #[test]
    fn rejects_wrong_id() {
        let mut buf = [0; FIXED_PAYLOAD_SIZE];
        FixedPayload {
            country: 1,
            state: 2,
            client_id: 3,
        }
        .to_bytes(&mut ByteWriter::new(&mut buf))
        .unwrap();
        buf[0] = 0x10;
        assert_eq!(parse(&buf).err(), Some(Error::InvalidValue));
    }

    #[test]
    fn rejects_truncation_and_trailing() {
        let mut buf = [0; FIXED_PAYLOAD_SIZE + 1];
        FixedPayload {
            country: 1,
            state: 2,
            client_id: 3,
        }
        .to_bytes(&mut ByteWriter::new(&mut buf))
        .unwrap();
        assert_eq!(
            parse(&buf[..FIXED_PAYLOAD_SIZE - 1]).err(),
            Some(Error::Eof)
        );
        assert_eq!(parse(&buf).err(), Some(Error::IncompleteParse));
    }

    #[test]
    fn supplier_is_constant() {
        let mut supplier = FixedPayloadSupplier::new(826, 3, 42);
        let mut a = [0; FIXED_PAYLOAD_SIZE];
        let mut b = [0; FIXED_PAYLOAD_SIZE];
        supplier
            .payload(Timestamp::from_secs(0), &mut ByteWriter::new(&mut a))
            .unwrap();
        supplier
            .payload(Timestamp::from_secs(86_400), &mut ByteWriter::new(&mut b))
            .unwrap();
        assert_eq!(a, b);
    }
}
