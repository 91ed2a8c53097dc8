//! Parser for the legacy ABTT (BlueTrace/OpenTrace) payload (ID `0x91`).
//!
//! Wire layout after the 5-byte envelope: a little-endian payload length, a length-prefixed
//! TempID, then TLV extension blocks (`code:u8 | length:u8 | bytes`). Only the codes below are
//! understood; an unknown code terminates parsing with an error, since the remainder of the
//! block cannot be skipped reliably.
//!
//! This format is parse-only. Proxima never advertises it, but reads it from legacy peers that
//! share the Herald service UUID.

use super::{Envelope, ABTT_PAYLOAD_ID};
use crate::bytes::{ByteReader, FromBytes};
use crate::Error;

/// TLV code: RSSI observed by the peer, 1 byte.
const EXTENSION_RSSI: u8 = 0x40;
/// TLV code: TX power of the peer, 2 bytes little-endian.
const EXTENSION_TX_POWER: u8 = 0x41;
/// TLV code: peer device model, UTF-8 text.
const EXTENSION_MODEL: u8 = 0x42;

/// A parsed ABTT payload.
#[derive(Debug, PartialEq, Eq)]
pub struct AbttPayload<'a> {
    pub country: u16,
    pub state: u16,
    /// The opaque rotating TempID issued by the peer's backend.
    pub temp_id: &'a [u8],
    /// TX power from the 0x41 extension, if present.
    pub tx_power: Option<u16>,
    /// RSSI from the 0x40 extension, if present.
    pub rssi: Option<i8>,
    /// Device model text from the 0x42 extension, if present.
    pub model: Option<&'a str>,
}

/// Parses an ABTT payload from a complete payload read.
pub fn parse(bytes: &[u8]) -> Result<AbttPayload<'_>, Error> {
    let mut reader = ByteReader::new(bytes);
    let envelope: &Envelope = FromBytes::from_bytes(&mut reader)?;
    if envelope.version() != ABTT_PAYLOAD_ID {
        return Err(Error::InvalidValue);
    }

    let payload_len = usize::from(reader.read_u16_le()?);
    if payload_len > reader.bytes_left() {
        return Err(Error::InvalidLength);
    }
    // Trailing data beyond the declared length is tolerated (some peers pad); everything from
    // here on works on the declared window only.
    let mut payload = reader.split_off(payload_len)?;

    let temp_id_len = usize::from(payload.read_u16_le()?);
    let temp_id = payload.read_slice(temp_id_len)?;

    let mut parsed = AbttPayload {
        country: envelope.country(),
        state: envelope.state(),
        temp_id,
        tx_power: None,
        rssi: None,
        model: None,
    };

    while !payload.is_empty() {
        let code = payload.read_u8()?;
        let length = usize::from(payload.read_u8()?);
        let data = payload.read_slice(length)?;
        match code {
            EXTENSION_TX_POWER => {
                if data.len() != 2 {
                    return Err(Error::InvalidLength);
                }
                parsed.tx_power = Some(u16::from_le_bytes([data[0], data[1]]));
            }
            EXTENSION_RSSI => {
                if data.len() != 1 {
                    return Err(Error::InvalidLength);
                }
                parsed.rssi = Some(data[0] as i8);
            }
            EXTENSION_MODEL => {
                parsed.model =
                    Some(core::str::from_utf8(data).map_err(|_| Error::InvalidValue)?);
            }
            _ => return Err(Error::InvalidValue),
        }
    }

    Ok(parsed)
}
