//! The scan ingestor: turns raw advertisement reports into [`ScanEvent`]s.
//!
//! An advertisement report is `(mac, rssi, tlv_bytes)`. The TLV buffer is walked segment by
//! segment (1-byte length, 1-byte type, `length - 1` data bytes); a malformed or truncated
//! segment discards the remainder of the report, never the scan loop.
//!
//! From the segments the ingestor extracts the manufacturer-data blobs (Herald's unregistered
//! `0xFFFA` id and Apple's `0x004C` for OS inference), the advertised TX power, and the 128-bit
//! service UUID list. The Herald *pseudo-address* is the first 6 bytes of an 8-byte Herald
//! manufacturer blob; peers without one (legacy devices, Apple backgrounded apps) are keyed by
//! their MAC instead. Every observer derives the same pseudo-address from the same
//! advertisement, which is all the device table needs.
//!
//! [`ScanEvent`]: struct.ScanEvent.html

use super::device::OsHint;
use super::{APPLE_MANUFACTURER_ID, HERALD_MANUFACTURER_ID, HERALD_SERVICE_UUID};
use crate::addr::BleAddress;
use crate::bytes::{ByteReader, FromBytes};
use crate::uuid::Uuid128;

enum_with_unknown! {
    /// AD structure types understood by the ingestor.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum SegmentType(u8) {
        Flags = 0x01,
        IncompleteServiceUuids128 = 0x06,
        CompleteServiceUuids128 = 0x07,
        ShortenedLocalName = 0x08,
        CompleteLocalName = 0x09,
        TxPowerLevel = 0x0A,
        ManufacturerData = 0xFF
    }
}

/// One advertisement segment, borrowing the report bytes.
#[derive(Debug, Copy, Clone)]
pub struct Segment<'a> {
    pub ty: SegmentType,
    pub data: &'a [u8],
}

/// Iterator over the segments of an advertisement report.
///
/// Stops at the first malformed segment, discarding the rest of the report.
pub struct Segments<'a> {
    reader: ByteReader<'a>,
}

/// Returns an iterator over the advertisement segments in `data`.
pub fn segments(data: &[u8]) -> Segments<'_> {
    Segments {
        reader: ByteReader::new(data),
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.is_empty() {
            return None;
        }
        let len = self.reader.read_u8().ok()?;
        if len == 0 {
            // Must be at least 1 for the type; drop the remainder.
            self.reader.read_rest();
            return None;
        }
        let mut segment = match self.reader.split_off(usize::from(len)) {
            Ok(segment) => segment,
            Err(_) => {
                // Truncated segment; drop the remainder.
                self.reader.read_rest();
                return None;
            }
        };
        let ty = SegmentType::from(segment.read_u8().ok()?);
        Some(Segment {
            ty,
            data: segment.read_rest(),
        })
    }
}

/// Extracts the advertised local name (complete preferred over shortened).
pub fn local_name(data: &[u8]) -> Option<&str> {
    let mut shortened = None;
    for segment in segments(data) {
        match segment.ty {
            SegmentType::CompleteLocalName => return core::str::from_utf8(segment.data).ok(),
            SegmentType::ShortenedLocalName => {
                shortened = core::str::from_utf8(segment.data).ok()
            }
            _ => {}
        }
    }
    shortened
}

/// A digested advertisement report, as queued for the scan-processing task.
#[derive(Debug, Copy, Clone)]
pub struct ScanEvent {
    /// The physical address the radio has to connect to.
    pub mac: BleAddress,
    /// The identity the device table is keyed by.
    pub pseudo: BleAddress,
    pub rssi: i8,
    /// Whether the advertisement suggests the peer may speak Herald. Peers that definitely do
    /// not are measured but never connected to.
    pub might_be_herald: bool,
    pub tx_power: Option<i8>,
    pub os: OsHint,
}

/// Digests one advertisement report.
pub fn ingest(mac: BleAddress, rssi: i8, data: &[u8]) -> ScanEvent {
    let mut pseudo = mac;
    let mut herald_manufacturer = false;
    let mut apple_manufacturer = false;
    let mut herald_service = false;
    let mut tx_power = None;

    for segment in segments(data) {
        match segment.ty {
            SegmentType::ManufacturerData => {
                if segment.data.len() < 2 {
                    continue;
                }
                let id = u16::from_le_bytes([segment.data[0], segment.data[1]]);
                match id {
                    HERALD_MANUFACTURER_ID => {
                        herald_manufacturer = true;
                        // The Herald blob is the 2-byte id plus the 6-byte address; its first
                        // 6 bytes form the pseudo-address.
                        if segment.data.len() == 8 {
                            let mut bytes = [0; 6];
                            bytes.copy_from_slice(&segment.data[..6]);
                            pseudo = BleAddress::new(bytes);
                        }
                    }
                    APPLE_MANUFACTURER_ID => apple_manufacturer = true,
                    _ => {}
                }
            }
            SegmentType::TxPowerLevel => {
                if let Some(&power) = segment.data.first() {
                    tx_power = Some(power as i8);
                }
            }
            SegmentType::CompleteServiceUuids128 | SegmentType::IncompleteServiceUuids128 => {
                let mut reader = ByteReader::new(segment.data);
                while let Ok(uuid) = <Uuid128 as FromBytes<'_>>::from_bytes(&mut reader) {
                    if uuid == HERALD_SERVICE_UUID {
                        herald_service = true;
                    }
                }
            }
            _ => {}
        }
    }

    let os = if apple_manufacturer {
        OsHint::Apple
    } else if herald_manufacturer {
        OsHint::Android
    } else {
        OsHint::Unknown
    };

    ScanEvent {
        mac,
        pseudo,
        rssi,
        // Apple peers may be Herald apps backgrounded into the overflow area, so they stay
        // candidates even without the service UUID in the clear.
        might_be_herald: herald_manufacturer || herald_service || apple_manufacturer,
        tx_power,
        os,
    }
}
