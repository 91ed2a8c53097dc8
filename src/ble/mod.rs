//! The BLE proximity engine: scan → connect → read pipeline, device database and radio
//! arbitration.
//!
//! The moving parts, bottom up:
//!
//! * [`arbiter`] pauses advertising and scanning around outgoing connections.
//! * [`scanner`] turns raw advertisement reports into [`ScanEvent`]s.
//! * [`table`] is the fixed-capacity device database, [`device`] the per-peer state machine.
//! * [`reader`] drives outgoing connections and accumulates payload reads.
//! * [`sensor`] ties everything together and feeds the [`delegate`] traits.
//!
//! The platform layer owns a [`BleSensor`] and calls into it from its scan callback, its GATT
//! read callbacks, its disconnection handler, and a couple of timers (expiry sweep, payload
//! rotation, poll tick). The sensor never blocks; anything that needs to wait (radio quiesce,
//! scanner restart) is a stored deadline serviced by [`BleSensor::poll`].
//!
//! [`BleSensor`]: struct.BleSensor.html
//! [`BleSensor::poll`]: struct.BleSensor.html#method.poll
//! [`ScanEvent`]: struct.ScanEvent.html

pub mod advert;
pub mod arbiter;
pub mod device;
pub mod delegate;
pub mod reader;
pub mod scanner;
pub mod sensor;
pub mod table;

pub use self::device::{Device, DeviceState, OsHint};
pub use self::reader::{BleReader, ChunkControl, PayloadMsg};
pub use self::scanner::ScanEvent;
pub use self::sensor::{BleSensor, ProximitySensor};
pub use self::table::DeviceTable;

use crate::uuid::Uuid128;
use core::fmt;

/// The Herald GATT service UUID, advertised in the complete 128-bit UUID list.
pub const HERALD_SERVICE_UUID: Uuid128 =
    Uuid128::parse_static("428132af-4746-42d3-801e-4572d65bfd9b");

/// The read-only payload characteristic within the Herald service.
pub const HERALD_PAYLOAD_UUID: Uuid128 =
    Uuid128::parse_static("3e98c0f8-8f05-4829-a121-43e38f8933e7");

/// The write-with-ack + indicate characteristic used for immediate send.
pub const HERALD_WRITE_UUID: Uuid128 =
    Uuid128::parse_static("f617b813-092e-437a-8324-e09a80821a11");

/// Manufacturer ID used by Herald peers without a registered company identifier.
pub const HERALD_MANUFACTURER_ID: u16 = 0xFFFA;

/// Apple's registered company identifier, used for OS inference.
pub const APPLE_MANUFACTURER_ID: u16 = 0x004C;

/// Failures of the payload read pipeline.
///
/// Exactly one of these (or a success) is reported per `read_payload` attempt; the device state
/// machine maps each kind onto a backoff family.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// A platform primitive failed outright; retried on the next scan without backoff.
    System,
    /// The connection could not be established or was lost mid-read.
    Connecting,
    /// GATT discovery did not complete.
    GattDiscovery,
    /// The peer does not offer the Herald service.
    HeraldServiceNotFound,
    /// The peer offers the service but not the payload characteristic.
    HeraldPayloadNotFound,
    /// The peer's payload does not fit the read buffer, or no buffer was available.
    PayloadTooBig,
}

impl ReadError {
    /// The numeric code used across the C implementations of the pipeline.
    pub fn code(&self) -> i8 {
        match self {
            ReadError::System => -1,
            ReadError::Connecting => -2,
            ReadError::GattDiscovery => -3,
            ReadError::HeraldServiceNotFound => -4,
            ReadError::HeraldPayloadNotFound => -5,
            ReadError::PayloadTooBig => -6,
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadError::System => "system error",
            ReadError::Connecting => "could not connect",
            ReadError::GattDiscovery => "GATT discovery failed",
            ReadError::HeraldServiceNotFound => "peer has no Herald service",
            ReadError::HeraldPayloadNotFound => "peer has no payload characteristic",
            ReadError::PayloadTooBig => "payload too big",
        })
    }
}
