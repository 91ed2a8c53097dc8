//! Hardware interfaces the platform layer must provide.
//!
//! The core never talks to a radio directly. The platform (a Zephyr port, a SoftDevice wrapper,
//! a host test harness) implements these traits once per supported stack and hands the
//! implementations to [`ble::BleSensor`]. Data flowing *out of* the radio (scan reports, payload
//! chunks, disconnections) is pushed into the core by the platform calling the corresponding
//! `BleSensor`/`BleReader` methods, so no callback registration with `void*` user pointers is
//! needed here.
//!
//! [`ble::BleSensor`]: ../ble/struct.BleSensor.html

use crate::addr::BleAddress;
use core::fmt;

/// Error from a platform radio primitive.
///
/// Wraps the driver's native error code; the core only distinguishes success from failure and
/// logs the code.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct HalError(pub i32);

impl fmt::Debug for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HalError({})", self.0)
    }
}

/// Controls the local advertiser.
///
/// The advertisement contents (flags, manufacturer data with the pseudo-address, the Herald
/// service UUID) are assembled by the core; the platform only turns broadcasting on and off.
pub trait Advertiser {
    /// Starts advertising.
    fn start(&mut self) -> Result<(), HalError>;

    /// Stops advertising.
    fn stop(&mut self) -> Result<(), HalError>;
}

/// Controls the scanner.
///
/// While scanning, the platform delivers each filtered advertisement report to
/// [`BleSensor::on_advert`].
///
/// [`BleSensor::on_advert`]: ../ble/struct.BleSensor.html#method.on_advert
pub trait Scanner {
    /// Starts scanning in passive mode.
    fn start(&mut self) -> Result<(), HalError>;

    /// Stops scanning.
    fn stop(&mut self) -> Result<(), HalError>;
}

/// Drives outgoing central-role connections.
///
/// `connect` begins the connect → discover → read sequence for the Herald payload
/// characteristic. The platform reports progress by calling [`BleReader::on_payload`] with data
/// chunks or a failure status, and [`BleReader::on_disconnected`] exactly once when the
/// connection is over (naturally or after a fatal error).
///
/// [`BleReader::on_payload`]: ../ble/struct.BleReader.html#method.on_payload
/// [`BleReader::on_disconnected`]: ../ble/struct.BleReader.html#method.on_disconnected
pub trait Central {
    /// Initiates a connection to `mac` and the subsequent payload read.
    fn connect(&mut self, mac: BleAddress) -> Result<(), HalError>;

    /// Tears down the connection to `mac`.
    ///
    /// The disconnection callback still fires afterwards; this only requests termination.
    fn disconnect(&mut self, mac: BleAddress) -> Result<(), HalError>;
}

/// The local Herald GATT service.
///
/// The platform registers the service and its characteristics with the host stack at init; the
/// core only pushes fresh payload bytes whenever the rotating identifier changes. Reads of the
/// payload characteristic are served by the platform from the last value set here. Writes from
/// peers (immediate-send data) are delivered to [`BleSensor::on_received`].
///
/// [`BleSensor::on_received`]: ../ble/struct.BleSensor.html#method.on_received
pub trait Transmitter {
    /// Replaces the payload served to reading peers.
    fn set_payload(&mut self, payload: &[u8]) -> Result<(), HalError>;
}
