//! Event delegates notified by the device table and the sensor.
//!
//! Delegates receive the pseudo-address and the changed value only, never a reference into the
//! table; anything further is looked up through the table by address. This keeps the table free
//! of long-lived back-pointers.

use super::device::{DeviceState, OsHint};
use crate::addr::BleAddress;

/// An observable device attribute change, passed to [`DatabaseDelegate::did_update`].
///
/// [`DatabaseDelegate::did_update`]: trait.DatabaseDelegate.html#method.did_update
#[derive(Debug, Copy, Clone)]
pub enum DeviceAttribute<'a> {
    State(DeviceState),
    Rssi(i8),
    TxPower(i8),
    Os(OsHint),
    PayloadData(&'a [u8]),
}

/// Observes mutations of the device table.
///
/// All methods default to doing nothing, so implementations only override what they care about.
pub trait DatabaseDelegate {
    /// A device was inserted for the first time.
    fn did_create(&mut self, _pseudo: &BleAddress) {}

    /// An attribute of a tracked device changed.
    fn did_update(&mut self, _pseudo: &BleAddress, _attribute: DeviceAttribute<'_>) {}

    /// A device was evicted by the expiry sweep.
    fn did_delete(&mut self, _pseudo: &BleAddress) {}
}

/// No-op delegate.
impl DatabaseDelegate for () {}

/// High-level sensor events, consumed by the exposure layer or the application.
pub trait SensorDelegate {
    /// A Herald-capable peer was detected for the first time.
    fn did_detect(&mut self, _pseudo: &BleAddress) {}

    /// A proximity measurement (RSSI) was taken. Fires for every scan report, including peers
    /// that never turn out to speak Herald.
    fn did_measure(&mut self, _pseudo: &BleAddress, _rssi: i8) {}

    /// A peer's identity payload was read successfully.
    fn did_read(&mut self, _pseudo: &BleAddress, _payload: &[u8]) {}

    /// A peer pushed immediate-send data to our write characteristic.
    fn did_receive(&mut self, _pseudo: &BleAddress, _data: &[u8]) {}

    /// A tracked peer was evicted after its TTL lapsed.
    fn did_delete(&mut self, _pseudo: &BleAddress) {}
}

/// No-op delegate.
impl SensorDelegate for () {}
