//! Per-device state: the IDLE/CONNECTING state machine, read scheduling and retry backoff.

use super::ReadError;
use crate::config::Config;
use crate::time::{Duration, Timestamp};

/// Connection state of a tracked device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// No outgoing connection; eligible for a payload read once `next_read` passes.
    Idle,
    /// An outgoing payload read is in flight. The device holds exactly one connection slot.
    Connecting,
}

/// Best-effort guess at the peer's operating system, derived from its advertisement.
///
/// Herald on Android advertises the 0xFFFA manufacturer data in the clear; iOS cannot do that
/// from the background, so Apple peers are recognized by their company identifier instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OsHint {
    Unknown,
    Apple,
    Android,
}

/// All state kept for one tracked peer, keyed in the device table by pseudo-address.
#[derive(Debug, Copy, Clone)]
pub struct Device {
    created: Timestamp,
    last_scan: Timestamp,
    next_read: Timestamp,
    state: DeviceState,
    /// Consecutive failures of the herald-not-found family.
    herald_not_found: u8,
    /// Consecutive failures of the connection family.
    err_connecting: u8,
    rssi: Option<i8>,
    tx_power: Option<i8>,
    os: OsHint,
}

impl Device {
    /// Creates the record for a device first scanned at `now`.
    ///
    /// The device starts out idle and immediately eligible for a payload read.
    pub fn new(now: Timestamp) -> Self {
        Device {
            created: now,
            last_scan: now,
            next_read: now,
            state: DeviceState::Idle,
            herald_not_found: 0,
            err_connecting: 0,
            rssi: None,
            tx_power: None,
            os: OsHint::Unknown,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    pub fn last_scan(&self) -> Timestamp {
        self.last_scan
    }

    pub fn next_read(&self) -> Timestamp {
        self.next_read
    }

    pub fn rssi(&self) -> Option<i8> {
        self.rssi
    }

    pub fn tx_power(&self) -> Option<i8> {
        self.tx_power
    }

    pub fn os(&self) -> OsHint {
        self.os
    }

    /// Records a scan of this device, extending its lifetime.
    pub fn scanned(&mut self, now: Timestamp) {
        self.last_scan = now;
    }

    /// Records the most recent RSSI. Returns `true` when the value changed.
    pub fn set_rssi(&mut self, rssi: i8) -> bool {
        let changed = self.rssi != Some(rssi);
        self.rssi = Some(rssi);
        changed
    }

    /// Records the advertised TX power. Returns `true` when the value changed.
    pub fn set_tx_power(&mut self, tx_power: i8) -> bool {
        let changed = self.tx_power != Some(tx_power);
        self.tx_power = Some(tx_power);
        changed
    }

    /// Records an OS guess. `Unknown` never overwrites a previous guess.
    /// Returns `true` when the value changed.
    pub fn set_os(&mut self, os: OsHint) -> bool {
        if os == OsHint::Unknown || self.os == os {
            return false;
        }
        self.os = os;
        true
    }

    /// Whether a payload read should be started now.
    ///
    /// True iff the device is idle and its next-read time has passed.
    pub fn payload_should_read(&self, now: Timestamp) -> bool {
        self.state == DeviceState::Idle && now >= self.next_read
    }

    /// Transitions IDLE → CONNECTING as a read starts.
    pub fn starting_read(&mut self) {
        if self.state != DeviceState::Idle {
            warn!("starting read but state is {:?}", self.state);
        }
        self.state = DeviceState::Connecting;
    }

    /// Records a successful payload read: CONNECTING → IDLE, failure counters cleared, next
    /// read scheduled a full interval out.
    pub fn payload_read_success(&mut self, now: Timestamp, config: &Config) {
        if self.state != DeviceState::Connecting {
            warn!("payload read success but state is {:?}", self.state);
        }
        self.herald_not_found = 0;
        self.err_connecting = 0;
        self.state = DeviceState::Idle;
        self.next_read = now + config.read_interval;
    }

    /// Records a failed payload read: CONNECTING → IDLE, next read pushed out by the backoff of
    /// the error's family.
    pub fn payload_not_read(&mut self, err: ReadError, now: Timestamp, config: &Config) {
        let delay_secs = match err {
            // Retried the next time the device is scanned.
            ReadError::System => 0,
            ReadError::Connecting | ReadError::GattDiscovery | ReadError::HeraldPayloadNotFound => {
                Self::backoff(&mut self.err_connecting, &config.connection_backoff)
            }
            ReadError::HeraldServiceNotFound | ReadError::PayloadTooBig => {
                Self::backoff(&mut self.herald_not_found, &config.herald_not_found_backoff)
            }
        };
        debug!("read failed ({}), next attempt in {}s", err, delay_secs);
        self.state = DeviceState::Idle;
        self.next_read = now.saturating_add_secs(delay_secs);
    }

    /// Whether the device has gone unseen long enough to be evicted.
    ///
    /// A device last scanned at `T` with expiry `E` is still alive at `T + E` and dead one
    /// second later.
    pub fn is_expired(&self, now: Timestamp, expiry: Duration) -> bool {
        now.duration_since(self.last_scan) > expiry
    }

    fn backoff(counter: &mut u8, family: &crate::config::Backoff) -> u64 {
        if family.reset_count > 0 && *counter > family.reset_count {
            *counter = 0;
        }
        let delay = family.delay_secs(*counter);
        *counter = counter.saturating_add(1);
        delay
    }
}
