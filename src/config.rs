//! Compile-time and construction-time configuration of the proximity engine.
//!
//! Container capacities (device table size, payload buffer pool, queue depths) are const
//! generics on the types that own the storage; the constants here are the defaults used by the
//! type aliases in [`ble`]. Everything else (expiry, read interval, backoff triples, radio
//! timing) travels in a [`Config`] value owned by the sensor.
//!
//! [`ble`]: ../ble/index.html

use crate::time::Duration;

/// Default capacity of the device table.
pub const MAX_DEVICES: usize = 32;

/// Default number of outgoing payload reads that may be in flight at once.
///
/// Small MCUs with a single radio rarely support more than 1 or 2.
pub const MAX_CONCURRENT_READS: usize = 2;

/// Default maximum size of a peer's identity payload, in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// Default depth of the scan event queue.
pub const SCAN_QUEUE_DEPTH: usize = 32;

/// Default depth of the completed-payload queue.
pub const PAYLOAD_QUEUE_DEPTH: usize = 4;

/// Delay between a scanner gate reopening and the actual scan start.
///
/// Lets the radio state machine settle after a connection before scanning resumes.
pub const SCANNER_RESTART_DELAY: Duration = Duration::from_millis(200);

/// Delay between stopping advertising/scanning and initiating an outgoing connection.
pub const RADIO_QUIESCE_DELAY: Duration = Duration::from_millis(100);

/// An exponential backoff family: retry `counter` maps to a delay of `base * rate^counter`.
///
/// The counter is managed by the device state machine; once it *exceeds* `reset_count` it wraps
/// back to zero, so the next delay is `base` again.
#[derive(Copy, Clone, Debug)]
pub struct Backoff {
    /// Base delay in seconds.
    pub base_secs: u32,
    /// Multiplier applied once per consecutive failure.
    pub rate: u32,
    /// Failure count after which the counter wraps to zero. Zero disables wrapping.
    pub reset_count: u8,
}

impl Backoff {
    /// Computes the delay for the given failure counter, in seconds.
    ///
    /// The intermediate power is computed in 64 bits and saturated, so a misconfigured
    /// `reset_count` cannot wrap the resulting deadline.
    pub fn delay_secs(&self, counter: u8) -> u64 {
        let mut delay = u64::from(self.base_secs);
        for _ in 0..counter {
            delay = delay.saturating_mul(u64::from(self.rate));
        }
        delay
    }
}

/// Tunable parameters of the proximity engine.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// A device not re-scanned for this long is evicted by the expiry sweep.
    pub expiry: Duration,
    /// Interval between successful payload reads of the same device.
    pub read_interval: Duration,
    /// Backoff applied to connection-class failures (connect, GATT discovery, missing payload
    /// characteristic).
    pub connection_backoff: Backoff,
    /// Backoff applied to peers that turn out not to speak Herald (service missing, payload
    /// oversized).
    pub herald_not_found_backoff: Backoff,
    /// Minimum advertising interval.
    pub adv_interval_min: Duration,
    /// Maximum advertising interval.
    pub adv_interval_max: Duration,
    /// Scan interval.
    pub scan_interval: Duration,
    /// Scan window; must not exceed the scan interval.
    pub scan_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            expiry: Duration::from_secs(60),
            read_interval: Duration::from_secs(600),
            connection_backoff: Backoff {
                base_secs: 8,
                rate: 2,
                reset_count: 5,
            },
            herald_not_found_backoff: Backoff {
                base_secs: 60,
                rate: 4,
                reset_count: 3,
            },
            adv_interval_min: Duration::from_millis(100),
            adv_interval_max: Duration::from_millis(150),
            scan_interval: Duration::from_millis(60),
            scan_window: Duration::from_millis(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_progression() {
        let b = Backoff {
            base_secs: 8,
            rate: 2,
            reset_count: 5,
        };
        assert_eq!(b.delay_secs(0), 8);
        assert_eq!(b.delay_secs(1), 16);
        assert_eq!(b.delay_secs(2), 32);
    }

    #[test]
    fn backoff_saturates() {
        let b = Backoff {
            base_secs: 1_000,
            rate: 1_000_000,
            reset_count: 0,
        };
        // Large rate^counter values saturate instead of wrapping.
        assert_eq!(b.delay_secs(255), u64::max_value());
    }
}
