//! Radio arbitration: pausing advertising and scanning around outgoing connections.
//!
//! A single-radio MCU cannot advertise, scan and run a central-role connection at the same
//! time, so the connection pipeline brackets every outgoing connection with
//! [`RadioArbiter::disallow`] / [`RadioArbiter::allow`]. Each activity is guarded by a
//! reference-counted [`Gate`]: the activity runs only while `should_be_on` is set *and* no
//! disallow is outstanding. A matched disallow/allow pair always returns the gate to its prior
//! state.
//!
//! The scanner is not restarted immediately when its gate reopens; the restart is delayed by
//! [`SCANNER_RESTART_DELAY`] to let the radio state machine settle, and issued by
//! [`RadioArbiter::poll`].
//!
//! [`Gate`]: struct.Gate.html
//! [`RadioArbiter::disallow`]: struct.RadioArbiter.html#method.disallow
//! [`RadioArbiter::allow`]: struct.RadioArbiter.html#method.allow
//! [`RadioArbiter::poll`]: struct.RadioArbiter.html#method.poll
//! [`SCANNER_RESTART_DELAY`]: ../../config/constant.SCANNER_RESTART_DELAY.html

use crate::config::SCANNER_RESTART_DELAY;
use crate::hal::{Advertiser, HalError, Scanner};
use crate::time::Timestamp;

/// Reference-counted on/off gate for one radio activity.
///
/// Pure state machine; the boolean results tell the caller whether to touch the radio.
#[derive(Debug, Default)]
pub struct Gate {
    should_be_on: bool,
    disallow_count: u8,
}

impl Gate {
    pub fn new() -> Self {
        Gate::default()
    }

    /// Requests the activity on. Returns `true` when the radio should be started now.
    pub fn start(&mut self) -> bool {
        self.should_be_on = true;
        self.disallow_count == 0
    }

    /// Requests the activity off. The radio is stopped unconditionally.
    pub fn stop(&mut self) {
        self.should_be_on = false;
    }

    /// Takes a disallow reference. Returns `true` when this transition must stop the radio
    /// (first disallow while the activity is on).
    pub fn disallow(&mut self) -> bool {
        let stop_now = self.disallow_count == 0 && self.should_be_on;
        self.disallow_count += 1;
        stop_now
    }

    /// Releases a disallow reference. Returns `true` when this transition should restart the
    /// radio (count back to zero while the activity is wanted).
    ///
    /// An unmatched `allow` is logged and ignored.
    pub fn allow(&mut self) -> bool {
        if self.disallow_count == 0 {
            error!("gate allow without matching disallow");
            return false;
        }
        self.disallow_count -= 1;
        self.disallow_count == 0 && self.should_be_on
    }

    /// Number of outstanding disallow references.
    pub fn disallow_count(&self) -> u8 {
        self.disallow_count
    }

    /// Whether the activity is requested on.
    pub fn should_be_on(&self) -> bool {
        self.should_be_on
    }
}

/// Owns the advertiser and scanner and their gates.
pub struct RadioArbiter<A: Advertiser, S: Scanner> {
    advertiser: A,
    scanner: S,
    advertise_gate: Gate,
    scan_gate: Gate,
    scanner_restart_at: Option<Timestamp>,
}

impl<A: Advertiser, S: Scanner> RadioArbiter<A, S> {
    pub fn new(advertiser: A, scanner: S) -> Self {
        RadioArbiter {
            advertiser,
            scanner,
            advertise_gate: Gate::new(),
            scan_gate: Gate::new(),
            scanner_restart_at: None,
        }
    }

    /// Turns advertising on (subject to the gate).
    pub fn start_advertising(&mut self) -> Result<(), HalError> {
        if self.advertise_gate.start() {
            self.advertiser.start()?;
        }
        Ok(())
    }

    /// Turns advertising off.
    pub fn stop_advertising(&mut self) -> Result<(), HalError> {
        self.advertise_gate.stop();
        self.advertiser.stop()
    }

    /// Turns scanning on (subject to the gate).
    pub fn start_scanning(&mut self) -> Result<(), HalError> {
        if self.scan_gate.start() {
            self.scanner.start()?;
        }
        Ok(())
    }

    /// Turns scanning off, cancelling any pending delayed restart.
    pub fn stop_scanning(&mut self) -> Result<(), HalError> {
        self.scan_gate.stop();
        self.scanner_restart_at = None;
        self.scanner.stop()
    }

    /// Pauses both activities for the duration of an outgoing connection.
    pub fn disallow(&mut self) {
        if self.advertise_gate.disallow() {
            if let Err(e) = self.advertiser.stop() {
                error!("advertiser stop failed: {:?}", e);
            } else {
                debug!("advertising stopped");
            }
        }
        if self.scan_gate.disallow() {
            self.scanner_restart_at = None;
            if let Err(e) = self.scanner.stop() {
                error!("scanner stop failed: {:?}", e);
            } else {
                debug!("scanning stopped");
            }
        }
    }

    /// Releases the pause taken by [`disallow`].
    ///
    /// The advertiser restarts immediately; the scanner restart is scheduled
    /// [`SCANNER_RESTART_DELAY`] after `now` and performed by [`poll`].
    ///
    /// [`disallow`]: #method.disallow
    /// [`poll`]: #method.poll
    /// [`SCANNER_RESTART_DELAY`]: ../../config/constant.SCANNER_RESTART_DELAY.html
    pub fn allow(&mut self, now: Timestamp) {
        if self.advertise_gate.allow() {
            if let Err(e) = self.advertiser.start() {
                error!("advertiser restart failed: {:?}", e);
            } else {
                debug!("advertising restarted");
            }
        }
        if self.scan_gate.allow() {
            self.scanner_restart_at = Some(now + SCANNER_RESTART_DELAY);
        }
    }

    /// Services the delayed scanner restart.
    pub fn poll(&mut self, now: Timestamp) {
        if let Some(at) = self.scanner_restart_at {
            if now >= at {
                self.scanner_restart_at = None;
                // The gate may have been closed again in the meantime.
                if self.scan_gate.disallow_count() == 0 && self.scan_gate.should_be_on() {
                    if let Err(e) = self.scanner.start() {
                        error!("scanner restart failed: {:?}", e);
                    } else {
                        debug!("scanning restarted");
                    }
                }
            }
        }
    }

    /// Whether a scanner restart is pending.
    pub fn scanner_restart_pending(&self) -> bool {
        self.scanner_restart_at.is_some()
    }
}
