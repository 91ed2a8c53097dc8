//! The connection pipeline: outgoing payload reads.
//!
//! `read_payload` claims one of `READS` slots (the connection semaphore and the payload buffer
//! pool of the C implementations, folded into one pool since they always had equal capacity),
//! pauses advertising and scanning through the arbiter, and schedules the connection for
//! [`RADIO_QUIESCE_DELAY`] later so the radio can settle. [`poll`] initiates due connections;
//! the platform then feeds GATT progress into [`on_payload`] and reports the end of the
//! connection (every end, success or failure) through the single funnel
//! [`on_disconnected`].
//!
//! Every exit path frees the slot, re-allows both radio gates, and emits exactly one
//! [`PayloadMsg`] carrying either the accumulated payload or the [`ReadError`] identifying the
//! failure.
//!
//! [`poll`]: struct.BleReader.html#method.poll
//! [`on_payload`]: struct.BleReader.html#method.on_payload
//! [`on_disconnected`]: struct.BleReader.html#method.on_disconnected
//! [`PayloadMsg`]: struct.PayloadMsg.html
//! [`ReadError`]: ../enum.ReadError.html
//! [`RADIO_QUIESCE_DELAY`]: ../../config/constant.RADIO_QUIESCE_DELAY.html

use super::arbiter::RadioArbiter;
use super::ReadError;
use crate::addr::BleAddress;
use crate::config::RADIO_QUIESCE_DELAY;
use crate::hal::{Advertiser, Central, Scanner};
use crate::time::Timestamp;
use heapless::Vec;

/// Completed (or failed) payload read, as queued for the payload-processing task.
#[derive(Debug, Clone)]
pub struct PayloadMsg<const MAX: usize> {
    pub pseudo: BleAddress,
    pub result: Result<Vec<u8, MAX>, ReadError>,
}

/// What the platform should do with the in-progress GATT read after a chunk was delivered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChunkControl {
    /// Keep reading; deliver the next chunk when it arrives.
    Continue,
    /// Stop reading and disconnect. The disconnection callback completes the bookkeeping.
    Stop,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Phase {
    /// Slot claimed, gates closed; waiting out the radio quiesce delay.
    AwaitingConnect(Timestamp),
    /// Connection initiated; chunks may arrive.
    Reading,
    /// Outcome message emitted; only the disconnection is outstanding.
    Finished,
}

struct Reading<const MAX: usize> {
    mac: BleAddress,
    pseudo: BleAddress,
    buf: Vec<u8, MAX>,
    phase: Phase,
}

/// Drives up to `READS` concurrent outgoing payload reads with `MAX`-byte buffers.
pub struct BleReader<C: Central, const MAX: usize, const READS: usize> {
    central: C,
    readings: [Option<Reading<MAX>>; READS],
}

impl<C: Central, const MAX: usize, const READS: usize> BleReader<C, MAX, READS> {
    pub fn new(central: C) -> Self {
        BleReader {
            central,
            readings: [(); READS].map(|_| None),
        }
    }

    /// Number of reads currently holding a slot.
    pub fn active_reads(&self) -> usize {
        self.readings.iter().flatten().count()
    }

    /// Begins a payload read from `mac`, keyed by `pseudo`.
    ///
    /// Claims a slot and closes both radio gates. The actual connection is initiated by
    /// [`poll`] once the quiesce delay has passed.
    ///
    /// Fails with `PayloadTooBig` when no slot is free (the pool doubles as the connection
    /// semaphore); nothing is disturbed in that case and the caller retries on a later scan.
    ///
    /// [`poll`]: #method.poll
    pub fn read_payload<A: Advertiser, S: Scanner>(
        &mut self,
        mac: BleAddress,
        pseudo: BleAddress,
        now: Timestamp,
        arbiter: &mut RadioArbiter<A, S>,
    ) -> Result<(), ReadError> {
        let slot = match self.readings.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => slot,
            None => {
                error!("no free payload read slot");
                return Err(ReadError::PayloadTooBig);
            }
        };
        *slot = Some(Reading {
            mac,
            pseudo,
            buf: Vec::new(),
            phase: Phase::AwaitingConnect(now + RADIO_QUIESCE_DELAY),
        });
        arbiter.disallow();
        debug!("read of {:?} scheduled", mac);
        Ok(())
    }

    /// Initiates connections whose quiesce delay has passed.
    ///
    /// At most one connection is initiated per call; the platform polls this regularly. A
    /// failure to even start the connection frees the slot, reopens the gates and surfaces as
    /// a `System` message so the device retries on its next scan.
    pub fn poll<A: Advertiser, S: Scanner>(
        &mut self,
        now: Timestamp,
        arbiter: &mut RadioArbiter<A, S>,
    ) -> Option<PayloadMsg<MAX>> {
        let slot = self.readings.iter_mut().find(|slot| {
            matches!(
                slot,
                Some(Reading {
                    phase: Phase::AwaitingConnect(at),
                    ..
                }) if now >= *at
            )
        })?;
        let reading = slot.as_mut().unwrap();
        match self.central.connect(reading.mac) {
            Ok(()) => {
                reading.phase = Phase::Reading;
                None
            }
            Err(e) => {
                error!("could not start connection to {:?}: {:?}", reading.mac, e);
                let pseudo = reading.pseudo;
                *slot = None;
                arbiter.allow(now);
                Some(PayloadMsg {
                    pseudo,
                    result: Err(ReadError::System),
                })
            }
        }
    }

    /// Handles a GATT read callback for `mac`.
    ///
    /// `chunk` is `Ok(Some(bytes))` for a data chunk, `Ok(None)` when the characteristic has
    /// been read completely, or `Err` for a failure reported by the driver. Returns the control
    /// decision for the driver and, on completion or failure, the outcome message.
    pub fn on_payload(
        &mut self,
        mac: BleAddress,
        chunk: Result<Option<&[u8]>, ReadError>,
    ) -> (ChunkControl, Option<PayloadMsg<MAX>>) {
        let reading = match self
            .readings
            .iter_mut()
            .flatten()
            .find(|reading| reading.mac == mac)
        {
            Some(reading) => reading,
            None => {
                error!("payload chunk for unknown connection {:?}", mac);
                return (ChunkControl::Stop, None);
            }
        };

        match chunk {
            Err(err) => {
                reading.phase = Phase::Finished;
                let msg = PayloadMsg {
                    pseudo: reading.pseudo,
                    result: Err(err),
                };
                (ChunkControl::Stop, Some(msg))
            }
            Ok(None) => {
                debug!("read of {:?} complete ({} bytes)", mac, reading.buf.len());
                reading.phase = Phase::Finished;
                let msg = PayloadMsg {
                    pseudo: reading.pseudo,
                    result: Ok(reading.buf.clone()),
                };
                (ChunkControl::Stop, Some(msg))
            }
            Ok(Some(data)) => {
                if reading.buf.extend_from_slice(data).is_err() {
                    warn!(
                        "payload of {:?} exceeds the {} byte buffer",
                        mac,
                        reading.buf.capacity()
                    );
                    reading.phase = Phase::Finished;
                    let msg = PayloadMsg {
                        pseudo: reading.pseudo,
                        result: Err(ReadError::PayloadTooBig),
                    };
                    (ChunkControl::Stop, Some(msg))
                } else {
                    (ChunkControl::Continue, None)
                }
            }
        }
    }

    /// Handles the end of the connection to `mac`. The single funnel for "connection over".
    ///
    /// Frees the slot and reopens the radio gates. A disconnection that arrives while the read
    /// was still in progress cancels it and surfaces as a `Connecting` failure.
    pub fn on_disconnected<A: Advertiser, S: Scanner>(
        &mut self,
        mac: BleAddress,
        now: Timestamp,
        arbiter: &mut RadioArbiter<A, S>,
    ) -> Option<PayloadMsg<MAX>> {
        let slot = self
            .readings
            .iter_mut()
            .find(|slot| matches!(slot, Some(reading) if reading.mac == mac));
        let slot = match slot {
            Some(slot) => slot,
            None => {
                warn!("disconnection for unknown connection {:?}", mac);
                return None;
            }
        };
        let reading = slot.as_ref().unwrap();
        let msg = match reading.phase {
            // Read still in flight; the peer dropped the link.
            Phase::AwaitingConnect(_) | Phase::Reading => Some(PayloadMsg {
                pseudo: reading.pseudo,
                result: Err(ReadError::Connecting),
            }),
            Phase::Finished => None,
        };
        *slot = None;
        arbiter.allow(now);
        msg
    }
}
