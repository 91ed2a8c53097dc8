//! The sensor: glue between scan events, the device table, the connection pipeline and the
//! delegates.
//!
//! Mirrors the three long-lived tasks of an RTOS deployment without requiring one:
//!
//! * the platform's scan callback calls [`on_advert`], which digests and queues the report;
//! * [`process_scan`] drains the scan queue, updates the device table and starts payload reads;
//! * [`process_payload`] drains completed reads and applies success/backoff bookkeeping;
//! * a periodic timer calls [`sweep`] to evict expired devices, and [`poll`] to service the
//!   stored radio deadlines.
//!
//! On an RTOS, `process_scan` and `process_payload` become the bodies of two queue-draining
//! threads and the queues get their native blocking behavior; the state they touch is all owned
//! by this struct, so a single mutex around the sensor reproduces the original locking.
//!
//! [`on_advert`]: struct.BleSensor.html#method.on_advert
//! [`process_scan`]: struct.BleSensor.html#method.process_scan
//! [`process_payload`]: struct.BleSensor.html#method.process_payload
//! [`sweep`]: struct.BleSensor.html#method.sweep
//! [`poll`]: struct.BleSensor.html#method.poll

use super::arbiter::RadioArbiter;
use super::delegate::{DatabaseDelegate, DeviceAttribute, SensorDelegate};
use super::device::DeviceState;
use super::reader::{BleReader, ChunkControl, PayloadMsg};
use super::scanner::{self, ScanEvent};
use super::table::DeviceTable;
use super::ReadError;
use crate::addr::BleAddress;
use crate::bytes::ByteWriter;
use crate::config::{self, Config};
use crate::hal::{Advertiser, Central, HalError, Scanner, Transmitter};
use crate::payload::PayloadSupplier;
use crate::time::Timestamp;
use crate::Error;
use heapless::Deque;

/// The BLE proximity sensor.
///
/// Const parameters: `DEVS` device table slots, `MAX` byte payload buffers, `READS` concurrent
/// outgoing reads, and the two queue depths. [`ProximitySensor`] applies the defaults from
/// [`config`].
///
/// The delegate type implements both [`SensorDelegate`] (high-level events) and
/// [`DatabaseDelegate`] (per-attribute device table events); implement only the methods of
/// interest and leave the rest defaulted.
///
/// [`ProximitySensor`]: type.ProximitySensor.html
/// [`config`]: ../../config/index.html
/// [`SensorDelegate`]: ../delegate/trait.SensorDelegate.html
/// [`DatabaseDelegate`]: ../delegate/trait.DatabaseDelegate.html
pub struct BleSensor<
    A,
    S,
    C,
    T,
    D,
    const DEVS: usize,
    const MAX: usize,
    const READS: usize,
    const SCAN_Q: usize,
    const PAYLOAD_Q: usize,
> where
    A: Advertiser,
    S: Scanner,
    C: Central,
    T: Transmitter,
    D: SensorDelegate + DatabaseDelegate,
{
    config: Config,
    arbiter: RadioArbiter<A, S>,
    reader: BleReader<C, MAX, READS>,
    transmitter: T,
    table: DeviceTable<DEVS>,
    delegate: D,
    scan_queue: Deque<ScanEvent, SCAN_Q>,
    payload_queue: Deque<PayloadMsg<MAX>, PAYLOAD_Q>,
}

/// A [`BleSensor`] with the default capacities from [`config`].
///
/// [`BleSensor`]: struct.BleSensor.html
/// [`config`]: ../../config/index.html
pub type ProximitySensor<A, S, C, T, D> = BleSensor<
    A,
    S,
    C,
    T,
    D,
    { config::MAX_DEVICES },
    { config::MAX_PAYLOAD_SIZE },
    { config::MAX_CONCURRENT_READS },
    { config::SCAN_QUEUE_DEPTH },
    { config::PAYLOAD_QUEUE_DEPTH },
>;

impl<
        A,
        S,
        C,
        T,
        D,
        const DEVS: usize,
        const MAX: usize,
        const READS: usize,
        const SCAN_Q: usize,
        const PAYLOAD_Q: usize,
    > BleSensor<A, S, C, T, D, DEVS, MAX, READS, SCAN_Q, PAYLOAD_Q>
where
    A: Advertiser,
    S: Scanner,
    C: Central,
    T: Transmitter,
    D: SensorDelegate + DatabaseDelegate,
{
    pub fn new(
        advertiser: A,
        scanner: S,
        central: C,
        transmitter: T,
        delegate: D,
        config: Config,
    ) -> Self {
        BleSensor {
            config,
            arbiter: RadioArbiter::new(advertiser, scanner),
            reader: BleReader::new(central),
            transmitter,
            table: DeviceTable::new(),
            delegate,
            scan_queue: Deque::new(),
            payload_queue: Deque::new(),
        }
    }

    /// Starts scanning and advertising.
    ///
    /// A failure here is fatal for initialization and surfaced to the caller.
    pub fn start(&mut self) -> Result<(), HalError> {
        self.arbiter.start_scanning()?;
        self.arbiter.start_advertising()?;
        info!("proximity sensor started");
        Ok(())
    }

    /// Stops scanning and advertising.
    pub fn stop(&mut self) -> Result<(), HalError> {
        self.arbiter.stop_scanning()?;
        self.arbiter.stop_advertising()
    }

    /// The tracked-device table, for inspection.
    pub fn devices(&self) -> &DeviceTable<DEVS> {
        &self.table
    }

    /// Regenerates the local identity payload and hands it to the transmitter.
    ///
    /// Called at startup and from the payload rotation timer. A transmitter refusal is logged
    /// and not treated as fatal; the previous payload stays in effect.
    pub fn update_payload(
        &mut self,
        supplier: &mut impl PayloadSupplier,
        now: Timestamp,
    ) -> Result<(), Error> {
        let mut buf = [0; MAX];
        let mut writer = ByteWriter::new(&mut buf);
        supplier.payload(now, &mut writer)?;
        let used = MAX - writer.space_left();
        if let Err(e) = self.transmitter.set_payload(&buf[..used]) {
            error!("transmitter rejected payload: {:?}", e);
        }
        Ok(())
    }

    /// Entry point for the platform's scan callback.
    ///
    /// Digests the advertisement and queues the event for [`process_scan`]. When the queue is
    /// full the event is dropped; detection loss is statistical and the radio is not throttled.
    ///
    /// [`process_scan`]: #method.process_scan
    pub fn on_advert(&mut self, mac: BleAddress, rssi: i8, data: &[u8]) {
        let event = scanner::ingest(mac, rssi, data);
        if self.scan_queue.push_back(event).is_err() {
            warn!("scan queue full, dropping report from {:?}", mac);
        }
    }

    /// Processes one queued scan event. Returns `false` when the queue was empty.
    pub fn process_scan(&mut self, now: Timestamp) -> bool {
        let event = match self.scan_queue.pop_front() {
            Some(event) => event,
            None => return false,
        };

        // Every observation is a proximity measurement, herald or not.
        self.delegate.did_measure(&event.pseudo, event.rssi);
        if !event.might_be_herald {
            return true;
        }

        let config = self.config;
        let was_known = self.table.find(&event.pseudo).is_some();
        let device = match self
            .table
            .find_or_create(&event.pseudo, now, &mut self.delegate)
        {
            Some(device) => device,
            None => {
                error!("device table full, cannot track {:?}", event.pseudo);
                return true;
            }
        };

        device.scanned(now);
        let rssi_changed = device.set_rssi(event.rssi);
        let tx_changed = match event.tx_power {
            Some(power) => device.set_tx_power(power),
            None => false,
        };
        let os_changed = device.set_os(event.os);
        let os = device.os();
        let should_read = device.payload_should_read(now);
        if should_read {
            device.starting_read();
        }

        if !was_known {
            self.delegate.did_detect(&event.pseudo);
        }
        if rssi_changed {
            self.delegate
                .did_update(&event.pseudo, DeviceAttribute::Rssi(event.rssi));
        }
        if tx_changed {
            if let Some(power) = event.tx_power {
                self.delegate
                    .did_update(&event.pseudo, DeviceAttribute::TxPower(power));
            }
        }
        if os_changed {
            self.delegate
                .did_update(&event.pseudo, DeviceAttribute::Os(os));
        }

        if should_read {
            self.delegate
                .did_update(&event.pseudo, DeviceAttribute::State(DeviceState::Connecting));
            if self
                .reader
                .read_payload(event.mac, event.pseudo, now, &mut self.arbiter)
                .is_err()
            {
                // Slot exhaustion; the device goes back to idle and retries on a later scan.
                if let Some(device) = self.table.find_mut(&event.pseudo) {
                    device.payload_not_read(ReadError::System, now, &config);
                }
                self.delegate
                    .did_update(&event.pseudo, DeviceAttribute::State(DeviceState::Idle));
            }
        }
        true
    }

    /// Processes one completed payload message. Returns `false` when the queue was empty.
    pub fn process_payload(&mut self, now: Timestamp) -> bool {
        let msg = match self.payload_queue.pop_front() {
            Some(msg) => msg,
            None => return false,
        };

        let config = self.config;
        let was_known = self.table.find(&msg.pseudo).is_some();
        let device = match self
            .table
            .find_or_create(&msg.pseudo, now, &mut self.delegate)
        {
            Some(device) => device,
            None => {
                error!("device table full, payload of {:?} dropped", msg.pseudo);
                return true;
            }
        };

        match &msg.result {
            Ok(_) => device.payload_read_success(now, &config),
            Err(err) => device.payload_not_read(*err, now, &config),
        }

        if !was_known {
            self.delegate.did_detect(&msg.pseudo);
        }
        match &msg.result {
            Ok(bytes) => {
                self.delegate
                    .did_update(&msg.pseudo, DeviceAttribute::PayloadData(bytes));
                self.delegate.did_read(&msg.pseudo, bytes);
            }
            Err(err) => {
                debug!("payload read of {:?} failed: {}", msg.pseudo, err);
            }
        }
        self.delegate
            .did_update(&msg.pseudo, DeviceAttribute::State(DeviceState::Idle));
        true
    }

    /// Evicts devices unseen for longer than the configured expiry.
    pub fn sweep(&mut self, now: Timestamp) {
        let expiry = self.config.expiry;
        self.table.sweep(now, expiry, &mut self.delegate);
    }

    /// Services stored deadlines: the delayed scanner restart and pending connects.
    pub fn poll(&mut self, now: Timestamp) {
        self.arbiter.poll(now);
        if let Some(msg) = self.reader.poll(now, &mut self.arbiter) {
            self.enqueue_payload_msg(msg);
        }
    }

    /// Entry point for the platform's GATT read callback.
    pub fn on_payload(
        &mut self,
        mac: BleAddress,
        chunk: Result<Option<&[u8]>, ReadError>,
    ) -> ChunkControl {
        let (control, msg) = self.reader.on_payload(mac, chunk);
        if let Some(msg) = msg {
            self.enqueue_payload_msg(msg);
        }
        control
    }

    /// Entry point for the platform's disconnection callback.
    pub fn on_disconnected(&mut self, mac: BleAddress, now: Timestamp) {
        if let Some(msg) = self.reader.on_disconnected(mac, now, &mut self.arbiter) {
            self.enqueue_payload_msg(msg);
        }
    }

    /// Entry point for writes to the local immediate-send characteristic.
    pub fn on_received(&mut self, pseudo: BleAddress, data: &[u8]) {
        self.delegate.did_receive(&pseudo, data);
    }

    fn enqueue_payload_msg(&mut self, msg: PayloadMsg<MAX>) {
        if self.payload_queue.push_back(msg).is_err() {
            error!("payload queue full, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::advert::herald_advertisement;
    use crate::config::{Backoff, RADIO_QUIESCE_DELAY};
    use crate::payload::fixed::FixedPayloadSupplier;
    use crate::time::Duration;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct MockRadio {
        on: Rc<Cell<bool>>,
    }

    impl Advertiser for MockRadio {
        fn start(&mut self) -> Result<(), HalError> {
            self.on.set(true);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), HalError> {
            self.on.set(false);
            Ok(())
        }
    }

    impl Scanner for MockRadio {
        fn start(&mut self) -> Result<(), HalError> {
            Advertiser::start(self)
        }

        fn stop(&mut self) -> Result<(), HalError> {
            Advertiser::stop(self)
        }
    }

    #[derive(Clone, Default)]
    struct MockCentral {
        connects: Rc<RefCell<Vec<BleAddress>>>,
    }

    impl Central for MockCentral {
        fn connect(&mut self, mac: BleAddress) -> Result<(), HalError> {
            self.connects.borrow_mut().push(mac);
            Ok(())
        }

        fn disconnect(&mut self, _mac: BleAddress) -> Result<(), HalError> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockTransmitter {
        payload: Rc<RefCell<Vec<u8>>>,
    }

    impl Transmitter for MockTransmitter {
        fn set_payload(&mut self, payload: &[u8]) -> Result<(), HalError> {
            *self.payload.borrow_mut() = payload.to_vec();
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        detected: Rc<RefCell<Vec<BleAddress>>>,
        measured: Rc<RefCell<Vec<(BleAddress, i8)>>>,
        read: Rc<RefCell<Vec<(BleAddress, Vec<u8>)>>>,
        received: Rc<RefCell<Vec<Vec<u8>>>>,
        deleted: Rc<RefCell<Vec<BleAddress>>>,
        states: Rc<RefCell<Vec<DeviceState>>>,
    }

    impl SensorDelegate for Recorder {
        fn did_detect(&mut self, pseudo: &BleAddress) {
            self.detected.borrow_mut().push(*pseudo);
        }

        fn did_measure(&mut self, pseudo: &BleAddress, rssi: i8) {
            self.measured.borrow_mut().push((*pseudo, rssi));
        }

        fn did_read(&mut self, pseudo: &BleAddress, payload: &[u8]) {
            self.read.borrow_mut().push((*pseudo, payload.to_vec()));
        }

        fn did_receive(&mut self, _pseudo: &BleAddress, data: &[u8]) {
            self.received.borrow_mut().push(data.to_vec());
        }
    }

    impl DatabaseDelegate for Recorder {
        fn did_update(&mut self, _pseudo: &BleAddress, attribute: DeviceAttribute<'_>) {
            if let DeviceAttribute::State(state) = attribute {
                self.states.borrow_mut().push(state);
            }
        }

        fn did_delete(&mut self, pseudo: &BleAddress) {
            self.deleted.borrow_mut().push(*pseudo);
        }
    }

    type TestSensor =
        BleSensor<MockRadio, MockRadio, MockCentral, MockTransmitter, Recorder, 4, 16, 1, 4, 2>;

    struct Harness {
        sensor: TestSensor,
        central: MockCentral,
        transmitter: MockTransmitter,
        delegate: Recorder,
        adv: MockRadio,
        scan: MockRadio,
    }

    fn test_config() -> Config {
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
            ..Config::default()
        }
    }

    fn harness() -> Harness {
        let adv = MockRadio::default();
        let scan = MockRadio::default();
        let central = MockCentral::default();
        let transmitter = MockTransmitter::default();
        let delegate = Recorder::default();
        let mut sensor = BleSensor::new(
            adv.clone(),
            scan.clone(),
            central.clone(),
            transmitter.clone(),
            delegate.clone(),
            test_config(),
        );
        sensor.start().unwrap();
        Harness {
            sensor,
            central,
            transmitter,
            delegate,
            adv,
            scan,
        }
    }

    const MAC: BleAddress = BleAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    /// Feeds a Herald advertisement for `advertised` and returns the derived pseudo-address.
    fn feed_advert(h: &mut Harness, advertised: BleAddress, rssi: i8) -> BleAddress {
        let mut buf = [0; 31];
        let len = herald_advertisement(&advertised, &mut buf).unwrap();
        h.sensor.on_advert(MAC, rssi, &buf[..len]);
        scanner::ingest(MAC, rssi, &buf[..len]).pseudo
    }

    fn drive_connect(h: &mut Harness, now: Timestamp) -> Timestamp {
        assert!(h.sensor.process_scan(now));
        let quiesced = now + RADIO_QUIESCE_DELAY;
        h.sensor.poll(quiesced);
        quiesced
    }

    #[test]
    fn clean_read_end_to_end() {
        let mut h = harness();
        let t10 = Timestamp::from_secs(10);
        let pseudo = feed_advert(&mut h, BleAddress::new([1, 2, 3, 4, 5, 6]), -60);

        let now = drive_connect(&mut h, t10);
        assert_eq!(h.delegate.detected.borrow().as_slice(), &[pseudo]);
        assert_eq!(h.delegate.measured.borrow().as_slice(), &[(pseudo, -60)]);
        assert_eq!(h.central.connects.borrow().as_slice(), &[MAC]);
        // Radios quiesced while the connection is in flight.
        assert!(!h.adv.on.get());
        assert!(!h.scan.on.get());

        // Deliver the fixed payload 0x08 | 0x0102 | 0x0003 | 0xDEADBEEF.
        let payload = [
            0x08, 0x02, 0x01, 0x03, 0x00, 0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(
            h.sensor.on_payload(MAC, Ok(Some(&payload))),
            ChunkControl::Continue
        );
        assert_eq!(h.sensor.on_payload(MAC, Ok(None)), ChunkControl::Stop);
        h.sensor.on_disconnected(MAC, now);
        assert!(h.sensor.process_payload(now));

        let reads = h.delegate.read.borrow();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].0, pseudo);
        assert_eq!(reads[0].1, payload.to_vec());
        drop(reads);

        let device = h.sensor.devices().find(&pseudo).unwrap();
        assert_eq!(device.state(), DeviceState::Idle);
        assert_eq!(device.next_read(), now + Duration::from_secs(600));
        assert_eq!(
            h.delegate.states.borrow().as_slice(),
            &[DeviceState::Connecting, DeviceState::Idle]
        );
    }

    #[test]
    fn connection_error_backoff_progression() {
        let mut h = harness();
        let advertised = BleAddress::new([1, 2, 3, 4, 5, 6]);

        // Each round scans once the previous backoff has lapsed; the connection drops before
        // the read completes, so the delay doubles: 8s, 16s, 32s.
        for (round, (t, backoff)) in [(0u64, 8u64), (9, 16), (26, 32)].iter().enumerate() {
            let pseudo = feed_advert(&mut h, advertised, -60);
            let now = drive_connect(&mut h, Timestamp::from_secs(*t));
            assert_eq!(h.central.connects.borrow().len(), round + 1);
            h.sensor.on_disconnected(MAC, now);
            assert!(h.sensor.process_payload(now));

            let device = *h.sensor.devices().find(&pseudo).unwrap();
            assert_eq!(device.state(), DeviceState::Idle);
            assert_eq!(device.next_read(), now.saturating_add_secs(*backoff));
        }
    }

    #[test]
    fn herald_not_found_applies_long_backoff() {
        let mut h = harness();
        let pseudo = feed_advert(&mut h, BleAddress::new([1, 2, 3, 4, 5, 6]), -61);
        let now = drive_connect(&mut h, Timestamp::from_secs(100));

        h.sensor
            .on_payload(MAC, Err(ReadError::HeraldServiceNotFound));
        h.sensor.on_disconnected(MAC, now);
        assert!(h.sensor.process_payload(now));

        let next_read = {
            let device = h.sensor.devices().find(&pseudo).unwrap();
            assert_eq!(device.next_read(), now.saturating_add_secs(60));
            device.next_read()
        };

        // A re-discovery before next_read refreshes last_scan but starts no connection.
        feed_advert(&mut h, BleAddress::new([1, 2, 3, 4, 5, 6]), -55);
        let later = now + Duration::from_secs(10);
        assert!(h.sensor.process_scan(later));
        h.sensor.poll(later + RADIO_QUIESCE_DELAY);
        assert_eq!(h.central.connects.borrow().len(), 1);
        let device = h.sensor.devices().find(&pseudo).unwrap();
        assert_eq!(device.last_scan(), later);
        assert_eq!(device.next_read(), next_read);
    }

    #[test]
    fn eviction_after_expiry() {
        let mut h = harness();
        let pseudo = feed_advert(&mut h, BleAddress::new([1, 2, 3, 4, 5, 6]), -60);
        assert!(h.sensor.process_scan(Timestamp::ZERO));

        h.sensor.sweep(Timestamp::from_secs(60));
        assert_eq!(h.sensor.devices().len(), 1);

        h.sensor.sweep(Timestamp::from_secs(61));
        assert_eq!(h.sensor.devices().len(), 0);
        assert_eq!(h.delegate.deleted.borrow().as_slice(), &[pseudo]);
    }

    #[test]
    fn non_herald_peer_is_measured_but_not_tracked() {
        let mut h = harness();
        // Flags-only advertisement.
        h.sensor.on_advert(MAC, -72, &[2, 0x01, 0x06]);
        assert!(h.sensor.process_scan(Timestamp::ZERO));
        assert_eq!(h.delegate.measured.borrow().as_slice(), &[(MAC, -72)]);
        assert!(h.delegate.detected.borrow().is_empty());
        assert_eq!(h.sensor.devices().len(), 0);
    }

    #[test]
    fn scan_queue_overflow_drops_newest() {
        let mut h = harness();
        for n in 0..6 {
            let advertised = BleAddress::new([n, 2, 3, 4, 5, 6]);
            feed_advert(&mut h, advertised, -60);
        }
        // Queue depth is 4: exactly four events survive.
        let mut processed = 0;
        while h.sensor.process_scan(Timestamp::ZERO) {
            processed += 1;
        }
        assert_eq!(processed, 4);
    }

    #[test]
    fn update_payload_reaches_transmitter() {
        let mut h = harness();
        let mut supplier = FixedPayloadSupplier::new(0x0102, 0x0003, 7);
        h.sensor
            .update_payload(&mut supplier, Timestamp::ZERO)
            .unwrap();
        assert_eq!(
            h.transmitter.payload.borrow().as_slice(),
            &[0x08, 0x02, 0x01, 0x03, 0x00, 7, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn immediate_send_reaches_delegate() {
        let mut h = harness();
        h.sensor.on_received(MAC, &[1, 2, 3]);
        assert_eq!(h.delegate.received.borrow().as_slice(), &[vec![1, 2, 3]]);
    }

    #[test]
    fn single_read_slot_limits_concurrency() {
        let mut h = harness();
        let a = feed_advert(&mut h, BleAddress::new([1, 0, 0, 0, 0, 1]), -60);
        let now = drive_connect(&mut h, Timestamp::ZERO);
        assert_eq!(h.central.connects.borrow().len(), 1);

        // A second device shows up while the first read is in flight (READS = 1). The slot
        // is taken, so the second device reverts to idle and will retry on a later scan.
        let b = feed_advert(&mut h, BleAddress::new([2, 0, 0, 0, 0, 1]), -60);
        assert!(h.sensor.process_scan(now));
        h.sensor.poll(now + RADIO_QUIESCE_DELAY);
        assert_eq!(h.central.connects.borrow().len(), 1);
        assert_ne!(a, b);
        assert_eq!(
            h.sensor.devices().find(&b).unwrap().state(),
            DeviceState::Idle
        );
    }
}
