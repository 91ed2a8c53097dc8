//! The fixed-capacity device database.
//!
//! A slot pool of `N` entries keyed by pseudo-address. Lookup and insertion are O(N) linear
//! scans over the pool; entries are unordered. Devices live from their first scan until the
//! expiry sweep finds them unseen for longer than the configured TTL.
//!
//! The table notifies a [`DatabaseDelegate`] on insertion and eviction; attribute-level
//! `did_update` events are emitted by the callers that mutate the device, since only they know
//! which attribute changed.
//!
//! [`DatabaseDelegate`]: ../delegate/trait.DatabaseDelegate.html

use super::delegate::DatabaseDelegate;
use super::device::Device;
use crate::addr::BleAddress;
use crate::time::{Duration, Timestamp};

#[derive(Copy, Clone)]
struct Entry {
    addr: BleAddress,
    device: Device,
}

/// Fixed slot pool mapping pseudo-addresses to device records.
pub struct DeviceTable<const N: usize> {
    slots: [Option<Entry>; N],
    size: usize,
}

impl<const N: usize> DeviceTable<N> {
    pub fn new() -> Self {
        DeviceTable {
            slots: [None; N],
            size: 0,
        }
    }

    /// Number of devices currently tracked.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The compile-time capacity of the pool.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Finds the device with the given pseudo-address.
    pub fn find(&self, addr: &BleAddress) -> Option<&Device> {
        self.slots
            .iter()
            .flatten()
            .find(|entry| entry.addr == *addr)
            .map(|entry| &entry.device)
    }

    /// Finds the device with the given pseudo-address, mutably.
    pub fn find_mut(&mut self, addr: &BleAddress) -> Option<&mut Device> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|entry| entry.addr == *addr)
            .map(|entry| &mut entry.device)
    }

    /// Finds the device with the given pseudo-address, inserting a fresh record into the first
    /// free slot if it is not yet tracked.
    ///
    /// Returns `None` when the device is unknown and the pool is full; the peer stays invisible
    /// until the next sweep frees a slot. `did_create` fires only on actual insertion.
    pub fn find_or_create(
        &mut self,
        addr: &BleAddress,
        now: Timestamp,
        delegate: &mut impl DatabaseDelegate,
    ) -> Option<&mut Device> {
        // Two passes keep the borrow checker happy: locate first, then reborrow.
        let existing = self
            .slots
            .iter()
            .position(|slot| matches!(slot, Some(entry) if entry.addr == *addr));
        let index = match existing {
            Some(index) => index,
            None => {
                let free = self.slots.iter().position(|slot| slot.is_none())?;
                self.slots[free] = Some(Entry {
                    addr: *addr,
                    device: Device::new(now),
                });
                self.size += 1;
                delegate.did_create(addr);
                free
            }
        };
        self.slots[index].as_mut().map(|entry| &mut entry.device)
    }

    /// Invokes `cb` on every tracked device. Returning `true` from the callback frees the slot.
    pub fn retain_devices(&mut self, mut cb: impl FnMut(&BleAddress, &mut Device) -> bool) {
        for slot in self.slots.iter_mut() {
            if let Some(entry) = slot {
                if cb(&entry.addr, &mut entry.device) {
                    *slot = None;
                    self.size -= 1;
                }
            }
        }
    }

    /// Evicts every device not scanned within `expiry`, notifying the delegate per eviction.
    pub fn sweep(
        &mut self,
        now: Timestamp,
        expiry: Duration,
        delegate: &mut impl DatabaseDelegate,
    ) {
        for slot in self.slots.iter_mut() {
            if let Some(entry) = slot {
                if entry.device.is_expired(now, expiry) {
                    debug!("evicting {:?}", entry.addr);
                    delegate.did_delete(&entry.addr);
                    *slot = None;
                    self.size -= 1;
                }
            }
        }
    }
}

impl<const N: usize> Default for DeviceTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        created: Vec<BleAddress>,
        deleted: Vec<BleAddress>,
    }

    impl DatabaseDelegate for Recorder {
        fn did_create(&mut self, pseudo: &BleAddress) {
            self.created.push(*pseudo);
        }

        fn did_delete(&mut self, pseudo: &BleAddress) {
            self.deleted.push(*pseudo);
        }
    }

    fn addr(n: u8) -> BleAddress {
        BleAddress::new([n, 0, 0, 0, 0, 1])
    }

    #[test]
    fn create_find_and_capacity() {
        let mut table: DeviceTable<4> = DeviceTable::new();
        let mut delegate = Recorder::default();
        let now = Timestamp::from_secs(1);

        for n in 0..4 {
            assert!(table.find_or_create(&addr(n), now, &mut delegate).is_some());
        }
        assert_eq!(table.len(), 4);
        assert_eq!(delegate.created.len(), 4);

        // A fifth distinct address finds no slot and no did_create fires.
        assert!(table.find_or_create(&addr(9), now, &mut delegate).is_none());
        assert_eq!(delegate.created.len(), 4);

        // Existing addresses keep resolving without new create events.
        assert!(table.find_or_create(&addr(2), now, &mut delegate).is_some());
        assert_eq!(delegate.created.len(), 4);
        assert!(table.find(&addr(2)).is_some());
        assert!(table.find(&addr(9)).is_none());
    }

    #[test]
    fn sweep_frees_slots_and_notifies() {
        let mut table: DeviceTable<2> = DeviceTable::new();
        let mut delegate = Recorder::default();
        let expiry = Duration::from_secs(60);

        table.find_or_create(&addr(0), Timestamp::ZERO, &mut delegate);
        table.find_or_create(&addr(1), Timestamp::ZERO, &mut delegate);

        // Keep device 1 alive with a later scan.
        table
            .find_mut(&addr(1))
            .unwrap()
            .scanned(Timestamp::from_secs(30));

        // At exactly last_scan + expiry nothing is evicted yet.
        table.sweep(Timestamp::from_secs(60), expiry, &mut delegate);
        assert_eq!(table.len(), 2);

        table.sweep(Timestamp::from_secs(61), expiry, &mut delegate);
        assert_eq!(table.len(), 1);
        assert_eq!(delegate.deleted, vec![addr(0)]);

        // The freed slot is reusable.
        assert!(table
            .find_or_create(&addr(5), Timestamp::from_secs(61), &mut delegate)
            .is_some());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn retain_devices_deletes_on_true() {
        let mut table: DeviceTable<4> = DeviceTable::new();
        let mut delegate = Recorder::default();
        for n in 0..3 {
            table.find_or_create(&addr(n), Timestamp::ZERO, &mut delegate);
        }

        let mut seen = 0;
        table.retain_devices(|a, _dev| {
            seen += 1;
            *a == addr(1)
        });
        assert_eq!(seen, 3);
        assert_eq!(table.len(), 2);
        assert!(table.find(&addr(1)).is_none());
    }
}
