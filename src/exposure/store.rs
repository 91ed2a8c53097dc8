//! The in-memory exposure store and the aggregation interface models consume it through.
//!
//! Risk models never hold references to individual exposures; they request aggregates over a
//! window through [`ExposureSource::aggregate`]. This keeps models pure and lets the store
//! evict or compact samples freely.
//!
//! [`ExposureSource::aggregate`]: trait.ExposureSource.html#tymethod.aggregate

use super::{Exposure, ExposureMetadata, ExposureSet};
use crate::time::Timestamp;
use crate::uuid::Agent;
use uuid::Uuid;

/// How a window of exposure values is collapsed into one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Aggregation {
    /// Sum of the values (metre-minutes over an hour, say).
    Sum,
    /// Largest single value.
    Maximum,
    /// Arithmetic mean of the values.
    Mean,
}

/// Read access to stored exposures, aggregated per agent and window.
pub trait ExposureSource {
    /// Aggregates all exposures for `agent` overlapping `[start, end)` and passes the result to
    /// `cb`. The callback is not invoked when no sample overlaps the window.
    fn aggregate(
        &self,
        agent: &Agent,
        start: Timestamp,
        end: Timestamp,
        aggregation: Aggregation,
        cb: impl FnMut(Exposure),
    );
}

/// A bounded in-memory exposure store: `TAGS` sources of up to `N` samples each.
#[derive(Debug, Default, Clone)]
pub struct FixedMemoryExposureStore<const N: usize, const TAGS: usize> {
    exposures: ExposureSet<N, TAGS>,
}

impl<const N: usize, const TAGS: usize> FixedMemoryExposureStore<N, TAGS> {
    pub fn new() -> Self {
        FixedMemoryExposureStore {
            exposures: ExposureSet::new(),
        }
    }

    /// Provisions storage for the given source. Returns `false` when all tag slots are taken.
    pub fn add_source(&mut self, meta: ExposureMetadata) -> bool {
        self.exposures.add_tag(meta)
    }

    /// Number of provisioned sources.
    pub fn source_count(&self) -> usize {
        self.exposures.len()
    }

    /// Records an exposure against its source.
    ///
    /// The source must have been provisioned. When the sample array is full the new exposure is
    /// folded into the most recent one using the additive law (union window, summed value,
    /// minimum confidence), which is the live-updating behavior of a one-slot array.
    pub fn add_exposure(&mut self, meta: &ExposureMetadata, exposure: Exposure) -> bool {
        let array = match self.exposures.find_mut(meta) {
            Some(array) => array,
            None => return false,
        };
        if array.add(exposure) {
            return true;
        }
        match array.last_mut() {
            Some(last) => {
                *last += exposure;
                true
            }
            None => false,
        }
    }

    /// Removes a source and all its samples, by sensor instance id.
    pub fn remove_source(&mut self, sensor_instance: &Uuid) -> bool {
        self.exposures
            .remove_by(|tag| tag.sensor_instance == *sensor_instance)
    }

    /// The stored samples for one source, oldest first.
    pub fn samples(&self, meta: &ExposureMetadata) -> &[Exposure] {
        self.exposures
            .find(meta)
            .map(|array| array.values())
            .unwrap_or(&[])
    }
}

impl<const N: usize, const TAGS: usize> ExposureSource for FixedMemoryExposureStore<N, TAGS> {
    fn aggregate(
        &self,
        agent: &Agent,
        start: Timestamp,
        end: Timestamp,
        aggregation: Aggregation,
        mut cb: impl FnMut(Exposure),
    ) {
        let mut result: Option<(Exposure, u32)> = None;
        for array in self.exposures.iter() {
            if array.tag().agent != *agent {
                continue;
            }
            for sample in array.values() {
                // Keep samples overlapping [start, end).
                if sample.period_end <= start || sample.period_start >= end {
                    continue;
                }
                result = Some(match result {
                    None => (*sample, 1),
                    Some((acc, count)) => {
                        let combined = match aggregation {
                            Aggregation::Sum | Aggregation::Mean => acc + *sample,
                            Aggregation::Maximum => {
                                let mut merged = acc + *sample;
                                merged.value = if sample.value > acc.value {
                                    sample.value
                                } else {
                                    acc.value
                                };
                                merged
                            }
                        };
                        (combined, count + 1)
                    }
                });
            }
        }
        if let Some((mut aggregated, count)) = result {
            if aggregation == Aggregation::Mean {
                aggregated.value /= f64::from(count);
            }
            cb(aggregated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::{agent, sensor_class};

    fn meta() -> ExposureMetadata {
        ExposureMetadata {
            agent: agent::HUMAN_PROXIMITY,
            sensor_class: sensor_class::BLUETOOTH_PROXIMITY_HERALD,
            sensor_instance: Uuid::from_bytes([9; 16]),
        }
    }

    fn exposure(start: u64, end: u64, value: f64) -> Exposure {
        Exposure {
            period_start: Timestamp::from_secs(start),
            period_end: Timestamp::from_secs(end),
            value,
            confidence: 1.0,
        }
    }

    type Store = FixedMemoryExposureStore<4, 2>;

    #[test]
    fn recording_requires_provisioning() {
        let mut store = Store::new();
        assert!(!store.add_exposure(&meta(), exposure(0, 60, 1.0)));
        assert!(store.add_source(meta()));
        assert!(store.add_exposure(&meta(), exposure(0, 60, 1.0)));
        assert_eq!(store.samples(&meta()).len(), 1);
    }

    #[test]
    fn full_array_folds_into_last() {
        let mut store: FixedMemoryExposureStore<2, 1> = FixedMemoryExposureStore::new();
        store.add_source(meta());
        store.add_exposure(&meta(), exposure(0, 60, 1.0));
        store.add_exposure(&meta(), exposure(60, 120, 2.0));
        store.add_exposure(&meta(), exposure(120, 180, 3.0));

        let samples = store.samples(&meta());
        assert_eq!(samples.len(), 2);
        // The third sample merged into the second: union window, summed value.
        assert_eq!(samples[1].value, 5.0);
        assert_eq!(samples[1].period_start, Timestamp::from_secs(60));
        assert_eq!(samples[1].period_end, Timestamp::from_secs(180));
    }

    #[test]
    fn aggregate_sum_and_maximum() {
        let mut store = Store::new();
        store.add_source(meta());
        store.add_exposure(&meta(), exposure(0, 60, 1.0));
        store.add_exposure(&meta(), exposure(60, 120, 4.0));
        store.add_exposure(&meta(), exposure(120, 180, 2.0));

        let mut sum = None;
        store.aggregate(
            &agent::HUMAN_PROXIMITY,
            Timestamp::ZERO,
            Timestamp::from_secs(180),
            Aggregation::Sum,
            |e| sum = Some(e),
        );
        assert_eq!(sum.unwrap().value, 7.0);

        let mut max = None;
        store.aggregate(
            &agent::HUMAN_PROXIMITY,
            Timestamp::ZERO,
            Timestamp::from_secs(180),
            Aggregation::Maximum,
            |e| max = Some(e),
        );
        assert_eq!(max.unwrap().value, 4.0);

        let mut mean = None;
        store.aggregate(
            &agent::HUMAN_PROXIMITY,
            Timestamp::ZERO,
            Timestamp::from_secs(180),
            Aggregation::Mean,
            |e| mean = Some(e),
        );
        assert!((mean.unwrap().value - 7.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn aggregate_respects_window_and_agent() {
        let mut store = Store::new();
        store.add_source(meta());
        store.add_exposure(&meta(), exposure(0, 60, 1.0));
        store.add_exposure(&meta(), exposure(300, 360, 8.0));

        // Only the first sample overlaps [0, 120).
        let mut seen = None;
        store.aggregate(
            &agent::HUMAN_PROXIMITY,
            Timestamp::ZERO,
            Timestamp::from_secs(120),
            Aggregation::Sum,
            |e| seen = Some(e),
        );
        assert_eq!(seen.unwrap().value, 1.0);

        // No luminosity source exists: the callback must not fire.
        let mut called = false;
        store.aggregate(
            &agent::LIGHT_BRIGHTNESS,
            Timestamp::ZERO,
            Timestamp::from_secs(600),
            Aggregation::Sum,
            |_| called = true,
        );
        assert!(!called);
    }

    #[test]
    fn remove_source_by_instance() {
        let mut store = Store::new();
        store.add_source(meta());
        assert!(store.remove_source(&Uuid::from_bytes([9; 16])));
        assert!(!store.remove_source(&Uuid::from_bytes([9; 16])));
        assert_eq!(store.source_count(), 0);
    }
}
