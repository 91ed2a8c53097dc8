//! The exposure and risk aggregation engine.
//!
//! Proximity samples (and samples from any other sensor feeding the same device) are stored as
//! [`Exposure`]s: aggregated values over a time window, tagged by `(agent, sensor class, sensor
//! instance)`. Registered [`risk`] models consume exposures through an aggregating source and
//! produce [`RiskScore`]s per agent and algorithm.
//!
//! Everything is fixed-capacity: tagged sample arrays live in the bounded containers of
//! [`array`], sized by const generics.
//!
//! [`Exposure`]: type.Exposure.html
//! [`RiskScore`]: type.RiskScore.html
//! [`array`]: array/index.html
//! [`risk`]: risk/index.html

pub mod array;
pub mod risk;
pub mod store;

pub use self::array::{ArrayMap, TaggedArray, TaggedArraySet};

use crate::time::Timestamp;
use crate::uuid::{Agent, ModelClass, SensorClass};
use core::ops::{Add, AddAssign};
use uuid::Uuid;

/// The data items common to exposures and risk scores: a value with a confidence over a time
/// window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Score {
    pub period_start: Timestamp,
    pub period_end: Timestamp,
    pub value: f64,
    /// Confidence in `value`, in `[0, 1]`.
    pub confidence: f64,
}

impl Score {
    /// A zero-valued score spanning the empty window at the epoch.
    pub const ZERO: Score = Score {
        period_start: Timestamp::ZERO,
        period_end: Timestamp::ZERO,
        value: 0.0,
        confidence: 1.0,
    };
}

impl Default for Score {
    fn default() -> Self {
        Score::ZERO
    }
}

/// Adding scores yields the union of the time windows, the summed value, and the lower of the
/// two confidences.
impl Add for Score {
    type Output = Score;

    fn add(self, other: Score) -> Score {
        Score {
            period_start: self.period_start.min(other.period_start),
            period_end: self.period_end.max(other.period_end),
            value: self.value + other.value,
            confidence: if other.confidence < self.confidence {
                other.confidence
            } else {
                self.confidence
            },
        }
    }
}

impl AddAssign for Score {
    fn add_assign(&mut self, other: Score) {
        *self = *self + other;
    }
}

/// A measured exposure to an agent over a time window.
///
/// This is not a raw sample: a run of RSSI readings aggregates into, say, a metre-minute score
/// before it is stored here.
pub type Exposure = Score;

/// A calculated risk score over a time window.
pub type RiskScore = Score;

/// Identifies one stream of exposure values.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExposureMetadata {
    /// What phenomenon was measured.
    pub agent: Agent,
    /// What kind of sensor measured it.
    pub sensor_class: SensorClass,
    /// Which concrete sensor measured it.
    pub sensor_instance: Uuid,
}

/// Identifies one stream of risk score values.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RiskScoreMetadata {
    /// The agent the risk estimate concerns (not necessarily an agent that was measured).
    pub agent: Agent,
    /// The algorithm that produced the scores.
    pub algorithm: ModelClass,
    /// The registered model instance.
    pub instance: Uuid,
}

/// Exposure values grouped under one metadata tag.
pub type ExposureArray<const N: usize> = TaggedArray<ExposureMetadata, Exposure, N>;

/// A set of exposure streams.
pub type ExposureSet<const N: usize, const TAGS: usize> =
    TaggedArraySet<ExposureMetadata, Exposure, N, TAGS>;

/// Risk score values grouped under one metadata tag.
pub type RiskScoreArray<const N: usize> = TaggedArray<RiskScoreMetadata, RiskScore, N>;

/// A set of risk score streams.
pub type RiskScoreSet<const N: usize, const TAGS: usize> =
    TaggedArraySet<RiskScoreMetadata, RiskScore, N, TAGS>;

#[cfg(test)]
mod tests {
    use super::*;

    fn score(start: u64, end: u64, value: f64, confidence: f64) -> Score {
        Score {
            period_start: Timestamp::from_secs(start),
            period_end: Timestamp::from_secs(end),
            value,
            confidence,
        }
    }

    #[test]
    fn addition_law() {
        let sum = score(100, 200, 1.5, 1.0) + score(150, 400, 2.0, 0.5);
        assert_eq!(sum, score(100, 400, 3.5, 0.5));
    }

    #[test]
    fn addition_is_commutative() {
        let a = score(0, 10, 1.0, 0.8);
        let b = score(5, 20, 2.0, 0.9);
        assert_eq!(a + b, b + a);
    }
}
