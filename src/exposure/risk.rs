//! Risk models and the risk manager.
//!
//! A risk model is a pure function from static parameters plus aggregated exposures over a
//! window to a sequence of [`RiskScore`]s. Deployments typically define one enum over their
//! registered model types and implement [`RiskModel`] on it by matching, so a single
//! [`RiskManager`] can hold heterogeneous instances without trait objects.
//!
//! The manager tracks which model instances are *dirty* (new exposures arrived that they care
//! about), widens their recompute window to cover the new data, and re-runs `produce` over the
//! window overlapping all previously stored scores. Models talk to storage only through the
//! [`ScoreSink`] handed to them, which injects the instance's metadata; they never see other
//! instances' scores.
//!
//! [`RiskManager`]: struct.RiskManager.html
//! [`RiskModel`]: trait.RiskModel.html
//! [`RiskScore`]: ../type.RiskScore.html
//! [`ScoreSink`]: trait.ScoreSink.html

use super::store::{Aggregation, ExposureSource};
use super::{ArrayMap, Exposure, RiskScore, RiskScoreMetadata, RiskScoreSet, TaggedArray};
use crate::time::{Duration, Timestamp};
use crate::uuid::{agent, parameter, Agent, ModelClass, RiskParameter};
use uuid::Uuid;

/// Static personal factors (age, weight, ...) keyed by parameter UUID.
pub type RiskParameters<const N: usize> = ArrayMap<RiskParameter, f64, N>;

/// Write access to risk score storage, pre-bound to one model instance.
pub trait ScoreSink {
    fn score(&mut self, score: RiskScore);
}

/// A registered risk algorithm.
pub trait RiskModel {
    /// Identifies the algorithm (not the instance).
    fn algorithm_id(&self) -> ModelClass;

    /// Whether a new exposure for `agent` can change this model's output.
    fn potentially_dirty(&self, agent: &Agent, exposure: &Exposure) -> bool;

    /// Recomputes scores for `[start, end)` in `periodicity` steps, pulling aggregates from
    /// `exposures` and pushing one score per period into `sink`. Returns `false` on failure.
    fn produce<SRC: ExposureSource, SINK: ScoreSink, const P: usize>(
        &self,
        parameters: &RiskParameters<P>,
        exposures: &SRC,
        start: Timestamp,
        end: Timestamp,
        periodicity: Duration,
        sink: &mut SINK,
    ) -> bool;
}

/// NOT FOR USE IN PRODUCTION: sample model combining two exposure variables with one static
/// parameter.
///
/// Scores scale linearly with age and summed human proximity, doubling in poor light (a crude
/// indoors approximation). Missing inputs reduce confidence instead of failing.
#[derive(Debug, Default, Copy, Clone)]
pub struct SampleScreeningModel;

impl RiskModel for SampleScreeningModel {
    fn algorithm_id(&self) -> ModelClass {
        ModelClass::new(1)
    }

    fn potentially_dirty(&self, agent: &Agent, _exposure: &Exposure) -> bool {
        *agent == agent::HUMAN_PROXIMITY || *agent == agent::LIGHT_BRIGHTNESS
    }

    fn produce<SRC: ExposureSource, SINK: ScoreSink, const P: usize>(
        &self,
        parameters: &RiskParameters<P>,
        exposures: &SRC,
        start: Timestamp,
        end: Timestamp,
        periodicity: Duration,
        sink: &mut SINK,
    ) -> bool {
        if periodicity == Duration::ZERO {
            return false;
        }
        let mut period_start = start;
        while period_start < end {
            let period_end = period_start + periodicity;

            let mut proximity = Exposure::ZERO;
            exposures.aggregate(
                &agent::HUMAN_PROXIMITY,
                period_start,
                period_end,
                Aggregation::Sum,
                |e| proximity = e,
            );
            let mut light = Exposure::ZERO;
            exposures.aggregate(
                &agent::LIGHT_BRIGHTNESS,
                period_start,
                period_end,
                Aggregation::Maximum,
                |e| light = e,
            );

            let mut confidence = 1.0;
            let age = match parameters.get(&parameter::AGE) {
                Some(age) => *age,
                None => {
                    // Population median as a stand-in.
                    confidence -= 0.25;
                    35.0
                }
            };
            let mut multiplier = 1.0;
            if light.value > 0.0 && light.value < 100.0 {
                multiplier = 2.0;
            }
            if light.value == 0.0 {
                // No light sample in this period.
                confidence -= 0.25;
            }

            sink.score(RiskScore {
                period_start,
                period_end,
                value: multiplier * age * proximity.value,
                confidence,
            });
            period_start = period_end;
        }
        true
    }
}

/// A bounded in-memory risk score store: `TAGS` model instances of up to `N` scores each.
#[derive(Debug, Default, Clone)]
pub struct FixedMemoryRiskStore<const N: usize, const TAGS: usize> {
    scores: RiskScoreSet<N, TAGS>,
}

impl<const N: usize, const TAGS: usize> FixedMemoryRiskStore<N, TAGS> {
    pub fn new() -> Self {
        FixedMemoryRiskStore {
            scores: RiskScoreSet::new(),
        }
    }

    /// Provisions score storage for a model instance.
    pub fn add(&mut self, meta: RiskScoreMetadata) -> bool {
        self.scores.add_tag(meta)
    }

    /// Number of provisioned instances.
    pub fn instance_count(&self) -> usize {
        self.scores.len()
    }

    /// Stores a score for the given instance.
    ///
    /// A recompute emits scores for periods that may already be stored, so a score with a known
    /// `period_start` replaces the stored one instead of piling up. When the array is full a
    /// genuinely new score folds into the most recent one.
    pub fn score(&mut self, meta: &RiskScoreMetadata, score: RiskScore) {
        let array = match self.scores.find_mut(meta) {
            Some(array) => array,
            None => {
                warn!("score for unregistered model instance dropped");
                return;
            }
        };
        if let Some(existing) = array
            .values_mut()
            .iter_mut()
            .find(|s| s.period_start == score.period_start)
        {
            *existing = score;
            return;
        }
        if !array.add(score) {
            if let Some(last) = array.last_mut() {
                *last += score;
            }
        }
    }

    /// Removes an instance and its scores, by instance id.
    pub fn remove(&mut self, instance: &Uuid) -> bool {
        self.scores.remove_by(|tag| tag.instance == *instance)
    }

    fn find_by_instance(
        &self,
        instance: &Uuid,
    ) -> Option<&TaggedArray<RiskScoreMetadata, RiskScore, N>> {
        self.scores.iter().find(|array| array.tag().instance == *instance)
    }

    /// The stored scores for one instance, oldest first.
    pub fn scores_for(&self, instance: &Uuid) -> &[RiskScore] {
        self.find_by_instance(instance)
            .map(|array| array.values())
            .unwrap_or(&[])
    }
}

/// Routes model output into the store under a fixed instance metadata, so models never name
/// (or see) their own storage tag.
struct WrappedScoreSink<'a, const N: usize, const TAGS: usize> {
    store: &'a mut FixedMemoryRiskStore<N, TAGS>,
    meta: RiskScoreMetadata,
}

impl<const N: usize, const TAGS: usize> ScoreSink for WrappedScoreSink<'_, N, TAGS> {
    fn score(&mut self, score: RiskScore) {
        self.store.score(&self.meta, score);
    }
}

struct ModelInstance<M> {
    meta: RiskScoreMetadata,
    model: M,
    dirty: bool,
    window_start: Timestamp,
    window_end: Timestamp,
}

/// Owns the registered model instances, the static parameters and the score store, and re-runs
/// models as exposures arrive.
pub struct RiskManager<M, const INSTANCES: usize, const PARAMS: usize, const SCORES: usize>
where
    M: RiskModel,
{
    models: heapless::Vec<ModelInstance<M>, INSTANCES>,
    parameters: RiskParameters<PARAMS>,
    store: FixedMemoryRiskStore<SCORES, INSTANCES>,
    anchor: Timestamp,
    period: Duration,
}

impl<M, const INSTANCES: usize, const PARAMS: usize, const SCORES: usize>
    RiskManager<M, INSTANCES, PARAMS, SCORES>
where
    M: RiskModel,
{
    /// Creates a manager with the given static parameters and a one-day default periodicity
    /// anchored at the epoch.
    pub fn new(parameters: RiskParameters<PARAMS>) -> Self {
        RiskManager {
            models: heapless::Vec::new(),
            parameters,
            store: FixedMemoryRiskStore::new(),
            anchor: Timestamp::ZERO,
            period: Duration::from_secs(86_400),
        }
    }

    /// Sets the global period anchor and interval used when recomputing scores.
    pub fn set_global_period(&mut self, anchor: Timestamp, interval: Duration) {
        self.anchor = anchor;
        self.period = interval;
    }

    pub fn global_period_anchor(&self) -> Timestamp {
        self.anchor
    }

    pub fn global_period_interval(&self) -> Duration {
        self.period
    }

    /// Registers a model instance for `agent`.
    ///
    /// Re-registering an existing instance id succeeds without change. Fails when either the
    /// instance list or the score store is out of slots.
    pub fn add_risk_model(&mut self, instance: Uuid, agent: Agent, model: M) -> bool {
        if self.models.iter().any(|m| m.meta.instance == instance) {
            return true;
        }
        let meta = RiskScoreMetadata {
            agent,
            algorithm: model.algorithm_id(),
            instance,
        };
        if !self.store.add(meta) {
            return false;
        }
        self.models
            .push(ModelInstance {
                meta,
                model,
                dirty: false,
                window_start: Timestamp::ZERO,
                window_end: Timestamp::ZERO,
            })
            .is_ok()
    }

    /// Whether the given instance is marked dirty.
    pub fn is_dirty(&self, instance: &Uuid) -> Option<bool> {
        self.models
            .iter()
            .find(|m| m.meta.instance == *instance)
            .map(|m| m.dirty)
    }

    /// Number of scores currently stored for the given instance.
    pub fn risk_score_count(&self, instance: &Uuid) -> usize {
        self.store.scores_for(instance).len()
    }

    /// Invokes `cb` for every stored score of the given instance, oldest first. Returns whether
    /// the instance exists.
    pub fn for_each_risk_score(
        &self,
        instance: &Uuid,
        mut cb: impl FnMut(&RiskScoreMetadata, &RiskScore),
    ) -> bool {
        let instance_meta = match self.models.iter().find(|m| m.meta.instance == *instance) {
            Some(m) => m.meta,
            None => return false,
        };
        for score in self.store.scores_for(instance) {
            cb(&instance_meta, score);
        }
        true
    }

    /// Feeds newly stored exposures into the manager.
    ///
    /// Marks every model instance whose output the exposures can affect as dirty and widens its
    /// recompute window; then re-runs each dirty model over the window overlapping all its
    /// stored scores and clears the flag.
    pub fn inject_exposures<SRC: ExposureSource>(
        &mut self,
        src: &SRC,
        source_agent: &Agent,
        exposures: &[Exposure],
    ) -> bool {
        for exposure in exposures {
            for inst in self.models.iter_mut() {
                if !inst.model.potentially_dirty(source_agent, exposure) {
                    continue;
                }
                if inst.dirty {
                    inst.window_start = inst.window_start.min(exposure.period_start);
                    inst.window_end = inst.window_end.max(exposure.period_end);
                } else {
                    inst.dirty = true;
                    inst.window_start = exposure.period_start;
                    inst.window_end = exposure.period_end;
                }
            }
        }

        let mut all_ok = true;
        for index in 0..self.models.len() {
            if !self.models[index].dirty {
                continue;
            }
            let meta = self.models[index].meta;
            let (start, end) = self.overlapping_window(index);
            let mut sink = WrappedScoreSink {
                store: &mut self.store,
                meta,
            };
            let ok = self.models[index].model.produce(
                &self.parameters,
                src,
                start,
                end,
                self.period,
                &mut sink,
            );
            if !ok {
                warn!("risk model produce failed for {:?}", meta.algorithm);
                all_ok = false;
            }
            self.models[index].dirty = false;
        }
        all_ok
    }

    /// The union of the instance's pending window and the windows of all its stored scores.
    fn overlapping_window(&self, index: usize) -> (Timestamp, Timestamp) {
        let inst = &self.models[index];
        let mut start = inst.window_start;
        let mut end = inst.window_end;
        for score in self.store.scores_for(&inst.meta.instance) {
            start = start.min(score.period_start);
            end = end.max(score.period_end);
        }
        (start, end)
    }
}
