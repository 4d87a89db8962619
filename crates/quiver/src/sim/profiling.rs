//! Per-decision prediction statistics.
//!
//! [`ProfilingObserver`] plugs into the parser simulator's observation
//! seam and aggregates one [`DecisionInfo`] per decision: invocation and
//! timing totals, SLL/LL lookahead extremes, DFA-vs-ATN transition
//! counts, and event records (predicate evaluations, fallbacks,
//! ambiguities, context sensitivities, errors) each embedding a snapshot
//! of the simulator at the moment the event fired.

use crate::alt_set::AltBitSet;
use crate::sim::{PredictionObserver, SimulatorSnapshot};
use parking_lot::Mutex;

/// A recorded semantic predicate evaluation.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct PredicateEvalInfo {
    pub snapshot: SimulatorSnapshot,
    pub result: bool,
    /// The alternative the predicate guards.
    pub alt: u32,
}

/// A recorded SLL→LL fallback.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct FallbackInfo {
    pub snapshot: SimulatorSnapshot,
    pub conflicting_alts: Vec<u32>,
}

/// A recorded ambiguity.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AmbiguityInfo {
    pub snapshot: SimulatorSnapshot,
    pub exact: bool,
    pub ambig_alts: Vec<u32>,
}

/// A recorded context sensitivity.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ContextSensitivityInfo {
    pub snapshot: SimulatorSnapshot,
    pub prediction: u32,
}

/// A recorded prediction failure.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ErrorInfo {
    pub snapshot: SimulatorSnapshot,
}

/// Aggregated statistics for one decision.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct DecisionInfo {
    pub decision: u32,
    pub invocations: u64,
    /// Total prediction time, monotonic nanoseconds.
    pub time_in_prediction_ns: u64,

    pub sll_total_look: u64,
    pub sll_min_look: u64,
    pub sll_max_look: u64,
    pub ll_total_look: u64,
    pub ll_min_look: u64,
    pub ll_max_look: u64,

    pub sll_dfa_transitions: u64,
    pub sll_atn_transitions: u64,
    pub ll_dfa_transitions: u64,
    pub ll_atn_transitions: u64,
    /// Number of SLL conflicts that escalated to full context.
    pub ll_fallback: u64,

    pub predicate_evals: Vec<PredicateEvalInfo>,
    pub fallbacks: Vec<FallbackInfo>,
    pub ambiguities: Vec<AmbiguityInfo>,
    pub context_sensitivities: Vec<ContextSensitivityInfo>,
    pub errors: Vec<ErrorInfo>,
}

#[derive(Default)]
struct InFlight {
    start_index: usize,
    sll_stop_index: Option<usize>,
    ll_stop_index: Option<usize>,
}

/// A [`PredictionObserver`] that aggregates [`DecisionInfo`] records.
///
/// Counters are guarded by a single mutex; contention is negligible next
/// to the prediction work being measured.
#[derive(Default)]
pub struct ProfilingObserver {
    decisions: Mutex<Vec<DecisionInfo>>,
    in_flight: Mutex<InFlight>,
}

impl ProfilingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the statistics gathered so far, indexed by decision.
    #[must_use]
    pub fn decision_info(&self) -> Vec<DecisionInfo> {
        self.decisions.lock().clone()
    }

    fn with_decision(&self, decision: u32, f: impl FnOnce(&mut DecisionInfo)) {
        let mut decisions = self.decisions.lock();
        let index = decision as usize;
        if decisions.len() <= index {
            decisions.resize_with(index + 1, DecisionInfo::default);
        }
        let info = &mut decisions[index];
        info.decision = decision;
        f(info);
    }
}

impl PredictionObserver for ProfilingObserver {
    fn predict_started(&self, _decision: u32, start_index: usize) {
        let mut in_flight = self.in_flight.lock();
        in_flight.start_index = start_index;
        in_flight.sll_stop_index = None;
        in_flight.ll_stop_index = None;
    }

    fn predict_finished(&self, decision: u32, _alt: Option<u32>, elapsed_nanos: u64) {
        let (sll_stop, ll_stop, start) = {
            let in_flight = self.in_flight.lock();
            (
                in_flight.sll_stop_index,
                in_flight.ll_stop_index,
                in_flight.start_index,
            )
        };
        self.with_decision(decision, |info| {
            info.invocations += 1;
            info.time_in_prediction_ns = info.time_in_prediction_ns.saturating_add(elapsed_nanos);

            if let Some(stop) = sll_stop {
                let k = (stop - start) as u64 + 1;
                info.sll_total_look += k;
                info.sll_min_look = if info.sll_min_look == 0 {
                    k
                } else {
                    info.sll_min_look.min(k)
                };
                info.sll_max_look = info.sll_max_look.max(k);
            }
            if let Some(stop) = ll_stop {
                let k = (stop - start) as u64 + 1;
                info.ll_total_look += k;
                info.ll_min_look = if info.ll_min_look == 0 {
                    k
                } else {
                    info.ll_min_look.min(k)
                };
                info.ll_max_look = info.ll_max_look.max(k);
            }
        });
    }

    fn dfa_transition(&self, decision: u32, use_context: bool) {
        self.with_decision(decision, |info| {
            if use_context {
                info.ll_dfa_transitions += 1;
            } else {
                info.sll_dfa_transitions += 1;
            }
        });
    }

    fn atn_transition(&self, decision: u32, use_context: bool) {
        self.with_decision(decision, |info| {
            if use_context {
                info.ll_atn_transitions += 1;
            } else {
                info.sll_atn_transitions += 1;
            }
        });
    }

    fn lookahead(&self, _decision: u32, use_context: bool, stop_index: usize) {
        let mut in_flight = self.in_flight.lock();
        if use_context {
            in_flight.ll_stop_index = Some(stop_index);
        } else {
            in_flight.sll_stop_index = Some(stop_index);
        }
    }

    fn predicate_evaluated(&self, snapshot: &SimulatorSnapshot, result: bool, alt: u32) {
        self.with_decision(snapshot.decision, |info| {
            info.predicate_evals.push(PredicateEvalInfo {
                snapshot: snapshot.clone(),
                result,
                alt,
            });
        });
    }

    fn full_context_fallback(&self, snapshot: &SimulatorSnapshot, conflicting_alts: &AltBitSet) {
        self.with_decision(snapshot.decision, |info| {
            info.ll_fallback += 1;
            info.fallbacks.push(FallbackInfo {
                snapshot: snapshot.clone(),
                conflicting_alts: conflicting_alts.iter().collect(),
            });
        });
    }

    fn context_sensitivity(&self, snapshot: &SimulatorSnapshot, prediction: u32) {
        self.with_decision(snapshot.decision, |info| {
            info.context_sensitivities.push(ContextSensitivityInfo {
                snapshot: snapshot.clone(),
                prediction,
            });
        });
    }

    fn ambiguity(&self, snapshot: &SimulatorSnapshot, exact: bool, ambig_alts: &AltBitSet) {
        self.with_decision(snapshot.decision, |info| {
            info.ambiguities.push(AmbiguityInfo {
                snapshot: snapshot.clone(),
                exact,
                ambig_alts: ambig_alts.iter().collect(),
            });
        });
    }

    fn prediction_error(&self, snapshot: &SimulatorSnapshot) {
        self.with_decision(snapshot.decision, |info| {
            info.errors.push(ErrorInfo {
                snapshot: snapshot.clone(),
            });
        });
    }
}
