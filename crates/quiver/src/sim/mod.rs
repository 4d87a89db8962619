//! # ATN Simulators
//!
//! The adaptive prediction engines: [`parser`] for decision prediction
//! with SLL→LL failover, [`lexer`] for longest-match token recognition,
//! and [`profiling`] for per-decision statistics.
//!
//! Both simulators walk the lazily-built [`Dfa`](crate::dfa::Dfa) first
//! and fall back to ATN closure/reach computation on a cache miss,
//! installing what they learn for every later prediction — including
//! predictions run concurrently by other parser instances sharing the
//! same automata.

pub mod lexer;
pub mod parser;
pub mod profiling;

pub use lexer::{
    LexerAction, LexerActionExecutor, LexerActionSink, LexerAtnSimulator, LexerMatch,
};
pub use parser::ParserAtnSimulator;
pub use profiling::{DecisionInfo, ProfilingObserver};

use crate::alt_set::AltBitSet;
use std::sync::Arc;

/// How far prediction is willing to go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PredictionMode {
    /// SLL only; conflicts resolve to the minimum alternative without
    /// consulting the outer context.
    Sll,
    /// SLL with full-context failover on conflict.
    #[default]
    Ll,
    /// Like `Ll`, but ambiguities are pinned down exactly before
    /// reporting.
    LlExactAmbigDetection,
}

/// A snapshot of the simulator at the moment an event fired.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SimulatorSnapshot {
    pub decision: u32,
    /// `true` during the full-context phase.
    pub use_context: bool,
    /// Number of the DFA state at the event, when one was interned.
    pub dfa_state: Option<u32>,
    pub start_index: usize,
    pub stop_index: usize,
}

/// Observation seam for instrumentation.
///
/// The parser simulator calls these around its hot path; all methods
/// default to no-ops, and implementations use interior mutability so a
/// shared observer can serve concurrent predictions.
pub trait PredictionObserver: Send + Sync {
    /// A prediction began.
    fn predict_started(&self, _decision: u32, _start_index: usize) {}

    /// A prediction finished (successfully or not) after `elapsed_nanos`.
    fn predict_finished(&self, _decision: u32, _alt: Option<u32>, _elapsed_nanos: u64) {}

    /// An existing DFA edge was followed.
    fn dfa_transition(&self, _decision: u32, _use_context: bool) {}

    /// A target state had to be computed through the ATN.
    fn atn_transition(&self, _decision: u32, _use_context: bool) {}

    /// The furthest input index consulted so far in the current phase.
    fn lookahead(&self, _decision: u32, _use_context: bool, _stop_index: usize) {}

    /// A semantic predicate was evaluated.
    fn predicate_evaluated(
        &self,
        _snapshot: &SimulatorSnapshot,
        _result: bool,
        _alt: u32,
    ) {
    }

    /// SLL conflicted; full-context prediction is starting.
    fn full_context_fallback(&self, _snapshot: &SimulatorSnapshot, _conflicting_alts: &AltBitSet) {}

    /// Full-context prediction resolved uniquely where SLL conflicted.
    fn context_sensitivity(&self, _snapshot: &SimulatorSnapshot, _prediction: u32) {}

    /// Full-context prediction stayed ambiguous.
    fn ambiguity(&self, _snapshot: &SimulatorSnapshot, _exact: bool, _ambig_alts: &AltBitSet) {}

    /// Prediction failed with no viable alternative.
    fn prediction_error(&self, _snapshot: &SimulatorSnapshot) {}
}

/// A no-op observer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl PredictionObserver for NullObserver {}

/// Caller-supplied cancellation hook, polled between token transitions.
pub type CancellationHook = Arc<dyn Fn() -> bool + Send + Sync>;
