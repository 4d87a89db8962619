//! # The Augmented Transition Network
//!
//! The frozen state-graph form of a grammar, consumed by the simulators.
//!
//! ## Overview
//!
//! An [`Atn`] is a directed graph of typed [`AtnState`]s connected by typed
//! [`Transition`]s, plus the lookup tables prediction needs: decision
//! states, rule start/stop states, lexer mode entry points, and token-type
//! assignments for lexer rules.
//!
//! The network is built once — by a deserializer or the
//! [`testing`](crate::testing) builder — and is read-only afterwards. The
//! only interior mutability is the shared context-interning cache, which
//! grows monotonically and is safe to use from any number of threads.

pub mod interval;
pub mod semantics;
pub mod state;
pub mod transition;

pub use interval::{Interval, IntervalSet};
pub use semantics::{PredicateEvaluator, SemanticContext};
pub use state::{AtnState, AtnStateKind};
pub use transition::Transition;

use crate::context::{ContextInternMap, PredictionContext};
use crate::sim::lexer::LexerAction;
use compact_str::CompactString;

/// Alternative number reserved as "no alternative".
pub const INVALID_ALT: u32 = 0;

/// Whether the network was compiled from a lexer or a parser grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrammarKind {
    Lexer,
    Parser,
}

/// A frozen grammar automaton.
#[derive(Debug)]
pub struct Atn {
    pub kind: GrammarKind,
    /// All states, indexed by state number.
    pub states: Vec<AtnState>,
    /// Decision index → decision state number.
    pub decision_to_state: Vec<u32>,
    /// Rule index → rule start state number.
    pub rule_to_start_state: Vec<u32>,
    /// Rule index → rule stop state number.
    pub rule_to_stop_state: Vec<u32>,
    /// Lexer mode → tokens-start state number. Empty for parser grammars.
    pub mode_to_start_state: Vec<u32>,
    /// Lexer rule index → emitted token type. Empty for parser grammars.
    pub rule_to_token_type: Vec<i32>,
    /// Largest token type a parser grammar can see.
    pub max_token_type: i32,
    /// Lexer actions referenced by action transitions. Empty for parser
    /// grammars.
    pub lexer_actions: Vec<LexerAction>,
    /// Rule display names for diagnostics.
    pub rule_names: Vec<CompactString>,
    /// Shared hash-consing cache for prediction contexts.
    context_cache: ContextInternMap,
}

impl Atn {
    /// Create an empty network shell. Builders fill the tables and freeze
    /// the result behind an `Arc`.
    #[must_use]
    pub fn new(kind: GrammarKind) -> Self {
        Self {
            kind,
            states: Vec::new(),
            decision_to_state: Vec::new(),
            rule_to_start_state: Vec::new(),
            rule_to_stop_state: Vec::new(),
            mode_to_start_state: Vec::new(),
            rule_to_token_type: Vec::new(),
            max_token_type: 0,
            lexer_actions: Vec::new(),
            rule_names: Vec::new(),
            context_cache: ContextInternMap::new(),
        }
    }

    /// Look up a state by number.
    ///
    /// # Panics
    ///
    /// Panics if `number` is not a state of this network.
    #[must_use]
    pub fn state(&self, number: u32) -> &AtnState {
        &self.states[number as usize]
    }

    /// The decision state heading decision `decision`.
    #[must_use]
    pub fn decision_state(&self, decision: u32) -> &AtnState {
        self.state(self.decision_to_state[decision as usize])
    }

    /// Number of decisions in the grammar.
    #[must_use]
    pub fn num_decisions(&self) -> usize {
        self.decision_to_state.len()
    }

    /// Display name of a rule, when known.
    #[must_use]
    pub fn rule_name(&self, rule: u32) -> &str {
        self.rule_names
            .get(rule as usize)
            .map_or("<rule>", CompactString::as_str)
    }

    /// Intern a context (and all its parents) into the shared cache,
    /// returning the canonical instance.
    #[must_use]
    pub fn cached_context(&self, context: &PredictionContext) -> PredictionContext {
        self.context_cache.intern_deep(context)
    }

    /// The shared interning cache itself.
    #[must_use]
    pub fn context_cache(&self) -> &ContextInternMap {
        &self.context_cache
    }
}
