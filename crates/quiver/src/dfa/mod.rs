//! # Lazily-built DFAs
//!
//! Each decision (or lexer mode) owns a [`Dfa`]: a concurrent map of
//! [`DfaState`]s interned by configuration-set equality, plus the SLL and
//! full-context start states. States and edges are added as prediction
//! encounters new input; the automaton is shared by every parser instance
//! running the same grammar.
//!
//! Precedence decisions (left-recursive rules) use placeholder start
//! states whose outgoing edges are keyed by the parser's precedence level
//! rather than by input symbols; everything downstream of start-state
//! lookup is oblivious to the difference.

pub mod edge_map;
pub mod state;

pub use edge_map::EdgeMap;
pub use state::{AcceptStateInfo, DfaState, PredPrediction};

use crate::atn::{Atn, AtnStateKind, GrammarKind};
use crate::config::AtnConfigSet;
use crate::stream::EOF;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Precedence levels storable on a precedence DFA's start-state edges.
const MAX_PRECEDENCE_EDGE: i32 = 200;

/// Interning key: delegates identity to the state's configuration set.
struct StateKey(Arc<DfaState>);

impl PartialEq for StateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for StateKey {}

impl Hash for StateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// The DFA for a single decision.
#[derive(Debug)]
pub struct Dfa {
    decision: u32,
    /// The ATN state this DFA was created from.
    atn_start_state: u32,
    precedence_dfa: bool,

    /// All interned states, for both SLL and full-context prediction.
    states: DashMap<StateKey, Arc<DfaState>>,
    next_state_number: AtomicU32,

    /// SLL start state; for precedence DFAs, a placeholder reached through
    /// precedence-keyed edges.
    s0: RwLock<Option<Arc<DfaState>>>,
    /// Full-context start state.
    s0_full: RwLock<Option<Arc<DfaState>>>,

    empty_edge_map: Arc<EdgeMap<Arc<DfaState>>>,
    empty_context_edge_map: Arc<EdgeMap<Arc<DfaState>>>,
}

impl std::fmt::Debug for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateKey({})", self.0.state_number())
    }
}

impl Dfa {
    /// Create the DFA for `decision`, rooted at `atn_start_state`.
    ///
    /// Symbol-edge bounds come from the grammar kind: lexer DFAs cache
    /// edges for a compact code-point prefix, parser DFAs for
    /// `[EOF, max_token_type]`. Symbols outside the bounds always
    /// recompute their transition.
    #[must_use]
    pub fn new(atn: &Atn, atn_start_state: u32, decision: u32) -> Self {
        let (min_edge, max_edge) = match atn.kind {
            GrammarKind::Lexer => (
                crate::sim::lexer::MIN_DFA_EDGE,
                crate::sim::lexer::MAX_DFA_EDGE,
            ),
            GrammarKind::Parser => (EOF, atn.max_token_type),
        };
        let empty_edge_map = Arc::new(EdgeMap::new(min_edge, max_edge));
        let empty_context_edge_map =
            Arc::new(EdgeMap::new(-1, atn.states.len() as i32 - 1));

        let start = atn.state(atn_start_state);
        let precedence_dfa =
            start.kind == AtnStateKind::StarLoopEntry && start.precedence_rule_decision;

        let dfa = Self {
            decision,
            atn_start_state,
            precedence_dfa,
            states: DashMap::new(),
            next_state_number: AtomicU32::new(0),
            s0: RwLock::new(None),
            s0_full: RwLock::new(None),
            empty_edge_map,
            empty_context_edge_map,
        };

        if precedence_dfa {
            // placeholder start states dispatch on precedence level
            let precedence_edges: Arc<EdgeMap<Arc<DfaState>>> =
                Arc::new(EdgeMap::new(0, MAX_PRECEDENCE_EDGE));
            let mut s0_configs = AtnConfigSet::new();
            s0_configs.seal();
            let mut s0_full_configs = AtnConfigSet::new();
            s0_full_configs.seal();
            *dfa.s0.write() = Some(Arc::new(DfaState::new(
                s0_configs,
                &precedence_edges,
                &dfa.empty_context_edge_map,
            )));
            *dfa.s0_full.write() = Some(Arc::new(DfaState::new(
                s0_full_configs,
                &precedence_edges,
                &dfa.empty_context_edge_map,
            )));
        }

        dfa
    }

    #[must_use]
    pub fn decision(&self) -> u32 {
        self.decision
    }

    #[must_use]
    pub fn atn_start_state(&self) -> u32 {
        self.atn_start_state
    }

    #[must_use]
    pub fn is_precedence_dfa(&self) -> bool {
        self.precedence_dfa
    }

    #[must_use]
    pub fn min_dfa_edge(&self) -> i32 {
        self.empty_edge_map.min_index()
    }

    #[must_use]
    pub fn max_dfa_edge(&self) -> i32 {
        self.empty_edge_map.max_index()
    }

    /// The shared empty symbol-edge map used to initialize new states.
    #[must_use]
    pub fn empty_edge_map(&self) -> &Arc<EdgeMap<Arc<DfaState>>> {
        &self.empty_edge_map
    }

    /// The shared empty context-edge map used to initialize new states.
    #[must_use]
    pub fn empty_context_edge_map(&self) -> &Arc<EdgeMap<Arc<DfaState>>> {
        &self.empty_context_edge_map
    }

    /// Intern a freshly computed state.
    ///
    /// The state receives the next sequential number before the
    /// put-if-absent; when an equal state already exists it is returned
    /// instead and the number is simply skipped.
    #[must_use]
    pub fn add_state(&self, state: DfaState) -> Arc<DfaState> {
        state.assign_state_number(self.next_state_number.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(state);
        let entry = self
            .states
            .entry(StateKey(Arc::clone(&state)))
            .or_insert_with(|| Arc::clone(&state));
        Arc::clone(entry.value())
    }

    /// Number of interned states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// The start state for the given prediction flavor.
    #[must_use]
    pub fn start_state(&self, full_context: bool) -> Option<Arc<DfaState>> {
        let slot = if full_context { &self.s0_full } else { &self.s0 };
        slot.read().clone()
    }

    /// Install a start state; when another thread won the race, its state
    /// is returned instead.
    pub fn set_start_state(&self, full_context: bool, state: Arc<DfaState>) -> Arc<DfaState> {
        let slot = if full_context { &self.s0_full } else { &self.s0 };
        let mut guard = slot.write();
        match &*guard {
            Some(existing) => Arc::clone(existing),
            None => {
                *guard = Some(Arc::clone(&state));
                state
            }
        }
    }

    /// Start state for a precedence level.
    ///
    /// # Panics
    ///
    /// Panics when this is not a precedence DFA.
    #[must_use]
    pub fn precedence_start_state(
        &self,
        precedence: u32,
        full_context: bool,
    ) -> Option<Arc<DfaState>> {
        assert!(
            self.precedence_dfa,
            "only precedence DFAs have precedence start states"
        );
        let slot = if full_context { &self.s0_full } else { &self.s0 };
        let guard = slot.read();
        guard
            .as_ref()
            .and_then(|placeholder| placeholder.target(precedence as i32))
    }

    /// Install the start state for a precedence level. Out-of-range levels
    /// are dropped by the placeholder's edge map and recomputed every
    /// prediction.
    ///
    /// # Panics
    ///
    /// Panics when this is not a precedence DFA.
    pub fn set_precedence_start_state(
        &self,
        precedence: u32,
        full_context: bool,
        start_state: Arc<DfaState>,
    ) {
        assert!(
            self.precedence_dfa,
            "only precedence DFAs have precedence start states"
        );
        let slot = if full_context { &self.s0_full } else { &self.s0 };
        let guard = slot.read();
        if let Some(placeholder) = guard.as_ref() {
            placeholder.set_target(precedence as i32, start_state);
        }
    }

    /// Whether prediction has stored anything here yet.
    #[must_use]
    pub fn is_dfa_empty(&self) -> bool {
        if self.precedence_dfa {
            return self
                .start_state(false)
                .is_none_or(|s| s.edge_map().is_empty())
                && self
                    .start_state(true)
                    .is_none_or(|s| s.edge_map().is_empty());
        }
        self.start_state(false).is_none() && self.start_state(true).is_none()
    }

    /// Whether full-context prediction has ever been needed.
    #[must_use]
    pub fn is_context_sensitive(&self) -> bool {
        if self.precedence_dfa {
            return self
                .start_state(true)
                .is_some_and(|s| !s.edge_map().is_empty());
        }
        self.start_state(true).is_some()
    }

    /// Human-readable dump of the automaton for diagnostics. No format
    /// stability is promised.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut states: Vec<Arc<DfaState>> = self
            .states
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        states.sort_by_key(|s| s.state_number());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "decision {} ({} states{})",
            self.decision,
            states.len(),
            if self.precedence_dfa {
                ", precedence"
            } else {
                ""
            }
        );
        for state in states {
            let accept = if state.is_accept_state() {
                format!(" => {}", state.prediction())
            } else {
                String::new()
            };
            let _ = writeln!(out, "s{}{}", state.state_number(), accept);
            for (symbol, target) in state.edge_map().to_sorted_vec() {
                let _ = writeln!(out, "  {} -> s{}", symbol, target.state_number());
            }
            for (invoking, target) in state.context_edge_map().to_sorted_vec() {
                let _ = writeln!(out, "  ctx<{}> -> s{}", invoking, target.state_number());
            }
        }
        out
    }
}
