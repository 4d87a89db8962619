//! DFA states: interned sets of ATN configurations with cached transitions.

use crate::alt_set::AltBitSet;
use crate::atn::{SemanticContext, INVALID_ALT};
use crate::config::AtnConfigSet;
use crate::context::EMPTY_FULL_STATE_KEY;
use crate::dfa::edge_map::EdgeMap;
use crate::sim::lexer::LexerActionExecutor;
use parking_lot::{Mutex, RwLock};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Prediction committed by an accept state.
#[derive(Clone, Debug)]
pub struct AcceptStateInfo {
    prediction: u32,
    lexer_action_executor: Option<Arc<LexerActionExecutor>>,
}

impl AcceptStateInfo {
    #[must_use]
    pub fn new(prediction: u32) -> Self {
        Self {
            prediction,
            lexer_action_executor: None,
        }
    }

    #[must_use]
    pub fn with_executor(prediction: u32, executor: Option<Arc<LexerActionExecutor>>) -> Self {
        Self {
            prediction,
            lexer_action_executor: executor,
        }
    }

    /// The alternative (or lexer rule) this accept state predicts.
    #[must_use]
    pub fn prediction(&self) -> u32 {
        self.prediction
    }

    #[must_use]
    pub fn lexer_action_executor(&self) -> Option<&Arc<LexerActionExecutor>> {
        self.lexer_action_executor.as_ref()
    }
}

/// One row of an accept state's predicate table: if `pred` holds, predict
/// `alt`.
#[derive(Clone, Debug)]
pub struct PredPrediction {
    pub pred: SemanticContext,
    pub alt: u32,
}

/// A DFA state: a sealed set of ATN configurations plus lazily-added
/// outgoing edges.
///
/// Identity is defined *solely* by the configuration set. The state number
/// is bookkeeping assigned at interning time and must never participate in
/// equality or hashing — two structurally identical states computed by
/// racing threads compare equal regardless of their numbers.
#[derive(Debug)]
pub struct DfaState {
    /// `u32::MAX` until the state is interned into a DFA.
    state_number: AtomicU32,
    configs: AtnConfigSet,
    /// Symbol → target. Readers take one lock-free-ish snapshot; writers
    /// swap in a rebuilt map.
    edges: RwLock<Arc<EdgeMap<Arc<DfaState>>>>,
    /// Invoking-ATN-state → target, for full-context start-state
    /// specialization.
    context_edges: RwLock<Arc<EdgeMap<Arc<DfaState>>>>,
    accept: RwLock<Option<AcceptStateInfo>>,
    predicates: RwLock<Option<Arc<[PredPrediction]>>>,
    /// Symbols that required a global-context split, offset by the edge
    /// map's minimum. Presence of the set is the context-sensitivity flag.
    context_symbols: Mutex<Option<AltBitSet>>,
}

impl DfaState {
    /// Create a state over a sealed configuration set.
    ///
    /// # Panics
    ///
    /// Panics when the configuration set has not been sealed.
    #[must_use]
    pub fn new(
        configs: AtnConfigSet,
        empty_edges: &Arc<EdgeMap<Arc<DfaState>>>,
        empty_context_edges: &Arc<EdgeMap<Arc<DfaState>>>,
    ) -> Self {
        assert!(configs.is_sealed(), "DFA states store sealed sets only");
        Self {
            state_number: AtomicU32::new(u32::MAX),
            configs,
            edges: RwLock::new(Arc::clone(empty_edges)),
            context_edges: RwLock::new(Arc::clone(empty_context_edges)),
            accept: RwLock::new(None),
            predicates: RwLock::new(None),
            context_symbols: Mutex::new(None),
        }
    }

    /// The sealed configuration set defining this state.
    #[must_use]
    pub fn configs(&self) -> &AtnConfigSet {
        &self.configs
    }

    /// The interned state number, or `u32::MAX` before interning.
    #[must_use]
    pub fn state_number(&self) -> u32 {
        self.state_number.load(Ordering::Relaxed)
    }

    pub(crate) fn assign_state_number(&self, number: u32) {
        self.state_number.store(number, Ordering::Relaxed);
    }

    /// Whether full-context prediction has specialized this state.
    #[must_use]
    pub fn is_context_sensitive(&self) -> bool {
        self.context_symbols.lock().is_some()
    }

    /// Whether `symbol` requires a global-context transition before
    /// matching.
    #[must_use]
    pub fn is_context_symbol(&self, symbol: i32) -> bool {
        let min = self.edges.read().min_index();
        if symbol < min {
            return false;
        }
        self.context_symbols
            .lock()
            .as_ref()
            .is_some_and(|set| set.contains((symbol - min) as u32))
    }

    /// Record that `symbol` required a global-context transition.
    ///
    /// # Panics
    ///
    /// Panics when the state has not been marked context sensitive.
    pub fn set_context_symbol(&self, symbol: i32) {
        let min = self.edges.read().min_index();
        let mut guard = self.context_symbols.lock();
        let set = guard
            .as_mut()
            .expect("state must be marked context sensitive first");
        if symbol < min {
            return;
        }
        set.insert((symbol - min) as u32);
    }

    /// Mark this state context sensitive. Idempotent; the symbol set is
    /// allocated under the state's monitor.
    pub fn set_context_sensitive(&self) {
        debug_assert!(!self.configs.is_outermost());
        let mut guard = self.context_symbols.lock();
        if guard.is_none() {
            *guard = Some(AltBitSet::new());
        }
    }

    #[must_use]
    pub fn accept_state_info(&self) -> Option<AcceptStateInfo> {
        self.accept.read().clone()
    }

    pub fn set_accept_state(&self, info: AcceptStateInfo) {
        *self.accept.write() = Some(info);
    }

    #[must_use]
    pub fn is_accept_state(&self) -> bool {
        self.accept.read().is_some()
    }

    /// The committed alternative, or [`INVALID_ALT`] for non-accept states.
    #[must_use]
    pub fn prediction(&self) -> u32 {
        self.accept
            .read()
            .as_ref()
            .map_or(INVALID_ALT, AcceptStateInfo::prediction)
    }

    #[must_use]
    pub fn lexer_action_executor(&self) -> Option<Arc<LexerActionExecutor>> {
        self.accept
            .read()
            .as_ref()
            .and_then(|info| info.lexer_action_executor().cloned())
    }

    /// The predicate table computed for a semantic-context accept state.
    #[must_use]
    pub fn predicates(&self) -> Option<Arc<[PredPrediction]>> {
        self.predicates.read().clone()
    }

    pub fn set_predicates(&self, predicates: Vec<PredPrediction>) {
        *self.predicates.write() = Some(predicates.into());
    }

    /// Follow the edge for `symbol`, if one has been installed.
    #[must_use]
    pub fn target(&self, symbol: i32) -> Option<Arc<DfaState>> {
        self.edges.read().get(symbol).cloned()
    }

    /// Install an edge. A concurrent reader either sees the old map or the
    /// new one; both are internally consistent.
    pub fn set_target(&self, symbol: i32, target: Arc<DfaState>) {
        let mut guard = self.edges.write();
        *guard = Arc::new(guard.put(symbol, target));
    }

    /// Snapshot of the current symbol edges.
    #[must_use]
    pub fn edge_map(&self) -> Arc<EdgeMap<Arc<DfaState>>> {
        Arc::clone(&self.edges.read())
    }

    /// Follow a context edge keyed on an invoking ATN state.
    /// [`EMPTY_FULL_STATE_KEY`] is folded to the `-1` slot.
    #[must_use]
    pub fn context_target(&self, invoking_state: i32) -> Option<Arc<DfaState>> {
        let key = if invoking_state == EMPTY_FULL_STATE_KEY {
            -1
        } else {
            invoking_state
        };
        self.context_edges.read().get(key).cloned()
    }

    /// Install a context edge.
    ///
    /// # Panics
    ///
    /// Panics when the state has not been marked context sensitive.
    pub fn set_context_target(&self, invoking_state: i32, target: Arc<DfaState>) {
        assert!(
            self.is_context_sensitive(),
            "the state is not context sensitive"
        );
        let key = if invoking_state == EMPTY_FULL_STATE_KEY {
            -1
        } else {
            invoking_state
        };
        let mut guard = self.context_edges.write();
        *guard = Arc::new(guard.put(key, target));
    }

    /// Snapshot of the current context edges.
    #[must_use]
    pub fn context_edge_map(&self) -> Arc<EdgeMap<Arc<DfaState>>> {
        Arc::clone(&self.context_edges.read())
    }
}

impl PartialEq for DfaState {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.configs == other.configs
    }
}

impl Eq for DfaState {}

impl Hash for DfaState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.configs.sealed_hash());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AtnConfig;
    use crate::context::{ContextCache, PredictionContext};

    fn sealed_set(alts: &[u32]) -> AtnConfigSet {
        let mut cache = ContextCache::new();
        let mut set = AtnConfigSet::new();
        for (i, &alt) in alts.iter().enumerate() {
            set.add(
                AtnConfig::new(i as u32, alt, PredictionContext::empty_full()),
                &mut cache,
            );
        }
        set.seal();
        set
    }

    fn empty_edges() -> Arc<EdgeMap<Arc<DfaState>>> {
        Arc::new(EdgeMap::new(-1, 100))
    }

    #[test]
    fn identity_is_config_set_only() {
        let e = empty_edges();
        let a = DfaState::new(sealed_set(&[1, 2]), &e, &e);
        let b = DfaState::new(sealed_set(&[1, 2]), &e, &e);
        a.assign_state_number(0);
        b.assign_state_number(17);

        assert_eq!(a, b);
        let mut ha = std::collections::hash_map::DefaultHasher::new();
        let mut hb = std::collections::hash_map::DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn edges_swap_visibly() {
        let e = empty_edges();
        let a = Arc::new(DfaState::new(sealed_set(&[1]), &e, &e));
        let b = Arc::new(DfaState::new(sealed_set(&[2]), &e, &e));

        let snapshot = a.edge_map();
        a.set_target(5, Arc::clone(&b));

        // the old snapshot is unchanged; fresh reads see the edge
        assert!(snapshot.get(5).is_none());
        assert!(a.target(5).is_some_and(|t| Arc::ptr_eq(&t, &b)));
    }

    #[test]
    fn accept_info_round_trip() {
        let e = empty_edges();
        let s = DfaState::new(sealed_set(&[3]), &e, &e);
        assert!(!s.is_accept_state());
        assert_eq!(s.prediction(), INVALID_ALT);

        s.set_accept_state(AcceptStateInfo::new(3));
        assert!(s.is_accept_state());
        assert_eq!(s.prediction(), 3);
    }

    #[test]
    #[should_panic(expected = "not context sensitive")]
    fn context_target_requires_sensitivity() {
        let e = empty_edges();
        let s = DfaState::new(sealed_set(&[1]), &e, &e);
        let t = Arc::new(DfaState::new(sealed_set(&[2]), &e, &e));
        s.set_context_target(4, t);
    }

    #[test]
    fn context_edges_fold_empty_full_key() {
        let e = empty_edges();
        let s = DfaState::new(sealed_set(&[1]), &e, &e);
        let t = Arc::new(DfaState::new(sealed_set(&[2]), &e, &e));
        s.set_context_sensitive();
        s.set_context_target(EMPTY_FULL_STATE_KEY, Arc::clone(&t));

        assert!(s
            .context_target(EMPTY_FULL_STATE_KEY)
            .is_some_and(|x| Arc::ptr_eq(&x, &t)));
        assert!(s.context_target(-1).is_some_and(|x| Arc::ptr_eq(&x, &t)));
    }

    #[test]
    fn context_symbols_tracked_under_monitor() {
        let e = empty_edges();
        let s = DfaState::new(sealed_set(&[1]), &e, &e);
        s.set_context_sensitive();
        s.set_context_sensitive(); // idempotent

        assert!(!s.is_context_symbol(10));
        s.set_context_symbol(10);
        assert!(s.is_context_symbol(10));
    }
}
