//! Adaptive decision prediction: SLL simulation with full-context LL
//! failover.

use crate::alt_set::AltBitSet;
use crate::atn::{
    Atn, GrammarKind, PredicateEvaluator, SemanticContext, Transition, INVALID_ALT,
};
use crate::config::{AtnConfig, AtnConfigSet, ConflictInfo};
use crate::context::{
    ContextCache, PredictionContext, RuleCall, EMPTY_FULL_STATE_KEY,
};
use crate::dfa::{AcceptStateInfo, Dfa, DfaState, PredPrediction};
use crate::error::PredictionError;
use crate::listener::{PredictionListener, ProxyListener, ReportContext};
use crate::sim::{CancellationHook, NullObserver, PredictionMode, PredictionObserver, SimulatorSnapshot};
use crate::stream::{SymbolStream, EOF};
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Structural grouping key over a configuration's context.
struct CtxKey(PredictionContext);

impl PartialEq for CtxKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for CtxKey {}

impl std::hash::Hash for CtxKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.context_hash());
    }
}

enum SllOutcome {
    Alt(u32),
    Conflict {
        state: Arc<DfaState>,
        alts: AltBitSet,
        stop_index: usize,
    },
}

/// The parser's adaptive prediction engine.
///
/// One simulator per grammar is enough: the DFAs it builds are shared, and
/// every method takes `&self`. Per-prediction mutable state (config-set
/// builders, the context memo) lives on the call stack.
pub struct ParserAtnSimulator {
    atn: Arc<Atn>,
    dfas: Arc<[Dfa]>,
    mode: PredictionMode,
    report_ambiguities: bool,
    listeners: ProxyListener,
    observer: Arc<dyn PredictionObserver>,
    cancellation: Option<CancellationHook>,
}

impl ParserAtnSimulator {
    /// Build a simulator (and a DFA per decision) for a parser ATN.
    ///
    /// # Panics
    ///
    /// Panics when the ATN is not a parser ATN.
    #[must_use]
    pub fn new(atn: Arc<Atn>) -> Self {
        assert_eq!(
            atn.kind,
            GrammarKind::Parser,
            "parser simulator needs a parser ATN"
        );
        let dfas: Vec<Dfa> = atn
            .decision_to_state
            .iter()
            .enumerate()
            .map(|(decision, &start)| Dfa::new(&atn, start, decision as u32))
            .collect();
        Self {
            atn,
            dfas: dfas.into(),
            mode: PredictionMode::default(),
            report_ambiguities: true,
            listeners: ProxyListener::new(),
            observer: Arc::new(NullObserver),
            cancellation: None,
        }
    }

    /// Share another simulator's DFAs — the shape used by concurrent
    /// parser instances over one grammar.
    #[must_use]
    pub fn with_shared_dfas(atn: Arc<Atn>, dfas: Arc<[Dfa]>) -> Self {
        let mut sim = Self::new(atn);
        sim.dfas = dfas;
        sim
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PredictionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PredictionObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, hook: CancellationHook) -> Self {
        self.cancellation = Some(hook);
        self
    }

    /// Suppress ambiguity reports to listeners (conflict resolution is
    /// unaffected).
    #[must_use]
    pub fn without_ambiguity_reports(mut self) -> Self {
        self.report_ambiguities = false;
        self
    }

    /// The per-decision DFAs.
    #[must_use]
    pub fn dfas(&self) -> &Arc<[Dfa]> {
        &self.dfas
    }

    #[must_use]
    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    #[must_use]
    pub fn mode(&self) -> PredictionMode {
        self.mode
    }

    /// Listener registration.
    pub fn attach_listener(&self, listener: Arc<dyn PredictionListener>) {
        self.listeners.attach(listener);
    }

    pub fn detach_listener(&self, listener: &Arc<dyn PredictionListener>) {
        self.listeners.detach(listener);
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Predict which alternative of `decision` the input selects.
    ///
    /// The stream is restored to its entry position before returning;
    /// repeated calls with the same input are deterministic, the only side
    /// effect being DFA growth.
    ///
    /// # Errors
    ///
    /// [`PredictionError::NoViableAlternative`] when no alternative
    /// matches (or every alternative's predicate failed), and
    /// [`PredictionError::Cancelled`] when the cancellation hook fired.
    pub fn adaptive_predict(
        &self,
        input: &mut dyn SymbolStream,
        decision: u32,
        outer_context: Option<&Arc<RuleCall>>,
        evaluator: &dyn PredicateEvaluator,
    ) -> Result<u32, PredictionError> {
        let start_index = input.index();
        let marker = input.mark();
        self.observer.predict_started(decision, start_index);
        let started = Instant::now();

        let result =
            self.predict_inner(input, decision, outer_context, evaluator, start_index);

        input.seek(start_index);
        input.release(marker);
        let elapsed = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.observer
            .predict_finished(decision, result.as_ref().ok().copied(), elapsed);
        if let Err(error) = &result {
            self.observer.prediction_error(&SimulatorSnapshot {
                decision,
                use_context: false,
                dfa_state: None,
                start_index,
                stop_index: error.index().unwrap_or(start_index),
            });
            self.listeners.syntax_error(error);
        }
        result
    }

    fn predict_inner(
        &self,
        input: &mut dyn SymbolStream,
        decision: u32,
        outer_context: Option<&Arc<RuleCall>>,
        evaluator: &dyn PredicateEvaluator,
        start_index: usize,
    ) -> Result<u32, PredictionError> {
        let dfa = &self.dfas[decision as usize];
        let mut cache = ContextCache::new();

        let s0 = self.sll_start_state(dfa, evaluator, &mut cache)?;
        trace!(decision, start_index, "predicting (sll)");

        match self.exec_sll(dfa, s0, input, start_index, decision, evaluator, &mut cache)? {
            SllOutcome::Alt(alt) => Ok(alt),
            SllOutcome::Conflict {
                state,
                mut alts,
                stop_index,
            } => {
                // predicates may resolve the conflict without outer context
                if let Some(rows) = state.predicates() {
                    let conflict_index = input.index();
                    input.seek(start_index);
                    let viable =
                        self.eval_predicate_rows(&rows, evaluator, decision, stop_index);
                    input.seek(conflict_index);
                    if viable.len() == 1 {
                        return Ok(viable.min().unwrap_or(INVALID_ALT));
                    }
                    if viable.is_empty() {
                        return Err(PredictionError::NoViableAlternative {
                            decision,
                            start_index,
                            stop_index,
                            state: dfa.atn_start_state(),
                        });
                    }
                    alts = viable;
                }

                if self.mode == PredictionMode::Sll {
                    return Ok(alts.min().unwrap_or(INVALID_ALT));
                }

                let snapshot = SimulatorSnapshot {
                    decision,
                    use_context: false,
                    dfa_state: Some(state.state_number()),
                    start_index,
                    stop_index,
                };
                self.observer.full_context_fallback(&snapshot, &alts);
                self.listeners.report_attempting_full_context(
                    &ReportContext {
                        decision,
                        start_index,
                        stop_index,
                        dfa_state: Some(state.state_number()),
                    },
                    &alts,
                );
                debug!(decision, ?alts, "sll conflict; retrying with full context");

                input.seek(start_index);
                let s0_full = self.ll_start_state(dfa, outer_context, evaluator, &mut cache)?;
                self.exec_ll(
                    dfa, s0_full, input, start_index, decision, evaluator, &mut cache,
                )
            }
        }
    }

    // ------------------------------------------------------------------
    // SLL phase

    fn exec_sll(
        &self,
        dfa: &Dfa,
        s0: Arc<DfaState>,
        input: &mut dyn SymbolStream,
        start_index: usize,
        decision: u32,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Result<SllOutcome, PredictionError> {
        let mut current = s0;
        if let Some(outcome) =
            self.sll_state_outcome(&current, start_index, start_index, decision, evaluator)?
        {
            return Ok(outcome);
        }

        loop {
            self.check_cancelled(decision)?;
            let t = input.la(1);
            let stop_index = input.index();

            let target = match current.target(t) {
                Some(target) => {
                    self.observer.dfa_transition(decision, false);
                    target
                }
                None => {
                    self.observer.atn_transition(decision, false);
                    match self.compute_target_state(dfa, &current, t, false, evaluator, cache)
                    {
                        Some(target) => target,
                        None => {
                            return Err(PredictionError::NoViableAlternative {
                                decision,
                                start_index,
                                stop_index,
                                state: dfa.atn_start_state(),
                            });
                        }
                    }
                }
            };
            self.observer.lookahead(decision, false, stop_index);

            if let Some(outcome) =
                self.sll_state_outcome(&target, start_index, stop_index, decision, evaluator)?
            {
                return Ok(outcome);
            }
            if t == EOF {
                return Err(PredictionError::NoViableAlternative {
                    decision,
                    start_index,
                    stop_index,
                    state: dfa.atn_start_state(),
                });
            }
            input.consume();
            current = target;
        }
    }

    /// Terminal analysis of an SLL state: conflict beats accept; accept
    /// states with predicate tables evaluate them in alternative order.
    fn sll_state_outcome(
        &self,
        state: &Arc<DfaState>,
        start_index: usize,
        stop_index: usize,
        decision: u32,
        evaluator: &dyn PredicateEvaluator,
    ) -> Result<Option<SllOutcome>, PredictionError> {
        if let Some(conflict) = state.configs().conflict_info() {
            return Ok(Some(SllOutcome::Conflict {
                state: Arc::clone(state),
                alts: conflict.conflicted_alts().clone(),
                stop_index,
            }));
        }
        if state.is_accept_state() {
            if let Some(rows) = state.predicates() {
                for row in rows.iter() {
                    let holds = row.pred.eval(evaluator);
                    self.observer.predicate_evaluated(
                        &SimulatorSnapshot {
                            decision,
                            use_context: false,
                            dfa_state: Some(state.state_number()),
                            start_index,
                            stop_index,
                        },
                        holds,
                        row.alt,
                    );
                    if holds {
                        return Ok(Some(SllOutcome::Alt(row.alt)));
                    }
                }
                return Err(PredictionError::NoViableAlternative {
                    decision,
                    start_index,
                    stop_index,
                    state: state.state_number(),
                });
            }
            return Ok(Some(SllOutcome::Alt(state.prediction())));
        }
        Ok(None)
    }

    fn eval_predicate_rows(
        &self,
        rows: &[PredPrediction],
        evaluator: &dyn PredicateEvaluator,
        decision: u32,
        stop_index: usize,
    ) -> AltBitSet {
        let mut viable = AltBitSet::new();
        for row in rows {
            let holds = row.pred.eval(evaluator);
            self.observer.predicate_evaluated(
                &SimulatorSnapshot {
                    decision,
                    use_context: false,
                    dfa_state: None,
                    start_index: stop_index,
                    stop_index,
                },
                holds,
                row.alt,
            );
            if holds {
                viable.insert(row.alt);
            }
        }
        viable
    }

    // ------------------------------------------------------------------
    // Full-context phase

    #[allow(clippy::too_many_arguments)]
    fn exec_ll(
        &self,
        dfa: &Dfa,
        s0: Arc<DfaState>,
        input: &mut dyn SymbolStream,
        start_index: usize,
        decision: u32,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Result<u32, PredictionError> {
        let mut current = s0;
        if let Some(alt) =
            self.ll_state_outcome(&current, start_index, start_index, decision)
        {
            return Ok(alt);
        }

        loop {
            self.check_cancelled(decision)?;
            let t = input.la(1);
            let stop_index = input.index();

            let target = match current.target(t) {
                Some(target) => {
                    self.observer.dfa_transition(decision, true);
                    target
                }
                None => {
                    self.observer.atn_transition(decision, true);
                    match self.compute_target_state(dfa, &current, t, true, evaluator, cache) {
                        Some(target) => target,
                        None => {
                            return Err(PredictionError::NoViableAlternative {
                                decision,
                                start_index,
                                stop_index,
                                state: dfa.atn_start_state(),
                            });
                        }
                    }
                }
            };
            self.observer.lookahead(decision, true, stop_index);

            if let Some(alt) = self.ll_state_outcome(&target, start_index, stop_index, decision)
            {
                return Ok(alt);
            }
            if t == EOF {
                return Err(PredictionError::NoViableAlternative {
                    decision,
                    start_index,
                    stop_index,
                    state: dfa.atn_start_state(),
                });
            }
            input.consume();
            current = target;
        }
    }

    /// Terminal analysis of a full-context state.
    fn ll_state_outcome(
        &self,
        state: &Arc<DfaState>,
        start_index: usize,
        stop_index: usize,
        decision: u32,
    ) -> Option<u32> {
        let configs = state.configs();
        let snapshot = SimulatorSnapshot {
            decision,
            use_context: true,
            dfa_state: Some(state.state_number()),
            start_index,
            stop_index,
        };
        let report = ReportContext {
            decision,
            start_index,
            stop_index,
            dfa_state: Some(state.state_number()),
        };

        let unique = configs.unique_alt();
        if unique != INVALID_ALT {
            // full context disambiguated where SLL could not
            self.observer.context_sensitivity(&snapshot, unique);
            self.listeners.report_context_sensitivity(&report, unique);
            debug!(decision, alt = unique, "context sensitivity");
            return Some(unique);
        }

        let groups = self.conflicting_alt_subsets(configs);
        if groups.is_empty() {
            return None;
        }

        match self.mode {
            PredictionMode::LlExactAmbigDetection => {
                if all_groups_conflict(&groups) && all_groups_equal(&groups) {
                    let ambig = configs.represented_alternatives();
                    let prediction = ambig.min().unwrap_or(INVALID_ALT);
                    self.observer.ambiguity(&snapshot, true, &ambig);
                    if self.report_ambiguities {
                        self.listeners.report_ambiguity(&report, true, &ambig);
                    }
                    debug!(decision, ?ambig, "exact ambiguity");
                    return Some(prediction);
                }
                None
            }
            _ => {
                let prediction = resolves_to_min_alt(&groups)?;
                let ambig = configs.represented_alternatives();
                self.observer.ambiguity(&snapshot, false, &ambig);
                if self.report_ambiguities {
                    self.listeners.report_ambiguity(&report, false, &ambig);
                }
                debug!(decision, alt = prediction, "ambiguity resolved to minimum");
                Some(prediction)
            }
        }
    }

    // ------------------------------------------------------------------
    // Start states

    fn sll_start_state(
        &self,
        dfa: &Dfa,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Result<Arc<DfaState>, PredictionError> {
        if dfa.is_precedence_dfa() {
            let precedence = evaluator.precedence();
            if let Some(existing) = dfa.precedence_start_state(precedence, false) {
                return Ok(existing);
            }
            let computed = self.compute_start_state(dfa, None, false, evaluator, cache);
            dfa.set_precedence_start_state(precedence, false, Arc::clone(&computed));
            return Ok(computed);
        }
        if let Some(existing) = dfa.start_state(false) {
            return Ok(existing);
        }
        let computed = self.compute_start_state(dfa, None, false, evaluator, cache);
        Ok(dfa.set_start_state(false, computed))
    }

    /// Full-context start state: a base state seeded with the outermost
    /// terminator, specialized one invocation frame at a time through the
    /// DFA's context edges.
    fn ll_start_state(
        &self,
        dfa: &Dfa,
        outer_context: Option<&Arc<RuleCall>>,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Result<Arc<DfaState>, PredictionError> {
        if dfa.is_precedence_dfa() {
            // precedence levels alias distinct outer stacks, so these
            // start states are computed per prediction
            return Ok(self.compute_start_state(dfa, outer_context, true, evaluator, cache));
        }

        let mut current = match dfa.start_state(true) {
            Some(existing) => existing,
            None => {
                let computed = self.compute_start_state(dfa, None, true, evaluator, cache);
                dfa.set_start_state(true, computed)
            }
        };

        let mut frame = outer_context.cloned();
        while let Some(call) = frame {
            if call.is_empty() || !self.needs_more_context(&current) {
                break;
            }
            let key = call.invoking_state;
            let next = match current.context_target(key) {
                Some(next) => next,
                None => {
                    let specialized =
                        self.specialize_start_state(dfa, &current, &call, evaluator, cache);
                    current.set_context_sensitive();
                    current.set_context_target(key, Arc::clone(&specialized));
                    specialized
                }
            };
            current = next;
            frame = call.parent.clone();
        }
        Ok(current)
    }

    fn needs_more_context(&self, state: &Arc<DfaState>) -> bool {
        state
            .configs()
            .iter()
            .any(|config| config.context().has_empty_path())
    }

    /// Bind one more invocation frame into a full-context start state:
    /// append the frame's follow state to every empty terminator, then
    /// re-run closure so newly-enabled rule-stop pops happen.
    fn specialize_start_state(
        &self,
        dfa: &Dfa,
        current: &Arc<DfaState>,
        call: &Arc<RuleCall>,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Arc<DfaState> {
        let invoking = self.atn.state(call.invoking_state as u32);
        let follow = invoking
            .transitions
            .iter()
            .find_map(|t| match t {
                Transition::Rule { follow, .. } => Some(*follow),
                _ => None,
            })
            .expect("invoking state must carry a rule transition");
        let suffix = PredictionContext::empty_full().child(follow as i32);

        let mut configs = AtnConfigSet::new();
        let mut busy: HashSet<AtnConfig, ahash::RandomState> = HashSet::default();
        for config in current.configs().iter() {
            let appended = config.context().append_context(&suffix, cache);
            let moved = config.transform_with_context(
                self.atn.state(config.state()),
                appended,
                false,
            );
            self.closure_from(
                moved, &mut configs, &mut busy, false, true, 0, dfa, evaluator, cache,
            );
        }
        self.seal_into_state(dfa, configs, true)
    }

    fn compute_start_state(
        &self,
        dfa: &Dfa,
        outer_context: Option<&Arc<RuleCall>>,
        full_ctx: bool,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Arc<DfaState> {
        let start = self.atn.state(dfa.atn_start_state());
        let initial_context = if full_ctx {
            PredictionContext::from_rule_context(&self.atn, outer_context, true)
        } else {
            PredictionContext::empty_local()
        };

        let mut configs = AtnConfigSet::new();
        let mut busy: HashSet<AtnConfig, ahash::RandomState> = HashSet::default();
        for (i, transition) in start.transitions.iter().enumerate() {
            let config = AtnConfig::new(
                transition.target(),
                i as u32 + 1,
                initial_context.clone(),
            );
            self.closure_from(
                config, &mut configs, &mut busy, true, full_ctx, 0, dfa, evaluator, cache,
            );
        }

        if dfa.is_precedence_dfa() {
            configs = self.apply_precedence_filter(&configs, evaluator, cache);
        }

        self.seal_into_state(dfa, configs, full_ctx)
    }

    /// For left-recursive decisions: alternative 1 is the primary
    /// expansion; recursive alternatives whose context matches a primary
    /// configuration are eliminated unless suppression was latched during
    /// closure.
    fn apply_precedence_filter(
        &self,
        configs: &AtnConfigSet,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> AtnConfigSet {
        let mut states_from_alt1: HashMap<u32, PredictionContext, ahash::RandomState> =
            HashMap::default();
        let mut filtered = AtnConfigSet::new();

        for config in configs.iter() {
            if config.alt() != 1 {
                continue;
            }
            let Some(updated) = config
                .semantic_context()
                .eval_precedence(evaluator.precedence())
            else {
                continue;
            };
            states_from_alt1.insert(config.state(), config.context().clone());
            let kept = if updated == *config.semantic_context() {
                config.clone()
            } else {
                config.transform_with_semantic_context(
                    self.atn.state(config.state()),
                    updated,
                    false,
                )
            };
            filtered.add(kept, cache);
        }

        for config in configs.iter() {
            if config.alt() == 1 {
                continue;
            }
            if !config.is_precedence_filter_suppressed() {
                if let Some(context) = states_from_alt1.get(&config.state()) {
                    if context == config.context() {
                        // eliminated: same position reachable without recursion
                        continue;
                    }
                }
            }
            filtered.add(config.clone(), cache);
        }

        filtered
    }

    // ------------------------------------------------------------------
    // Subset construction

    fn compute_target_state(
        &self,
        dfa: &Dfa,
        current: &Arc<DfaState>,
        t: i32,
        full_ctx: bool,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Option<Arc<DfaState>> {
        let mut moved: Vec<AtnConfig> = Vec::new();
        let mut skipped_stop: Vec<AtnConfig> = Vec::new();

        for config in current.configs().iter() {
            let state = self.atn.state(config.state());
            if state.is_rule_stop() {
                if full_ctx || t == EOF {
                    skipped_stop.push(config.clone());
                }
                continue;
            }
            for transition in &state.transitions {
                if transition.matches(t) {
                    moved.push(config.transform(self.atn.state(transition.target()), false));
                }
            }
        }

        let mut reach = AtnConfigSet::new();
        let mut busy: HashSet<AtnConfig, ahash::RandomState> = HashSet::default();
        for config in moved {
            self.closure_from(
                config, &mut reach, &mut busy, false, full_ctx, 0, dfa, evaluator, cache,
            );
        }

        if reach.is_empty() {
            // at end of the start rule the surviving configurations are
            // the ones that already completed it
            for config in skipped_stop {
                reach.add(config, cache);
            }
            if reach.is_empty() {
                return None;
            }
        }

        let target = self.seal_into_state(dfa, reach, full_ctx);
        current.set_target(t, Arc::clone(&target));
        Some(target)
    }

    /// Epsilon closure of one configuration.
    #[allow(clippy::too_many_arguments)]
    fn closure_from(
        &self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig, ahash::RandomState>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        dfa: &Dfa,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) {
        let state = self.atn.state(config.state());

        if state.is_rule_stop() {
            let context = config.context().clone();
            if context.is_empty() {
                if !context.is_empty_local() {
                    // outermost frame consumed: stop here
                    configs.add(config, cache);
                    return;
                }
                // local-empty: fall through and chase the global FOLLOW
            } else {
                for i in 0..context.size() {
                    let return_state = context.return_state(i);
                    if return_state == EMPTY_FULL_STATE_KEY {
                        if full_ctx {
                            let stopped = config.transform_with_context(
                                state,
                                PredictionContext::empty_full(),
                                false,
                            );
                            configs.add(stopped, cache);
                        } else {
                            let unknown = config.transform_with_context(
                                state,
                                PredictionContext::empty_local(),
                                false,
                            );
                            self.closure_from(
                                unknown,
                                configs,
                                busy,
                                collect_predicates,
                                full_ctx,
                                depth,
                                dfa,
                                evaluator,
                                cache,
                            );
                        }
                        continue;
                    }
                    let popped = config.transform_with_context(
                        self.atn.state(return_state as u32),
                        context.parent(i).clone(),
                        false,
                    );
                    self.closure_from(
                        popped,
                        configs,
                        busy,
                        collect_predicates,
                        full_ctx,
                        depth - 1,
                        dfa,
                        evaluator,
                        cache,
                    );
                }
                return;
            }
        }

        if !state.only_has_epsilon_transitions() {
            configs.add(config.clone(), cache);
        }

        for transition in &state.transitions {
            let Some(mut next) = self.epsilon_target(
                &config,
                transition,
                collect_predicates,
                depth == 0,
                full_ctx,
                evaluator,
                cache,
            ) else {
                continue;
            };

            let mut new_depth = depth;
            if state.is_rule_stop() {
                // leaving the decision rule through the global FOLLOW
                if dfa.is_precedence_dfa() {
                    if let Transition::Epsilon {
                        outermost_precedence_return: Some(returned_rule),
                        ..
                    } = transition
                    {
                        if *returned_rule == self.atn.state(dfa.atn_start_state()).rule {
                            next.set_precedence_filter_suppressed(true);
                        }
                    }
                }
                next.set_outer_context_depth(next.outer_context_depth() + 1);
                if !busy.insert(next.clone()) {
                    continue;
                }
                new_depth -= 1;
            } else if matches!(transition, Transition::Rule { .. }) && new_depth >= 0 {
                new_depth += 1;
            }

            self.closure_from(
                next,
                configs,
                busy,
                collect_predicates,
                full_ctx,
                new_depth,
                dfa,
                evaluator,
                cache,
            );
        }
    }

    /// Follow one epsilon-like transition, collecting or evaluating
    /// predicates as the phase demands.
    #[allow(clippy::too_many_arguments)]
    fn epsilon_target(
        &self,
        config: &AtnConfig,
        transition: &Transition,
        collect_predicates: bool,
        in_context: bool,
        full_ctx: bool,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Option<AtnConfig> {
        match transition {
            Transition::Epsilon { target, .. } | Transition::Action { target, .. } => {
                Some(config.transform(self.atn.state(*target), false))
            }
            Transition::Rule { target, follow, .. } => {
                let context = cache.child(config.context(), *follow as i32);
                Some(config.transform_with_context(self.atn.state(*target), context, false))
            }
            Transition::Predicate {
                target,
                rule,
                pred_index,
                is_ctx_dependent,
            } => {
                let target = self.atn.state(*target);
                if collect_predicates && (!is_ctx_dependent || in_context) {
                    if full_ctx {
                        // in full context the predicate can be decided now
                        evaluator
                            .eval_predicate(*rule, *pred_index)
                            .then(|| config.transform(target, false))
                    } else {
                        let gated = SemanticContext::and(
                            config.semantic_context(),
                            &SemanticContext::Predicate {
                                rule: *rule,
                                pred_index: *pred_index,
                                is_ctx_dependent: *is_ctx_dependent,
                            },
                        );
                        Some(config.transform_with_semantic_context(target, gated, false))
                    }
                } else {
                    Some(config.transform(target, false))
                }
            }
            Transition::PrecedencePredicate { target, precedence } => {
                let target = self.atn.state(*target);
                if collect_predicates && in_context {
                    if full_ctx {
                        (*precedence >= evaluator.precedence())
                            .then(|| config.transform(target, false))
                    } else {
                        let gated = SemanticContext::and(
                            config.semantic_context(),
                            &SemanticContext::Precedence(*precedence),
                        );
                        Some(config.transform_with_semantic_context(target, gated, false))
                    }
                } else {
                    Some(config.transform(target, false))
                }
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Conflict analysis & sealing

    fn conflicting_alt_subsets(&self, configs: &AtnConfigSet) -> Vec<AltBitSet> {
        let mut groups: HashMap<(u32, CtxKey), AltBitSet, ahash::RandomState> =
            HashMap::default();
        for config in configs.iter() {
            groups
                .entry((config.state(), CtxKey(config.context().clone())))
                .or_default()
                .insert(config.alt());
        }
        groups.into_values().collect()
    }

    fn compute_conflict_info(&self, configs: &AtnConfigSet) -> Option<ConflictInfo> {
        if configs.len() <= 1 {
            return None;
        }
        let groups = self.conflicting_alt_subsets(configs);
        if groups.iter().any(|group| group.len() == 1) {
            // some configuration can still uniquely identify an alternative
            return None;
        }
        let mut union = AltBitSet::new();
        for group in &groups {
            union.union_with(group);
        }
        let exact = all_groups_equal(&groups);
        Some(ConflictInfo::new(union, exact))
    }

    fn predicate_table(&self, configs: &AtnConfigSet) -> Vec<PredPrediction> {
        let mut by_alt: BTreeMap<u32, SemanticContext> = BTreeMap::new();
        for config in configs.iter() {
            by_alt
                .entry(config.alt())
                .and_modify(|sem| *sem = SemanticContext::or(sem, config.semantic_context()))
                .or_insert_with(|| config.semantic_context().clone());
        }
        by_alt
            .into_iter()
            .map(|(alt, pred)| PredPrediction { pred, alt })
            .collect()
    }

    fn seal_into_state(
        &self,
        dfa: &Dfa,
        mut configs: AtnConfigSet,
        full_ctx: bool,
    ) -> Arc<DfaState> {
        let unique = configs.unique_alt();
        let mut accept = None;
        if unique != INVALID_ALT {
            accept = Some(AcceptStateInfo::new(unique));
        } else if !full_ctx {
            if let Some(conflict) = self.compute_conflict_info(&configs) {
                let resolved = conflict.conflicted_alts().min().unwrap_or(INVALID_ALT);
                accept = Some(AcceptStateInfo::new(resolved));
                configs.set_conflict_info(Some(conflict));
            }
        }

        let predicate_rows = if accept.is_some() && configs.has_semantic_context() {
            Some(self.predicate_table(&configs))
        } else {
            None
        };

        configs.optimize_configs(&self.atn);
        configs.seal();
        let state = DfaState::new(configs, dfa.empty_edge_map(), dfa.empty_context_edge_map());
        if let Some(info) = accept {
            state.set_accept_state(info);
        }
        if let Some(rows) = predicate_rows {
            state.set_predicates(rows);
        }
        dfa.add_state(state)
    }

    fn check_cancelled(&self, decision: u32) -> Result<(), PredictionError> {
        if let Some(hook) = &self.cancellation {
            if hook() {
                return Err(PredictionError::Cancelled { decision });
            }
        }
        Ok(())
    }
}

fn all_groups_conflict(groups: &[AltBitSet]) -> bool {
    groups.iter().all(|group| group.len() > 1)
}

fn all_groups_equal(groups: &[AltBitSet]) -> bool {
    groups.windows(2).all(|pair| pair[0] == pair[1])
}

/// The common minimum when every group resolves to the same smallest
/// alternative.
fn resolves_to_min_alt(groups: &[AltBitSet]) -> Option<u32> {
    let mut mins = groups.iter().map(AltBitSet::min);
    let first = mins.next()??;
    mins.all(|m| m == Some(first)).then_some(first)
}
