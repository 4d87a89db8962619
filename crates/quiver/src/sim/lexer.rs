//! Lexer-mode DFA simulation: longest-match token recognition with
//! accept-state action executors.

use crate::atn::{Atn, AtnStateKind, GrammarKind, PredicateEvaluator, Transition};
use crate::config::{AtnConfig, AtnConfigSet};
use crate::context::{ContextCache, PredictionContext, EMPTY_FULL_STATE_KEY};
use crate::dfa::{AcceptStateInfo, Dfa, DfaState};
use crate::error::PredictionError;
use crate::stream::{SymbolStream, EOF};
use std::sync::Arc;
use tracing::trace;

/// Smallest code point cached as a DFA edge.
pub const MIN_DFA_EDGE: i32 = 0;
/// Largest code point cached as a DFA edge; larger code points always
/// recompute their transition through the ATN.
pub const MAX_DFA_EDGE: i32 = 127;

/// A single lexer command attached to a rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LexerAction {
    Skip,
    More,
    Type(i32),
    Mode(u32),
    PushMode(u32),
    PopMode,
    Channel(u32),
    /// A user action block; position-dependent, so replay anchors it at
    /// the offset it was collected at.
    Custom { rule: u32, action_index: u32 },
}

impl LexerAction {
    /// Position-dependent actions must execute with the input at the
    /// offset where they appeared, not at the end of the token.
    #[must_use]
    pub fn is_position_dependent(&self) -> bool {
        matches!(self, Self::Custom { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct LexerActionEntry {
    /// Offset from the token start, fixed up when a position-dependent
    /// action is carried past input the DFA has already consumed.
    offset: Option<usize>,
    action: LexerAction,
}

/// The ordered list of lexer commands an accept state commits to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct LexerActionExecutor {
    actions: Vec<LexerActionEntry>,
}

/// Replay target for committed lexer actions.
pub trait LexerActionSink {
    fn skip(&mut self) {}
    fn more(&mut self) {}
    fn set_type(&mut self, _token_type: i32) {}
    fn set_mode(&mut self, _mode: u32) {}
    fn push_mode(&mut self, _mode: u32) {}
    fn pop_mode(&mut self) {}
    fn set_channel(&mut self, _channel: u32) {}
    /// A user action block. `offset` is the code-point offset from the
    /// token start the action is anchored at, when position-dependent.
    fn custom_action(&mut self, _rule: u32, _action_index: u32, _offset: Option<usize>) {}
}

impl LexerActionExecutor {
    /// Executor holding a single action.
    #[must_use]
    pub fn single(action: LexerAction) -> Arc<Self> {
        Arc::new(Self {
            actions: vec![LexerActionEntry {
                offset: None,
                action,
            }],
        })
    }

    /// Append `action` to `existing`, sharing the prefix.
    #[must_use]
    pub fn append(existing: Option<&Arc<Self>>, action: LexerAction) -> Arc<Self> {
        let mut actions = existing.map(|e| e.actions.clone()).unwrap_or_default();
        actions.push(LexerActionEntry {
            offset: None,
            action,
        });
        Arc::new(Self { actions })
    }

    /// Anchor position-dependent actions at `offset` code points past the
    /// token start. Returns the executor unchanged when nothing is
    /// position-dependent.
    #[must_use]
    pub fn fix_offset_before_match(this: &Arc<Self>, offset: usize) -> Arc<Self> {
        if !this
            .actions
            .iter()
            .any(|e| e.offset.is_none() && e.action.is_position_dependent())
        {
            return Arc::clone(this);
        }
        let actions = this
            .actions
            .iter()
            .map(|e| {
                if e.offset.is_none() && e.action.is_position_dependent() {
                    LexerActionEntry {
                        offset: Some(offset),
                        action: e.action.clone(),
                    }
                } else {
                    e.clone()
                }
            })
            .collect();
        Arc::new(Self { actions })
    }

    /// Replay against the matched span.
    pub fn execute(&self, sink: &mut dyn LexerActionSink) {
        for entry in &self.actions {
            match &entry.action {
                LexerAction::Skip => sink.skip(),
                LexerAction::More => sink.more(),
                LexerAction::Type(t) => sink.set_type(*t),
                LexerAction::Mode(m) => sink.set_mode(*m),
                LexerAction::PushMode(m) => sink.push_mode(*m),
                LexerAction::PopMode => sink.pop_mode(),
                LexerAction::Channel(c) => sink.set_channel(*c),
                LexerAction::Custom { rule, action_index } => {
                    sink.custom_action(*rule, *action_index, entry.offset);
                }
            }
        }
    }

    /// Number of collected actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// A committed token match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexerMatch {
    /// The emitted token type.
    pub token_type: i32,
    /// Code-point index of the first matched symbol.
    pub start_index: usize,
    /// Code-point index one past the last matched symbol.
    pub end_index: usize,
    /// Actions to replay against the span, if any.
    pub executor: Option<Arc<LexerActionExecutor>>,
}

/// Accepts-all evaluator for grammars without lexer predicates.
struct NoPredicates;

impl PredicateEvaluator for NoPredicates {
    fn eval_predicate(&self, _rule: u32, _pred_index: u32) -> bool {
        true
    }
}

/// The lexer-mode ATN simulator.
///
/// One DFA per mode, shared freely across threads; per-call state is
/// confined to the stack.
pub struct LexerAtnSimulator {
    atn: Arc<Atn>,
    dfas: Arc<[Dfa]>,
}

impl LexerAtnSimulator {
    /// Build a simulator (and its per-mode DFAs) for a lexer ATN.
    ///
    /// # Panics
    ///
    /// Panics when the ATN is not a lexer ATN.
    #[must_use]
    pub fn new(atn: Arc<Atn>) -> Self {
        assert_eq!(atn.kind, GrammarKind::Lexer, "lexer simulator needs a lexer ATN");
        let dfas: Vec<Dfa> = atn
            .mode_to_start_state
            .iter()
            .enumerate()
            .map(|(mode, &start)| Dfa::new(&atn, start, mode as u32))
            .collect();
        Self {
            atn,
            dfas: dfas.into(),
        }
    }

    /// Share another simulator's DFAs (a second lexer over the same
    /// grammar).
    #[must_use]
    pub fn with_shared_dfas(atn: Arc<Atn>, dfas: Arc<[Dfa]>) -> Self {
        Self { atn, dfas }
    }

    /// The per-mode DFAs.
    #[must_use]
    pub fn dfas(&self) -> &Arc<[Dfa]> {
        &self.dfas
    }

    /// Match one token in `mode` starting at the stream's position,
    /// leaving the stream positioned after the match.
    ///
    /// # Errors
    ///
    /// [`PredictionError::NoViableAlternative`] when no rule matches; the
    /// stream is restored to the start position.
    pub fn match_token(
        &self,
        input: &mut dyn SymbolStream,
        mode: u32,
    ) -> Result<LexerMatch, PredictionError> {
        self.match_token_with(input, mode, &NoPredicates)
    }

    /// [`match_token`](Self::match_token) with lexer predicates evaluated
    /// through `evaluator`, anchored at the token start.
    ///
    /// # Errors
    ///
    /// [`PredictionError::NoViableAlternative`] when no rule matches.
    pub fn match_token_with(
        &self,
        input: &mut dyn SymbolStream,
        mode: u32,
        evaluator: &dyn PredicateEvaluator,
    ) -> Result<LexerMatch, PredictionError> {
        let dfa = &self.dfas[mode as usize];
        let start_index = input.index();
        let marker = input.mark();

        let mut cache = ContextCache::new();
        let s0 = match dfa.start_state(false) {
            Some(s0) => s0,
            None => {
                let computed = self.compute_start_state(dfa, evaluator, &mut cache);
                dfa.set_start_state(false, computed)
            }
        };

        let mut current = s0;
        let mut last_accept: Option<(AcceptStateInfo, usize)> = None;
        loop {
            let t = input.la(1);
            let target = match current.target(t) {
                Some(target) => target,
                None => {
                    match self.compute_target_state(
                        dfa,
                        &current,
                        t,
                        start_index,
                        input.index(),
                        evaluator,
                        &mut cache,
                    ) {
                        Some(target) => target,
                        None => break,
                    }
                }
            };

            if t != EOF {
                input.consume();
            }
            if let Some(info) = target.accept_state_info() {
                last_accept = Some((info, input.index()));
            }
            if t == EOF {
                break;
            }
            current = target;
        }

        input.release(marker);
        match last_accept {
            Some((info, end_index)) => {
                input.seek(end_index);
                trace!(
                    mode,
                    token_type = info.prediction() as i32,
                    start_index,
                    end_index,
                    "token matched"
                );
                Ok(LexerMatch {
                    token_type: info.prediction() as i32,
                    start_index,
                    end_index,
                    executor: info
                        .lexer_action_executor()
                        .map(|e| LexerActionExecutor::fix_offset_before_match(e, end_index - start_index)),
                })
            }
            None => {
                let stop_index = input.index();
                input.seek(start_index);
                Err(PredictionError::NoViableAlternative {
                    decision: mode,
                    start_index,
                    stop_index,
                    state: dfa.atn_start_state(),
                })
            }
        }
    }

    /// Initial configurations: one per rule reachable from the mode's
    /// tokens-start state, alternative = position in the mode.
    fn compute_start_state(
        &self,
        dfa: &Dfa,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Arc<DfaState> {
        let start = self.atn.state(dfa.atn_start_state());
        debug_assert_eq!(start.kind, AtnStateKind::TokensStart);

        let mut configs = AtnConfigSet::new();
        for (i, transition) in start.transitions.iter().enumerate() {
            let config = AtnConfig::new(
                transition.target(),
                i as u32 + 1,
                PredictionContext::empty_full(),
            );
            self.closure(config, &mut configs, false, evaluator, cache);
        }
        self.seal_into_state(dfa, configs)
    }

    /// One step of subset construction over code point `t`.
    fn compute_target_state(
        &self,
        dfa: &Dfa,
        current: &Arc<DfaState>,
        t: i32,
        start_index: usize,
        current_index: usize,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> Option<Arc<DfaState>> {
        let mut reach = AtnConfigSet::new();
        let mut skip_alt = crate::atn::INVALID_ALT;
        for config in current.configs().iter() {
            let current_alt_accepted = config.alt() == skip_alt;
            if current_alt_accepted && config.passed_through_non_greedy_decision() {
                // first-match-wins: this alternative already accepted
                continue;
            }
            let state = self.atn.state(config.state());
            for transition in &state.transitions {
                if !transition.matches(t) {
                    continue;
                }
                let mut moved =
                    config.transform(self.atn.state(transition.target()), true);
                if let Some(executor) = moved.lexer_action_executor().cloned() {
                    // actions collected before this point execute at their
                    // original offset, not at the end of the token
                    let fixed = LexerActionExecutor::fix_offset_before_match(&executor, current_index - start_index);
                    if !Arc::ptr_eq(&fixed, &executor) {
                        moved = moved.transform_with_executor(
                            self.atn.state(moved.state()),
                            Some(fixed),
                            false,
                        );
                    }
                }
                if self.closure(moved, &mut reach, current_alt_accepted, evaluator, cache) {
                    skip_alt = config.alt();
                    break;
                }
            }
        }

        if reach.is_empty() {
            return None;
        }
        let target = self.seal_into_state(dfa, reach);
        current.set_target(t, Arc::clone(&target));
        Some(target)
    }

    /// Lexer closure. Returns `true` when an accept (rule stop) was
    /// reached.
    fn closure(
        &self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        mut current_alt_accepted: bool,
        evaluator: &dyn PredicateEvaluator,
        cache: &mut ContextCache,
    ) -> bool {
        let state = self.atn.state(config.state());

        if state.is_rule_stop() {
            let ctx = config.context().clone();
            if ctx.is_empty() {
                configs.add(config, cache);
                return true;
            }
            if ctx.has_empty() {
                let stop = config.transform_with_context(
                    state,
                    PredictionContext::empty_full(),
                    false,
                );
                configs.add(stop, cache);
                current_alt_accepted = true;
            }
            for i in 0..ctx.size() {
                let return_state = ctx.return_state(i);
                if return_state == EMPTY_FULL_STATE_KEY {
                    continue;
                }
                let popped = config.transform_with_context(
                    self.atn.state(return_state as u32),
                    ctx.parent(i).clone(),
                    false,
                );
                current_alt_accepted |=
                    self.closure(popped, configs, current_alt_accepted, evaluator, cache);
            }
            return current_alt_accepted;
        }

        if !state.only_has_epsilon_transitions()
            && (!current_alt_accepted || !config.passed_through_non_greedy_decision())
        {
            configs.add(config.clone(), cache);
        }

        for transition in &state.transitions {
            let next = match transition {
                Transition::Epsilon { target, .. } => {
                    Some(config.transform(self.atn.state(*target), true))
                }
                Transition::Rule { target, follow, .. } => {
                    let ctx = cache.child(config.context(), *follow as i32);
                    Some(config.transform_with_context(self.atn.state(*target), ctx, true))
                }
                Transition::Predicate {
                    target,
                    rule,
                    pred_index,
                    ..
                } => {
                    // evaluated at closure time, anchored at the token start
                    if evaluator.eval_predicate(*rule, *pred_index) {
                        Some(config.transform(self.atn.state(*target), true))
                    } else {
                        None
                    }
                }
                Transition::Action {
                    target,
                    action_index,
                    ..
                } => {
                    let action = self.atn.lexer_actions[*action_index as usize].clone();
                    let executor = LexerActionExecutor::append(
                        config.lexer_action_executor(),
                        action,
                    );
                    Some(config.transform_with_executor(
                        self.atn.state(*target),
                        Some(executor),
                        true,
                    ))
                }
                Transition::PrecedencePredicate { .. } => None,
                _ => None,
            };
            if let Some(next) = next {
                current_alt_accepted |=
                    self.closure(next, configs, current_alt_accepted, evaluator, cache);
            }
        }

        current_alt_accepted
    }

    fn seal_into_state(&self, dfa: &Dfa, mut configs: AtnConfigSet) -> Arc<DfaState> {
        // accept = first rule-stop configuration in insertion order
        // (alternatives are explored lowest-first)
        let accept = configs.iter().find_map(|config| {
            let state = self.atn.state(config.state());
            state.is_rule_stop().then(|| {
                let token_type = self
                    .atn
                    .rule_to_token_type
                    .get(state.rule as usize)
                    .copied()
                    .unwrap_or(EOF);
                AcceptStateInfo::with_executor(
                    token_type as u32,
                    config.lexer_action_executor().cloned(),
                )
            })
        });

        configs.optimize_configs(&self.atn);
        configs.seal();
        let state = DfaState::new(
            configs,
            dfa.empty_edge_map(),
            dfa.empty_context_edge_map(),
        );
        if let Some(info) = accept {
            state.set_accept_state(info);
        }
        dfa.add_state(state)
    }
}
