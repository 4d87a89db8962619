//! # Test Fixtures
//!
//! Programmatic construction of small, well-formed ATNs.
//!
//! ## Overview
//!
//! Grammar compilation is out of scope for this crate; the simulators
//! consume a frozen [`Atn`]. [`AtnBuilder`] assembles one by hand the way
//! a grammar compiler would: rule start/stop pairs, block decisions,
//! star/plus loops, lexer modes, the left-recursion lowering with
//! precedence predicates, and the rule-stop FOLLOW edges closure relies
//! on.
//!
//! Decisions are numbered in the order their decision states are created:
//! within one rule body that is left-to-right, blocks before the loops
//! that contain them.
//!
//! ```rust
//! use quiver::testing::AtnBuilder;
//!
//! const ID: i32 = 1;
//! const INT: i32 = 2;
//!
//! let mut builder = AtnBuilder::parser(2);
//! let r = builder.rule("r");
//! builder.alts(r, &[&[AtnBuilder::token(ID)], &[AtnBuilder::token(INT)]]);
//! let atn = builder.build();
//! assert_eq!(atn.num_decisions(), 1);
//! ```

use crate::atn::{
    Atn, AtnState, AtnStateKind, GrammarKind, IntervalSet, Transition,
};
use crate::sim::lexer::LexerAction;

/// One element of an alternative.
#[derive(Clone, Debug)]
pub enum Element {
    /// Match a single symbol code.
    Token(i32),
    /// Match any symbol in the set.
    Set(IntervalSet),
    /// Match any symbol not in the set.
    NotSet(IntervalSet),
    /// Match any symbol except EOF.
    Wildcard,
    /// Invoke another rule (with a precedence argument for left-recursive
    /// targets).
    RuleRef { rule: u32, precedence: u32 },
    /// A semantic predicate gate.
    Predicate {
        pred_index: u32,
        is_ctx_dependent: bool,
    },
    /// A lexer action (index into the builder's action table).
    Action(u32),
    /// A nested sub-block decision.
    Block(Vec<Vec<Element>>),
    /// Zero-or-more loop over the block.
    Star(Vec<Vec<Element>>),
    /// One-or-more loop over the block.
    Plus(Vec<Vec<Element>>),
}

/// Hand-assembles a frozen [`Atn`].
pub struct AtnBuilder {
    atn: Atn,
    left_recursive: Vec<bool>,
}

impl AtnBuilder {
    /// Start a parser grammar whose token types run `1..=max_token_type`.
    #[must_use]
    pub fn parser(max_token_type: i32) -> Self {
        let mut atn = Atn::new(GrammarKind::Parser);
        atn.max_token_type = max_token_type;
        Self {
            atn,
            left_recursive: Vec::new(),
        }
    }

    /// Start a lexer grammar.
    #[must_use]
    pub fn lexer() -> Self {
        Self {
            atn: Atn::new(GrammarKind::Lexer),
            left_recursive: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // element shorthands

    #[must_use]
    pub fn token(symbol: i32) -> Element {
        Element::Token(symbol)
    }

    #[must_use]
    pub fn set<I: IntoIterator<Item = i32>>(symbols: I) -> Element {
        Element::Set(symbols.into_iter().collect())
    }

    #[must_use]
    pub fn wildcard() -> Element {
        Element::Wildcard
    }

    #[must_use]
    pub fn rule_ref(rule: u32) -> Element {
        Element::RuleRef {
            rule,
            precedence: 0,
        }
    }

    #[must_use]
    pub fn rule_ref_with_precedence(rule: u32, precedence: u32) -> Element {
        Element::RuleRef { rule, precedence }
    }

    #[must_use]
    pub fn predicate(pred_index: u32) -> Element {
        Element::Predicate {
            pred_index,
            is_ctx_dependent: false,
        }
    }

    // ------------------------------------------------------------------
    // rules

    /// Allocate a rule with its start and stop states. The body is added
    /// later with [`alts`](Self::alts) or
    /// [`left_recursive_rule`](Self::left_recursive_rule).
    pub fn rule(&mut self, name: &str) -> u32 {
        let rule = self.atn.rule_to_start_state.len() as u32;
        let start = self.new_state(AtnStateKind::RuleStart, rule);
        let stop = self.new_state(AtnStateKind::RuleStop, rule);
        self.atn.rule_to_start_state.push(start);
        self.atn.rule_to_stop_state.push(stop);
        self.atn.rule_names.push(name.into());
        self.left_recursive.push(false);
        if self.atn.kind == GrammarKind::Lexer {
            self.atn.rule_to_token_type.push(0);
        }
        rule
    }

    /// Define a rule body as a list of alternatives. Multi-alternative
    /// bodies get a block decision.
    pub fn alts(&mut self, rule: u32, alternatives: &[&[Element]]) {
        let start = self.atn.rule_to_start_state[rule as usize];
        let stop = self.atn.rule_to_stop_state[rule as usize];
        let exit = if alternatives.len() == 1 {
            self.chain(rule, start, alternatives[0])
        } else {
            let owned: Vec<Vec<Element>> =
                alternatives.iter().map(|alt| alt.to_vec()).collect();
            self.build_block(rule, start, &owned)
        };
        self.epsilon(exit, stop);
    }

    /// Lower a left-recursive rule the way a grammar compiler does:
    /// `primary_alts` followed by a star loop whose alternatives are the
    /// recursive tails, each gated by a precedence predicate. Returns the
    /// precedence decision's index.
    pub fn left_recursive_rule(
        &mut self,
        rule: u32,
        primary_alts: &[&[Element]],
        tails: &[(u32, &[Element])],
    ) -> u32 {
        self.left_recursive[rule as usize] = true;
        let start = self.atn.rule_to_start_state[rule as usize];
        let stop = self.atn.rule_to_stop_state[rule as usize];

        let after_primary = if primary_alts.len() == 1 {
            self.chain(rule, start, primary_alts[0])
        } else {
            let owned: Vec<Vec<Element>> =
                primary_alts.iter().map(|alt| alt.to_vec()).collect();
            self.build_block(rule, start, &owned)
        };

        let loop_entry = self.new_state(AtnStateKind::StarLoopEntry, rule);
        let decision = self.register_decision(loop_entry);
        self.atn.states[loop_entry as usize].precedence_rule_decision = true;

        let block_start = self.new_state(AtnStateKind::StarBlockStart, rule);
        let block_end = self.new_state(AtnStateKind::BlockEnd, rule);
        let loop_back = self.new_state(AtnStateKind::StarLoopBack, rule);
        let loop_end = self.new_state(AtnStateKind::LoopEnd, rule);

        self.epsilon(after_primary, loop_entry);
        self.epsilon(loop_entry, block_start);
        self.epsilon(loop_entry, loop_end);

        for (precedence, elements) in tails {
            let alt_entry = self.new_state(AtnStateKind::Basic, rule);
            self.epsilon(block_start, alt_entry);
            let guard = self.new_state(AtnStateKind::Basic, rule);
            self.add_transition(
                alt_entry,
                Transition::PrecedencePredicate {
                    target: guard,
                    precedence: *precedence,
                },
            );
            let tail = self.chain(rule, guard, elements);
            self.epsilon(tail, block_end);
        }
        self.epsilon(block_end, loop_back);
        self.epsilon(loop_back, loop_entry);
        self.epsilon(loop_end, stop);

        decision
    }

    // ------------------------------------------------------------------
    // lexer

    /// Allocate a lexer mode with its tokens-start state; mode 0 is the
    /// default mode.
    pub fn mode(&mut self) -> u32 {
        let mode = self.atn.mode_to_start_state.len() as u32;
        let start = self.new_state(AtnStateKind::TokensStart, u32::MAX);
        self.atn.mode_to_start_state.push(start);
        mode
    }

    /// Define a lexer rule in `mode`, emitting `token_type` on match.
    pub fn lexer_rule(&mut self, mode: u32, name: &str, token_type: i32, body: &[Element]) -> u32 {
        let rule = self.rule(name);
        self.atn.rule_to_token_type[rule as usize] = token_type;
        let tokens_start = self.atn.mode_to_start_state[mode as usize];
        let rule_start = self.atn.rule_to_start_state[rule as usize];
        self.epsilon(tokens_start, rule_start);
        let exit = self.chain(rule, rule_start, body);
        self.epsilon(exit, self.atn.rule_to_stop_state[rule as usize]);
        rule
    }

    /// Register a lexer action and return its index for
    /// [`Element::Action`].
    pub fn lexer_action(&mut self, action: LexerAction) -> u32 {
        let index = self.atn.lexer_actions.len() as u32;
        self.atn.lexer_actions.push(action);
        index
    }

    // ------------------------------------------------------------------
    // assembly

    /// Wire the rule-stop FOLLOW edges and freeze the network.
    #[must_use]
    pub fn build(mut self) -> std::sync::Arc<Atn> {
        // every rule invocation adds a return edge from the invoked
        // rule's stop state to the call site's follow state
        let mut follow_edges: Vec<(u32, Transition)> = Vec::new();
        for state in &self.atn.states {
            for transition in &state.transitions {
                if let Transition::Rule {
                    rule,
                    precedence,
                    follow,
                    ..
                } = transition
                {
                    let outermost_precedence_return = (self.left_recursive[*rule as usize]
                        && *precedence == 0)
                        .then_some(*rule);
                    follow_edges.push((
                        self.atn.rule_to_stop_state[*rule as usize],
                        Transition::Epsilon {
                            target: *follow,
                            outermost_precedence_return,
                        },
                    ));
                }
            }
        }
        for (stop, edge) in follow_edges {
            self.atn.states[stop as usize].transitions.push(edge);
        }
        std::sync::Arc::new(self.atn)
    }

    // ------------------------------------------------------------------
    // plumbing

    fn new_state(&mut self, kind: AtnStateKind, rule: u32) -> u32 {
        let number = self.atn.states.len() as u32;
        self.atn.states.push(AtnState::new(number, rule, kind));
        number
    }

    fn register_decision(&mut self, state: u32) -> u32 {
        let decision = self.atn.decision_to_state.len() as u32;
        self.atn.decision_to_state.push(state);
        self.atn.states[state as usize].decision = Some(decision);
        decision
    }

    fn add_transition(&mut self, from: u32, transition: Transition) {
        self.atn.states[from as usize].transitions.push(transition);
    }

    fn epsilon(&mut self, from: u32, to: u32) {
        self.add_transition(
            from,
            Transition::Epsilon {
                target: to,
                outermost_precedence_return: None,
            },
        );
    }

    fn chain(&mut self, rule: u32, entry: u32, elements: &[Element]) -> u32 {
        let mut current = entry;
        for element in elements {
            current = match element {
                Element::Token(symbol) => {
                    let next = self.new_state(AtnStateKind::Basic, rule);
                    self.add_transition(
                        current,
                        Transition::Atom {
                            target: next,
                            symbol: *symbol,
                        },
                    );
                    next
                }
                Element::Set(set) => {
                    let next = self.new_state(AtnStateKind::Basic, rule);
                    self.add_transition(
                        current,
                        Transition::Set {
                            target: next,
                            set: set.clone(),
                        },
                    );
                    next
                }
                Element::NotSet(set) => {
                    let next = self.new_state(AtnStateKind::Basic, rule);
                    self.add_transition(
                        current,
                        Transition::NotSet {
                            target: next,
                            set: set.clone(),
                        },
                    );
                    next
                }
                Element::Wildcard => {
                    let next = self.new_state(AtnStateKind::Basic, rule);
                    self.add_transition(current, Transition::Wildcard { target: next });
                    next
                }
                Element::RuleRef {
                    rule: target_rule,
                    precedence,
                } => {
                    let next = self.new_state(AtnStateKind::Basic, rule);
                    self.add_transition(
                        current,
                        Transition::Rule {
                            target: self.atn.rule_to_start_state[*target_rule as usize],
                            rule: *target_rule,
                            precedence: *precedence,
                            follow: next,
                        },
                    );
                    next
                }
                Element::Predicate {
                    pred_index,
                    is_ctx_dependent,
                } => {
                    let next = self.new_state(AtnStateKind::Basic, rule);
                    self.add_transition(
                        current,
                        Transition::Predicate {
                            target: next,
                            rule,
                            pred_index: *pred_index,
                            is_ctx_dependent: *is_ctx_dependent,
                        },
                    );
                    next
                }
                Element::Action(action_index) => {
                    let next = self.new_state(AtnStateKind::Basic, rule);
                    self.add_transition(
                        current,
                        Transition::Action {
                            target: next,
                            rule,
                            action_index: *action_index,
                        },
                    );
                    next
                }
                Element::Block(alternatives) => self.build_block(rule, current, alternatives),
                Element::Star(alternatives) => self.build_star(rule, current, alternatives),
                Element::Plus(alternatives) => self.build_plus(rule, current, alternatives),
            };
        }
        current
    }

    fn build_block(&mut self, rule: u32, entry: u32, alternatives: &[Vec<Element>]) -> u32 {
        let block_start = self.new_state(AtnStateKind::BlockStart, rule);
        if alternatives.len() > 1 {
            self.register_decision(block_start);
        }
        let block_end = self.new_state(AtnStateKind::BlockEnd, rule);
        self.epsilon(entry, block_start);
        for alternative in alternatives {
            let alt_entry = self.new_state(AtnStateKind::Basic, rule);
            self.epsilon(block_start, alt_entry);
            let tail = self.chain(rule, alt_entry, alternative);
            self.epsilon(tail, block_end);
        }
        block_end
    }

    fn build_star(&mut self, rule: u32, entry: u32, alternatives: &[Vec<Element>]) -> u32 {
        let loop_entry = self.new_state(AtnStateKind::StarLoopEntry, rule);
        self.register_decision(loop_entry);
        let block_start = self.new_state(AtnStateKind::StarBlockStart, rule);
        let block_end = self.new_state(AtnStateKind::BlockEnd, rule);
        let loop_back = self.new_state(AtnStateKind::StarLoopBack, rule);
        let loop_end = self.new_state(AtnStateKind::LoopEnd, rule);

        self.epsilon(entry, loop_entry);
        self.epsilon(loop_entry, block_start);
        self.epsilon(loop_entry, loop_end);
        for alternative in alternatives {
            let alt_entry = self.new_state(AtnStateKind::Basic, rule);
            self.epsilon(block_start, alt_entry);
            let tail = self.chain(rule, alt_entry, alternative);
            self.epsilon(tail, block_end);
        }
        self.epsilon(block_end, loop_back);
        self.epsilon(loop_back, loop_entry);
        loop_end
    }

    fn build_plus(&mut self, rule: u32, entry: u32, alternatives: &[Vec<Element>]) -> u32 {
        let block_start = self.new_state(AtnStateKind::PlusBlockStart, rule);
        if alternatives.len() > 1 {
            self.register_decision(block_start);
        }
        let block_end = self.new_state(AtnStateKind::BlockEnd, rule);
        let loop_back = self.new_state(AtnStateKind::PlusLoopBack, rule);
        let loop_end = self.new_state(AtnStateKind::LoopEnd, rule);

        self.epsilon(entry, block_start);
        for alternative in alternatives {
            let alt_entry = self.new_state(AtnStateKind::Basic, rule);
            self.epsilon(block_start, alt_entry);
            let tail = self.chain(rule, alt_entry, alternative);
            self.epsilon(tail, block_end);
        }
        self.epsilon(block_end, loop_back);
        self.register_decision(loop_back);
        self.epsilon(loop_back, block_start);
        self.epsilon(loop_back, loop_end);
        loop_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_alt_rule_gets_one_decision() {
        let mut builder = AtnBuilder::parser(2);
        let r = builder.rule("r");
        builder.alts(r, &[&[AtnBuilder::token(1)], &[AtnBuilder::token(2)]]);
        let atn = builder.build();

        assert_eq!(atn.num_decisions(), 1);
        let decision_state = atn.decision_state(0);
        assert_eq!(decision_state.transitions.len(), 2);
        assert_eq!(decision_state.kind, AtnStateKind::BlockStart);
    }

    #[test]
    fn rule_invocation_wires_follow_edge() {
        let mut builder = AtnBuilder::parser(2);
        let callee = builder.rule("callee");
        let caller = builder.rule("caller");
        builder.alts(callee, &[&[AtnBuilder::token(1)]]);
        builder.alts(
            caller,
            &[&[AtnBuilder::rule_ref(callee), AtnBuilder::token(2)]],
        );
        let atn = builder.build();

        let stop = atn.state(atn.rule_to_stop_state[callee as usize]);
        assert_eq!(stop.transitions.len(), 1);
        assert!(matches!(
            stop.transitions[0],
            Transition::Epsilon {
                outermost_precedence_return: None,
                ..
            }
        ));
    }

    #[test]
    fn left_recursion_marks_precedence_decision() {
        const ID: i32 = 1;
        const AT: i32 = 2;
        const X: i32 = 3;

        let mut builder = AtnBuilder::parser(3);
        let expr = builder.rule("expr");
        let decision = builder.left_recursive_rule(
            expr,
            &[&[AtnBuilder::token(ID)]],
            &[(2, &[AtnBuilder::token(AT), AtnBuilder::token(X)])],
        );
        let atn = builder.build();

        let state = atn.decision_state(decision);
        assert_eq!(state.kind, AtnStateKind::StarLoopEntry);
        assert!(state.precedence_rule_decision);
    }

    #[test]
    fn plus_loop_registers_block_and_loop_decisions() {
        let mut builder = AtnBuilder::parser(3);
        let r = builder.rule("r");
        builder.alts(
            r,
            &[&[
                Element::Plus(vec![
                    vec![Element::Token(1)],
                    vec![Element::Wildcard],
                ]),
                Element::Token(crate::stream::EOF),
            ]],
        );
        let atn = builder.build();

        // decision 0: the inner block; decision 1: the loop-back
        assert_eq!(atn.num_decisions(), 2);
        assert_eq!(atn.decision_state(0).kind, AtnStateKind::PlusBlockStart);
        assert_eq!(atn.decision_state(1).kind, AtnStateKind::PlusLoopBack);
    }
}
