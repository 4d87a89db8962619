//! End-to-end adaptive prediction tests over hand-built ATNs.

use quiver::alt_set::AltBitSet;
use quiver::atn::PredicateEvaluator;
use quiver::error::PredictionError;
use quiver::listener::{PredictionListener, ReportContext};
use quiver::sim::{ParserAtnSimulator, PredictionMode};
use quiver::stream::{SymbolStream, TokenTypeStream, EOF};
use quiver::testing::{AtnBuilder, Element};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ID: i32 = 1;
const EQ: i32 = 2;
const INT: i32 = 3;
const SEMI: i32 = 4;

struct NoPreds;

impl PredicateEvaluator for NoPreds {
    fn eval_predicate(&self, _rule: u32, _pred_index: u32) -> bool {
        true
    }
}

struct FixedPreds {
    truths: Vec<bool>,
}

impl PredicateEvaluator for FixedPreds {
    fn eval_predicate(&self, _rule: u32, pred_index: u32) -> bool {
        self.truths
            .get(pred_index as usize)
            .copied()
            .unwrap_or(false)
    }
}

#[derive(Default)]
struct CountingListener {
    ambiguities: AtomicUsize,
    exact_ambiguities: AtomicUsize,
    fallbacks: AtomicUsize,
    sensitivities: AtomicUsize,
    errors: AtomicUsize,
}

impl PredictionListener for CountingListener {
    fn syntax_error(&self, _error: &PredictionError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn report_ambiguity(&self, _context: &ReportContext, exact: bool, _alts: &AltBitSet) {
        self.ambiguities.fetch_add(1, Ordering::SeqCst);
        if exact {
            self.exact_ambiguities.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn report_attempting_full_context(&self, _context: &ReportContext, _alts: &AltBitSet) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
    }

    fn report_context_sensitivity(&self, _context: &ReportContext, _prediction: u32) {
        self.sensitivities.fetch_add(1, Ordering::SeqCst);
    }
}

/// `r : ID | INT ;` — resolved by the first token.
#[test]
fn simple_two_alt_decision() {
    let mut builder = AtnBuilder::parser(4);
    let r = builder.rule("r");
    builder.alts(r, &[&[AtnBuilder::token(ID)], &[AtnBuilder::token(INT)]]);
    let atn = builder.build();
    let sim = ParserAtnSimulator::new(atn);

    let mut input = TokenTypeStream::new(vec![ID]);
    assert_eq!(sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap(), 1);
    // prediction leaves the stream where it started
    assert_eq!(input.index(), 0);

    let mut input = TokenTypeStream::new(vec![INT]);
    assert_eq!(sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap(), 2);
}

#[test]
fn prediction_is_deterministic_and_reuses_the_dfa() {
    let mut builder = AtnBuilder::parser(4);
    let r = builder.rule("r");
    builder.alts(
        r,
        &[
            &[AtnBuilder::token(ID), AtnBuilder::token(EQ)],
            &[AtnBuilder::token(ID), AtnBuilder::token(SEMI)],
        ],
    );
    let atn = builder.build();
    let sim = ParserAtnSimulator::new(atn);

    let mut input = TokenTypeStream::new(vec![ID, SEMI]);
    let first = sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap();
    let states_after_first = sim.dfas()[0].state_count();

    for _ in 0..10 {
        let mut input = TokenTypeStream::new(vec![ID, SEMI]);
        assert_eq!(
            sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap(),
            first
        );
    }
    // warm predictions walk existing edges; the DFA stops growing
    assert_eq!(sim.dfas()[0].state_count(), states_after_first);
    assert_eq!(first, 2);
}

#[test]
fn no_viable_alternative_reports_and_restores_input() {
    let mut builder = AtnBuilder::parser(4);
    let r = builder.rule("r");
    builder.alts(r, &[&[AtnBuilder::token(ID)], &[AtnBuilder::token(INT)]]);
    let atn = builder.build();
    let sim = ParserAtnSimulator::new(atn);
    let listener = Arc::new(CountingListener::default());
    sim.attach_listener(listener.clone());

    let mut input = TokenTypeStream::new(vec![SEMI]);
    let err = sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap_err();
    assert!(matches!(
        err,
        PredictionError::NoViableAlternative { decision: 0, .. }
    ));
    assert_eq!(input.index(), 0);
    assert_eq!(listener.errors.load(Ordering::SeqCst), 1);
}

/// Scenario: `a : (assign | .)+ EOF ; assign : ID '=' INT ';' ;` over
/// `x=10; abc;;;; y=99;` — the wildcard alternative absorbs everything
/// the assignment does not claim.
#[test]
fn wildcard_alternative_skips_unclaimed_tokens() {
    let mut builder = AtnBuilder::parser(4);
    let a = builder.rule("a");
    let assign = builder.rule("assign");
    builder.alts(
        a,
        &[&[
            Element::Plus(vec![
                vec![AtnBuilder::rule_ref(assign)],
                vec![AtnBuilder::wildcard()],
            ]),
            AtnBuilder::token(EOF),
        ]],
    );
    builder.alts(
        assign,
        &[&[
            AtnBuilder::token(ID),
            AtnBuilder::token(EQ),
            AtnBuilder::token(INT),
            AtnBuilder::token(SEMI),
        ]],
    );
    let atn = builder.build();
    let sim = ParserAtnSimulator::new(atn);

    // x=10; abc ;;;; y=99;
    let tokens = vec![
        ID, EQ, INT, SEMI, // x=10;
        ID,   // abc
        SEMI, SEMI, SEMI, SEMI, // ;;;;
        ID, EQ, INT, SEMI, // y=99;
    ];
    let mut input = TokenTypeStream::new(tokens.clone());

    // decision 0 is the (assign | .) block
    let mut predictions = Vec::new();
    while input.index() < tokens.len() {
        let alt = sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap();
        predictions.push(alt);
        let consumed = if alt == 1 { 4 } else { 1 };
        for _ in 0..consumed {
            input.consume();
        }
    }

    assert_eq!(predictions, vec![1, 2, 2, 2, 2, 2, 1]);
}

/// Scenario: `s : '$' a | '@' b ; a : e ID ; b : e INT ID ; e : INT | ;`
/// — SLL conflicts inside `e` because the caller is unknown; the real
/// context resolves it and the listener hears about the sensitivity.
#[test]
fn full_context_resolves_sll_conflict() {
    const DOLLAR: i32 = 5;
    const AT: i32 = 6;

    let mut builder = AtnBuilder::parser(6);
    let s = builder.rule("s");
    let a = builder.rule("a");
    let b = builder.rule("b");
    let e = builder.rule("e");
    builder.alts(
        s,
        &[
            &[AtnBuilder::token(DOLLAR), AtnBuilder::rule_ref(a)],
            &[AtnBuilder::token(AT), AtnBuilder::rule_ref(b)],
        ],
    );
    builder.alts(a, &[&[AtnBuilder::rule_ref(e), AtnBuilder::token(ID)]]);
    builder.alts(
        b,
        &[&[
            AtnBuilder::rule_ref(e),
            AtnBuilder::token(INT),
            AtnBuilder::token(ID),
        ]],
    );
    builder.alts(e, &[&[AtnBuilder::token(INT)], &[]]);
    let atn = builder.build();

    // the decisions: 0 = s's block, 1 = e's block
    assert_eq!(atn.num_decisions(), 2);

    // the invocation stack for predicting inside e, called from a,
    // called from s
    let invoking_e_from_a = atn
        .states
        .iter()
        .find(|state| {
            state.rule == a
                && state.transitions.iter().any(
                    |t| matches!(t, quiver::atn::Transition::Rule { rule, .. } if *rule == e),
                )
        })
        .map(|state| state.number)
        .expect("a invokes e");
    let invoking_a_from_s = atn
        .states
        .iter()
        .find(|state| {
            state.rule == s
                && state.transitions.iter().any(
                    |t| matches!(t, quiver::atn::Transition::Rule { rule, .. } if *rule == a),
                )
        })
        .map(|state| state.number)
        .expect("s invokes a");

    let sim = ParserAtnSimulator::new(atn);
    let listener = Arc::new(CountingListener::default());
    sim.attach_listener(listener.clone());

    let outermost = quiver::context::RuleCall::new(None, -1);
    let a_frame = quiver::context::RuleCall::new(Some(outermost), invoking_a_from_s as i32);
    let e_frame = quiver::context::RuleCall::new(Some(a_frame), invoking_e_from_a as i32);

    // after "$", inside a, at e's decision the remaining input is INT ID
    let mut input = TokenTypeStream::new(vec![INT, ID]);
    let alt = sim
        .adaptive_predict(&mut input, 1, Some(&e_frame), &NoPreds)
        .unwrap();

    // full context picks e's INT alternative
    assert_eq!(alt, 1);
    assert_eq!(listener.fallbacks.load(Ordering::SeqCst), 1);
    assert_eq!(listener.sensitivities.load(Ordering::SeqCst), 1);
    assert_eq!(listener.ambiguities.load(Ordering::SeqCst), 0);
    assert!(sim.dfas()[1].is_context_sensitive());
}

/// Scenario: `p : ID | ID ;` in exact-ambiguity mode — the tie is
/// reported exactly and resolves to the minimum alternative.
#[test]
fn identical_alternatives_report_exact_ambiguity() {
    let mut builder = AtnBuilder::parser(4);
    let p = builder.rule("p");
    builder.alts(p, &[&[AtnBuilder::token(ID)], &[AtnBuilder::token(ID)]]);
    let atn = builder.build();

    let sim =
        ParserAtnSimulator::new(atn).with_mode(PredictionMode::LlExactAmbigDetection);
    let listener = Arc::new(CountingListener::default());
    sim.attach_listener(listener.clone());

    let mut input = TokenTypeStream::new(vec![ID]);
    let alt = sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap();

    assert_eq!(alt, 1);
    assert_eq!(listener.ambiguities.load(Ordering::SeqCst), 1);
    assert_eq!(listener.exact_ambiguities.load(Ordering::SeqCst), 1);
    assert_eq!(listener.fallbacks.load(Ordering::SeqCst), 1);
}

/// In plain SLL mode the same conflict resolves locally with no fallback.
#[test]
fn sll_mode_resolves_conflicts_to_minimum() {
    let mut builder = AtnBuilder::parser(4);
    let p = builder.rule("p");
    builder.alts(p, &[&[AtnBuilder::token(ID)], &[AtnBuilder::token(ID)]]);
    let atn = builder.build();

    let sim = ParserAtnSimulator::new(atn).with_mode(PredictionMode::Sll);
    let listener = Arc::new(CountingListener::default());
    sim.attach_listener(listener.clone());

    let mut input = TokenTypeStream::new(vec![ID]);
    assert_eq!(sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap(), 1);
    assert_eq!(listener.fallbacks.load(Ordering::SeqCst), 0);
}

/// Semantic predicates disambiguate otherwise identical alternatives.
#[test]
fn predicates_select_the_viable_alternative() {
    let mut builder = AtnBuilder::parser(4);
    let r = builder.rule("r");
    builder.alts(
        r,
        &[
            &[AtnBuilder::predicate(0), AtnBuilder::token(ID)],
            &[AtnBuilder::predicate(1), AtnBuilder::token(ID)],
        ],
    );
    let atn = builder.build();
    let sim = ParserAtnSimulator::new(atn);

    let mut input = TokenTypeStream::new(vec![ID]);
    let alt = sim
        .adaptive_predict(
            &mut input,
            0,
            None,
            &FixedPreds {
                truths: vec![false, true],
            },
        )
        .unwrap();
    assert_eq!(alt, 2);

    // every predicate false: nothing is viable
    let mut input = TokenTypeStream::new(vec![ID]);
    let err = sim
        .adaptive_predict(
            &mut input,
            0,
            None,
            &FixedPreds {
                truths: vec![false, false],
            },
        )
        .unwrap_err();
    assert!(matches!(err, PredictionError::NoViableAlternative { .. }));
}

/// The profiling observer sees the whole story: invocations, lookahead
/// depth, transition kinds, and fallbacks.
#[test]
fn profiler_aggregates_per_decision_statistics() {
    use quiver::sim::ProfilingObserver;

    let mut builder = AtnBuilder::parser(4);
    let p = builder.rule("p");
    builder.alts(p, &[&[AtnBuilder::token(ID)], &[AtnBuilder::token(ID)]]);
    let atn = builder.build();

    let profiler = Arc::new(ProfilingObserver::new());
    let sim = ParserAtnSimulator::new(atn).with_observer(profiler.clone());

    for _ in 0..3 {
        let mut input = TokenTypeStream::new(vec![ID]);
        sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap();
    }

    let info = &profiler.decision_info()[0];
    assert_eq!(info.invocations, 3);
    assert_eq!(info.ll_fallback, 3);
    assert_eq!(info.fallbacks.len(), 3);
    assert_eq!(info.ambiguities.len(), 3);
    // cold run computes through the ATN; warm runs ride the DFA
    assert!(info.sll_atn_transitions >= 1);
    assert!(info.sll_dfa_transitions >= 1);
    assert_eq!(info.sll_max_look, 1);
    assert_eq!(info.ll_max_look, 1);
    assert!(info.time_in_prediction_ns > 0);
}

#[test]
fn cancellation_hook_stops_prediction() {
    let mut builder = AtnBuilder::parser(4);
    let r = builder.rule("r");
    builder.alts(
        r,
        &[
            &[AtnBuilder::token(ID), AtnBuilder::token(EQ)],
            &[AtnBuilder::token(ID), AtnBuilder::token(SEMI)],
        ],
    );
    let atn = builder.build();
    let sim = ParserAtnSimulator::new(atn).with_cancellation(Arc::new(|| true));

    let mut input = TokenTypeStream::new(vec![ID, SEMI]);
    let err = sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap_err();
    assert!(matches!(err, PredictionError::Cancelled { decision: 0 }));
}
