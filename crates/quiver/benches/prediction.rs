//! Prediction micro-benchmarks: cold DFA construction vs warm edge
//! walking, and context-merge throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quiver::atn::PredicateEvaluator;
use quiver::context::{ContextCache, PredictionContext};
use quiver::sim::ParserAtnSimulator;
use quiver::stream::TokenTypeStream;
use quiver::testing::{AtnBuilder, Element};

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

fn assignment_grammar() -> std::sync::Arc<quiver::atn::Atn> {
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
            AtnBuilder::token(quiver::stream::EOF),
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
    builder.build()
}

fn bench_prediction(c: &mut Criterion) {
    c.bench_function("predict_cold", |b| {
        b.iter(|| {
            let sim = ParserAtnSimulator::new(assignment_grammar());
            let mut input = TokenTypeStream::new(vec![ID, EQ, INT, SEMI]);
            black_box(sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap())
        });
    });

    let sim = ParserAtnSimulator::new(assignment_grammar());
    // warm the DFA once
    let mut input = TokenTypeStream::new(vec![ID, EQ, INT, SEMI]);
    let _ = sim.adaptive_predict(&mut input, 0, None, &NoPreds);

    c.bench_function("predict_warm", |b| {
        b.iter(|| {
            let mut input = TokenTypeStream::new(vec![ID, EQ, INT, SEMI]);
            black_box(sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap())
        });
    });
}

fn bench_context_join(c: &mut Criterion) {
    c.bench_function("context_join_fanout", |b| {
        b.iter(|| {
            let mut cache = ContextCache::new();
            let mut joined = PredictionContext::empty_full().child(0);
            for state in 1..64 {
                let other = PredictionContext::empty_full().child(state);
                joined = PredictionContext::join(&joined, &other, &mut cache);
            }
            black_box(joined.size())
        });
    });
}

criterion_group!(benches, bench_prediction, bench_context_join);
criterion_main!(benches);
