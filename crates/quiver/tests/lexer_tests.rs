//! Lexer-mode simulation tests: longest match, rule priority, code-point
//! semantics, and action executors.

use quiver::sim::lexer::{LexerAction, LexerActionSink};
use quiver::sim::LexerAtnSimulator;
use quiver::stream::{CodePointStream, SymbolStream};
use quiver::testing::{AtnBuilder, Element};

const TT_IF: i32 = 1;
const TT_ID: i32 = 2;
const TT_WS: i32 = 3;
const TT_LETTERS: i32 = 4;

fn keyword_lexer() -> LexerAtnSimulator {
    // IF : 'if' ;  ID : [a-z]+ ;  WS : ' ' ;
    let mut builder = AtnBuilder::lexer();
    let mode = builder.mode();
    builder.lexer_rule(
        mode,
        "IF",
        TT_IF,
        &[AtnBuilder::token('i' as i32), AtnBuilder::token('f' as i32)],
    );
    builder.lexer_rule(
        mode,
        "ID",
        TT_ID,
        &[Element::Plus(vec![vec![AtnBuilder::set(
            'a' as i32..='z' as i32,
        )]])],
    );
    builder.lexer_rule(mode, "WS", TT_WS, &[AtnBuilder::token(' ' as i32)]);
    LexerAtnSimulator::new(builder.build())
}

#[test]
fn earlier_rule_wins_ties() {
    let sim = keyword_lexer();
    let mut input = CodePointStream::from_str("if");
    let matched = sim.match_token(&mut input, 0).unwrap();
    assert_eq!(matched.token_type, TT_IF);
    assert_eq!(matched.start_index, 0);
    assert_eq!(matched.end_index, 2);
}

#[test]
fn longest_match_beats_keyword_prefix() {
    let sim = keyword_lexer();
    let mut input = CodePointStream::from_str("ifx ");
    let matched = sim.match_token(&mut input, 0).unwrap();
    assert_eq!(matched.token_type, TT_ID);
    assert_eq!(matched.end_index, 3);
    // the stream sits on the next token
    assert_eq!(input.index(), 3);

    let matched = sim.match_token(&mut input, 0).unwrap();
    assert_eq!(matched.token_type, TT_WS);
}

#[test]
fn tokenizing_a_sequence_reuses_the_dfa() {
    let sim = keyword_lexer();
    let mut input = CodePointStream::from_str("if ab if");
    let mut kinds = Vec::new();
    while input.index() < input.size() {
        kinds.push(sim.match_token(&mut input, 0).unwrap().token_type);
    }
    assert_eq!(kinds, vec![TT_IF, TT_WS, TT_ID, TT_WS, TT_IF]);
}

#[test]
fn unmatched_input_restores_position() {
    let sim = keyword_lexer();
    let mut input = CodePointStream::from_str("9");
    let err = sim.match_token(&mut input, 0).unwrap_err();
    assert!(matches!(
        err,
        quiver::error::PredictionError::NoViableAlternative { .. }
    ));
    assert_eq!(input.index(), 0);
}

/// Scenario: a rule over supplementary-plane letters matches whole code
/// points — the token spans 5 code points, not 8 UTF-16 units.
#[test]
fn supplementary_plane_set_matches_code_points() {
    let text = "a\u{1D5C2}\u{1D5CE}\u{1D5BA}c";
    assert_eq!(text.encode_utf16().count(), 8);

    // LETTERS : ('a' | SMP letters)* 'c' ;
    let mut builder = AtnBuilder::lexer();
    let mode = builder.mode();
    builder.lexer_rule(
        mode,
        "LETTERS",
        TT_LETTERS,
        &[
            Element::Star(vec![vec![AtnBuilder::set([
                'a' as i32,
                0x1D5BA,
                0x1D5C2,
                0x1D5CE,
            ])]]),
            AtnBuilder::token('c' as i32),
        ],
    );
    let sim = LexerAtnSimulator::new(builder.build());

    let mut input = CodePointStream::from_str(text);
    let matched = sim.match_token(&mut input, 0).unwrap();
    assert_eq!(matched.token_type, TT_LETTERS);
    assert_eq!(matched.start_index, 0);
    assert_eq!(matched.end_index, 5);
}

#[test]
fn accept_state_carries_the_action_executor() {
    #[derive(Default)]
    struct Recorder {
        skipped: bool,
        channel: Option<u32>,
    }
    impl LexerActionSink for Recorder {
        fn skip(&mut self) {
            self.skipped = true;
        }
        fn set_channel(&mut self, channel: u32) {
            self.channel = Some(channel);
        }
    }

    // WS : ' '+ -> skip, channel(1) ;
    let mut builder = AtnBuilder::lexer();
    let mode = builder.mode();
    let skip = builder.lexer_action(LexerAction::Skip);
    let channel = builder.lexer_action(LexerAction::Channel(1));
    builder.lexer_rule(
        mode,
        "WS",
        TT_WS,
        &[
            Element::Plus(vec![vec![AtnBuilder::token(' ' as i32)]]),
            Element::Action(skip),
            Element::Action(channel),
        ],
    );
    let sim = LexerAtnSimulator::new(builder.build());

    let mut input = CodePointStream::from_str("   x");
    let matched = sim.match_token(&mut input, 0).unwrap();
    assert_eq!(matched.token_type, TT_WS);
    assert_eq!(matched.end_index, 3);

    let executor = matched.executor.expect("actions attached");
    let mut recorder = Recorder::default();
    executor.execute(&mut recorder);
    assert!(recorder.skipped);
    assert_eq!(recorder.channel, Some(1));
}
