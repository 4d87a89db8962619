//! # Quiver
//!
//! An adaptive LL(*) prediction runtime: lazily-built, thread-safe DFAs
//! over an Augmented Transition Network (ATN).
//!
//! ## Overview
//!
//! Given a grammar compiled to an [`Atn`](atn::Atn), an integer symbol
//! stream, and a decision point, quiver predicts which alternative
//! production to take. It implements the hard parts of an adaptive
//! parser runtime:
//!
//! - **Graph-structured prediction stacks**: immutable, hash-consed
//!   [`PredictionContext`](context::PredictionContext) DAGs that merge
//!   many concurrent call stacks into one structure
//! - **Configuration sets**: [`AtnConfigSet`](config::AtnConfigSet)
//!   merges configurations in place during closure, then seals into the
//!   frozen form DFA states are interned by
//! - **Lazy, shared DFAs**: [`Dfa`](dfa::Dfa) states and edges are added
//!   as prediction encounters input and are shared by every parser
//!   instance running the grammar, across threads
//! - **Adaptive prediction**: SLL simulation with full-context LL
//!   failover, semantic predicate evaluation, precedence-based
//!   left-recursion support, and ambiguity / context-sensitivity
//!   reporting ([`ParserAtnSimulator`](sim::ParserAtnSimulator))
//! - **Lexer mode simulation**: longest-match token recognition with
//!   accept-state action executors
//!   ([`LexerAtnSimulator`](sim::LexerAtnSimulator))
//!
//! ## Quick Start
//!
//! ```rust
//! use quiver::atn::PredicateEvaluator;
//! use quiver::sim::ParserAtnSimulator;
//! use quiver::stream::TokenTypeStream;
//! use quiver::testing::AtnBuilder;
//!
//! const ID: i32 = 1;
//! const INT: i32 = 2;
//!
//! struct NoPreds;
//! impl PredicateEvaluator for NoPreds {
//!     fn eval_predicate(&self, _rule: u32, _pred: u32) -> bool {
//!         true
//!     }
//! }
//!
//! // r : ID | INT ;
//! let mut builder = AtnBuilder::parser(2);
//! let r = builder.rule("r");
//! builder.alts(r, &[&[AtnBuilder::token(ID)], &[AtnBuilder::token(INT)]]);
//! let atn = builder.build();
//!
//! let sim = ParserAtnSimulator::new(atn);
//! let mut input = TokenTypeStream::new(vec![INT]);
//! let alt = sim.adaptive_predict(&mut input, 0, None, &NoPreds).unwrap();
//! assert_eq!(alt, 2);
//! ```
//!
//! ## Modules
//!
//! - [`atn`] - The frozen grammar automaton: states, transitions,
//!   semantic contexts
//! - [`context`] - Graph-structured prediction stacks and their caches
//! - [`config`] - ATN configurations and mergeable configuration sets
//! - [`dfa`] - Lazily-built DFAs: states, edge maps, concurrent interning
//! - [`sim`] - The parser and lexer simulators and the profiling observer
//! - [`stream`] - Symbol streams and code-point decoding
//! - [`listener`] - Advisory reporting hooks
//! - [`error`] - Error types
//! - [`testing`] - Programmatic ATN construction for tests and embedders

pub mod alt_set;
pub mod atn;
pub mod config;
pub mod context;
pub mod dfa;
pub mod error;
pub mod listener;
pub mod sim;
pub mod stream;
pub mod testing;

// Re-export commonly used types
pub use alt_set::AltBitSet;
pub use atn::{Atn, GrammarKind, PredicateEvaluator, SemanticContext};
pub use config::{AtnConfig, AtnConfigSet, ConflictInfo};
pub use context::{ContextCache, PredictionContext, RuleCall};
pub use dfa::{Dfa, DfaState, EdgeMap};
pub use error::{DecodeError, PredictionError};
pub use listener::{PredictionListener, ProxyListener, ReportContext};
pub use sim::{
    LexerAtnSimulator, ParserAtnSimulator, PredictionMode, PredictionObserver, ProfilingObserver,
};
pub use stream::{CodePointStream, DecodePolicy, SymbolStream, TokenTypeStream, EOF};
