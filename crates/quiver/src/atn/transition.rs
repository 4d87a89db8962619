//! Typed transitions between ATN states.

use crate::atn::interval::IntervalSet;
use crate::stream::EOF;

/// A directed, typed edge in the ATN.
///
/// Epsilon-like transitions (everything that consumes no input) are
/// followed during closure; label-bearing transitions are consulted while
/// computing reach sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Consumes nothing. Follow edges out of left-recursive rules carry the
    /// index of the rule being returned to in `outermost_precedence_return`
    /// so the precedence filter can suppress itself for configurations that
    /// escaped the recursion.
    Epsilon {
        target: u32,
        outermost_precedence_return: Option<u32>,
    },

    /// Matches exactly one symbol code.
    Atom { target: u32, symbol: i32 },

    /// Matches any symbol in the inclusive range.
    Range { target: u32, start: i32, end: i32 },

    /// Matches any symbol in the set.
    Set { target: u32, set: IntervalSet },

    /// Matches any symbol *not* in the set (EOF never matches).
    NotSet { target: u32, set: IntervalSet },

    /// Matches any single symbol except EOF.
    Wildcard { target: u32 },

    /// Invokes another rule. `target` is the invoked rule's start state;
    /// `follow` is the state to return to when the rule completes.
    Rule {
        target: u32,
        rule: u32,
        precedence: u32,
        follow: u32,
    },

    /// Gated by a semantic predicate, evaluated during closure.
    Predicate {
        target: u32,
        rule: u32,
        pred_index: u32,
        is_ctx_dependent: bool,
    },

    /// Carries a lexer action; epsilon for prediction purposes.
    Action {
        target: u32,
        rule: u32,
        action_index: u32,
    },

    /// Gated by the parser's current precedence level.
    PrecedencePredicate { target: u32, precedence: u32 },
}

impl Transition {
    /// The state this transition leads to.
    #[must_use]
    pub fn target(&self) -> u32 {
        match *self {
            Self::Epsilon { target, .. }
            | Self::Atom { target, .. }
            | Self::Range { target, .. }
            | Self::Set { target, .. }
            | Self::NotSet { target, .. }
            | Self::Wildcard { target }
            | Self::Rule { target, .. }
            | Self::Predicate { target, .. }
            | Self::Action { target, .. }
            | Self::PrecedencePredicate { target, .. } => target,
        }
    }

    /// `true` when following this transition consumes no input.
    #[must_use]
    pub fn is_epsilon(&self) -> bool {
        matches!(
            self,
            Self::Epsilon { .. }
                | Self::Rule { .. }
                | Self::Predicate { .. }
                | Self::Action { .. }
                | Self::PrecedencePredicate { .. }
        )
    }

    /// Whether the transition's label admits `symbol`.
    ///
    /// Epsilon-like transitions admit nothing. EOF only matches an explicit
    /// EOF atom or set member; wildcard and negated sets never admit it.
    #[must_use]
    pub fn matches(&self, symbol: i32) -> bool {
        match self {
            Self::Atom { symbol: s, .. } => *s == symbol,
            Self::Range { start, end, .. } => symbol >= *start && symbol <= *end,
            Self::Set { set, .. } => set.contains(symbol),
            Self::NotSet { set, .. } => symbol != EOF && !set.contains(symbol),
            Self::Wildcard { .. } => symbol != EOF,
            _ => false,
        }
    }
}
