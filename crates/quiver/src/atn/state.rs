//! Typed ATN states.

use crate::atn::transition::Transition;
use smallvec::SmallVec;

/// The structural role a state plays in its rule's subgraph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtnStateKind {
    Basic,
    RuleStart,
    RuleStop,
    BlockStart,
    BlockEnd,
    PlusBlockStart,
    PlusLoopBack,
    StarBlockStart,
    StarLoopEntry,
    StarLoopBack,
    LoopEnd,
    TokensStart,
}

/// A single numbered state in the ATN.
#[derive(Clone, Debug)]
pub struct AtnState {
    /// Position in [`Atn::states`](crate::atn::Atn::states); stable identity.
    pub number: u32,
    /// The rule this state belongs to.
    pub rule: u32,
    pub kind: AtnStateKind,
    /// Outgoing edges, in grammar order. Alternative order at decision
    /// states is the order of these transitions.
    pub transitions: SmallVec<[Transition; 2]>,
    /// Decision index when this state heads a decision, else `None`.
    pub decision: Option<u32>,
    /// Non-greedy loop decision (lexer `*?` and friends).
    pub non_greedy: bool,
    /// Set on the star-loop-entry of a left-recursive rule; start states of
    /// precedence DFAs carry this flag.
    pub precedence_rule_decision: bool,
}

impl AtnState {
    /// Create a plain state with no transitions.
    #[must_use]
    pub fn new(number: u32, rule: u32, kind: AtnStateKind) -> Self {
        Self {
            number,
            rule,
            kind,
            transitions: SmallVec::new(),
            decision: None,
            non_greedy: false,
            precedence_rule_decision: false,
        }
    }

    /// `true` when this state heads a decision.
    #[must_use]
    pub fn is_decision(&self) -> bool {
        self.decision.is_some()
    }

    /// `true` for rule-stop states, where closure pops the prediction
    /// context.
    #[must_use]
    pub fn is_rule_stop(&self) -> bool {
        self.kind == AtnStateKind::RuleStop
    }

    /// Whether only epsilon-like transitions leave this state. States with
    /// no transitions at all (rule stops of uncalled rules) report `false`
    /// so closure keeps their configurations in the set.
    #[must_use]
    pub fn only_has_epsilon_transitions(&self) -> bool {
        !self.transitions.is_empty() && self.transitions.iter().all(Transition::is_epsilon)
    }
}
