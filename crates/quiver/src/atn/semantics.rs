//! Semantic contexts: predicate trees gating ATN configurations.
//!
//! A semantic context records which user predicates must hold for a
//! configuration to be viable. Contexts form a small and/or tree over leaf
//! predicates and precedence tests; the smart constructors keep the tree
//! reduced (flattened, deduplicated, precedence tests folded).

use smallvec::SmallVec;
use std::sync::Arc;

/// Evaluates leaf predicates on behalf of the simulator.
///
/// The embedding parser supplies this; the prediction core never interprets
/// predicate bodies itself.
pub trait PredicateEvaluator {
    /// Evaluate predicate `pred_index` of `rule`.
    fn eval_predicate(&self, rule: u32, pred_index: u32) -> bool;

    /// The parser's current precedence level.
    fn precedence(&self) -> u32 {
        0
    }
}

/// A predicate tree attached to an ATN configuration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SemanticContext {
    /// The trivially-true context. The default for almost every
    /// configuration.
    None,
    /// A user predicate in the grammar.
    Predicate {
        rule: u32,
        pred_index: u32,
        is_ctx_dependent: bool,
    },
    /// `{precedence >= n}?` test used by left-recursive rules.
    Precedence(u32),
    /// All operands must hold.
    And(Arc<[SemanticContext]>),
    /// At least one operand must hold.
    Or(Arc<[SemanticContext]>),
}

impl SemanticContext {
    /// Conjunction with reduction: `None` operands vanish, nested `And`s
    /// flatten, duplicates collapse, and precedence tests keep only the
    /// most restrictive (smallest) one.
    #[must_use]
    pub fn and(a: &Self, b: &Self) -> Self {
        match (a, b) {
            (Self::None, other) | (other, Self::None) => other.clone(),
            _ => {
                let mut operands: SmallVec<[Self; 4]> = SmallVec::new();
                let mut precedence: Option<u32> = None;
                for ctx in [a, b] {
                    Self::collect(ctx, true, &mut operands, &mut precedence, u32::min);
                }
                Self::rebuild(operands, precedence, true)
            }
        }
    }

    /// Disjunction with reduction: `None` absorbs, nested `Or`s flatten,
    /// duplicates collapse, and precedence tests keep only the least
    /// restrictive (largest) one.
    #[must_use]
    pub fn or(a: &Self, b: &Self) -> Self {
        if matches!(a, Self::None) || matches!(b, Self::None) {
            return Self::None;
        }
        let mut operands: SmallVec<[Self; 4]> = SmallVec::new();
        let mut precedence: Option<u32> = None;
        for ctx in [a, b] {
            Self::collect(ctx, false, &mut operands, &mut precedence, u32::max);
        }
        Self::rebuild(operands, precedence, false)
    }

    fn collect(
        ctx: &Self,
        conjunction: bool,
        operands: &mut SmallVec<[Self; 4]>,
        precedence: &mut Option<u32>,
        fold: fn(u32, u32) -> u32,
    ) {
        match ctx {
            Self::And(items) if conjunction => {
                for item in items.iter() {
                    Self::collect(item, conjunction, operands, precedence, fold);
                }
            }
            Self::Or(items) if !conjunction => {
                for item in items.iter() {
                    Self::collect(item, conjunction, operands, precedence, fold);
                }
            }
            Self::Precedence(p) => {
                *precedence = Some(precedence.map_or(*p, |q| fold(q, *p)));
            }
            other => {
                if !operands.contains(other) {
                    operands.push(other.clone());
                }
            }
        }
    }

    fn rebuild(
        mut operands: SmallVec<[Self; 4]>,
        precedence: Option<u32>,
        conjunction: bool,
    ) -> Self {
        if let Some(p) = precedence {
            let folded = Self::Precedence(p);
            if !operands.contains(&folded) {
                operands.push(folded);
            }
        }
        match operands.len() {
            0 => Self::None,
            1 => operands.pop().unwrap_or(Self::None),
            _ => {
                let items: Arc<[Self]> = operands.into_vec().into();
                if conjunction {
                    Self::And(items)
                } else {
                    Self::Or(items)
                }
            }
        }
    }

    /// Fully evaluate against the caller's evaluator.
    ///
    /// A precedence test `Precedence(n)` holds when `n` is at least the
    /// parser's current precedence level.
    #[must_use]
    pub fn eval(&self, evaluator: &dyn PredicateEvaluator) -> bool {
        match self {
            Self::None => true,
            Self::Predicate {
                rule, pred_index, ..
            } => evaluator.eval_predicate(*rule, *pred_index),
            Self::Precedence(p) => *p >= evaluator.precedence(),
            Self::And(items) => items.iter().all(|c| c.eval(evaluator)),
            Self::Or(items) => items.iter().any(|c| c.eval(evaluator)),
        }
    }

    /// Partially evaluate precedence tests against a known precedence
    /// level, leaving user predicates intact.
    ///
    /// Returns `None` when the context is statically false at this
    /// precedence.
    #[must_use]
    pub fn eval_precedence(&self, precedence: u32) -> Option<Self> {
        match self {
            Self::Precedence(p) => {
                if *p >= precedence {
                    Some(Self::None)
                } else {
                    None
                }
            }
            Self::And(items) => {
                let mut result = Self::None;
                for item in items.iter() {
                    result = Self::and(&result, &item.eval_precedence(precedence)?);
                }
                Some(result)
            }
            Self::Or(items) => {
                let mut survivors: Vec<Self> = Vec::new();
                for item in items.iter() {
                    if let Some(reduced) = item.eval_precedence(precedence) {
                        if matches!(reduced, Self::None) {
                            return Some(Self::None);
                        }
                        survivors.push(reduced);
                    }
                }
                match survivors.len() {
                    0 => None,
                    1 => survivors.pop(),
                    _ => {
                        let mut result = survivors.remove(0);
                        for s in survivors {
                            result = Self::or(&result, &s);
                        }
                        Some(result)
                    }
                }
            }
            other => Some(other.clone()),
        }
    }

    /// `true` when this is the trivially-true context.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl Default for SemanticContext {
    fn default() -> Self {
        Self::None
    }
}
