//! # Prediction Contexts
//!
//! The graph-structured stack of rule-return states.
//!
//! ## Overview
//!
//! A [`PredictionContext`] compactly represents every rule-invocation stack
//! a configuration may be executing under. It is a cheap-clone handle to an
//! immutable, shared node; a node pairs each parent pointer with the ATN
//! state to return to when the current rule completes. Two distinguished
//! empty terminators exist:
//!
//! - [`PredictionContext::empty_local`] — "any caller"; used by SLL
//!   prediction, it absorbs everything it is joined with.
//! - [`PredictionContext::empty_full`] — "no caller"; marks the outermost
//!   frame during full-context prediction.
//!
//! Return states in a node are strictly increasing, the structural hash is
//! computed at construction, and structural equality (`==`) is the semantic
//! equality; [`PredictionContext::same`] is the conservative identity
//! fast path.
//!
//! Merging is [`PredictionContext::join`]; per-prediction memoization goes
//! through [`ContextCache`], and cross-prediction sharing through the
//! [`ContextInternMap`] hash-consing table.

mod cache;

pub use cache::{ContextCache, ContextInternMap};

use crate::atn::{Atn, Transition};
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

/// Return-state key standing for the local-empty terminator.
pub const EMPTY_LOCAL_STATE_KEY: i32 = i32::MIN;
/// Return-state key standing for the outermost (full-empty) terminator.
pub const EMPTY_FULL_STATE_KEY: i32 = i32::MAX;

static EMPTY_LOCAL: LazyLock<PredictionContext> =
    LazyLock::new(|| PredictionContext::from_node(ContextNode::empty(true)));
static EMPTY_FULL: LazyLock<PredictionContext> =
    LazyLock::new(|| PredictionContext::from_node(ContextNode::empty(false)));

/// One frame of a parser's rule-invocation stack, as seen by the embedding
/// runtime. `invoking_state == -1` marks the outermost frame.
#[derive(Debug)]
pub struct RuleCall {
    pub parent: Option<Arc<RuleCall>>,
    pub invoking_state: i32,
}

impl RuleCall {
    #[must_use]
    pub fn new(parent: Option<Arc<RuleCall>>, invoking_state: i32) -> Arc<Self> {
        Arc::new(Self {
            parent,
            invoking_state,
        })
    }

    /// The outermost frame carries no invoking state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invoking_state < 0
    }
}

#[derive(Debug)]
enum ContextKind {
    Empty {
        local: bool,
    },
    Singleton {
        parent: PredictionContext,
        return_state: i32,
    },
    Array {
        parents: Vec<PredictionContext>,
        return_states: Vec<i32>,
    },
}

#[derive(Debug)]
struct ContextNode {
    cached_hash: u64,
    kind: ContextKind,
}

impl ContextNode {
    fn empty(local: bool) -> Self {
        Self {
            cached_hash: finish_hash(HASH_SEED, 0),
            kind: ContextKind::Empty { local },
        }
    }
}

/// An immutable node of the graph-structured prediction stack, handled by
/// reference. Cloning shares the node.
#[derive(Clone, Debug)]
pub struct PredictionContext {
    node: Arc<ContextNode>,
}

impl PredictionContext {
    fn from_node(node: ContextNode) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    fn singleton(parent: PredictionContext, return_state: i32) -> Self {
        let mut h = HASH_SEED;
        h = mix_hash(h, parent.context_hash());
        h = mix_hash(h, return_state as i64 as u64);
        Self::from_node(ContextNode {
            cached_hash: finish_hash(h, 2),
            kind: ContextKind::Singleton {
                parent,
                return_state,
            },
        })
    }

    fn array(parents: Vec<PredictionContext>, return_states: Vec<i32>) -> Self {
        debug_assert_eq!(parents.len(), return_states.len());
        debug_assert!(return_states.windows(2).all(|w| w[0] < w[1]));
        let mut h = HASH_SEED;
        for parent in &parents {
            h = mix_hash(h, parent.context_hash());
        }
        for &r in &return_states {
            h = mix_hash(h, r as i64 as u64);
        }
        let len = parents.len();
        Self::from_node(ContextNode {
            cached_hash: finish_hash(h, 2 * len as u64),
            kind: ContextKind::Array {
                parents,
                return_states,
            },
        })
    }

    /// The local-empty terminator ("any caller").
    #[must_use]
    pub fn empty_local() -> Self {
        EMPTY_LOCAL.clone()
    }

    /// The full-empty terminator ("no caller"; outermost frame).
    #[must_use]
    pub fn empty_full() -> Self {
        EMPTY_FULL.clone()
    }

    /// Identity test: do both handles share one node? A conservative fast
    /// path for equality — `same` implies `==`, never the reverse.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Stable address of the shared node, for identity-keyed caches. Valid
    /// while at least one handle to the node is alive.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.node) as usize
    }

    /// Number of (parent, return-state) edges in this node.
    #[must_use]
    pub fn size(&self) -> usize {
        match &self.node.kind {
            ContextKind::Empty { .. } => 0,
            ContextKind::Singleton { .. } => 1,
            ContextKind::Array { return_states, .. } => return_states.len(),
        }
    }

    /// The `index`-th return state.
    ///
    /// # Panics
    ///
    /// Panics when `index >= size()`.
    #[must_use]
    pub fn return_state(&self, index: usize) -> i32 {
        match &self.node.kind {
            ContextKind::Empty { .. } => panic!("empty context has no return states"),
            ContextKind::Singleton { return_state, .. } => {
                assert_eq!(index, 0);
                *return_state
            }
            ContextKind::Array { return_states, .. } => return_states[index],
        }
    }

    /// The `index`-th parent.
    ///
    /// # Panics
    ///
    /// Panics when `index >= size()`.
    #[must_use]
    pub fn parent(&self, index: usize) -> &Self {
        match &self.node.kind {
            ContextKind::Empty { .. } => panic!("empty context has no parents"),
            ContextKind::Singleton { parent, .. } => {
                assert_eq!(index, 0);
                parent
            }
            ContextKind::Array { parents, .. } => &parents[index],
        }
    }

    /// Index of `return_state` in this node, or `None`.
    #[must_use]
    pub fn find_return_state(&self, return_state: i32) -> Option<usize> {
        match &self.node.kind {
            ContextKind::Empty { .. } => None,
            ContextKind::Singleton {
                return_state: rs, ..
            } => (*rs == return_state).then_some(0),
            ContextKind::Array { return_states, .. } => {
                return_states.binary_search(&return_state).ok()
            }
        }
    }

    /// `true` for the two empty terminators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.node.kind, ContextKind::Empty { .. })
    }

    /// `true` for the local-empty terminator specifically.
    #[must_use]
    pub fn is_empty_local(&self) -> bool {
        matches!(self.node.kind, ContextKind::Empty { local: true })
    }

    /// Whether some path through this node reaches an empty terminator
    /// directly.
    #[must_use]
    pub fn has_empty(&self) -> bool {
        match &self.node.kind {
            ContextKind::Empty { .. } => true,
            ContextKind::Singleton { return_state, .. } => {
                *return_state == EMPTY_FULL_STATE_KEY
            }
            // sorted, so an empty alternative is always last
            ContextKind::Array { return_states, .. } => {
                return_states.last() == Some(&EMPTY_FULL_STATE_KEY)
            }
        }
    }

    /// Whether any path through the DAG reaches an empty terminator —
    /// i.e. some represented stack still depends on unseen outer context.
    #[must_use]
    pub fn has_empty_path(&self) -> bool {
        let mut seen: hashbrown::HashSet<usize, ahash::RandomState> =
            hashbrown::HashSet::default();
        let mut work: SmallVec<[PredictionContext; 8]> = SmallVec::new();
        work.push(self.clone());
        while let Some(ctx) = work.pop() {
            if !seen.insert(ctx.addr()) {
                continue;
            }
            if ctx.has_empty() {
                return true;
            }
            for i in 0..ctx.size() {
                work.push(ctx.parent(i).clone());
            }
        }
        false
    }

    /// Push a new frame: a singleton whose sole parent is `self`.
    #[must_use]
    pub fn child(&self, return_state: i32) -> Self {
        Self::singleton(self.clone(), return_state)
    }

    /// Lift a parser rule-invocation stack into a prediction context.
    #[must_use]
    pub fn from_rule_context(
        atn: &Atn,
        context: Option<&Arc<RuleCall>>,
        full_context: bool,
    ) -> Self {
        let Some(ctx) = context else {
            return if full_context {
                Self::empty_full()
            } else {
                Self::empty_local()
            };
        };
        if ctx.is_empty() {
            return if full_context {
                Self::empty_full()
            } else {
                Self::empty_local()
            };
        }

        let parent = Self::from_rule_context(atn, ctx.parent.as_ref(), full_context);
        let state = atn.state(ctx.invoking_state as u32);
        let follow = state
            .transitions
            .iter()
            .find_map(|t| match t {
                Transition::Rule { follow, .. } => Some(*follow),
                _ => None,
            })
            .expect("invoking state must carry a rule transition");
        parent.child(follow as i32)
    }

    fn add_empty_context(&self) -> Self {
        match &self.node.kind {
            ContextKind::Empty { .. } => self.clone(),
            ContextKind::Singleton {
                parent,
                return_state,
            } => {
                if *return_state == EMPTY_FULL_STATE_KEY {
                    self.clone()
                } else {
                    Self::array(
                        vec![parent.clone(), Self::empty_full()],
                        vec![*return_state, EMPTY_FULL_STATE_KEY],
                    )
                }
            }
            ContextKind::Array {
                parents,
                return_states,
            } => {
                if self.has_empty() {
                    self.clone()
                } else {
                    let mut parents = parents.clone();
                    let mut return_states = return_states.clone();
                    parents.push(Self::empty_full());
                    return_states.push(EMPTY_FULL_STATE_KEY);
                    Self::array(parents, return_states)
                }
            }
        }
    }

    /// Structural merge of two contexts.
    ///
    /// The result's return states are the sorted union of both inputs'
    /// return states; shared return states recursively join their parents.
    /// When one input already covers the other, that input is returned
    /// unchanged (node-identical).
    #[must_use]
    pub fn join(a: &Self, b: &Self, cache: &mut ContextCache) -> Self {
        if a.same(b) {
            return a.clone();
        }

        if a.is_empty() {
            return if a.is_empty_local() {
                a.clone()
            } else {
                b.add_empty_context()
            };
        }
        if b.is_empty() {
            return if b.is_empty_local() {
                b.clone()
            } else {
                a.add_empty_context()
            };
        }

        let a_size = a.size();
        let b_size = b.size();
        if a_size == 1 && b_size == 1 && a.return_state(0) == b.return_state(0) {
            let merged = cache.join(a.parent(0), b.parent(0));
            if merged.same(a.parent(0)) {
                return a.clone();
            }
            if merged.same(b.parent(0)) {
                return b.clone();
            }
            return merged.child(a.return_state(0));
        }

        let mut parents: Vec<Self> = Vec::with_capacity(a_size + b_size);
        let mut return_states: Vec<i32> = Vec::with_capacity(a_size + b_size);
        let mut left = 0;
        let mut right = 0;
        let mut can_return_left = true;
        let mut can_return_right = true;

        while left < a_size && right < b_size {
            let left_state = a.return_state(left);
            let right_state = b.return_state(right);
            if left_state == right_state {
                let parent = cache.join(a.parent(left), b.parent(right));
                can_return_left = can_return_left && parent.same(a.parent(left));
                can_return_right = can_return_right && parent.same(b.parent(right));
                parents.push(parent);
                return_states.push(left_state);
                left += 1;
                right += 1;
            } else if left_state < right_state {
                parents.push(a.parent(left).clone());
                return_states.push(left_state);
                can_return_right = false;
                left += 1;
            } else {
                parents.push(b.parent(right).clone());
                return_states.push(right_state);
                can_return_left = false;
                right += 1;
            }
        }
        while left < a_size {
            parents.push(a.parent(left).clone());
            return_states.push(a.return_state(left));
            can_return_right = false;
            left += 1;
        }
        while right < b_size {
            parents.push(b.parent(right).clone());
            return_states.push(b.return_state(right));
            can_return_left = false;
            right += 1;
        }

        if can_return_left {
            return a.clone();
        }
        if can_return_right {
            return b.clone();
        }

        match parents.len() {
            0 => Self::empty_full(),
            1 => {
                let parent = parents.pop().unwrap_or_else(Self::empty_full);
                Self::singleton(parent, return_states[0])
            }
            _ => Self::array(parents, return_states),
        }
    }

    /// Replace every empty terminator reachable from `self` with `suffix`.
    ///
    /// Nodes that carry an empty alternative additionally join the suffix
    /// in, so no stack represented by `self` is lost.
    #[must_use]
    pub fn append_context(&self, suffix: &Self, cache: &mut ContextCache) -> Self {
        let mut visited: hashbrown::HashMap<usize, Self, ahash::RandomState> =
            hashbrown::HashMap::default();
        Self::append_impl(self, suffix, cache, &mut visited)
    }

    fn append_impl(
        ctx: &Self,
        suffix: &Self,
        cache: &mut ContextCache,
        visited: &mut hashbrown::HashMap<usize, Self, ahash::RandomState>,
    ) -> Self {
        if suffix.is_empty() {
            // appending the full-empty terminator changes nothing; a
            // local-empty suffix collapses anything that could already be
            // empty down to "any caller"
            if suffix.is_empty_local() {
                assert!(ctx.has_empty(), "cannot append a local-empty suffix here");
                return Self::empty_local();
            }
            return ctx.clone();
        }

        let key = ctx.addr();
        if let Some(found) = visited.get(&key) {
            return found.clone();
        }

        let result = if ctx.is_empty() {
            suffix.clone()
        } else {
            let mut count = ctx.size();
            if ctx.has_empty() {
                count -= 1;
            }
            let mut parents: Vec<Self> = Vec::with_capacity(count);
            let mut return_states: Vec<i32> = Vec::with_capacity(count);
            for i in 0..count {
                return_states.push(ctx.return_state(i));
                parents.push(Self::append_impl(ctx.parent(i), suffix, cache, visited));
            }
            let mut appended = match count {
                // only the empty alternative: the node collapses into the
                // suffix outright
                0 => suffix.clone(),
                1 => {
                    let parent = parents.pop().unwrap_or_else(Self::empty_full);
                    Self::singleton(parent, return_states[0])
                }
                _ => Self::array(parents, return_states),
            };
            if count > 0 && ctx.has_empty() {
                appended = Self::join(&appended, suffix, cache);
            }
            appended
        };

        visited.insert(key, result.clone());
        result
    }

    /// The cached structural hash.
    #[must_use]
    pub fn context_hash(&self) -> u64 {
        self.node.cached_hash
    }

    /// Number of distinct nodes in the DAG — useful for diagnostics and
    /// tests.
    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut seen: hashbrown::HashSet<usize, ahash::RandomState> =
            hashbrown::HashSet::default();
        let mut work: SmallVec<[PredictionContext; 8]> = SmallVec::new();
        work.push(self.clone());
        while let Some(ctx) = work.pop() {
            if !seen.insert(ctx.addr()) {
                continue;
            }
            for i in 0..ctx.size() {
                work.push(ctx.parent(i).clone());
            }
        }
        seen.len()
    }
}

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        if self.same(other) {
            return true;
        }
        if self.context_hash() != other.context_hash() {
            return false;
        }
        match (&self.node.kind, &other.node.kind) {
            (ContextKind::Empty { local: a }, ContextKind::Empty { local: b }) => a == b,
            (
                ContextKind::Singleton {
                    parent: pa,
                    return_state: ra,
                },
                ContextKind::Singleton {
                    parent: pb,
                    return_state: rb,
                },
            ) => ra == rb && pa == pb,
            (
                ContextKind::Array {
                    parents: pa,
                    return_states: ra,
                },
                ContextKind::Array {
                    parents: pb,
                    return_states: rb,
                },
            ) => ra == rb && pa == pb,
            _ => false,
        }
    }
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.context_hash());
    }
}

const HASH_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

fn mix_hash(h: u64, value: u64) -> u64 {
    (h.rotate_left(5) ^ value).wrapping_mul(0x517C_C1B7_2722_0A95)
}

fn finish_hash(h: u64, len: u64) -> u64 {
    let mut x = h ^ len;
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn singleton_chain(states: &[i32]) -> PredictionContext {
        let mut ctx = PredictionContext::empty_full();
        for &s in states {
            ctx = ctx.child(s);
        }
        ctx
    }

    #[test]
    fn empties_are_distinct_singletons() {
        assert!(PredictionContext::empty_local().same(&PredictionContext::empty_local()));
        assert!(!PredictionContext::empty_local().same(&PredictionContext::empty_full()));
        assert!(PredictionContext::empty_local().is_empty_local());
        assert!(!PredictionContext::empty_full().is_empty_local());
        assert_ne!(
            PredictionContext::empty_local(),
            PredictionContext::empty_full()
        );
    }

    #[test]
    fn join_is_idempotent() {
        let mut cache = ContextCache::new();
        let a = singleton_chain(&[5, 7]);
        let joined = PredictionContext::join(&a, &a, &mut cache);
        assert!(joined.same(&a));
    }

    #[test]
    fn join_merges_sorted_union() {
        let mut cache = ContextCache::new();
        let a = PredictionContext::empty_full().child(3);
        let b = PredictionContext::empty_full().child(7);
        let joined = PredictionContext::join(&a, &b, &mut cache);

        assert_eq!(joined.size(), 2);
        assert_eq!(joined.return_state(0), 3);
        assert_eq!(joined.return_state(1), 7);
    }

    #[test]
    fn empty_local_absorbs() {
        let mut cache = ContextCache::new();
        let a = PredictionContext::empty_local();
        let b = singleton_chain(&[3]);
        let joined = PredictionContext::join(&a, &b, &mut cache);
        assert!(joined.same(&a));
    }

    #[test]
    fn empty_full_adds_empty_alternative() {
        let mut cache = ContextCache::new();
        let a = PredictionContext::empty_full();
        let b = singleton_chain(&[3]);
        let joined = PredictionContext::join(&a, &b, &mut cache);

        assert_eq!(joined.size(), 2);
        assert_eq!(joined.return_state(0), 3);
        assert_eq!(joined.return_state(1), EMPTY_FULL_STATE_KEY);
        assert!(joined.has_empty());
    }

    #[test]
    fn join_equal_singletons_shares_structure() {
        let mut cache = ContextCache::new();
        let a = singleton_chain(&[2, 9]);
        let b = singleton_chain(&[2, 9]);
        let joined = PredictionContext::join(&a, &b, &mut cache);
        // structurally equal operands: one side is returned as-is
        assert!(joined.same(&a) || joined.same(&b));
    }

    #[test]
    fn structural_equality() {
        let a = singleton_chain(&[1, 2, 3]);
        let b = singleton_chain(&[1, 2, 3]);
        let c = singleton_chain(&[1, 2, 4]);
        assert_eq!(a, b);
        assert!(!a.same(&b));
        assert_ne!(a, c);
        assert_eq!(a.context_hash(), b.context_hash());
    }

    #[test]
    fn find_return_state_binary_search() {
        let mut cache = ContextCache::new();
        let a = PredictionContext::empty_full().child(3);
        let b = PredictionContext::empty_full().child(7);
        let c = PredictionContext::empty_full().child(11);
        let ab = PredictionContext::join(&a, &b, &mut cache);
        let abc = PredictionContext::join(&ab, &c, &mut cache);

        assert_eq!(abc.find_return_state(7), Some(1));
        assert_eq!(abc.find_return_state(11), Some(2));
        assert_eq!(abc.find_return_state(4), None);
    }

    #[test]
    fn append_replaces_empty_terminator() {
        let mut cache = ContextCache::new();
        let prefix = PredictionContext::empty_full().child(4);
        let suffix = PredictionContext::empty_full().child(9);
        let appended = prefix.append_context(&suffix, &mut cache);

        // [4] over empty becomes [4] over [9]
        assert_eq!(appended.size(), 1);
        assert_eq!(appended.return_state(0), 4);
        assert_eq!(appended.parent(0).return_state(0), 9);
    }

    #[test]
    fn append_full_empty_suffix_is_noop() {
        let mut cache = ContextCache::new();
        let prefix = singleton_chain(&[4, 6]);
        let appended = prefix.append_context(&PredictionContext::empty_full(), &mut cache);
        assert!(appended.same(&prefix));
    }

    #[test]
    fn has_empty_path_sees_deep_terminators() {
        let chain = singleton_chain(&[4, 6, 8]);
        assert!(!chain.has_empty());
        assert!(chain.has_empty_path());
    }

    #[test]
    fn node_count_shares_subgraphs() {
        let mut cache = ContextCache::new();
        let base = singleton_chain(&[1]);
        let a = base.child(2);
        let b = base.child(3);
        let joined = PredictionContext::join(&a, &b, &mut cache);
        // joined + shared base + the empty terminator
        assert_eq!(joined.node_count(), 3);
    }
}
