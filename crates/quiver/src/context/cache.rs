//! Context memoization: per-prediction join/child caches and the shared
//! hash-consing table.

use super::PredictionContext;
use dashmap::DashMap;
use hashbrown::HashMap;
use std::hash::{Hash, Hasher};

/// Identity key over an unordered pair of contexts. Join is commutative,
/// so the pair is normalized by address. The held handles keep the
/// addresses valid for the life of the cache entry.
struct JoinKey(PredictionContext, PredictionContext);

impl JoinKey {
    fn new(a: &PredictionContext, b: &PredictionContext) -> Self {
        if a.addr() <= b.addr() {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }
}

impl PartialEq for JoinKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.same(&other.0) && self.1.same(&other.1)
    }
}

impl Eq for JoinKey {}

impl Hash for JoinKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.addr());
        state.write_usize(self.1.addr());
    }
}

/// Per-prediction context memo.
///
/// Thread-confined. Memoizes `join` results by operand identity and
/// `child` results by (parent identity, return state), so repeated merges
/// inside one closure/reach pass reuse their results and, transitively,
/// their structure.
#[derive(Default)]
pub struct ContextCache {
    joins: HashMap<JoinKey, PredictionContext, ahash::RandomState>,
    // a memoized child keeps its parent (the address key) alive through
    // its own parent link
    children: HashMap<(usize, i32), PredictionContext, ahash::RandomState>,
}

impl ContextCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Memoized structural merge.
    #[must_use]
    pub fn join(&mut self, a: &PredictionContext, b: &PredictionContext) -> PredictionContext {
        if a.same(b) {
            return a.clone();
        }
        let key = JoinKey::new(a, b);
        if let Some(found) = self.joins.get(&key) {
            return found.clone();
        }
        let result = PredictionContext::join(a, b, self);
        self.joins.insert(JoinKey::new(a, b), result.clone());
        result
    }

    /// Memoized frame push.
    #[must_use]
    pub fn child(&mut self, parent: &PredictionContext, return_state: i32) -> PredictionContext {
        let key = (parent.addr(), return_state);
        if let Some(found) = self.children.get(&key) {
            return found.clone();
        }
        let result = parent.child(return_state);
        self.children.insert(key, result.clone());
        result
    }

    /// Number of memoized join results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.joins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }
}

/// Structural key wrapper for the shared intern table.
struct InternKey(PredictionContext);

impl PartialEq for InternKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for InternKey {}

impl Hash for InternKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.context_hash());
    }
}

/// Shared hash-consing table for prediction contexts.
///
/// Keyed by structural equality; safe for concurrent interning from any
/// number of prediction threads. Each unique context appears once, so
/// sealed configuration sets stored in the DFA share their context
/// subgraphs across predictions and parser instances.
#[derive(Default)]
pub struct ContextInternMap {
    map: DashMap<InternKey, PredictionContext>,
}

impl ContextInternMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `context` and every reachable parent, returning the
    /// canonical instance.
    #[must_use]
    pub fn intern_deep(&self, context: &PredictionContext) -> PredictionContext {
        let mut visited: HashMap<usize, PredictionContext, ahash::RandomState> =
            HashMap::default();
        self.intern_impl(context, &mut visited)
    }

    fn intern_impl(
        &self,
        context: &PredictionContext,
        visited: &mut HashMap<usize, PredictionContext, ahash::RandomState>,
    ) -> PredictionContext {
        if context.is_empty() {
            return context.clone();
        }

        let key = context.addr();
        if let Some(found) = visited.get(&key) {
            return found.clone();
        }
        if let Some(found) = self.map.get(&InternKey(context.clone())) {
            let found = found.value().clone();
            visited.insert(key, found.clone());
            return found;
        }

        // canonicalize parents first; rebuild only when one changed
        let size = context.size();
        let mut changed = false;
        let mut parents: Vec<PredictionContext> = Vec::with_capacity(size);
        for i in 0..size {
            let parent = self.intern_impl(context.parent(i), visited);
            changed |= !parent.same(context.parent(i));
            parents.push(parent);
        }

        let updated = if changed {
            let mut rebuilt = if size == 1 {
                parents[0].child(context.return_state(0))
            } else {
                let return_states: Vec<i32> =
                    (0..size).map(|i| context.return_state(i)).collect();
                PredictionContext::array(parents, return_states)
            };
            // rebuilding with canonical parents may itself hit the table
            if let Some(found) = self.map.get(&InternKey(rebuilt.clone())) {
                rebuilt = found.value().clone();
            }
            rebuilt
        } else {
            context.clone()
        };

        let canonical = self
            .map
            .entry(InternKey(updated.clone()))
            .or_insert_with(|| updated.clone())
            .value()
            .clone();
        visited.insert(key, canonical.clone());
        visited.insert(updated.addr(), canonical.clone());
        canonical
    }

    /// Number of interned contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl std::fmt::Debug for ContextInternMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextInternMap")
            .field("len", &self.map.len())
            .finish()
    }
}
