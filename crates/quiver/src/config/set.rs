//! Sets of ATN configurations with in-place context merging.

use crate::alt_set::AltBitSet;
use crate::atn::{Atn, INVALID_ALT};
use crate::config::AtnConfig;
use crate::context::{ContextCache, PredictionContext};
use hashbrown::HashMap;
use std::hash::{Hash, Hasher};

/// The set of alternatives that tied on some input prefix, with an
/// exactness flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictInfo {
    conflicted_alts: AltBitSet,
    exact: bool,
}

impl ConflictInfo {
    #[must_use]
    pub fn new(conflicted_alts: AltBitSet, exact: bool) -> Self {
        Self {
            conflicted_alts,
            exact,
        }
    }

    #[must_use]
    pub fn conflicted_alts(&self) -> &AltBitSet {
        &self.conflicted_alts
    }

    /// `true` when every conflicting alternative is truly viable, not just
    /// the minimum.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.exact
    }
}

/// A set of [`AtnConfig`]s.
///
/// While writable, configurations added to the set are merged with an
/// existing configuration at the same `(state, alt)` whenever their
/// semantic contexts agree, joining the prediction contexts through the
/// graph-structured stack. [`seal`](Self::seal) drops the merge tables and
/// freezes the set for storage in a DFA state; sealed sets cache their
/// hash and reject mutation.
#[derive(Debug)]
pub struct AtnConfigSet {
    /// `(state << 12 | alt)` → index of the representative in `configs`.
    /// `None` once sealed.
    merged: Option<HashMap<u64, usize, ahash::RandomState>>,
    /// Indices of configs with a colliding key but a different semantic
    /// context. `None` once sealed.
    unmerged: Option<Vec<usize>>,
    /// Every configuration, in insertion order.
    configs: Vec<AtnConfig>,

    unique_alt: u32,
    conflict: Option<ConflictInfo>,
    has_semantic_context: bool,
    dips_into_outer_context: bool,
    outermost: bool,

    cached_hash: u64,
}

impl AtnConfigSet {
    /// Create an empty, writable set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            merged: Some(HashMap::default()),
            unmerged: Some(Vec::new()),
            configs: Vec::new(),
            unique_alt: INVALID_ALT,
            conflict: None,
            has_semantic_context: false,
            dips_into_outer_context: false,
            outermost: false,
            cached_hash: 0,
        }
    }

    fn key_of(config: &AtnConfig) -> u64 {
        (u64::from(config.state()) << 12) | u64::from(config.alt() & 0xFFF)
    }

    fn can_merge(left: &AtnConfig, left_key: u64, right: &AtnConfig) -> bool {
        left.state() == right.state()
            && left_key == Self::key_of(right)
            && left.semantic_context() == right.semantic_context()
    }

    /// Add a configuration, merging it with an existing one when possible.
    ///
    /// Returns `true` when the set changed.
    ///
    /// # Panics
    ///
    /// Panics if the set is sealed.
    pub fn add(&mut self, config: AtnConfig, cache: &mut ContextCache) -> bool {
        assert!(!self.is_sealed(), "cannot add to a sealed configuration set");
        debug_assert!(
            !self.outermost || !config.reaches_into_outer_context(),
            "outermost sets never dip into the outer context"
        );

        let key = Self::key_of(&config);
        let rep = self
            .merged
            .as_ref()
            .and_then(|m| m.get(&key).copied())
            .filter(|&idx| Self::can_merge(&config, key, &self.configs[idx]));
        let key_free = self
            .merged
            .as_ref()
            .is_some_and(|m| !m.contains_key(&key));

        if let Some(idx) = rep {
            let changed = Self::merge_into(&mut self.configs[idx], &config, cache);
            self.dips_into_outer_context |= config.reaches_into_outer_context();
            return changed;
        }

        // scan the overflow list for a mergeable entry
        let overflow_hit = self.unmerged.as_ref().and_then(|unmerged| {
            unmerged
                .iter()
                .copied()
                .enumerate()
                .find(|&(_, idx)| Self::can_merge(&config, key, &self.configs[idx]))
        });
        if let Some((pos, idx)) = overflow_hit {
            let changed = Self::merge_into(&mut self.configs[idx], &config, cache);
            self.dips_into_outer_context |= config.reaches_into_outer_context();
            if changed && key_free {
                // promote the overflow entry to representative
                if let (Some(merged), Some(unmerged)) =
                    (self.merged.as_mut(), self.unmerged.as_mut())
                {
                    merged.insert(key, idx);
                    unmerged.remove(pos);
                }
            }
            return changed;
        }

        // genuinely new
        let idx = self.configs.len();
        self.update_properties_for_added(&config);
        self.configs.push(config);
        if let (Some(merged), Some(unmerged)) = (self.merged.as_mut(), self.unmerged.as_mut()) {
            if key_free {
                merged.insert(key, idx);
            } else {
                unmerged.push(idx);
            }
        }
        true
    }

    /// Merge `incoming` into the representative; returns `true` when the
    /// representative's context changed.
    fn merge_into(rep: &mut AtnConfig, incoming: &AtnConfig, cache: &mut ContextCache) -> bool {
        rep.set_outer_context_depth(
            rep.outer_context_depth().max(incoming.outer_context_depth()),
        );
        if incoming.is_precedence_filter_suppressed() {
            rep.set_precedence_filter_suppressed(true);
        }
        let joined = cache.join(rep.context(), incoming.context());
        if joined.same(rep.context()) {
            return false;
        }
        rep.set_context(joined);
        true
    }

    fn update_properties_for_added(&mut self, config: &AtnConfig) {
        if self.configs.is_empty() {
            self.unique_alt = config.alt();
        } else if self.unique_alt != config.alt() {
            self.unique_alt = INVALID_ALT;
        }
        self.has_semantic_context |= !config.semantic_context().is_none();
        self.dips_into_outer_context |= config.reaches_into_outer_context();
        debug_assert!(!self.outermost || !self.dips_into_outer_context);
    }

    /// Add every configuration from an iterator.
    pub fn add_all<I: IntoIterator<Item = AtnConfig>>(
        &mut self,
        configs: I,
        cache: &mut ContextCache,
    ) -> bool {
        let mut changed = false;
        for config in configs {
            changed |= self.add(config, cache);
        }
        changed
    }

    /// Conservative membership: `true` means every configuration
    /// represented by `config` is represented here.
    #[must_use]
    pub fn contains(&self, config: &AtnConfig) -> bool {
        if let Some(merged) = &self.merged {
            let key = Self::key_of(config);
            if let Some(&idx) = merged.get(&key) {
                if Self::can_merge(config, key, &self.configs[idx])
                    && self.configs[idx].contains(config)
                {
                    return true;
                }
            }
            if let Some(unmerged) = &self.unmerged {
                return unmerged.iter().any(|&idx| self.configs[idx].contains(config));
            }
            false
        } else {
            self.configs.iter().any(|c| c.contains(config))
        }
    }

    /// Number of configurations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Iterate all configurations in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, AtnConfig> {
        self.configs.iter()
    }

    /// Configuration at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> &AtnConfig {
        &self.configs[index]
    }

    /// All alternatives represented, from the conflict info when set.
    #[must_use]
    pub fn represented_alternatives(&self) -> AltBitSet {
        if let Some(conflict) = &self.conflict {
            return conflict.conflicted_alts().clone();
        }
        self.configs.iter().map(AtnConfig::alt).collect()
    }

    /// The single alternative every configuration predicts, or
    /// [`INVALID_ALT`].
    #[must_use]
    pub fn unique_alt(&self) -> u32 {
        self.unique_alt
    }

    #[must_use]
    pub fn conflict_info(&self) -> Option<&ConflictInfo> {
        self.conflict.as_ref()
    }

    /// # Panics
    ///
    /// Panics if the set is sealed.
    pub fn set_conflict_info(&mut self, conflict: Option<ConflictInfo>) {
        assert!(!self.is_sealed(), "cannot mutate a sealed configuration set");
        self.conflict = conflict;
    }

    #[must_use]
    pub fn is_exact_conflict(&self) -> bool {
        self.conflict.as_ref().is_some_and(ConflictInfo::is_exact)
    }

    #[must_use]
    pub fn has_semantic_context(&self) -> bool {
        self.has_semantic_context
    }

    /// # Panics
    ///
    /// Panics if the set is sealed.
    pub fn clear_explicit_semantic_context(&mut self) {
        assert!(!self.is_sealed(), "cannot mutate a sealed configuration set");
        self.has_semantic_context = false;
    }

    #[must_use]
    pub fn dips_into_outer_context(&self) -> bool {
        self.dips_into_outer_context
    }

    /// Whether this set represents configurations whose entire outer
    /// context has been consumed.
    #[must_use]
    pub fn is_outermost(&self) -> bool {
        self.outermost
    }

    /// # Panics
    ///
    /// Panics when clearing an already-outermost set, or when the set dips
    /// into the outer context.
    pub fn set_outermost(&mut self, outermost: bool) {
        assert!(
            !(self.outermost && !outermost),
            "outermost flag cannot be cleared"
        );
        assert!(!outermost || !self.dips_into_outer_context);
        self.outermost = outermost;
    }

    /// Re-intern every configuration's context through the shared cache so
    /// equal subgraphs are stored once.
    pub fn optimize_configs(&mut self, atn: &Atn) {
        for config in &mut self.configs {
            let interned = atn.cached_context(config.context());
            if !interned.same(config.context()) {
                config.set_context(interned);
            }
        }
    }

    /// Freeze the set: drop the merge tables and cache the hash. Idempotent.
    pub fn seal(&mut self) {
        if self.is_sealed() {
            return;
        }
        self.merged = None;
        self.unmerged = None;
        self.cached_hash = self.compute_hash();
    }

    /// `true` once [`seal`](Self::seal) has run.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.merged.is_none()
    }

    /// Clone back into a writable set, rebuilding the merge tables.
    #[must_use]
    pub fn to_builder(&self, cache: &mut ContextCache) -> Self {
        let mut builder = Self::new();
        builder.outermost = self.outermost;
        for config in &self.configs {
            builder.add(config.clone(), cache);
        }
        builder.conflict = self.conflict.clone();
        builder
    }

    fn compute_hash(&self) -> u64 {
        // deterministic across instances: sealed-set hashes participate in
        // DFA state identity
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        hasher.write_u8(u8::from(self.outermost));
        hasher.write_usize(self.configs.len());
        for config in &self.configs {
            config.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// The cached hash of a sealed set.
    ///
    /// # Panics
    ///
    /// Panics when the set is still writable.
    #[must_use]
    pub fn sealed_hash(&self) -> u64 {
        assert!(self.is_sealed(), "hash is cached at seal time");
        self.cached_hash
    }
}

impl Default for AtnConfigSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for AtnConfigSet {
    fn eq(&self, other: &Self) -> bool {
        self.outermost == other.outermost
            && self.conflict == other.conflict
            && self.configs == other.configs
    }
}

impl Eq for AtnConfigSet {}

impl Hash for AtnConfigSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.is_sealed() {
            state.write_u64(self.cached_hash);
        } else {
            state.write_u64(self.compute_hash());
        }
    }
}

impl<'a> IntoIterator for &'a AtnConfigSet {
    type Item = &'a AtnConfig;
    type IntoIter = std::slice::Iter<'a, AtnConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atn::SemanticContext;

    fn config(state: u32, alt: u32, return_state: i32) -> AtnConfig {
        AtnConfig::new(
            state,
            alt,
            PredictionContext::empty_full().child(return_state),
        )
    }

    #[test]
    fn add_merges_same_position() {
        let mut cache = ContextCache::new();
        let mut set = AtnConfigSet::new();

        assert!(set.add(config(1, 1, 10), &mut cache));
        assert!(set.add(config(1, 1, 20), &mut cache));

        // merged into one config whose context is the union
        assert_eq!(set.len(), 1);
        let merged = set.get(0);
        assert_eq!(merged.context().size(), 2);
        assert_eq!(set.unique_alt(), 1);
    }

    #[test]
    fn add_identical_context_is_unchanged() {
        let mut cache = ContextCache::new();
        let mut set = AtnConfigSet::new();
        set.add(config(1, 1, 10), &mut cache);
        assert!(!set.add(config(1, 1, 10), &mut cache));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unique_alt_invalidated_by_second_alt() {
        let mut cache = ContextCache::new();
        let mut set = AtnConfigSet::new();
        set.add(config(1, 1, 10), &mut cache);
        assert_eq!(set.unique_alt(), 1);

        set.add(config(2, 2, 10), &mut cache);
        assert_eq!(set.unique_alt(), INVALID_ALT);
        assert_eq!(
            set.represented_alternatives().iter().collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn different_semantic_contexts_stay_separate() {
        let mut cache = ContextCache::new();
        let mut set = AtnConfigSet::new();

        set.add(config(1, 1, 10), &mut cache);
        let gated = AtnConfig::create(
            1,
            1,
            PredictionContext::empty_full().child(10),
            SemanticContext::Precedence(3),
            None,
        );
        set.add(gated, &mut cache);

        // same (state, alt) key but different semantic context: overflow
        assert_eq!(set.len(), 2);
        assert!(set.has_semantic_context());
    }

    #[test]
    #[should_panic(expected = "sealed")]
    fn sealed_set_rejects_add() {
        let mut cache = ContextCache::new();
        let mut set = AtnConfigSet::new();
        set.add(config(1, 1, 10), &mut cache);
        set.seal();
        set.add(config(1, 1, 20), &mut cache);
    }

    #[test]
    fn sealed_hash_is_stable_and_structural() {
        let mut cache = ContextCache::new();
        let mut a = AtnConfigSet::new();
        let mut b = AtnConfigSet::new();
        for set in [&mut a, &mut b] {
            set.add(config(1, 1, 10), &mut cache);
            set.add(config(2, 2, 20), &mut cache);
            set.seal();
        }
        assert_eq!(a, b);
        assert_eq!(a.sealed_hash(), b.sealed_hash());
    }

    #[test]
    fn to_builder_round_trips() {
        let mut cache = ContextCache::new();
        let mut set = AtnConfigSet::new();
        set.add(config(1, 1, 10), &mut cache);
        set.add(config(2, 2, 20), &mut cache);
        set.seal();

        let builder = set.to_builder(&mut cache);
        assert!(!builder.is_sealed());
        assert_eq!(builder, set);
        assert_eq!(builder.unique_alt(), INVALID_ALT);
    }

    #[test]
    fn merged_configs_share_semantic_context_property() {
        // invariant: equal (state, alt) pairs in a set imply equal
        // semantic contexts among the representative and its merges
        let mut cache = ContextCache::new();
        let mut set = AtnConfigSet::new();
        set.add(config(3, 1, 10), &mut cache);
        set.add(config(3, 1, 30), &mut cache);
        set.add(config(3, 1, 20), &mut cache);
        set.seal();

        assert_eq!(set.len(), 1);
        let rep = set.get(0);
        let returns: Vec<i32> = (0..rep.context().size())
            .map(|i| rep.context().return_state(i))
            .collect();
        assert_eq!(returns, vec![10, 20, 30]);
    }
}
