//! Property-based tests for the merge and map primitives.

use proptest::prelude::*;
use quiver::config::AtnConfig;
use quiver::context::{ContextCache, PredictionContext};
use quiver::dfa::EdgeMap;

fn singleton_context(return_state: i32) -> PredictionContext {
    PredictionContext::empty_full().child(return_state)
}

fn join_all(states: &[i32]) -> PredictionContext {
    let mut cache = ContextCache::new();
    let mut result = singleton_context(states[0]);
    for &state in &states[1..] {
        result = PredictionContext::join(&result, &singleton_context(state), &mut cache);
    }
    result
}

fn return_states(ctx: &PredictionContext) -> Vec<i32> {
    (0..ctx.size()).map(|i| ctx.return_state(i)).collect()
}

proptest! {
    /// Joining singletons yields the sorted union of return states.
    #[test]
    fn join_produces_sorted_union(
        states in proptest::collection::vec(0i32..500, 1..12),
    ) {
        let joined = join_all(&states);

        let mut expected: Vec<i32> = states.clone();
        expected.sort_unstable();
        expected.dedup();

        prop_assert_eq!(return_states(&joined), expected);
    }

    /// `join(a, a)` returns `a` itself.
    #[test]
    fn join_is_idempotent(states in proptest::collection::vec(0i32..500, 1..8)) {
        let mut cache = ContextCache::new();
        let a = join_all(&states);
        let joined = PredictionContext::join(&a, &a, &mut cache);
        prop_assert!(joined.same(&a));
    }

    /// Join is commutative up to structural equality.
    #[test]
    fn join_is_commutative(
        left in proptest::collection::vec(0i32..500, 1..8),
        right in proptest::collection::vec(0i32..500, 1..8),
    ) {
        let mut cache = ContextCache::new();
        let a = join_all(&left);
        let b = join_all(&right);
        let ab = PredictionContext::join(&a, &b, &mut cache);
        let ba = PredictionContext::join(&b, &a, &mut ContextCache::new());
        prop_assert_eq!(ab, ba);
    }

    /// Adding then removing a previously-absent key restores an equal
    /// map, whatever representation each side picked.
    #[test]
    fn edge_map_put_remove_round_trips(
        existing in proptest::collection::btree_set(0i32..200, 0..12),
        key in 0i32..200,
    ) {
        prop_assume!(!existing.contains(&key));

        let mut map: EdgeMap<i32> = EdgeMap::new(0, 199);
        for &k in &existing {
            map = map.put(k, k * 10);
        }
        let round_trip = map.put(key, 1234).remove(key);
        prop_assert_eq!(&map, &round_trip);
    }

    /// Lookup agrees with a model map over arbitrary put sequences.
    #[test]
    fn edge_map_matches_model(
        entries in proptest::collection::vec((0i32..100, 0i32..1000), 0..40),
    ) {
        let mut map: EdgeMap<i32> = EdgeMap::new(0, 99);
        let mut model = std::collections::BTreeMap::new();
        for (k, v) in entries {
            map = map.put(k, v);
            model.insert(k, v);
        }

        prop_assert_eq!(map.size(), model.len());
        for (k, v) in &model {
            prop_assert_eq!(map.get(*k), Some(v));
        }
        let sorted: Vec<(i32, i32)> = model.into_iter().collect();
        prop_assert_eq!(map.to_sorted_vec(), sorted);
    }

    /// Containment is reflexive, and a joined context contains each of
    /// its operands' configurations.
    #[test]
    fn config_containment(
        left in proptest::collection::vec(0i32..200, 1..6),
        right in proptest::collection::vec(0i32..200, 1..6),
    ) {
        let mut cache = ContextCache::new();
        let a = join_all(&left);
        let b = join_all(&right);
        let joined = PredictionContext::join(&a, &b, &mut cache);

        let whole = AtnConfig::new(7, 1, joined);
        let part_a = AtnConfig::new(7, 1, a);
        let part_b = AtnConfig::new(7, 1, b);

        prop_assert!(whole.contains(&whole));
        prop_assert!(whole.contains(&part_a));
        prop_assert!(whole.contains(&part_b));
    }
}
