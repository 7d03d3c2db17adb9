//! Property-Based Tests for the Bounded Cache
//!
//! Drives the cache and a naive `Vec`-ordered model with the same operation
//! sequence and checks that residency and LRU order always agree.

#![cfg(test)]

use std::time::Duration;

use proptest::prelude::*;

use super::bounded::BoundedCache;

const TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u32),
    Get(u8),
    Peek(u8),
    Invalidate(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..12, any::<u32>()).prop_map(|(k, v)| Op::Set(k, v)),
        (0u8..12).prop_map(Op::Get),
        (0u8..12).prop_map(Op::Peek),
        (0u8..12).prop_map(Op::Invalidate),
    ]
}

/// Reference model: front of the vec is least recently used
#[derive(Default)]
struct Model {
    entries: Vec<(u8, u32)>,
}

impl Model {
    fn set(&mut self, capacity: usize, key: u8, value: u32) {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(pos);
        } else if self.entries.len() >= capacity {
            self.entries.remove(0);
        }
        self.entries.push((key, value));
    }

    fn get(&mut self, key: u8) -> Option<u32> {
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        let entry = self.entries.remove(pos);
        self.entries.push(entry);
        Some(entry.1)
    }

    fn peek(&self, key: u8) -> Option<u32> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn invalidate(&mut self, key: u8) -> Option<u32> {
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(pos).1)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the cache behaves exactly like a strict LRU list.
    #[test]
    fn prop_matches_lru_model(
        capacity in 1usize..6,
        ops in prop::collection::vec(op_strategy(), 1..300),
    ) {
        let cache = BoundedCache::new("prop", capacity);
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Set(k, v) => {
                    cache.set(k, v, TTL);
                    model.set(capacity, k, v);
                }
                Op::Get(k) => prop_assert_eq!(cache.get(&k), model.get(k)),
                Op::Peek(k) => prop_assert_eq!(cache.peek(&k).map(|e| e.value), model.peek(k)),
                Op::Invalidate(k) => prop_assert_eq!(cache.invalidate(&k), model.invalidate(k)),
            }

            prop_assert!(cache.len() <= capacity);
            let model_keys: Vec<u8> = model.entries.iter().map(|(k, _)| *k).collect();
            prop_assert_eq!(cache.keys(), model_keys);
        }
    }
}
