//! Partition selection across all four `ShardStrategy` variants (spec
//! §4.1 items 2-3). `wal_common::identity::partition_for` covers the
//! pure hash case; the stateful strategies (round-robin's per-namespace
//! counter, random) live here since they need process-local state C1
//! itself is specified to stay free of (spec §5 "C1 ... are CPU-only").
//!
//! The counter map is grounded on `capture::partition_limits`'s
//! `DashMap`-backed per-key state pattern.

use dashmap::DashMap;
use rand::Rng;
use wal_common::identity;
use wal_common::model::{ShardConfig, ShardStrategy};

pub struct ShardSelector {
    round_robin_counters: DashMap<String, u32>,
}

impl ShardSelector {
    pub fn new() -> Self {
        Self {
            round_robin_counters: DashMap::new(),
        }
    }

    /// Resolve a partition for `message_id`/`payload` under `config`,
    /// scoped to `namespace` for the round-robin counter.
    pub fn select(
        &self,
        namespace: &str,
        config: &ShardConfig,
        message_id: &str,
        payload: &serde_json::Value,
    ) -> u32 {
        let modulus = if config.legacy_fixed_modulus {
            10
        } else {
            config.partition_count
        };

        match config.strategy {
            ShardStrategy::Hash => identity::partition_for(message_id, modulus),
            ShardStrategy::RoundRobin => self.next_round_robin(namespace, modulus),
            ShardStrategy::Random => rand::thread_rng().gen_range(0..modulus),
            ShardStrategy::Custom => match &config.custom_logic {
                Some(logic) => match identity::extract_key(payload, &logic.extract_key) {
                    Some(key) => identity::partition_for(&key, modulus),
                    None => identity::partition_for(message_id, modulus),
                },
                None => identity::partition_for(message_id, modulus),
            },
        }
    }

    fn next_round_robin(&self, namespace: &str, modulus: u32) -> u32 {
        let mut counter = self
            .round_robin_counters
            .entry(namespace.to_owned())
            .or_insert(0);
        let assigned = *counter % modulus;
        *counter = counter.wrapping_add(1);
        assigned
    }
}

impl Default for ShardSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: ShardStrategy) -> ShardConfig {
        ShardConfig {
            strategy,
            partition_count: 4,
            custom_logic: None,
            legacy_fixed_modulus: false,
        }
    }

    #[test]
    fn hash_strategy_is_deterministic() {
        let selector = ShardSelector::new();
        let a = selector.select("ns", &config(ShardStrategy::Hash), "wal_1", &serde_json::json!({}));
        let b = selector.select("ns", &config(ShardStrategy::Hash), "wal_1", &serde_json::json!({}));
        assert_eq!(a, b);
    }

    #[test]
    fn round_robin_cycles_through_partitions() {
        let selector = ShardSelector::new();
        let cfg = config(ShardStrategy::RoundRobin);
        let assignments: Vec<u32> = (0..8)
            .map(|_| selector.select("ns", &cfg, "wal_x", &serde_json::json!({})))
            .collect();
        assert_eq!(assignments, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn round_robin_counters_are_independent_per_namespace() {
        let selector = ShardSelector::new();
        let cfg = config(ShardStrategy::RoundRobin);
        assert_eq!(selector.select("a", &cfg, "wal_x", &serde_json::json!({})), 0);
        assert_eq!(selector.select("b", &cfg, "wal_x", &serde_json::json!({})), 0);
        assert_eq!(selector.select("a", &cfg, "wal_x", &serde_json::json!({})), 1);
    }

    #[test]
    fn custom_strategy_extracts_key_and_falls_back() {
        let mut cfg = config(ShardStrategy::Custom);
        cfg.custom_logic = Some(wal_common::model::CustomShardLogic {
            extract_key: "user.id".to_owned(),
        });
        let selector = ShardSelector::new();

        let with_key = selector.select(
            "ns",
            &cfg,
            "wal_1",
            &serde_json::json!({"user": {"id": "u-1"}}),
        );
        let by_hash_directly = identity::partition_for("u-1", 4);
        assert_eq!(with_key, by_hash_directly);

        let without_key = selector.select("ns", &cfg, "wal_1", &serde_json::json!({}));
        assert_eq!(without_key, identity::partition_for("wal_1", 4));
    }

    #[test]
    fn random_strategy_stays_within_modulus() {
        let selector = ShardSelector::new();
        let cfg = config(ShardStrategy::Random);
        for _ in 0..20 {
            let p = selector.select("ns", &cfg, "wal_1", &serde_json::json!({}));
            assert!(p < 4);
        }
    }
}
