//! Worker assignment strategies.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::error::SmartError;

/// Policy assigning a channel to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalance {
    /// Uniform random pick.
    Random,
    /// `connection_id % pool_size`.
    Hash,
    /// Monotonic counter over accept order.
    #[default]
    RoundRobin,
}

impl LoadBalance {
    /// Configuration name of the strategy.
    pub fn as_str(self) -> &'static str {
        match self {
            LoadBalance::Random => "random",
            LoadBalance::Hash => "hash",
            LoadBalance::RoundRobin => "rr",
        }
    }

    /// Parse a configured name, falling back to round-robin with a warning.
    pub fn parse_or_default(name: &str) -> LoadBalance {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(
                load_balance = name,
                "unknown load balance strategy, using round robin"
            );
            LoadBalance::RoundRobin
        })
    }
}

impl FromStr for LoadBalance {
    type Err = SmartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(LoadBalance::Random),
            "hash" => Ok(LoadBalance::Hash),
            "rr" | "round_robin" | "roundrobin" => Ok(LoadBalance::RoundRobin),
            other => Err(SmartError::Config(format!(
                "unknown load balance strategy `{}`",
                other
            ))),
        }
    }
}

impl std::fmt::Display for LoadBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateful picker for one strategy.
#[derive(Debug)]
pub(crate) struct Balancer {
    strategy: LoadBalance,
    counter: AtomicUsize,
}

impl Balancer {
    pub(crate) fn new(strategy: LoadBalance) -> Self {
        Self {
            strategy,
            counter: AtomicUsize::new(0),
        }
    }

    pub(crate) fn strategy(&self) -> LoadBalance {
        self.strategy
    }

    /// Pick an index in `0..size` for connection `id`. `size` must be non-zero.
    pub(crate) fn pick(&self, id: u64, size: usize) -> usize {
        match self.strategy {
            LoadBalance::Random => rand::thread_rng().gen_range(0..size),
            LoadBalance::Hash => (id % size as u64) as usize,
            LoadBalance::RoundRobin => self.counter.fetch_add(1, Ordering::Relaxed) % size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("random".parse::<LoadBalance>().unwrap(), LoadBalance::Random);
        assert_eq!("HASH".parse::<LoadBalance>().unwrap(), LoadBalance::Hash);
        assert_eq!("rr".parse::<LoadBalance>().unwrap(), LoadBalance::RoundRobin);
        assert!("sticky".parse::<LoadBalance>().is_err());
    }

    #[test]
    fn test_unknown_falls_back_to_round_robin() {
        assert_eq!(LoadBalance::parse_or_default("weighted"), LoadBalance::RoundRobin);
    }

    #[test]
    fn test_each_strategy_reports_its_own_tag() {
        for strategy in [LoadBalance::Random, LoadBalance::Hash, LoadBalance::RoundRobin] {
            assert_eq!(Balancer::new(strategy).strategy(), strategy);
            assert_eq!(strategy.as_str().parse::<LoadBalance>().unwrap(), strategy);
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let b = Balancer::new(LoadBalance::Hash);
        assert_eq!(b.pick(10, 4), 2);
        assert_eq!(b.pick(10, 4), 2);
        assert_eq!(b.pick(7, 4), 3);
    }

    #[test]
    fn test_round_robin_cycles() {
        let b = Balancer::new(LoadBalance::RoundRobin);
        let picks: Vec<_> = (0..8).map(|id| b.pick(id * 17, 4)).collect();
        assert_eq!(picks, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_random_in_range() {
        let b = Balancer::new(LoadBalance::Random);
        for id in 0..1000 {
            assert!(b.pick(id, 3) < 3);
        }
    }
}
