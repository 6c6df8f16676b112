//! Metrics Aggregator
//! ==================
//!
//! Maintains the seven KPI scalars, the two bounded numeric history series
//! and the top-source tally. Each KPI drifts under its own rule:
//!
//! | KPI               | Rule                                          |
//! |-------------------|-----------------------------------------------|
//! | total_waves       | monotonic, `+U(0.5m, 2m)`                     |
//! | active_users      | baseline ±5%, reset every tick (sawtooth)     |
//! | rewards_streamed  | trickle `U(0.01m, 0.05m)`, batch p=0.15       |
//! | processing        | random walk `U(-2, 3)` clamped to [5, 25]     |
//! | conversion_rate   | baseline ± per-tick-random width `U(0.2,0.5)` |
//! | avg_time_to_verify| baseline ±0.3                                 |
//! | network_health    | random walk ±0.5 clamped to [70, 95]          |
//!
//! `m` is the KPI speed multiplier.

use crate::config::{EngineConfig, SourceSeed};
use crate::history::BoundedSeries;
use crate::rng::LcgRng;
use serde::{Deserialize, Serialize};

const PROCESSING_RANGE: (f64, f64) = (5.0, 25.0);
const HEALTH_RANGE: (f64, f64) = (70.0, 95.0);
const ACTIVE_USER_NOISE: f64 = 0.05;
const VERIFY_NOISE: f64 = 0.3;

/// Process-wide KPI snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KpiSnapshot {
    pub total_waves: f64,
    pub active_users: f64,
    pub rewards_streamed: f64,
    pub processing: f64,
    pub conversion_rate: f64,
    pub avg_time_to_verify: f64,
    /// 0-100
    pub network_health: f64,
}

impl Default for KpiSnapshot {
    fn default() -> Self {
        Self {
            total_waves: 1247.0,
            active_users: 342.0,
            rewards_streamed: 0.0,
            processing: 12.0,
            conversion_rate: 87.3,
            avg_time_to_verify: 2.4,
            network_health: 89.0,
        }
    }
}

/// One entry of the top-source tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSource {
    pub name: String,
    pub count: u64,
    /// `count / total_waves * 100`
    pub percentage: f64,
}

/// Fixed set of named sources, kept sorted by descending percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTally {
    sources: Vec<TopSource>,
}

impl SourceTally {
    pub fn new(seeds: &[SourceSeed], total_waves: f64) -> Self {
        let mut tally = Self {
            sources: seeds
                .iter()
                .map(|s| TopSource {
                    name: s.name.clone(),
                    count: s.count,
                    percentage: 0.0,
                })
                .collect(),
        };
        tally.recompute(total_waves);
        tally
    }

    /// Adds `U[0,3]` to every count, then re-derives and re-sorts.
    pub fn update(&mut self, rng: &mut LcgRng, total_waves: f64) {
        for source in &mut self.sources {
            source.count += rng.next_int(0, 3) as u64;
        }
        self.recompute(total_waves);
    }

    fn recompute(&mut self, total_waves: f64) {
        for source in &mut self.sources {
            source.percentage = if total_waves > 0.0 {
                source.count as f64 / total_waves * 100.0
            } else {
                0.0
            };
        }
        // Stable: ties keep their previous relative order
        self.sources
            .sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
    }

    pub fn to_vec(&self) -> Vec<TopSource> {
        self.sources.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopSource> {
        self.sources.iter()
    }
}

/// What a KPI tick changed, ready for publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiTick {
    pub kpi: KpiSnapshot,
    pub events_per_interval: Vec<f64>,
    pub reward_per_interval: Vec<f64>,
}

/// Owns the KPI snapshot, both numeric series and the source tally.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    kpi: KpiSnapshot,
    /// Baselines for the mean-reverting metrics
    baseline: KpiSnapshot,
    batch_payout_probability: f64,
    events_per_interval: BoundedSeries,
    reward_per_interval: BoundedSeries,
    sources: SourceTally,
}

impl MetricsAggregator {
    /// Creates the aggregator and pre-fills both series to capacity.
    pub fn new(config: &EngineConfig, rng: &mut LcgRng) -> Self {
        let kpi = config.initial_kpi.clone();
        let mut events_per_interval = BoundedSeries::new(config.series_capacity);
        let mut reward_per_interval = BoundedSeries::new(config.series_capacity);
        for _ in 0..config.series_capacity {
            events_per_interval.push(rng.next_real(5.0, 15.0));
            reward_per_interval.push(0.0);
        }

        Self {
            sources: SourceTally::new(&config.sources, kpi.total_waves),
            baseline: kpi.clone(),
            kpi,
            batch_payout_probability: config.batch_payout_probability,
            events_per_interval,
            reward_per_interval,
        }
    }

    /// Advances every KPI by one tick with the given multiplier.
    pub fn tick(&mut self, rng: &mut LcgRng, multiplier: f64) -> KpiTick {
        let kpi = &mut self.kpi;
        let base = &self.baseline;

        kpi.total_waves += rng.next_real(0.5 * multiplier, 2.0 * multiplier);

        let user_noise = base.active_users * ACTIVE_USER_NOISE;
        kpi.active_users = base.active_users + rng.next_real(-user_noise, user_noise);

        let payout = if rng.chance(self.batch_payout_probability) {
            rng.next_real(0.1 * multiplier, 0.5 * multiplier)
        } else {
            rng.next_real(0.01 * multiplier, 0.05 * multiplier)
        };
        kpi.rewards_streamed += payout;

        kpi.processing = (kpi.processing + rng.next_real(-2.0, 3.0))
            .clamp(PROCESSING_RANGE.0, PROCESSING_RANGE.1);

        let width = rng.next_real(0.2, 0.5);
        kpi.conversion_rate = base.conversion_rate + rng.next_real(-width, width);

        kpi.avg_time_to_verify = base.avg_time_to_verify + rng.next_real(-VERIFY_NOISE, VERIFY_NOISE);

        kpi.network_health = (kpi.network_health + rng.next_real(-0.5, 0.5))
            .clamp(HEALTH_RANGE.0, HEALTH_RANGE.1);

        self.events_per_interval.push(rng.next_real(8.0, 18.0) * multiplier);
        self.reward_per_interval
            .push(self.kpi.rewards_streamed + rng.next_real(-0.1, 0.3));

        self.sources.update(rng, self.kpi.total_waves);

        KpiTick {
            kpi: self.kpi.clone(),
            events_per_interval: self.events_per_interval.to_vec(),
            reward_per_interval: self.reward_per_interval.to_vec(),
        }
    }

    /// Credits a reward to the cumulative total. Negative amounts are ignored.
    pub fn add_reward(&mut self, amount: f64) {
        if amount > 0.0 {
            self.kpi.rewards_streamed += amount;
        }
    }

    pub fn kpi(&self) -> KpiSnapshot {
        self.kpi.clone()
    }

    pub fn events_per_interval(&self) -> Vec<f64> {
        self.events_per_interval.to_vec()
    }

    pub fn reward_per_interval(&self) -> Vec<f64> {
        self.reward_per_interval.to_vec()
    }

    pub fn top_sources(&self) -> Vec<TopSource> {
        self.sources.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn aggregator(seed: u64) -> (MetricsAggregator, LcgRng) {
        let mut rng = LcgRng::new(seed);
        let agg = MetricsAggregator::new(&EngineConfig::default(), &mut rng);
        (agg, rng)
    }

    #[test]
    fn test_initial_state() {
        let (agg, _) = aggregator(1);
        let kpi = agg.kpi();
        assert_eq!(kpi.total_waves, 1247.0);
        assert_eq!(kpi.rewards_streamed, 0.0);
        assert_eq!(agg.events_per_interval().len(), 600);
        assert!(agg.events_per_interval().iter().all(|v| (5.0..15.0).contains(v)));
        assert!(agg.reward_per_interval().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_total_waves_increment_at_unit_multiplier() {
        let (mut agg, mut rng) = aggregator(42);
        let before = agg.kpi().total_waves;
        let tick = agg.tick(&mut rng, 1.0);
        let delta = tick.kpi.total_waves - before;
        assert!((0.5..=2.0).contains(&delta), "delta {delta}");
    }

    #[test]
    fn test_series_stay_bounded() {
        let (mut agg, mut rng) = aggregator(3);
        for _ in 0..700 {
            let tick = agg.tick(&mut rng, 1.5);
            assert_eq!(tick.events_per_interval.len(), 600);
            assert_eq!(tick.reward_per_interval.len(), 600);
        }
    }

    #[test]
    fn test_clamped_walks() {
        let (mut agg, mut rng) = aggregator(5);
        for _ in 0..2000 {
            let kpi = agg.tick(&mut rng, 2.0).kpi;
            assert!((5.0..=25.0).contains(&kpi.processing));
            assert!((70.0..=95.0).contains(&kpi.network_health));
            assert!((kpi.active_users - 342.0).abs() <= 342.0 * 0.05);
            assert!((kpi.conversion_rate - 87.3).abs() <= 0.5);
            assert!((kpi.avg_time_to_verify - 2.4).abs() <= 0.3);
        }
    }

    #[test]
    fn test_add_reward_ignores_negative() {
        let (mut agg, _) = aggregator(6);
        agg.add_reward(0.04);
        agg.add_reward(-1.0);
        assert_relative_eq!(agg.kpi().rewards_streamed, 0.04);
    }

    #[test]
    fn test_source_tally_initially_sorted() {
        let (agg, _) = aggregator(7);
        let sources = agg.top_sources();
        assert_eq!(sources[0].name, "#LYRIN402");
        assert_relative_eq!(sources[0].percentage, 234.0 / 1247.0 * 100.0);
    }

    proptest! {
        #[test]
        fn prop_rewards_monotonic_and_sources_sorted(seed in any::<u64>(), ticks in 1usize..200, m in 0.5f64..2.0) {
            let (mut agg, mut rng) = aggregator(seed);
            let mut last_rewards = agg.kpi().rewards_streamed;
            let mut last_total = agg.kpi().total_waves;
            for _ in 0..ticks {
                let tick = agg.tick(&mut rng, m);
                prop_assert!(tick.kpi.rewards_streamed >= last_rewards);
                prop_assert!(tick.kpi.total_waves > last_total);
                last_rewards = tick.kpi.rewards_streamed;
                last_total = tick.kpi.total_waves;

                let sources = agg.top_sources();
                prop_assert!(sources.windows(2).all(|w| w[0].percentage >= w[1].percentage));
                let sum: f64 = sources.iter().map(|s| s.percentage).sum();
                let expected: f64 = sources.iter().map(|s| s.count as f64 / tick.kpi.total_waves * 100.0).sum();
                prop_assert!((sum - expected).abs() < 1e-9);
            }
        }
    }
}
