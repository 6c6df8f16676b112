//! Invariant monitor - the harness's view of ground truth.
//!
//! The Monitor subscribes to every topic of a [`Simulator`] and checks each
//! payload as it is published:
//! - Every wave's observed status sequence is a legal lifecycle prefix
//! - `reward` is present iff the status is `resonated`
//! - `rewardsStreamed` never decreases
//! - Series, ticker and graph payloads stay within their bounds
//!
//! It also rebuilds a [`FeedProjection`] from `new-event` and
//! `event-updated` the way a bus-only consumer would.
//!
//! [`Monitor::check_engine`] adds pull-side checks (history and feed
//! lengths, top-source ordering, projection agreeing with the engine's feed)
//! that the harness runs between steps.

use resonance_core::bus::{
    EventsPerIntervalUpdated, GraphUpdated, KpiUpdated, NewWave, RewardPerIntervalUpdated, TickerUpdated, Topic,
    WaveUpdated,
};
use resonance_core::wave::is_legal_sequence;
use resonance_core::{EngineConfig, FeedFilter, FeedProjection, Simulator, Wave, WaveId, WaveStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Bounds the monitor checks payloads against.
#[derive(Debug, Clone, Copy)]
struct Limits {
    series: usize,
    ticker: usize,
    history: usize,
    feed: usize,
}

#[derive(Debug, Default)]
struct MonitorState {
    /// Status sequence per wave, as observed on the bus
    sequences: HashMap<WaveId, Vec<WaveStatus>>,
    /// Publications per topic name
    published: HashMap<&'static str, u64>,
    last_rewards: Option<f64>,
    node_count: Option<usize>,
    resonated: u64,
    retries: u64,
    /// Sum of rewards carried by resonated updates
    rewards_paid: f64,
    violations: Vec<String>,
    /// Consumer-side feed rebuilt from the bus
    projection: FeedProjection,
}

impl MonitorState {
    fn violation(&mut self, message: String) {
        warn!(%message, "Invariant violated");
        self.violations.push(message);
    }

    fn count<T: Topic>(&mut self) {
        *self.published.entry(T::NAME).or_default() += 1;
    }

    fn check_rewards(&mut self, rewards: f64, source: &str) {
        if let Some(last) = self.last_rewards {
            if rewards + 1e-9 < last {
                self.violation(format!("rewardsStreamed decreased ({source}): {last} -> {rewards}"));
            }
        }
        self.last_rewards = Some(rewards);
    }
}

/// Summary of what the monitor observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub waves_seen: usize,
    pub waves_resonated: u64,
    pub retries: u64,
    pub events_published: u64,
    pub violations: Vec<String>,
}

/// Records and checks everything a simulator publishes.
#[derive(Debug, Clone)]
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
    limits: Limits,
}

impl Monitor {
    /// Subscribes to every topic of `sim`.
    pub fn attach(sim: &mut Simulator) -> Self {
        let config: &EngineConfig = sim.config();
        let limits = Limits {
            series: config.series_capacity,
            ticker: config.ticker_capacity,
            history: config.history_capacity,
            feed: config.feed_capacity,
        };
        let state = MonitorState {
            projection: FeedProjection::new(config.feed_capacity),
            ..MonitorState::default()
        };
        let monitor = Self {
            state: Arc::new(Mutex::new(state)),
            limits,
        };
        let bus = sim.bus_mut();

        let state = Arc::clone(&monitor.state);
        bus.subscribe::<NewWave, _>(move |wave| {
            let mut s = lock(&state);
            s.count::<NewWave>();
            if wave.status != WaveStatus::Sent || wave.reward.is_some() {
                s.violation(format!("{} created as {} (reward {:?})", wave.id, wave.status, wave.reward));
            }
            if s.sequences.insert(wave.id, vec![wave.status]).is_some() {
                s.violation(format!("{} created twice", wave.id));
            }
            s.projection.on_new(wave);
        });

        let state = Arc::clone(&monitor.state);
        bus.subscribe::<WaveUpdated, _>(move |wave| {
            let mut s = lock(&state);
            s.count::<WaveUpdated>();
            match wave.status {
                WaveStatus::Resonated => {
                    s.resonated += 1;
                    s.rewards_paid += wave.reward.unwrap_or(0.0);
                }
                WaveStatus::Retry => s.retries += 1,
                _ => {}
            }
            if wave.reward.is_some() != (wave.status == WaveStatus::Resonated) {
                s.violation(format!("{} is {} with reward {:?}", wave.id, wave.status, wave.reward));
            }
            s.projection.on_update(wave);
            let Some(seq) = s.sequences.get_mut(&wave.id) else {
                s.violation(format!("{} updated before creation", wave.id));
                return;
            };
            seq.push(wave.status);
            if !is_legal_sequence(seq) {
                let seq = format!("{seq:?}");
                s.violation(format!("{} took an illegal path {seq}", wave.id));
            }
        });

        let state = Arc::clone(&monitor.state);
        bus.subscribe::<KpiUpdated, _>(move |kpi| {
            let mut s = lock(&state);
            s.count::<KpiUpdated>();
            s.check_rewards(kpi.rewards_streamed, KpiUpdated::NAME);
            if !(5.0..=25.0).contains(&kpi.processing) {
                s.violation(format!("processing out of range: {}", kpi.processing));
            }
            if !(70.0..=95.0).contains(&kpi.network_health) {
                s.violation(format!("networkHealth out of range: {}", kpi.network_health));
            }
        });

        let state = Arc::clone(&monitor.state);
        bus.subscribe::<EventsPerIntervalUpdated, _>(move |series| {
            let mut s = lock(&state);
            s.count::<EventsPerIntervalUpdated>();
            if series.len() > limits.series {
                s.violation(format!("events-per-interval length {}", series.len()));
            }
        });

        let state = Arc::clone(&monitor.state);
        bus.subscribe::<RewardPerIntervalUpdated, _>(move |series| {
            let mut s = lock(&state);
            s.count::<RewardPerIntervalUpdated>();
            if series.len() > limits.series {
                s.violation(format!("reward-per-interval length {}", series.len()));
            }
        });

        let state = Arc::clone(&monitor.state);
        bus.subscribe::<TickerUpdated, _>(move |lines| {
            let mut s = lock(&state);
            s.count::<TickerUpdated>();
            if lines.len() > limits.ticker {
                s.violation(format!("ticker length {}", lines.len()));
            }
        });

        let state = Arc::clone(&monitor.state);
        bus.subscribe::<GraphUpdated, _>(move |graph| {
            let mut s = lock(&state);
            s.count::<GraphUpdated>();
            let known = s.node_count;
            match known {
                Some(n) if n != graph.nodes.len() => {
                    s.violation(format!("node count changed {n} -> {}", graph.nodes.len()));
                }
                _ => s.node_count = Some(graph.nodes.len()),
            }
            let stray = graph
                .nodes
                .iter()
                .filter(|n| !(0.1..=0.9).contains(&n.x) || !(0.1..=0.9).contains(&n.y))
                .count();
            if stray > 0 {
                s.violation(format!("{stray} nodes outside the unit box"));
            }
            if graph.edges.iter().any(|e| !(0.3..=1.0).contains(&e.strength)) {
                s.violation("edge strength out of range".to_string());
            }
        });

        monitor
    }

    /// Pull-side checks against the engine's query surface.
    pub fn check_engine(&self, sim: &Simulator) {
        let mut s = lock(&self.state);
        s.check_rewards(sim.kpi().rewards_streamed, "query");

        let waves = sim.waves().len();
        if waves > self.limits.history {
            s.violation(format!("history length {waves}"));
        }
        let feed = sim.feed();
        if feed.len() > self.limits.feed {
            s.violation(format!("feed length {}", feed.len()));
        }
        if s.projection.view(&FeedFilter::All) != feed {
            let projected = s.projection.len();
            s.violation(format!("projected feed ({projected}) diverged from engine feed ({})", feed.len()));
        }

        let sources = sim.top_sources();
        if sources.windows(2).any(|w| w[0].percentage < w[1].percentage) {
            s.violation("top sources not sorted by percentage".to_string());
        }
    }

    /// Records a failed scenario assertion alongside invariant violations.
    pub fn fail(&self, message: impl Into<String>) {
        lock(&self.state).violation(message.into());
    }

    /// Number of payloads published on a topic.
    pub fn published<T: Topic>(&self) -> u64 {
        lock(&self.state).published.get(T::NAME).copied().unwrap_or(0)
    }

    /// Observed status sequence of one wave.
    pub fn sequence(&self, id: WaveId) -> Option<Vec<WaveStatus>> {
        lock(&self.state).sequences.get(&id).cloned()
    }

    /// The bus-rebuilt feed, filtered.
    pub fn projected_feed(&self, filter: &FeedFilter) -> Vec<Wave> {
        lock(&self.state).projection.view(filter)
    }

    /// Total reward paid out by wave lifecycles so far.
    pub fn rewards_paid(&self) -> f64 {
        lock(&self.state).rewards_paid
    }

    pub fn violations(&self) -> Vec<String> {
        lock(&self.state).violations.clone()
    }

    pub fn is_clean(&self) -> bool {
        lock(&self.state).violations.is_empty()
    }

    pub fn report(&self) -> MonitorReport {
        let s = lock(&self.state);
        MonitorReport {
            waves_seen: s.sequences.len(),
            waves_resonated: s.resonated,
            retries: s.retries,
            events_published: s.published.values().sum(),
            violations: s.violations.clone(),
        }
    }
}

/// Monitor handlers run inside the engine's panic guard; a poisoned lock
/// still holds valid bookkeeping.
fn lock(state: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn run(sim: &mut Simulator, monitor: &Monitor, secs: u64) {
        for step in 1..=secs * 10 {
            sim.advance_to(Duration::from_millis(step * 100));
            monitor.check_engine(sim);
        }
    }

    #[test]
    fn test_monitor_clean_on_normal_run() {
        let mut sim = Simulator::new(EngineConfig::seeded(42), 0);
        let monitor = Monitor::attach(&mut sim);
        sim.start(Duration::ZERO);
        run(&mut sim, &monitor, 30);

        let report = monitor.report();
        assert!(report.violations.is_empty(), "{:?}", report.violations);
        assert!(report.waves_seen > 0);
        assert!(monitor.published::<TickerUpdated>() >= 29);
        assert!(monitor.published::<KpiUpdated>() >= 10);
        assert!(monitor.published::<GraphUpdated>() >= 9);
    }

    #[test]
    fn test_monitor_tracks_sequences() {
        let mut sim = Simulator::new(EngineConfig::seeded(3), 0);
        let monitor = Monitor::attach(&mut sim);
        let wave = sim.inject(1, Duration::ZERO).remove(0);
        run(&mut sim, &monitor, 11);

        let seq = monitor.sequence(wave.id).unwrap();
        assert_eq!(seq.first(), Some(&WaveStatus::Sent));
        assert_eq!(seq.last(), Some(&WaveStatus::Resonated));
        assert!(seq.len() == 3 || seq.len() == 5);
        assert_eq!(monitor.report().waves_resonated, 1);
    }

    #[test]
    fn test_projection_tracks_engine_feed() {
        let mut config = EngineConfig::seeded(9);
        config.history_capacity = 60;
        config.feed_capacity = 30;
        let mut sim = Simulator::new(config, 0);
        let monitor = Monitor::attach(&mut sim);
        sim.start(Duration::ZERO);
        sim.trigger_spike(Duration::ZERO);
        sim.trigger_spike(Duration::ZERO);
        run(&mut sim, &monitor, 20);

        assert!(monitor.is_clean(), "{:?}", monitor.violations());
        let projected = monitor.projected_feed(&FeedFilter::All);
        assert_eq!(projected.len(), 30);
        assert_eq!(projected, sim.feed());

        let resonated = monitor.projected_feed(&FeedFilter::Resonated);
        let expected: Vec<Wave> = projected.into_iter().filter(|w| w.status == WaveStatus::Resonated).collect();
        assert_eq!(resonated, expected);
        assert!(resonated.iter().all(|w| w.reward.is_some()));
    }

    #[test]
    fn test_fail_records_violation() {
        let mut sim = Simulator::new(EngineConfig::seeded(4), 0);
        let monitor = Monitor::attach(&mut sim);
        assert!(monitor.is_clean());
        monitor.fail("scenario assertion");
        assert_eq!(monitor.violations(), vec!["scenario assertion".to_string()]);
    }
}
