//! Simulator - the explicitly owned engine instance.
//!
//! The simulator is synchronous and clock-agnostic: callers pass the current
//! engine time (`now`, a monotonic `Duration`) into every command and drive it
//! with [`Simulator::advance_to`]. The async driver in [`crate::runtime`] and
//! the deterministic harness in `resonance_sim` are both thin loops around
//! this type.
//!
//! # Lifecycle
//!
//! ```text
//! new ──► start ──► (advance_to / commands)* ──► stop ──► drop
//!           ▲                                     │
//!           └──────────── start again ────────────┘
//! ```

use crate::bus::{
    EventBus, EventsPerIntervalUpdated, GraphUpdated, KpiUpdated, NewWave, RewardPerIntervalUpdated, TickerUpdated,
    WaveUpdated,
};
use crate::config::EngineConfig;
use crate::metrics::{KpiSnapshot, MetricsAggregator, TopSource};
use crate::rng::LcgRng;
use crate::schedule::{LoopKind, Scheduler, Speed, Timer, TimerKind};
use crate::ticker::Ticker;
use crate::topology::{GraphEdge, GraphNode, Topology};
use crate::wave::{LifecycleRates, Wave, WaveId, WaveLedger, WaveStatus};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Seed used when the configuration does not pin one and the caller
/// supplies no wall-clock seed.
const FALLBACK_SEED: u64 = 42;

/// Counters for a simulator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub waves_created: u64,
    pub transitions: u64,
    pub waves_resonated: u64,
    pub retries: u64,
    pub spikes: u64,
    pub loop_ticks: u64,
    pub tick_panics: u64,
}

/// The synthetic activity engine.
pub struct Simulator {
    config: EngineConfig,
    rates: LifecycleRates,
    rng: LcgRng,
    bus: EventBus,
    waves: WaveLedger,
    metrics: MetricsAggregator,
    topology: Topology,
    ticker: Ticker,
    scheduler: Scheduler,
    speed: Speed,
    /// Wall-clock epoch (ms) corresponding to engine time zero
    epoch_ms: u64,
    stats: EngineStats,
}

impl Simulator {
    /// Creates a stopped engine.
    ///
    /// `epoch_ms` is the wall-clock time at engine time zero; record
    /// timestamps are `epoch_ms + now`. The seed is `config.seed`, or
    /// `epoch_ms` when the configuration does not pin one.
    pub fn new(config: EngineConfig, epoch_ms: u64) -> Self {
        let seed = config.seed.unwrap_or(if epoch_ms > 0 { epoch_ms } else { FALLBACK_SEED });
        let mut rng = LcgRng::new(seed);
        let metrics = MetricsAggregator::new(&config, &mut rng);
        let topology = Topology::generate(&mut rng, epoch_ms);

        info!(
            seed,
            nodes = topology.node_count(),
            edges = topology.edge_count(),
            "Simulator created"
        );

        Self {
            rates: LifecycleRates {
                retry_probability: config.retry_probability,
                rare_reward_probability: config.rare_reward_probability,
            },
            waves: WaveLedger::new(config.history_capacity),
            ticker: Ticker::new(config.ticker_capacity),
            scheduler: Scheduler::new(),
            bus: EventBus::new(),
            speed: Speed::default(),
            stats: EngineStats::default(),
            config,
            rng,
            metrics,
            topology,
            epoch_ms,
        }
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Arms the five periodic loops. No-op if already running.
    pub fn start(&mut self, now: Duration) {
        if self.scheduler.is_armed() {
            debug!("start ignored: already running");
            return;
        }
        self.scheduler.arm_loops(self.speed, now, &mut self.rng);
        info!(speed = %self.speed, "Simulator started");
    }

    /// Cancels the periodic loops. In-flight wave lifecycles keep running.
    pub fn stop(&mut self) {
        if !self.scheduler.is_armed() {
            return;
        }
        self.scheduler.disarm_loops();
        info!(in_flight = self.waves.in_flight(), "Simulator stopped");
    }

    /// Changes the speed and re-arms every loop if running.
    ///
    /// Accumulated state (seed, buffers, in-flight waves) is untouched.
    pub fn set_speed(&mut self, speed: Speed, now: Duration) {
        self.speed = speed;
        if self.scheduler.is_armed() {
            self.scheduler.arm_loops(speed, now, &mut self.rng);
        }
        info!(%speed, "Speed changed");
        for kind in LoopKind::all() {
            let interval_ms = self.scheduler.interval_of(kind).as_millis() as u64;
            debug!(loop_kind = kind.name(), interval_ms, "Loop interval");
        }
    }

    /// Creates `count` waves immediately. Returns copies of the new waves.
    pub fn inject(&mut self, count: usize, now: Duration) -> Vec<Wave> {
        (0..count).map(|_| self.create_wave(now)).collect()
    }

    /// Lump-sum reward plus an immediate burst of waves.
    pub fn trigger_spike(&mut self, now: Duration) -> f64 {
        let amount = self.rng.next_real(5.0, 10.0);
        self.metrics.add_reward(amount);
        self.stats.spikes += 1;
        info!(amount, waves = self.config.spike_wave_count, "Spike triggered");
        self.inject(self.config.spike_wave_count, now);
        amount
    }

    /// Replaces the generator state with a fresh seed.
    pub fn reset_seed(&mut self, seed: u64) {
        self.rng.reseed(seed);
        info!(seed, "Seed reset");
    }

    // =========================================================================
    // DRIVING
    // =========================================================================

    /// Runs every timer due at or before `now`, earliest first.
    ///
    /// Returns the number of timers that ran. A panic inside one timer is
    /// logged and counted; the remaining timers still run.
    pub fn advance_to(&mut self, now: Duration) -> usize {
        let mut ran = 0;
        while let Some(timer) = self.scheduler.pop_due(now) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(timer)));
            if let Err(cause) = outcome {
                self.record_panic(&format!("{:?}", timer.kind), cause.as_ref());
            }
            ran += 1;
        }
        ran
    }

    /// Counts and logs a panic that escaped a callback run on the engine.
    pub fn record_panic(&mut self, source: &str, cause: &(dyn Any + Send)) {
        self.stats.tick_panics += 1;
        let message = cause
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| cause.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(source, %message, "Engine callback panicked; continuing");
    }

    /// Earliest pending deadline (loop or wave).
    pub fn next_deadline(&self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    fn dispatch(&mut self, timer: Timer) {
        match timer.kind {
            TimerKind::Loop { kind, generation } => {
                // Re-arm first so a loop survives a panicking body
                self.scheduler.rearm(kind, generation, timer.deadline);
                self.stats.loop_ticks += 1;
                self.run_loop(kind, timer.deadline);
            }
            TimerKind::Wave(id) => self.advance_wave(id, timer.deadline),
        }
    }

    fn run_loop(&mut self, kind: LoopKind, now: Duration) {
        let m = self.speed.multipliers();
        match kind {
            LoopKind::Spawn => {
                let probability = self.config.spawn_probability * m.event;
                if self.rng.chance(probability) {
                    let count = self.rng.next_int(1, 3) as usize;
                    self.inject(count, now);
                }
            }
            LoopKind::Kpi => {
                let tick = self.metrics.tick(&mut self.rng, m.kpi);
                self.bus.publish::<KpiUpdated>(&tick.kpi);
                self.bus.publish::<EventsPerIntervalUpdated>(&tick.events_per_interval);
                self.bus.publish::<RewardPerIntervalUpdated>(&tick.reward_per_interval);
            }
            LoopKind::TopologyDrift => {
                self.topology.drift(&mut self.rng);
                self.bus.publish::<GraphUpdated>(&self.topology.snapshot());
            }
            LoopKind::TopologyJitter => {
                if self.topology.jitter(&mut self.rng, self.config.rewire_probability) {
                    debug!(edges = self.topology.edge_count(), "Edges regenerated");
                }
                self.bus.publish::<GraphUpdated>(&self.topology.snapshot());
            }
            LoopKind::Ticker => {
                let lines = self.ticker.tick(&mut self.rng, &self.waves);
                self.bus.publish::<TickerUpdated>(&lines);
            }
        }
    }

    fn create_wave(&mut self, now: Duration) -> Wave {
        let now_ms = self.wall_ms(now);
        let (wave, deadline) = self.waves.create(&mut self.rng, now, now_ms);
        self.scheduler.schedule_wave(wave.id, deadline);
        self.stats.waves_created += 1;
        self.bus.publish::<NewWave>(&wave);
        wave
    }

    fn advance_wave(&mut self, id: WaveId, now: Duration) {
        let now_ms = self.wall_ms(now);
        let Some(advanced) = self.waves.advance(id, now, now_ms, &mut self.rng, &self.rates) else {
            warn!(wave = %id, "Wave timer fired for unknown or idle wave");
            return;
        };

        self.stats.transitions += 1;
        match advanced.wave.status {
            WaveStatus::Retry => self.stats.retries += 1,
            WaveStatus::Resonated => self.stats.waves_resonated += 1,
            _ => {}
        }
        if let Some(reward) = advanced.reward {
            self.metrics.add_reward(reward);
        }
        if let Some(next) = advanced.next_deadline {
            self.scheduler.schedule_wave(id, next);
        }
        self.bus.publish::<WaveUpdated>(&advanced.wave);
    }

    fn wall_ms(&self, now: Duration) -> u64 {
        self.epoch_ms + now.as_millis() as u64
    }

    // =========================================================================
    // QUERIES (all return copies)
    // =========================================================================

    pub fn kpi(&self) -> KpiSnapshot {
        self.metrics.kpi()
    }

    /// Externally visible event list: newest first, at most `feed_capacity`.
    pub fn feed(&self) -> Vec<Wave> {
        self.waves.head(self.config.feed_capacity)
    }

    /// Full in-memory history: newest first, at most `history_capacity`.
    pub fn waves(&self) -> Vec<Wave> {
        self.waves.to_vec()
    }

    pub fn wave(&self, id: WaveId) -> Option<Wave> {
        self.waves.get(id).cloned()
    }

    pub fn top_sources(&self) -> Vec<TopSource> {
        self.metrics.top_sources()
    }

    pub fn graph_nodes(&self) -> Vec<GraphNode> {
        self.topology.nodes()
    }

    pub fn graph_edges(&self) -> Vec<GraphEdge> {
        self.topology.edges()
    }

    pub fn events_per_interval(&self) -> Vec<f64> {
        self.metrics.events_per_interval()
    }

    pub fn reward_per_interval(&self) -> Vec<f64> {
        self.metrics.reward_per_interval()
    }

    pub fn ticker(&self) -> Vec<String> {
        self.ticker.lines()
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Current generator state (not the original seed).
    pub fn rng_state(&self) -> u64 {
        self.rng.state()
    }

    pub fn in_flight(&self) -> usize {
        self.waves.in_flight()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscription access. Handlers run on the engine's thread.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("speed", &self.speed)
            .field("running", &self.is_running())
            .field("waves", &self.waves.len())
            .field("stats", &self.stats)
            .finish()
    }
}
