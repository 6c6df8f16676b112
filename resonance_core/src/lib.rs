//! Resonance Core - Seeded Synthetic Network-Activity Engine
//!
//! Generates a believable, reproducible stream of network activity for
//! dashboards and demos:
//! 1. **Waves**: activity events moving through `sent → transmission → resonated`
//!    (with an occasional retry detour), each paying out a small reward
//! 2. **KPIs**: seven slowly drifting scalars plus two 600-sample series
//! 3. **Topology**: a participant graph with jitter and periodic rewiring
//! 4. **Ticker**: templated status lines sampled from recent waves
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Simulator                            │
//! │  ┌────────────┐   timers   ┌───────────────────────────────┐  │
//! │  │ Scheduler  │ ─────────► │ WaveLedger  MetricsAggregator │  │
//! │  │ (min-heap) │            │ Topology    Ticker            │  │
//! │  └────────────┘            └───────────────┬───────────────┘  │
//! │        ▲                                   │ copies           │
//! │        │ advance_to(now)                   ▼                  │
//! │        │                           ┌──────────────┐           │
//! │        │                           │  EventBus    │ ──► subscribers
//! │        │                           └──────────────┘           │
//! └────────┼──────────────────────────────────────────────────────┘
//!          │
//!   EngineRuntime (tokio task)  or  resonance_sim (virtual clock)
//! ```
//!
//! All randomness comes from one [`LcgRng`]; with a fixed seed and a
//! virtual clock, a run is fully reproducible.

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod history;
pub mod metrics;
pub mod names;
pub mod rng;
pub mod runtime;
pub mod schedule;
pub mod ticker;
pub mod topology;
pub mod wave;

// Re-export key types for convenience
pub use bus::{
    EventBus, EventsPerIntervalUpdated, GraphUpdated, KpiUpdated, NewWave, RewardPerIntervalUpdated, Subscription,
    TickerUpdated, Topic, WaveUpdated,
};
pub use config::{EngineConfig, SourceSeed};
pub use engine::{EngineStats, Simulator};
pub use error::{ConfigError, EngineError};
pub use feed::{FeedFilter, FeedProjection};
pub use metrics::{KpiSnapshot, TopSource};
pub use rng::LcgRng;
pub use runtime::{EngineHandle, EngineRuntime};
pub use schedule::{LoopKind, ParseSpeedError, Speed};
pub use topology::{GraphEdge, GraphNode, GraphSnapshot};
pub use wave::{Wave, WaveId, WaveStatus};
