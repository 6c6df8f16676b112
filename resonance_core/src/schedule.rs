//! Scheduler
//! =========
//!
//! A single timer queue drives everything: the five periodic loops and the
//! per-wave lifecycle deadlines. Timers are popped in (deadline, insertion)
//! order and each one runs to completion before the next is popped.
//!
//! ```text
//!   ┌──────────────┐  pop_due(now)   ┌─────────────────────────┐
//!   │ BinaryHeap   │ ──────────────► │ Simulator::dispatch     │
//!   │ (min by      │                 │  • Loop(kind) -> re-arm │
//!   │  deadline)   │ ◄────────────── │  • Wave(id)  -> advance │
//!   └──────────────┘   schedule(..)  └─────────────────────────┘
//! ```
//!
//! Loop timers carry the arm generation they were created under. Disarming
//! bumps the generation, so stale loop timers are dropped when popped; wave
//! timers carry no generation and are never cancelled.

use crate::rng::LcgRng;
use crate::wave::WaveId;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Named global speed setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speed {
    Slow,
    #[default]
    Normal,
    Fast,
    Hype,
}

/// Per-loop-family multipliers for a speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedMultipliers {
    pub event: f64,
    pub kpi: f64,
    pub graph: f64,
}

impl Speed {
    pub fn all() -> [Speed; 4] {
        [Speed::Slow, Speed::Normal, Speed::Fast, Speed::Hype]
    }

    pub fn multipliers(self) -> SpeedMultipliers {
        let (event, kpi, graph) = match self {
            Speed::Slow => (0.5, 0.5, 0.5),
            Speed::Normal => (1.0, 1.0, 1.0),
            Speed::Fast => (1.5, 1.5, 1.5),
            Speed::Hype => (2.0, 1.5, 1.0),
        };
        SpeedMultipliers { event, kpi, graph }
    }

    pub fn name(self) -> &'static str {
        match self {
            Speed::Slow => "slow",
            Speed::Normal => "normal",
            Speed::Fast => "fast",
            Speed::Hype => "hype",
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for unrecognised speed names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown speed: {0} (expected slow, normal, fast or hype)")]
pub struct ParseSpeedError(pub String);

impl FromStr for Speed {
    type Err = ParseSpeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "slow" => Ok(Speed::Slow),
            "normal" => Ok(Speed::Normal),
            "fast" => Ok(Speed::Fast),
            "hype" => Ok(Speed::Hype),
            _ => Err(ParseSpeedError(s.to_string())),
        }
    }
}

/// The five periodic loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LoopKind {
    /// Spontaneous wave generation
    Spawn,
    /// KPI / series / source tally update
    Kpi,
    /// Slow node mutation
    TopologyDrift,
    /// Positional jitter + occasional rewiring
    TopologyJitter,
    /// Ticker line
    Ticker,
}

impl LoopKind {
    pub fn all() -> [LoopKind; 5] {
        [
            LoopKind::Spawn,
            LoopKind::Kpi,
            LoopKind::TopologyDrift,
            LoopKind::TopologyJitter,
            LoopKind::Ticker,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            LoopKind::Spawn => "spawn",
            LoopKind::Kpi => "kpi",
            LoopKind::TopologyDrift => "topology-drift",
            LoopKind::TopologyJitter => "topology-jitter",
            LoopKind::Ticker => "ticker",
        }
    }

    /// Computes this loop's period for a speed.
    ///
    /// KPI jitter and the drift period are drawn once per arm, so they are
    /// stable between speed changes.
    pub fn interval(self, speed: Speed, rng: &mut LcgRng) -> Duration {
        let m = speed.multipliers();
        let ms = match self {
            LoopKind::Spawn => 1000.0 / m.event,
            LoopKind::Kpi => 2000.0 / m.kpi + rng.next_int(300, 700) as f64,
            LoopKind::TopologyDrift => rng.next_int(3000, 10000) as f64 / m.graph,
            LoopKind::TopologyJitter => 3000.0 / m.graph,
            LoopKind::Ticker => 1000.0,
        };
        Duration::from_secs_f64(ms / 1000.0)
    }
}

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Loop { kind: LoopKind, generation: u64 },
    Wave(WaveId),
}

/// A scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub deadline: Duration,
    /// Insertion order; breaks deadline ties FIFO
    pub seq: u64,
    pub kind: TimerKind,
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Timer queue plus the armed loop table.
#[derive(Debug, Clone)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<Timer>>,
    next_seq: u64,
    generation: u64,
    armed: bool,
    intervals: [(LoopKind, Duration); 5],
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            generation: 0,
            armed: false,
            intervals: LoopKind::all().map(|k| (k, Duration::ZERO)),
        }
    }

    fn push(&mut self, deadline: Duration, kind: TimerKind) {
        let timer = Timer {
            deadline,
            seq: self.next_seq,
            kind,
        };
        self.next_seq += 1;
        self.queue.push(Reverse(timer));
    }

    /// Arms all five loops. Any previously armed loops are cancelled first.
    pub fn arm_loops(&mut self, speed: Speed, now: Duration, rng: &mut LcgRng) {
        self.disarm_loops();
        self.armed = true;
        for i in 0..self.intervals.len() {
            let kind = self.intervals[i].0;
            let interval = kind.interval(speed, rng);
            self.intervals[i].1 = interval;
            let generation = self.generation;
            self.push(now + interval, TimerKind::Loop { kind, generation });
        }
    }

    /// Cancels all loop timers. Wave timers are unaffected.
    pub fn disarm_loops(&mut self) {
        self.generation += 1;
        self.armed = false;
        let generation = self.generation;
        self.queue.retain(|Reverse(t)| match t.kind {
            TimerKind::Loop { generation: g, .. } => g == generation,
            TimerKind::Wave(_) => true,
        });
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Current period of a loop (zero if never armed).
    pub fn interval_of(&self, kind: LoopKind) -> Duration {
        self.intervals
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, d)| *d)
            .unwrap_or(Duration::ZERO)
    }

    /// Schedules the next run of a loop one period after `fired_at`.
    ///
    /// Ignored if the loop generation is stale.
    pub fn rearm(&mut self, kind: LoopKind, generation: u64, fired_at: Duration) {
        if !self.armed || generation != self.generation {
            return;
        }
        let interval = self.interval_of(kind);
        self.push(fired_at + interval, TimerKind::Loop { kind, generation });
    }

    /// Schedules a lifecycle deadline for a wave.
    pub fn schedule_wave(&mut self, id: WaveId, deadline: Duration) {
        self.push(deadline, TimerKind::Wave(id));
    }

    /// Pops the earliest timer due at or before `now`, skipping stale loops.
    pub fn pop_due(&mut self, now: Duration) -> Option<Timer> {
        loop {
            let Reverse(head) = *self.queue.peek()?;
            if head.deadline > now {
                return None;
            }
            self.queue.pop();
            match head.kind {
                TimerKind::Loop { generation, .. } if generation != self.generation => continue,
                _ => return Some(head),
            }
        }
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.peek().map(|Reverse(t)| t.deadline)
    }

    /// Number of queued wave timers.
    pub fn pending_waves(&self) -> usize {
        self.queue
            .iter()
            .filter(|Reverse(t)| matches!(t.kind, TimerKind::Wave(_)))
            .count()
    }

    /// Number of queued live loop timers.
    pub fn pending_loops(&self) -> usize {
        self.queue
            .iter()
            .filter(|Reverse(t)| matches!(t.kind, TimerKind::Loop { generation, .. } if generation == self.generation))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn wave_id(seq: u64) -> WaveId {
        WaveId {
            created_ms: 0,
            suffix: 1000,
            seq,
        }
    }

    #[test]
    fn test_speed_parse_and_table() {
        assert_eq!("HYPE".parse::<Speed>().unwrap(), Speed::Hype);
        assert!("warp".parse::<Speed>().is_err());
        let hype = Speed::Hype.multipliers();
        assert_eq!((hype.event, hype.kpi, hype.graph), (2.0, 1.5, 1.0));
        assert_eq!(Speed::default(), Speed::Normal);
    }

    #[test]
    fn test_intervals_per_speed() {
        let mut rng = LcgRng::new(1);
        assert_eq!(LoopKind::Spawn.interval(Speed::Normal, &mut rng), ms(1000));
        assert_eq!(LoopKind::Spawn.interval(Speed::Hype, &mut rng), ms(500));
        assert_eq!(LoopKind::TopologyJitter.interval(Speed::Slow, &mut rng), ms(6000));
        assert_eq!(LoopKind::Ticker.interval(Speed::Hype, &mut rng), ms(1000));

        let kpi = LoopKind::Kpi.interval(Speed::Normal, &mut rng);
        assert!(kpi >= ms(2300) && kpi <= ms(2700));
        let drift = LoopKind::TopologyDrift.interval(Speed::Fast, &mut rng);
        assert!(drift >= ms(2000) && drift <= ms(6667));
    }

    #[test]
    fn test_timers_pop_in_deadline_then_fifo_order() {
        let mut sched = Scheduler::new();
        sched.schedule_wave(wave_id(1), ms(300));
        sched.schedule_wave(wave_id(2), ms(100));
        sched.schedule_wave(wave_id(3), ms(100));

        let order: Vec<_> = std::iter::from_fn(|| sched.pop_due(ms(1000)))
            .map(|t| match t.kind {
                TimerKind::Wave(id) => id.seq,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_pop_due_respects_now() {
        let mut sched = Scheduler::new();
        sched.schedule_wave(wave_id(1), ms(500));
        assert!(sched.pop_due(ms(499)).is_none());
        assert!(sched.pop_due(ms(500)).is_some());
    }

    #[test]
    fn test_rearm_cancels_previous_loops_only() {
        let mut rng = LcgRng::new(2);
        let mut sched = Scheduler::new();
        sched.schedule_wave(wave_id(1), ms(50_000));
        sched.arm_loops(Speed::Normal, Duration::ZERO, &mut rng);
        assert_eq!(sched.pending_loops(), 5);

        sched.arm_loops(Speed::Fast, Duration::ZERO, &mut rng);
        assert_eq!(sched.pending_loops(), 5);
        assert_eq!(sched.pending_waves(), 1);

        sched.disarm_loops();
        assert_eq!(sched.pending_loops(), 0);
        assert_eq!(sched.pending_waves(), 1);
        assert!(!sched.is_armed());
    }

    #[test]
    fn test_stale_rearm_is_ignored() {
        let mut rng = LcgRng::new(3);
        let mut sched = Scheduler::new();
        sched.arm_loops(Speed::Normal, Duration::ZERO, &mut rng);
        let timer = sched.pop_due(ms(1000)).unwrap();
        let TimerKind::Loop { kind, generation } = timer.kind else {
            panic!("expected loop timer");
        };

        sched.arm_loops(Speed::Slow, ms(1000), &mut rng);
        sched.rearm(kind, generation, ms(1000));
        // Only the freshly armed generation remains
        assert_eq!(sched.pending_loops(), 5);
    }
}
