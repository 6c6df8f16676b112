//! Wave Lifecycle Engine
//! =====================
//!
//! Every wave walks a fixed state machine:
//!
//! ```text
//!            1.0-2.0s            2.0-5.0s (p=0.95)
//!   SENT ───────────► TRANSMISSION ─────────────────► RESONATED
//!                          │  ▲
//!         2.0-5.0s (p=0.05)│  │ +2.0s          +2.0-3.0s
//!                          ▼  │
//!                         RETRY ───► TRANSMISSION ──────────► RESONATED
//! ```
//!
//! Timing is planned up front and expressed as absolute deadlines on the
//! engine clock. [`Lifecycle::advance`] performs at most one legal transition
//! per call, so the legal-transition invariant can be checked without any
//! wall-clock timers.

use crate::history::BoundedFeed;
use crate::names;
use crate::rng::LcgRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Fixed delay between entering RETRY and re-entering TRANSMISSION.
const RETRY_BACKOFF_MS: u64 = 2000;

/// Lifecycle status of a wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveStatus {
    Sent,
    Transmission,
    Retry,
    Resonated,
}

impl WaveStatus {
    /// Whether `next` may directly follow `self`.
    pub fn can_transition_to(self, next: WaveStatus) -> bool {
        use WaveStatus::*;
        matches!(
            (self, next),
            (Sent, Transmission) | (Transmission, Resonated) | (Transmission, Retry) | (Retry, Transmission)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == WaveStatus::Resonated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WaveStatus::Sent => "sent",
            WaveStatus::Transmission => "transmission",
            WaveStatus::Retry => "retry",
            WaveStatus::Resonated => "resonated",
        }
    }
}

impl fmt::Display for WaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two complete status paths a wave may take.
const DIRECT_PATH: [WaveStatus; 3] = [WaveStatus::Sent, WaveStatus::Transmission, WaveStatus::Resonated];
const RETRY_PATH: [WaveStatus; 5] = [
    WaveStatus::Sent,
    WaveStatus::Transmission,
    WaveStatus::Retry,
    WaveStatus::Transmission,
    WaveStatus::Resonated,
];

/// Returns true if `observed` is a prefix of one of the two legal paths.
pub fn is_legal_sequence(observed: &[WaveStatus]) -> bool {
    DIRECT_PATH.starts_with(observed) || RETRY_PATH.starts_with(observed)
}

/// Wave identity: creation time, a random suffix and a per-engine sequence
/// number. The sequence alone makes ids unique within one engine; two engines
/// with the same seed and epoch produce the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveId {
    pub created_ms: u64,
    pub suffix: u16,
    pub seq: u64,
}

impl fmt::Display for WaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wave-{}-{}-{}", self.created_ms, self.suffix, self.seq)
    }
}

/// One synthetic activity event as seen by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wave {
    pub id: WaveId,
    pub user_id: String,
    pub user_name: String,
    pub user_avatar: String,
    /// Six uppercase hex digits
    pub content_hash: String,
    pub status: WaveStatus,
    /// Present iff `status == Resonated`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
    /// Last update (epoch ms)
    pub timestamp: u64,
    /// Creation (epoch ms)
    pub created_at: u64,
}

impl Wave {
    /// Applies one lifecycle step to the record.
    fn apply(&mut self, step: &Step, now_ms: u64) {
        debug_assert!(self.status.can_transition_to(step.status));
        self.status = step.status;
        if step.status.is_terminal() {
            self.reward = step.reward;
        }
        self.timestamp = now_ms;
    }
}

/// Probabilities governing lifecycle branches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleRates {
    pub retry_probability: f64,
    pub rare_reward_probability: f64,
}

impl Default for LifecycleRates {
    fn default() -> Self {
        Self {
            retry_probability: 0.05,
            rare_reward_probability: 0.10,
        }
    }
}

/// Draws the reward paid on resonance.
///
/// Normal range is 0.01-0.05; with `rare_probability` the draw is replaced
/// by one from 0.05-0.10. The two ranges meet at 0.05.
pub fn draw_reward(rng: &mut LcgRng, rare_probability: f64) -> f64 {
    let normal = rng.next_real(0.01, 0.05);
    if rng.chance(rare_probability) {
        rng.next_real(0.05, 0.10)
    } else {
        normal
    }
}

/// Internal FSM position. Each variant waits on `Lifecycle::deadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitTransmission,
    AwaitDecision,
    AwaitRetryTransmission,
    AwaitRetryResolution,
    Done,
}

/// A single status change produced by [`Lifecycle::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub status: WaveStatus,
    pub reward: Option<f64>,
}

/// Explicit per-wave state machine with absolute deadlines.
#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    stage: Stage,
    deadline: Duration,
    decide_at: Duration,
}

impl Lifecycle {
    /// Plans a new lifecycle for a wave created at `created`.
    pub fn plan(created: Duration, rng: &mut LcgRng) -> Self {
        let transmit_at = created + Duration::from_millis(rng.next_int(1000, 2000) as u64);
        let decide_at = created + Duration::from_millis(rng.next_int(2000, 5000) as u64);
        Self {
            stage: Stage::AwaitTransmission,
            deadline: transmit_at,
            decide_at,
        }
    }

    /// Next time `advance` will do something, or `None` once resonated.
    pub fn next_deadline(&self) -> Option<Duration> {
        match self.stage {
            Stage::Done => None,
            _ => Some(self.deadline),
        }
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Performs at most one transition if `now` has reached the deadline.
    pub fn advance(&mut self, now: Duration, rng: &mut LcgRng, rates: &LifecycleRates) -> Option<Step> {
        if self.stage == Stage::Done || now < self.deadline {
            return None;
        }

        let step = match self.stage {
            Stage::AwaitTransmission => {
                // Decision is never earlier than transmission (ranges meet at 2.0s)
                self.stage = Stage::AwaitDecision;
                self.deadline = self.decide_at.max(self.deadline);
                Step {
                    status: WaveStatus::Transmission,
                    reward: None,
                }
            }
            Stage::AwaitDecision => {
                if rng.chance(rates.retry_probability) {
                    self.stage = Stage::AwaitRetryTransmission;
                    self.deadline += Duration::from_millis(RETRY_BACKOFF_MS);
                    Step {
                        status: WaveStatus::Retry,
                        reward: None,
                    }
                } else {
                    self.resonate(rng, rates)
                }
            }
            Stage::AwaitRetryTransmission => {
                self.stage = Stage::AwaitRetryResolution;
                self.deadline += Duration::from_millis(rng.next_int(2000, 3000) as u64);
                Step {
                    status: WaveStatus::Transmission,
                    reward: None,
                }
            }
            Stage::AwaitRetryResolution => self.resonate(rng, rates),
            Stage::Done => unreachable!("checked above"),
        };
        Some(step)
    }

    fn resonate(&mut self, rng: &mut LcgRng, rates: &LifecycleRates) -> Step {
        self.stage = Stage::Done;
        Step {
            status: WaveStatus::Resonated,
            reward: Some(draw_reward(rng, rates.rare_reward_probability)),
        }
    }
}

/// A wave record paired with its private state machine.
#[derive(Debug, Clone)]
struct TrackedWave {
    record: Wave,
    lifecycle: Lifecycle,
}

/// Outcome of advancing one wave.
#[derive(Debug, Clone, PartialEq)]
pub struct Advanced {
    /// Copy of the record after the transition
    pub wave: Wave,
    /// Reward granted by this transition, if it resonated
    pub reward: Option<f64>,
    /// Next deadline, if the wave is still in flight
    pub next_deadline: Option<Duration>,
}

/// Bounded, newest-first wave history.
///
/// A wave evicted from the history while still in flight is parked in a
/// detached set until it resonates, so late transitions still publish and
/// still pay out.
#[derive(Debug, Clone)]
pub struct WaveLedger {
    history: BoundedFeed<TrackedWave>,
    detached: HashMap<WaveId, TrackedWave>,
    next_seq: u64,
}

impl WaveLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: BoundedFeed::new(capacity),
            detached: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Creates a wave in the SENT state. Returns a copy and its first deadline.
    pub fn create(&mut self, rng: &mut LcgRng, now: Duration, now_ms: u64) -> (Wave, Duration) {
        let suffix = rng.next_int(1000, 9999) as u16;
        let user_id = names::user_id(rng);
        let user_name = names::user_name(rng);
        let user_avatar = names::avatar_url(&user_id);
        let content_hash = names::content_hash(rng);
        let lifecycle = Lifecycle::plan(now, rng);

        let id = WaveId {
            created_ms: now_ms,
            suffix,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        let record = Wave {
            id,
            user_id,
            user_name,
            user_avatar,
            content_hash,
            status: WaveStatus::Sent,
            reward: None,
            timestamp: now_ms,
            created_at: now_ms,
        };
        let first_deadline = lifecycle.deadline;
        let copy = record.clone();

        if let Some(evicted) = self.history.push_front(TrackedWave { record, lifecycle }) {
            if !evicted.lifecycle.is_done() {
                self.detached.insert(evicted.record.id, evicted);
            }
        }
        (copy, first_deadline)
    }

    /// Advances one wave by at most one transition.
    ///
    /// Returns `None` for unknown ids or when the deadline has not been reached.
    pub fn advance(
        &mut self,
        id: WaveId,
        now: Duration,
        now_ms: u64,
        rng: &mut LcgRng,
        rates: &LifecycleRates,
    ) -> Option<Advanced> {
        let detached = !self.history.iter().any(|t| t.record.id == id);
        let tracked = if detached {
            self.detached.get_mut(&id)?
        } else {
            self.history.iter_mut().find(|t| t.record.id == id)?
        };

        let step = tracked.lifecycle.advance(now, rng, rates)?;
        tracked.record.apply(&step, now_ms);
        let advanced = Advanced {
            wave: tracked.record.clone(),
            reward: step.reward,
            next_deadline: tracked.lifecycle.next_deadline(),
        };

        if detached && advanced.next_deadline.is_none() {
            self.detached.remove(&id);
        }
        Some(advanced)
    }

    /// Number of waves in the history (detached ones excluded).
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Waves still in flight, including detached ones.
    pub fn in_flight(&self) -> usize {
        self.history.iter().filter(|t| !t.lifecycle.is_done()).count() + self.detached.len()
    }

    /// The `index`-th most recent wave.
    pub fn nth_recent(&self, index: usize) -> Option<&Wave> {
        self.history.get(index).map(|t| &t.record)
    }

    /// Looks up a wave by id (history or detached).
    pub fn get(&self, id: WaveId) -> Option<&Wave> {
        self.history
            .iter()
            .map(|t| &t.record)
            .find(|w| w.id == id)
            .or_else(|| self.detached.get(&id).map(|t| &t.record))
    }

    /// Copies out at most `limit` records, newest first.
    pub fn head(&self, limit: usize) -> Vec<Wave> {
        self.history.iter().take(limit).map(|t| t.record.clone()).collect()
    }

    /// Copies out the whole history, newest first.
    pub fn to_vec(&self) -> Vec<Wave> {
        self.head(usize::MAX)
    }
}
