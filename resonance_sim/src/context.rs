//! Simulation context implementing ResonanceContext for deterministic testing.

use async_trait::async_trait;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use resonance_env::ResonanceContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 2024-01-01 00:00:00 UTC
const EPOCH_SECS: u64 = 1_704_067_200;

/// Simulation context backed by a virtual clock and a seeded RNG.
///
/// - Time only moves when the harness advances it (or a task sleeps)
/// - Virtual time zero maps to a fixed wall-clock epoch
/// - "Fresh" seeds for `reset_seed` are drawn from a ChaCha8 stream derived
///   from the master seed, so even re-seeding is reproducible
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<AtomicU64>,

    /// Source of reproducible re-seed values
    seed_rng: Arc<Mutex<ChaCha8Rng>>,

    /// Wall-clock time at virtual time zero
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            seed_rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            epoch: UNIX_EPOCH + Duration::from_secs(EPOCH_SECS),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time: Duration) {
        self.virtual_time_ns
            .store(time.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Wall-clock milliseconds at virtual time zero.
    pub fn epoch_ms(&self) -> u64 {
        EPOCH_SECS * 1000
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            seed_rng: Arc::clone(&self.seed_rng),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl ResonanceContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        // The clock only jumps once the sleep completes; a sleep dropped at
        // the yield point leaves virtual time untouched.
        let target = self.time_ns().saturating_add(duration.as_nanos() as u64);
        tokio::task::yield_now().await;
        self.virtual_time_ns.fetch_max(target, Ordering::SeqCst);
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, t_ns = self.time_ns(), "spawning simulated task");
        tokio::spawn(future);
    }

    fn wall_clock_seed(&self) -> u64 {
        self.seed_rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonance_core::{EngineConfig, EngineRuntime, KpiSnapshot, Wave, WaveStatus};

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));

        ctx.set_time(Duration::from_secs(10));
        assert_eq!(ctx.time_ns(), 10_000_000_000);
    }

    #[test]
    fn test_sim_context_epoch() {
        let ctx = SimContext::new(1);
        ctx.advance_time(Duration::from_millis(250));
        assert_eq!(resonance_env::epoch_millis(ctx.system_time()), ctx.epoch_ms() + 250);
    }

    #[test]
    fn test_sim_context_reseed_values_are_reproducible() {
        let a = SimContext::new(42);
        let b = SimContext::new(42);
        let seq_a: Vec<u64> = (0..4).map(|_| a.wall_clock_seed()).collect();
        let seq_b: Vec<u64> = (0..4).map(|_| b.wall_clock_seed()).collect();
        assert_eq!(seq_a, seq_b);
        assert_ne!(seq_a[0], seq_a[1]);

        let c = SimContext::new(43);
        assert_ne!(c.wall_clock_seed(), seq_a[0]);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        // Both should see the same time
        assert_eq!(ctx1.now(), ctx2.now());
    }

    async fn scripted_run(seed: u64) -> (u64, KpiSnapshot, Vec<Wave>) {
        let ctx = SimContext::shared(seed);
        let handle = EngineRuntime::spawn(Arc::clone(&ctx), EngineConfig::seeded(seed));
        handle.start().await.unwrap();
        for _ in 0..200 {
            handle.kpi().await.unwrap();
            tokio::task::yield_now().await;
        }
        let kpi = handle.kpi().await.unwrap();
        let waves = handle.waves().await.unwrap();
        handle.dispose().await;
        (ctx.time_ns(), kpi, waves)
    }

    #[tokio::test]
    async fn test_runtime_on_virtual_clock_is_reproducible() {
        let first = scripted_run(7).await;
        assert!(first.0 > 0);
        assert!(!first.2.is_empty());

        for _ in 0..5 {
            let again = scripted_run(7).await;
            assert_eq!(again.0, first.0);
            assert_eq!(again.1, first.1);
            assert_eq!(again.2, first.2);
        }
    }

    #[tokio::test]
    async fn test_runtime_on_virtual_clock() {
        let ctx = SimContext::shared(7);
        let handle = EngineRuntime::spawn(Arc::clone(&ctx), EngineConfig::seeded(7));
        let wave = handle.inject(1).await.unwrap().remove(0);

        let mut resonated = false;
        for _ in 0..1000 {
            let current = handle.waves().await.unwrap();
            if current[0].status == WaveStatus::Resonated {
                resonated = true;
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(resonated);
        assert_eq!(handle.waves().await.unwrap()[0].id, wave.id);
        assert!(ctx.now() >= Duration::from_secs(2));
        handle.dispose().await;
    }
}
