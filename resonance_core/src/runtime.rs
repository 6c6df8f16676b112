//! Engine Runtime - async driver around the synchronous [`Simulator`].
//!
//! One task owns the simulator. It sleeps on the context clock until the
//! next timer deadline and wakes early for commands, so every mutation still
//! happens on a single logical thread:
//!
//! ```text
//!  EngineHandle ──(mpsc: boxed call)──►┌──────────────────────────────┐
//!  EngineHandle ──────────────────────►│ driver task                  │
//!       ▲                              │  select! {                   │
//!       │        (oneshot reply)       │    cmd  => advance_to; call  │
//!       └──────────────────────────────│    sleep => advance_to(now)  │
//!                                      │  }                           │
//!                                      └──────────────────────────────┘
//! ```
//!
//! The driver is generic over [`ResonanceContext`], so the same code runs on
//! tokio wall-clock time or under a paused test clock.

use crate::bus::{Subscription, Topic};
use crate::config::EngineConfig;
use crate::engine::{EngineStats, Simulator};
use crate::error::EngineError;
use crate::metrics::{KpiSnapshot, TopSource};
use crate::schedule::Speed;
use crate::topology::{GraphEdge, GraphNode};
use crate::wave::Wave;
use resonance_env::{epoch_millis, ResonanceContext};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Command queue depth between handles and the driver task.
const COMMAND_BUFFER: usize = 64;

type Call = Box<dyn FnOnce(&mut Simulator, Duration) + Send>;

enum Command {
    Call(Call),
    Dispose,
}

/// Spawns engine driver tasks.
pub struct EngineRuntime;

impl EngineRuntime {
    /// Builds a simulator and spawns its driver on the context.
    ///
    /// Without a configured seed the run is seeded from
    /// [`ResonanceContext::wall_clock_seed`]. The engine starts stopped.
    pub fn spawn<Ctx: ResonanceContext>(ctx: Arc<Ctx>, mut config: EngineConfig) -> EngineHandle {
        if config.seed.is_none() {
            config.seed = Some(ctx.wall_clock_seed());
        }
        let epoch_ms = epoch_millis(ctx.system_time()).saturating_sub(ctx.now().as_millis() as u64);
        let simulator = Simulator::new(config, epoch_ms);

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let driver = Arc::clone(&ctx);
        ctx.spawn("resonance-engine", async move {
            drive(driver, simulator, rx).await;
        });

        EngineHandle { commands: tx }
    }
}

async fn drive<Ctx: ResonanceContext>(ctx: Arc<Ctx>, mut sim: Simulator, mut rx: mpsc::Receiver<Command>) {
    info!("Engine driver started");
    loop {
        let now = ctx.now();
        sim.advance_to(now);
        let wait = sim.next_deadline().map(|deadline| deadline.saturating_sub(now));

        let idle = async {
            match wait {
                Some(d) => ctx.sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Commands win ties so the idle sleep never moves a virtual clock
        // past a command that is already queued.
        tokio::select! {
            biased;
            cmd = rx.recv() => match cmd {
                Some(Command::Call(call)) => {
                    let now = ctx.now();
                    sim.advance_to(now);
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| call(&mut sim, now)));
                    if let Err(cause) = outcome {
                        sim.record_panic("command", cause.as_ref());
                    }
                }
                Some(Command::Dispose) | None => break,
            },
            _ = idle => {}
        }
    }
    sim.stop();
    info!(stats = ?sim.stats(), "Engine driver disposed");
}

/// Cloneable handle to a running engine.
///
/// Every method round-trips through the driver task and fails with
/// [`EngineError::Closed`] once the engine is disposed.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Runs a closure against the simulator on the driver task.
    ///
    /// A panic inside the closure (or inside a bus handler it triggers) is
    /// contained on the driver and reported as [`EngineError::CommandPanicked`].
    pub async fn call<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Simulator, Duration) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let call: Call = Box::new(move |sim, now| {
            let _ = reply_tx.send(f(sim, now));
        });
        self.commands
            .send(Command::Call(call))
            .await
            .map_err(|_| EngineError::Closed)?;
        reply_rx.await.map_err(|_| {
            if self.commands.is_closed() {
                EngineError::Closed
            } else {
                EngineError::CommandPanicked
            }
        })
    }

    // -- commands ------------------------------------------------------------

    pub async fn start(&self) -> Result<(), EngineError> {
        self.call(|sim, now| sim.start(now)).await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.call(|sim, _| sim.stop()).await
    }

    pub async fn set_speed(&self, speed: Speed) -> Result<(), EngineError> {
        self.call(move |sim, now| sim.set_speed(speed, now)).await
    }

    pub async fn inject(&self, count: usize) -> Result<Vec<Wave>, EngineError> {
        self.call(move |sim, now| sim.inject(count, now)).await
    }

    /// Returns the lump-sum reward that was credited.
    pub async fn trigger_spike(&self) -> Result<f64, EngineError> {
        self.call(|sim, now| sim.trigger_spike(now)).await
    }

    /// Re-seeds from the given value. See [`EngineHandle::reset_seed_from`]
    /// for the wall-clock variant.
    pub async fn reset_seed(&self, seed: u64) -> Result<(), EngineError> {
        self.call(move |sim, _| sim.reset_seed(seed)).await
    }

    /// Re-seeds from the context's wall clock; returns the seed used.
    pub async fn reset_seed_from<Ctx: ResonanceContext>(&self, ctx: &Ctx) -> Result<u64, EngineError> {
        let seed = ctx.wall_clock_seed();
        self.reset_seed(seed).await?;
        Ok(seed)
    }

    /// Ends the driver task. Idempotent.
    pub async fn dispose(&self) {
        if self.commands.send(Command::Dispose).await.is_err() {
            debug!("dispose on closed engine");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    // -- subscriptions -------------------------------------------------------

    /// Subscribes to a topic; payloads arrive on the returned channel.
    pub async fn subscribe<T: Topic>(
        &self,
    ) -> Result<(Subscription<T>, mpsc::UnboundedReceiver<T::Payload>), EngineError> {
        self.call(|sim, _| sim.bus_mut().subscribe_channel::<T>()).await
    }

    pub async fn unsubscribe<T: Topic>(&self, subscription: Subscription<T>) -> Result<bool, EngineError> {
        self.call(move |sim, _| sim.bus_mut().unsubscribe(subscription)).await
    }

    // -- queries -------------------------------------------------------------

    pub async fn kpi(&self) -> Result<KpiSnapshot, EngineError> {
        self.call(|sim, _| sim.kpi()).await
    }

    pub async fn feed(&self) -> Result<Vec<Wave>, EngineError> {
        self.call(|sim, _| sim.feed()).await
    }

    pub async fn waves(&self) -> Result<Vec<Wave>, EngineError> {
        self.call(|sim, _| sim.waves()).await
    }

    pub async fn top_sources(&self) -> Result<Vec<TopSource>, EngineError> {
        self.call(|sim, _| sim.top_sources()).await
    }

    pub async fn graph_nodes(&self) -> Result<Vec<GraphNode>, EngineError> {
        self.call(|sim, _| sim.graph_nodes()).await
    }

    pub async fn graph_edges(&self) -> Result<Vec<GraphEdge>, EngineError> {
        self.call(|sim, _| sim.graph_edges()).await
    }

    pub async fn events_per_interval(&self) -> Result<Vec<f64>, EngineError> {
        self.call(|sim, _| sim.events_per_interval()).await
    }

    pub async fn reward_per_interval(&self) -> Result<Vec<f64>, EngineError> {
        self.call(|sim, _| sim.reward_per_interval()).await
    }

    pub async fn ticker(&self) -> Result<Vec<String>, EngineError> {
        self.call(|sim, _| sim.ticker()).await
    }

    pub async fn speed(&self) -> Result<Speed, EngineError> {
        self.call(|sim, _| sim.speed()).await
    }

    pub async fn is_running(&self) -> Result<bool, EngineError> {
        self.call(|sim, _| sim.is_running()).await
    }

    pub async fn stats(&self) -> Result<EngineStats, EngineError> {
        self.call(|sim, _| sim.stats()).await
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{NewWave, TickerUpdated, WaveUpdated};
    use crate::wave::WaveStatus;
    use resonance_env::TokioContext;

    fn engine(seed: u64) -> EngineHandle {
        EngineRuntime::spawn(TokioContext::shared(), EngineConfig::seeded(seed))
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_wave_resonates_on_tokio_clock() {
        let handle = engine(5);
        let (_sub, mut updates) = handle.subscribe::<WaveUpdated>().await.unwrap();

        let wave = handle.inject(1).await.unwrap().remove(0);
        assert_eq!(wave.status, WaveStatus::Sent);

        tokio::time::sleep(Duration::from_secs(11)).await;

        let mut last = None;
        while let Ok(update) = updates.try_recv() {
            assert_eq!(update.id, wave.id);
            last = Some(update);
        }
        let last = last.unwrap();
        assert_eq!(last.status, WaveStatus::Resonated);
        assert!(last.reward.is_some());

        handle.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_command_keeps_driver_alive() {
        let handle = engine(11);
        handle
            .call(|sim, _| {
                sim.bus_mut().subscribe::<NewWave, _>(|_| panic!("handler defect"));
            })
            .await
            .unwrap();

        assert!(matches!(handle.inject(1).await, Err(EngineError::CommandPanicked)));
        assert!(!handle.is_closed());
        assert_eq!(handle.stats().await.unwrap().tick_panics, 1);

        // The wave was scheduled before the handler ran, so it still finishes
        tokio::time::sleep(Duration::from_secs(11)).await;
        let waves = handle.waves().await.unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].status, WaveStatus::Resonated);

        handle.start().await.unwrap();
        let before = handle.kpi().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let after = handle.kpi().await.unwrap();
        assert!(after.total_waves > before.total_waves);
        assert!(handle.is_running().await.unwrap());
        handle.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_run_after_start() {
        let handle = engine(6);
        let (_sub, mut ticker) = handle.subscribe::<TickerUpdated>().await.unwrap();
        handle.start().await.unwrap();
        assert!(handle.is_running().await.unwrap());

        let before = handle.kpi().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        let after = handle.kpi().await.unwrap();

        assert!(after.total_waves > before.total_waves);
        assert!(after.rewards_streamed >= before.rewards_streamed);
        assert!(!handle.ticker().await.unwrap().is_empty());
        assert!(ticker.try_recv().is_ok());

        handle.stop().await.unwrap();
        assert!(!handle.is_running().await.unwrap());
        handle.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_change_keeps_history() {
        let handle = engine(7);
        let (_sub, mut created) = handle.subscribe::<NewWave>().await.unwrap();
        handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;

        let waves = handle.waves().await.unwrap();
        handle.set_speed(Speed::Fast).await.unwrap();
        assert_eq!(handle.waves().await.unwrap(), waves);
        assert_eq!(handle.speed().await.unwrap(), Speed::Fast);

        let mut seen = 0;
        while created.try_recv().is_ok() {
            seen += 1;
        }
        assert!(seen >= waves.len());
        handle.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_spike_credits_reward() {
        let handle = engine(8);
        let before = handle.kpi().await.unwrap().rewards_streamed;
        let amount = handle.trigger_spike().await.unwrap();
        let after = handle.kpi().await.unwrap().rewards_streamed;

        assert!((5.0..10.0).contains(&amount));
        assert!((after - before - amount).abs() < 1e-9);
        assert_eq!(handle.feed().await.unwrap().len(), 20);
        handle.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_seed_from_context() {
        let ctx = TokioContext::shared();
        let handle = EngineRuntime::spawn(Arc::clone(&ctx), EngineConfig::default());
        let seed = handle.reset_seed_from(ctx.as_ref()).await.unwrap();
        assert!(seed > 0);
        handle.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_handle_reports_closed() {
        let handle = engine(9);
        let clone = handle.clone();
        handle.dispose().await;
        tokio::task::yield_now().await;

        assert!(matches!(clone.kpi().await, Err(EngineError::Closed)));
        assert!(matches!(clone.inject(1).await, Err(EngineError::Closed)));
        clone.dispose().await;
    }
}
