//! Core environment context trait for the Resonance engine.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so the activity engine can run
/// in both production (tokio) and simulation (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - manually advanced virtual clock
///
/// # Determinism
///
/// Every source of non-determinism the engine touches (time, re-seeding)
/// is supplied by the implementation.
#[async_trait]
pub trait ResonanceContext: Send + Sync + 'static {
    /// Returns the monotonic time elapsed since context creation.
    ///
    /// All engine deadlines are expressed on this clock.
    fn now(&self) -> Duration;
    
    /// Returns the wall-clock time used for record timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);
    
    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
    
    /// Returns a seed for a fresh, non-reproducible run.
    ///
    /// The default is the current wall-clock time in milliseconds.
    fn wall_clock_seed(&self) -> u64 {
        epoch_millis(self.system_time())
    }
}

/// Converts a wall-clock time to milliseconds since the UNIX epoch.
///
/// Times before the epoch collapse to 0.
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
