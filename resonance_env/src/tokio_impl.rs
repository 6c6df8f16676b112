//! Production implementation of ResonanceContext using Tokio.

use crate::ResonanceContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Production context backed by Tokio's clock.
///
/// Monotonic time comes from `tokio::time::Instant`, so paused-clock tests
/// (`#[tokio::test(start_paused = true)]`) observe auto-advanced time.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
    
    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResonanceContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
    
    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
    
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
    
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "spawning task");
        tokio::spawn(future);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();
        
        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }
    
    #[tokio::test(start_paused = true)]
    async fn test_tokio_context_paused_clock() {
        let ctx = TokioContext::new();
        ctx.sleep(Duration::from_secs(30)).await;
        
        // Paused clock auto-advances exactly to the sleep deadline
        assert!(ctx.now() >= Duration::from_secs(30));
        assert!(ctx.now() < Duration::from_secs(31));
    }
    
    #[test]
    fn test_tokio_context_wall_clock_seed() {
        let ctx = TokioContext::new();
        // Any time after 2020-01-01
        assert!(ctx.wall_clock_seed() > 1_577_836_800_000);
    }
}
