//! Resonance Environment Abstraction Layer
//!
//! This crate provides the seam that lets the Resonance activity engine run
//! against either **wall-clock** time (tokio) or **virtual** time (the
//! deterministic harness in `resonance_sim`).
//!
//! # Core Concept
//!
//! The engine never reads a clock directly. Everything it needs from the
//! outside world goes through [`ResonanceContext`]:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Fresh entropy for a re-seed (`wall_clock_seed()`)
//!
//! With a virtual clock and a fixed master seed, a whole run is reproducible.
//!
//! # Example
//!
//! ```ignore
//! use resonance_env::{ResonanceContext, TokioContext};
//!
//! let ctx = TokioContext::shared();
//! loop {
//!     tokio::select! {
//!         cmd = commands.recv() => handle(cmd),
//!         _ = ctx.sleep(until_next_deadline) => engine.advance_to(ctx.now()),
//!     }
//! }
//! ```

mod context;
mod tokio_impl;

pub use context::{epoch_millis, ResonanceContext};
pub use tokio_impl::TokioContext;
