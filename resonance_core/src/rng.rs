//! Deterministic Number Source
//! ==========================
//!
//! A linear-congruential generator with a deliberately tiny state space:
//!
//! ```text
//! seed' = (seed * 9301 + 49297) mod 233280
//! real  = min + (seed' / 233280) * (max - min)
//! ```
//!
//! The same starting seed always reproduces the same draws. There is no
//! locking: the engine serializes all draws on its single logical thread.

/// LCG multiplier
const MULTIPLIER: u64 = 9301;

/// LCG increment
const INCREMENT: u64 = 49297;

/// LCG modulus (also the number of distinct states)
const MODULUS: u64 = 233_280;

/// Seeded pseudo-random source shared by every engine component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcgRng {
    /// Current state, always kept reduced into `[0, MODULUS)`
    state: u64,
}

impl LcgRng {
    /// Creates a generator from an arbitrary 64-bit seed.
    ///
    /// The seed is reduced modulo 233280 up front; the recurrence is
    /// congruent so the draw sequence is the same as with the raw seed.
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed % MODULUS,
        }
    }

    /// Replaces the state with a new seed.
    pub fn reseed(&mut self, seed: u64) {
        self.state = seed % MODULUS;
    }

    /// Returns the current internal state.
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Returns a real in `[min, max)`.
    pub fn next_real(&mut self, min: f64, max: f64) -> f64 {
        self.state = (self.state * MULTIPLIER + INCREMENT) % MODULUS;
        min + (self.state as f64 / MODULUS as f64) * (max - min)
    }

    /// Returns an integer in `[min, max]` (inclusive on both ends).
    pub fn next_int(&mut self, min: i64, max: i64) -> i64 {
        self.next_real(min as f64, (max + 1) as f64).floor() as i64
    }

    /// Returns `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_real(0.0, 1.0) < p
    }

    /// Picks a uniformly random element. Returns `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.next_int(0, items.len() as i64 - 1) as usize;
        items.get(idx)
    }
}
