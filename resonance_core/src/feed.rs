//! Feed Projection - the consumer-side event list.
//!
//! Subscribers that only see the bus (not the engine) rebuild the event list
//! from `new-event` and `event-updated`:
//!
//! ```text
//!   new-event      ──► prepend, truncate to capacity
//!   event-updated  ──► replace in place by id (unknown ids ignored)
//! ```
//!
//! An update for a wave that has already been truncated away is dropped; the
//! projection never resurrects records.

use crate::history::BoundedFeed;
use crate::wave::{Wave, WaveStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default projection length.
pub const FEED_CAPACITY: usize = 500;

/// View filter over the projection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFilter {
    #[default]
    All,
    Transmission,
    Resonated,
    /// Waves sent by one participant
    Mine(String),
}

impl FeedFilter {
    pub fn matches(&self, wave: &Wave) -> bool {
        match self {
            FeedFilter::All => true,
            FeedFilter::Transmission => wave.status == WaveStatus::Transmission,
            FeedFilter::Resonated => wave.status == WaveStatus::Resonated,
            FeedFilter::Mine(user_id) => wave.user_id == *user_id,
        }
    }
}

impl fmt::Display for FeedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedFilter::All => f.write_str("all"),
            FeedFilter::Transmission => f.write_str("transmission"),
            FeedFilter::Resonated => f.write_str("resonated"),
            FeedFilter::Mine(user) => write!(f, "mine:{user}"),
        }
    }
}

impl FromStr for FeedFilter {
    type Err = String;

    /// Accepts `all`, `transmission`, `resonated` or `mine:<user_id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(user) = s.strip_prefix("mine:") {
            if user.is_empty() {
                return Err("mine filter needs a user id (mine:<user>)".to_string());
            }
            return Ok(FeedFilter::Mine(user.to_string()));
        }
        match s.to_lowercase().as_str() {
            "all" => Ok(FeedFilter::All),
            "transmission" => Ok(FeedFilter::Transmission),
            "resonated" => Ok(FeedFilter::Resonated),
            _ => Err(format!("Unknown feed filter: {s}")),
        }
    }
}

/// Newest-first list of waves rebuilt from bus events.
#[derive(Debug, Clone)]
pub struct FeedProjection {
    waves: BoundedFeed<Wave>,
}

impl Default for FeedProjection {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl FeedProjection {
    pub fn new(capacity: usize) -> Self {
        Self {
            waves: BoundedFeed::new(capacity),
        }
    }

    /// Applies a `new-event` payload.
    pub fn on_new(&mut self, wave: &Wave) {
        self.waves.push_front(wave.clone());
    }

    /// Applies an `event-updated` payload. Returns false for unknown ids.
    pub fn on_update(&mut self, wave: &Wave) -> bool {
        match self.waves.iter_mut().find(|w| w.id == wave.id) {
            Some(slot) => {
                *slot = wave.clone();
                true
            }
            None => false,
        }
    }

    /// Copies out the matching waves, newest first.
    pub fn view(&self, filter: &FeedFilter) -> Vec<Wave> {
        self.waves.iter().filter(|w| filter.matches(w)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::LcgRng;
    use crate::wave::WaveLedger;
    use std::time::Duration;

    fn waves(n: usize, seed: u64) -> Vec<Wave> {
        let mut rng = LcgRng::new(seed);
        let mut ledger = WaveLedger::new(n.max(1));
        (0..n).map(|_| ledger.create(&mut rng, Duration::ZERO, 0).0).collect()
    }

    #[test]
    fn test_projection_is_bounded_newest_first() {
        let mut feed = FeedProjection::new(3);
        let ws = waves(5, 1);
        for w in &ws {
            feed.on_new(w);
        }
        let view = feed.view(&FeedFilter::All);
        assert_eq!(view.len(), 3);
        assert_eq!(view[0].id, ws[4].id);
        assert_eq!(view[2].id, ws[2].id);
    }

    #[test]
    fn test_update_replaces_in_place() {
        let mut feed = FeedProjection::default();
        let ws = waves(3, 2);
        for w in &ws {
            feed.on_new(w);
        }

        let mut updated = ws[1].clone();
        updated.status = WaveStatus::Resonated;
        updated.reward = Some(0.03);
        assert!(feed.on_update(&updated));

        let view = feed.view(&FeedFilter::All);
        assert_eq!(view[1], updated);
        assert_eq!(feed.view(&FeedFilter::Resonated), vec![updated]);
        assert!(feed.view(&FeedFilter::Transmission).is_empty());
    }

    #[test]
    fn test_update_for_unknown_id_ignored() {
        let mut feed = FeedProjection::new(1);
        let ws = waves(2, 3);
        feed.on_new(&ws[0]);
        feed.on_new(&ws[1]);
        assert!(!feed.on_update(&ws[0]));
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn test_mine_filter() {
        let mut feed = FeedProjection::default();
        let ws = waves(20, 4);
        for w in &ws {
            feed.on_new(w);
        }
        let me = ws[0].user_id.clone();
        let mine = feed.view(&FeedFilter::Mine(me.clone()));
        assert!(!mine.is_empty());
        assert!(mine.iter().all(|w| w.user_id == me));
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("all".parse::<FeedFilter>().unwrap(), FeedFilter::All);
        assert_eq!("Resonated".parse::<FeedFilter>().unwrap(), FeedFilter::Resonated);
        assert_eq!(
            "mine:user7".parse::<FeedFilter>().unwrap(),
            FeedFilter::Mine("user7".to_string())
        );
        assert!("mine:".parse::<FeedFilter>().is_err());
        assert!("pending".parse::<FeedFilter>().is_err());
        assert_eq!(FeedFilter::Mine("u".into()).to_string(), "mine:u");
    }
}
