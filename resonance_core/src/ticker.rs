//! Ticker Generator - rolling human-readable status lines.

use crate::history::BoundedFeed;
use crate::names;
use crate::rng::LcgRng;
use crate::wave::WaveLedger;

/// Message templates. Placeholders: `{hash}`, `{user}`, `{reward}`.
pub const TEMPLATES: [&str; 6] = [
    "Wave #{hash} verified → {reward} SOL streamed",
    "@{user} sent wave",
    "Echo amplified",
    "Signal in transmission...",
    "Resonance detected",
    "Network pulse increased",
];

/// How far back into the wave history a ticker line may sample.
const SAMPLE_WINDOW: usize = 10;

/// Newest-first buffer of ticker lines.
#[derive(Debug, Clone)]
pub struct Ticker {
    lines: BoundedFeed<String>,
}

impl Ticker {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: BoundedFeed::new(capacity),
        }
    }

    /// Renders one line from a random template and pushes it to the front.
    ///
    /// Placeholders are filled from one of the most recent waves when any
    /// exist, otherwise from freshly generated values.
    pub fn tick(&mut self, rng: &mut LcgRng, waves: &WaveLedger) -> Vec<String> {
        let template = rng.pick(&TEMPLATES).copied().unwrap_or(TEMPLATES[0]);

        let line = if waves.is_empty() {
            let hash = names::content_hash(rng);
            let user = names::user_name(rng);
            let reward = rng.next_real(0.01, 0.05);
            render(template, &hash, &user, reward)
        } else {
            let upper = SAMPLE_WINDOW.min(waves.len() - 1) as i64;
            let index = rng.next_int(0, upper) as usize;
            match waves.nth_recent(index) {
                Some(wave) => {
                    let reward = match wave.reward {
                        Some(r) => r,
                        None => rng.next_real(0.01, 0.05),
                    };
                    render(template, &wave.content_hash, &wave.user_name, reward)
                }
                None => template.to_string(),
            }
        };

        self.lines.push_front(line);
        self.lines()
    }

    /// Copies out the buffer, newest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.to_vec()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Fills the first occurrence of each placeholder.
pub fn render(template: &str, hash: &str, user: &str, reward: f64) -> String {
    template
        .replacen("{hash}", hash, 1)
        .replacen("{user}", user, 1)
        .replacen("{reward}", &format!("{reward:.2}"), 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_render_fills_placeholders() {
        let line = render(TEMPLATES[0], "ABC123", "Echo100", 0.0349);
        assert_eq!(line, "Wave #ABC123 verified → 0.03 SOL streamed");
        assert_eq!(render(TEMPLATES[1], "X", "Pulse417", 0.0), "@Pulse417 sent wave");
    }

    #[test]
    fn test_ticker_without_waves_uses_synthetic_values() {
        let mut rng = LcgRng::new(21);
        let ledger = WaveLedger::new(10);
        let mut ticker = Ticker::new(20);
        for _ in 0..30 {
            let lines = ticker.tick(&mut rng, &ledger);
            assert!(!lines[0].contains('{'));
        }
        assert_eq!(ticker.len(), 20);
    }

    #[test]
    fn test_ticker_samples_recent_waves() {
        let mut rng = LcgRng::new(22);
        let mut ledger = WaveLedger::new(50);
        for _ in 0..30 {
            ledger.create(&mut rng, Duration::ZERO, 0);
        }
        let recent_users: Vec<String> = (0..=10)
            .filter_map(|i| ledger.nth_recent(i).map(|w| w.user_name.clone()))
            .collect();

        let mut ticker = Ticker::new(20);
        for _ in 0..200 {
            let line = ticker.tick(&mut rng, &ledger).remove(0);
            if let Some(user) = line.strip_prefix('@').and_then(|l| l.strip_suffix(" sent wave")) {
                assert!(recent_users.iter().any(|u| u == user), "{user} not recent");
            }
        }
    }

    #[test]
    fn test_ticker_newest_first() {
        let mut rng = LcgRng::new(23);
        let ledger = WaveLedger::new(1);
        let mut ticker = Ticker::new(3);
        let first = ticker.tick(&mut rng, &ledger)[0].clone();
        let lines = ticker.tick(&mut rng, &ledger);
        assert_eq!(lines[1], first);
    }
}
