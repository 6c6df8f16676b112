//! JSON exporter for offline inspection of a run.
//!
//! Frames are sampled on the virtual clock; command events (spikes, speed
//! changes, re-seeds) are attached to the frame that follows them.

use resonance_core::{KpiSnapshot, Simulator};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub kpi: KpiSnapshot,

    pub speed: String,

    /// Waves in the history buffer
    pub waves: usize,

    pub in_flight: usize,

    /// Newest ticker line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker_head: Option<String>,

    /// Commands issued since the previous frame
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

impl SimFrame {
    /// Captures the simulator's current state.
    pub fn capture(time_sec: f64, sim: &Simulator, events: Vec<SimEvent>) -> Self {
        Self {
            time_sec,
            kpi: sim.kpi(),
            speed: sim.speed().to_string(),
            waves: sim.waves().len(),
            in_flight: sim.in_flight(),
            ticker_head: sim.ticker().into_iter().next(),
            events,
        }
    }
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            violations: Vec::new(),
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, violations: Vec<String>) {
        self.passed = passed;
        self.violations = violations;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resonance_core::EngineConfig;
    use std::time::Duration;

    #[test]
    fn test_export_serializes_camel_case_kpi() {
        let mut sim = Simulator::new(EngineConfig::seeded(1), 0);
        sim.inject(2, Duration::ZERO);

        let mut export = SimExport::new("single_wave", 1);
        export.add_frame(SimFrame::capture(0.0, &sim, vec![SimEvent::info("inject 2")]));
        export.add_frame(SimFrame::capture(1.5, &sim, Vec::new()));
        export.finalize(true, Vec::new());

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["duration_sec"], 1.5);
        assert_eq!(json["frames"][0]["kpi"]["totalWaves"], 1247.0);
        assert_eq!(json["frames"][0]["waves"], 2);
        assert_eq!(json["frames"][0]["events"][0]["message"], "inject 2");
        assert!(json["frames"][1].get("events").is_none());
        assert!(json.get("violations").is_none());
    }
}
