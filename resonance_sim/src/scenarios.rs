//! Scenario catalogue for the deterministic harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// A: one KPI tick moves totalWaves by [0.5, 2] from 1247
    KpiTick,

    /// B: one injected wave resolves to resonated with a bounded reward
    SingleWave,

    /// C: a spike credits [5, 10] plus the rewards of 20 fresh waves
    Spike,

    /// D: a mid-run speed change keeps history, series and seed state
    SpeedChange,

    /// Random command script with full invariant monitoring
    Soak,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::KpiTick,
            ScenarioId::SingleWave,
            ScenarioId::Spike,
            ScenarioId::SpeedChange,
            ScenarioId::Soak,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::KpiTick => "kpi_tick",
            ScenarioId::SingleWave => "single_wave",
            ScenarioId::Spike => "spike",
            ScenarioId::SpeedChange => "speed_change",
            ScenarioId::Soak => "soak",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::KpiTick => "First KPI tick at normal speed advances totalWaves by 0.5-2",
            ScenarioId::SingleWave => "inject(1) then wait out the longest lifecycle; wave resonates",
            ScenarioId::Spike => "trigger_spike credits 5-10 immediately plus 20 wave rewards",
            ScenarioId::SpeedChange => "set_speed mid-run keeps waves, series and generator state",
            ScenarioId::Soak => "Seeded random commands over a long run; no invariant breaks",
        }
    }

    /// Returns true if the scenario runs the periodic loops.
    pub fn uses_loops(&self) -> bool {
        matches!(self, ScenarioId::KpiTick | ScenarioId::SpeedChange | ScenarioId::Soak)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kpi_tick" | "kpitick" | "a" => Ok(ScenarioId::KpiTick),
            "single_wave" | "singlewave" | "b" => Ok(ScenarioId::SingleWave),
            "spike" | "c" => Ok(ScenarioId::Spike),
            "speed_change" | "speedchange" | "d" => Ok(ScenarioId::SpeedChange),
            "soak" => Ok(ScenarioId::Soak),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>().unwrap(), id);
            assert_eq!(id.to_string(), id.name());
        }
    }

    #[test]
    fn test_scenario_letter_aliases() {
        assert_eq!("A".parse::<ScenarioId>().unwrap(), ScenarioId::KpiTick);
        assert_eq!("d".parse::<ScenarioId>().unwrap(), ScenarioId::SpeedChange);
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
