//! Scenario run states and the catalog objects the engine reads.

use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a scenario's evaluation run.
///
/// `Finished` and `Failed` are terminal for a run; the scenario returns to
/// `Changed` as soon as its configuration is edited again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Changed,
    Running,
    Finished,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Changed => "changed",
            RunState::Running => "running",
            RunState::Finished => "finished",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "changed" => Ok(RunState::Changed),
            "running" => Ok(RunState::Running),
            "finished" => Ok(RunState::Finished),
            "failed" => Ok(RunState::Failed),
            other => Err(format!("unknown run state: {other}")),
        }
    }
}

/// Area-of-interest geometry a scenario run is scoped to.
#[derive(Debug, Clone)]
pub struct Catchment {
    pub id: Uuid,
    pub name: String,
    pub geom: MultiPolygon<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_round_trip() {
        for state in [
            RunState::Changed,
            RunState::Running,
            RunState::Finished,
            RunState::Failed,
        ] {
            let parsed: RunState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn run_state_rejects_unknown() {
        assert!("paused".parse::<RunState>().is_err());
    }
}
