//! Expansion of a scenario's declarative configuration into independent
//! units of work.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bioflow_algorithms::{AlgorithmRegistry, ParamSetting, ParameterMap, ParameterStore};

use crate::error::ConfigError;

/// One parameter value assigned in a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterAssignment {
    pub parameter: String,
    pub value: f64,
    #[serde(default)]
    pub standard_deviation: Option<f64>,
}

/// One (feedstock, algorithm, assignments) triple of a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub feedstock_id: Uuid,
    pub algorithm_id: String,
    #[serde(default)]
    pub assignments: Vec<ParameterAssignment>,
}

/// Declarative configuration of a scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub entries: Vec<ConfigEntry>,
}

/// One independent job: everything a worker needs to run on its own.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    pub scenario_id: Uuid,
    pub catchment_id: Uuid,
    pub feedstock_id: Uuid,
    pub algorithm_id: String,
    pub params: ParameterMap,
}

impl ScenarioConfig {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configuration pre-filled with every algorithm's default parameter
    /// values for the given (feedstock, algorithm) pairs.
    pub fn with_defaults(pairs: &[(Uuid, String)], store: &ParameterStore) -> Self {
        let entries = pairs
            .iter()
            .map(|(feedstock_id, algorithm_id)| {
                let assignments = store
                    .default_values(algorithm_id)
                    .into_iter()
                    .map(|(parameter, value)| ParameterAssignment {
                        parameter,
                        value: value.value,
                        standard_deviation: value.standard_deviation,
                    })
                    .collect();
                ConfigEntry {
                    feedstock_id: *feedstock_id,
                    algorithm_id: algorithm_id.clone(),
                    assignments,
                }
            })
            .collect();
        Self { entries }
    }

    /// Group the configuration into exactly one unit of work per distinct
    /// (feedstock, algorithm) pair, merging that pair's assignments.
    ///
    /// Fails without producing any unit when the configuration is empty, a
    /// parameter is assigned twice for the same pair, an algorithm is not
    /// registered, or a required parameter has no value.
    pub fn expand(
        &self,
        scenario_id: Uuid,
        catchment_id: Uuid,
        registry: &AlgorithmRegistry,
    ) -> Result<Vec<UnitOfWork>, ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::Empty);
        }

        // Merge assignments per (feedstock, algorithm), first-seen pair order.
        let mut pairs: IndexMap<(Uuid, String), ParameterMap> = IndexMap::new();
        for entry in &self.entries {
            let params = pairs
                .entry((entry.feedstock_id, entry.algorithm_id.clone()))
                .or_default();
            for assignment in &entry.assignments {
                if params.contains(&assignment.parameter) {
                    return Err(ConfigError::DuplicateParameterAssignment {
                        feedstock_id: entry.feedstock_id,
                        algorithm_id: entry.algorithm_id.clone(),
                        parameter: assignment.parameter.clone(),
                    });
                }
                params.insert(
                    assignment.parameter.clone(),
                    ParamSetting {
                        value: assignment.value,
                        standard_deviation: assignment.standard_deviation,
                    },
                );
            }
        }

        // Every referenced algorithm must exist and have all required
        // parameters assigned.
        for ((feedstock_id, algorithm_id), params) in &pairs {
            let algorithm = registry
                .resolve(algorithm_id)
                .map_err(|_| ConfigError::UnknownAlgorithm(algorithm_id.clone()))?;
            for def in algorithm.parameters().iter().filter(|p| p.required) {
                if !params.contains(&def.name) {
                    return Err(ConfigError::Incomplete {
                        feedstock_id: *feedstock_id,
                        algorithm_id: algorithm_id.clone(),
                        parameter: def.name.clone(),
                    });
                }
            }
        }

        Ok(pairs
            .into_iter()
            .map(|((feedstock_id, algorithm_id), params)| UnitOfWork {
                scenario_id,
                catchment_id,
                feedstock_id,
                algorithm_id,
                params,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AlgorithmRegistry {
        AlgorithmRegistry::builtin()
    }

    fn assignment(parameter: &str, value: f64) -> ParameterAssignment {
        ParameterAssignment {
            parameter: parameter.to_string(),
            value,
            standard_deviation: None,
        }
    }

    #[test]
    fn one_unit_per_distinct_pair() {
        let feedstock_a = Uuid::new_v4();
        let feedstock_b = Uuid::new_v4();
        let config = ScenarioConfig {
            entries: vec![
                ConfigEntry {
                    feedstock_id: feedstock_a,
                    algorithm_id: "avg_point_yield".into(),
                    assignments: vec![assignment("point_yield", 5.0)],
                },
                ConfigEntry {
                    feedstock_id: feedstock_a,
                    algorithm_id: "avg_area_yield".into(),
                    assignments: vec![assignment("area_yield", 0.5)],
                },
                ConfigEntry {
                    feedstock_id: feedstock_b,
                    algorithm_id: "avg_point_yield".into(),
                    assignments: vec![assignment("point_yield", 2.0)],
                },
            ],
        };

        let units = config
            .expand(Uuid::new_v4(), Uuid::new_v4(), &registry())
            .unwrap();
        assert_eq!(units.len(), 3);

        let pairs: Vec<_> = units
            .iter()
            .map(|u| (u.feedstock_id, u.algorithm_id.as_str()))
            .collect();
        assert!(pairs.contains(&(feedstock_a, "avg_point_yield")));
        assert!(pairs.contains(&(feedstock_a, "avg_area_yield")));
        assert!(pairs.contains(&(feedstock_b, "avg_point_yield")));
    }

    #[test]
    fn entries_for_same_pair_are_merged() {
        let feedstock = Uuid::new_v4();
        // Same pair split across two entries with different parameters.
        let config = ScenarioConfig {
            entries: vec![
                ConfigEntry {
                    feedstock_id: feedstock,
                    algorithm_id: "avg_point_yield".into(),
                    assignments: vec![assignment("point_yield", 5.0)],
                },
                ConfigEntry {
                    feedstock_id: feedstock,
                    algorithm_id: "avg_point_yield".into(),
                    assignments: vec![],
                },
            ],
        };

        let units = config
            .expand(Uuid::new_v4(), Uuid::new_v4(), &registry())
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].params.len(), 1);
    }

    #[test]
    fn empty_configuration_rejected() {
        let config = ScenarioConfig::default();
        let err = config
            .expand(Uuid::new_v4(), Uuid::new_v4(), &registry())
            .unwrap_err();
        assert_eq!(err, ConfigError::Empty);
    }

    #[test]
    fn duplicate_assignment_rejected() {
        let feedstock = Uuid::new_v4();
        let config = ScenarioConfig {
            entries: vec![ConfigEntry {
                feedstock_id: feedstock,
                algorithm_id: "avg_point_yield".into(),
                assignments: vec![assignment("point_yield", 5.0), assignment("point_yield", 6.0)],
            }],
        };

        let err = config
            .expand(Uuid::new_v4(), Uuid::new_v4(), &registry())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateParameterAssignment { parameter, .. } if parameter == "point_yield"
        ));
    }

    #[test]
    fn missing_required_parameter_rejected() {
        let config = ScenarioConfig {
            entries: vec![ConfigEntry {
                feedstock_id: Uuid::new_v4(),
                algorithm_id: "avg_point_yield".into(),
                assignments: vec![],
            }],
        };

        let err = config
            .expand(Uuid::new_v4(), Uuid::new_v4(), &registry())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Incomplete { parameter, .. } if parameter == "point_yield"
        ));
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let config = ScenarioConfig {
            entries: vec![ConfigEntry {
                feedstock_id: Uuid::new_v4(),
                algorithm_id: "not_registered".into(),
                assignments: vec![],
            }],
        };

        let err = config
            .expand(Uuid::new_v4(), Uuid::new_v4(), &registry())
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownAlgorithm("not_registered".into()));
    }

    #[test]
    fn defaults_seed_a_runnable_configuration() {
        let store = ParameterStore::new();
        store.insert_value("avg_point_yield", "point_yield", 5.0, Some(0.5), true);

        let feedstock = Uuid::new_v4();
        let config = ScenarioConfig::with_defaults(
            &[(feedstock, "avg_point_yield".to_string())],
            &store,
        );

        let units = config
            .expand(Uuid::new_v4(), Uuid::new_v4(), &registry())
            .unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].params.require("point_yield").unwrap().value, 5.0);
    }
}
