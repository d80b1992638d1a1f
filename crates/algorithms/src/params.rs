//! Parameter definitions, per-run parameter maps, and the candidate-value
//! store with its single-default invariant.

use std::collections::HashMap;
use std::sync::RwLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AlgorithmError;

/// Declared input of an algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub unit: String,
    pub required: bool,
}

impl ParameterDef {
    pub fn required(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            required: false,
        }
    }
}

/// A resolved parameter value passed into a single run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSetting {
    pub value: f64,
    pub standard_deviation: Option<f64>,
}

/// Resolved parameter values for one unit of work, keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct ParameterMap {
    inner: IndexMap<String, ParamSetting>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, setting: ParamSetting) -> Option<ParamSetting> {
        self.inner.insert(name.into(), setting)
    }

    pub fn get(&self, name: &str) -> Option<&ParamSetting> {
        self.inner.get(name)
    }

    /// Fetch a parameter that the algorithm cannot run without.
    pub fn require(&self, name: &str) -> Result<&ParamSetting, AlgorithmError> {
        self.inner
            .get(name)
            .ok_or_else(|| AlgorithmError::MissingRequiredParameter(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamSetting)> {
        self.inner.iter()
    }
}

/// One candidate value of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub id: Uuid,
    pub value: f64,
    pub standard_deviation: Option<f64>,
    pub is_default: bool,
}

/// Candidate parameter values per (algorithm, parameter).
///
/// Invariant: at most one candidate per (algorithm, parameter) is marked
/// default. The first inserted value becomes default automatically; marking
/// another value default demotes the previous one in the same critical
/// section.
#[derive(Debug, Default)]
pub struct ParameterStore {
    values: RwLock<HashMap<(String, String), Vec<ParameterValue>>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate value.
    ///
    /// With `make_default` set, any previously default value of the same
    /// parameter is demoted atomically. Without it, the value still becomes
    /// default when it is the first candidate for its parameter.
    pub fn insert_value(
        &self,
        algorithm: &str,
        parameter: &str,
        value: f64,
        standard_deviation: Option<f64>,
        make_default: bool,
    ) -> ParameterValue {
        let mut values = self.values.write().unwrap();
        let candidates = values
            .entry((algorithm.to_string(), parameter.to_string()))
            .or_default();

        let is_default = make_default || candidates.iter().all(|v| !v.is_default);
        if is_default {
            for existing in candidates.iter_mut() {
                existing.is_default = false;
            }
        }

        let candidate = ParameterValue {
            id: Uuid::new_v4(),
            value,
            standard_deviation,
            is_default,
        };
        candidates.push(candidate);
        candidate
    }

    /// Mark an existing candidate as the default, demoting all others for the
    /// same parameter atomically.
    pub fn set_default(
        &self,
        algorithm: &str,
        parameter: &str,
        value_id: Uuid,
    ) -> Result<(), AlgorithmError> {
        let mut values = self.values.write().unwrap();
        let candidates = values
            .get_mut(&(algorithm.to_string(), parameter.to_string()))
            .ok_or_else(|| AlgorithmError::UnknownParameter {
                algorithm: algorithm.to_string(),
                parameter: parameter.to_string(),
            })?;

        if !candidates.iter().any(|v| v.id == value_id) {
            return Err(AlgorithmError::UnknownParameterValue(value_id));
        }

        for candidate in candidates.iter_mut() {
            candidate.is_default = candidate.id == value_id;
        }
        Ok(())
    }

    /// All candidate values for one parameter.
    pub fn values(&self, algorithm: &str, parameter: &str) -> Vec<ParameterValue> {
        self.values
            .read()
            .unwrap()
            .get(&(algorithm.to_string(), parameter.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// All candidate values for all of an algorithm's parameters.
    pub fn algorithm_values(&self, algorithm: &str) -> HashMap<String, Vec<ParameterValue>> {
        self.values
            .read()
            .unwrap()
            .iter()
            .filter(|((alg, _), _)| alg == algorithm)
            .map(|((_, param), candidates)| (param.clone(), candidates.clone()))
            .collect()
    }

    /// The default candidate per parameter of an algorithm.
    pub fn default_values(&self, algorithm: &str) -> HashMap<String, ParameterValue> {
        self.values
            .read()
            .unwrap()
            .iter()
            .filter(|((alg, _), _)| alg == algorithm)
            .filter_map(|((_, param), candidates)| {
                candidates
                    .iter()
                    .find(|v| v.is_default)
                    .map(|v| (param.clone(), *v))
            })
            .collect()
    }
}
