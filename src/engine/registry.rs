//! Static catalog of scenario types and predefined chains

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{Chain, ChainStep, ConfigMap, ScenarioType};

pub struct ScenarioRegistry {
    types: BTreeMap<String, ScenarioType>,
}

impl ScenarioRegistry {
    pub fn new(types: impl IntoIterator<Item = ScenarioType>) -> Self {
        Self {
            types: types
                .into_iter()
                .map(|t| (t.scenario_type.clone(), t))
                .collect(),
        }
    }

    /// The built-in e-commerce scenarios
    pub fn builtin() -> Self {
        Self::new([
            scenario(
                "load_test",
                "Load Test",
                "High request volume against every service",
                1000,
                &[("test_type", "load"), ("environment", "testing")],
                json!({"interval_ms": 10}),
            ),
            scenario(
                "error_spike",
                "Error Spike",
                "Sudden burst of failing requests",
                200,
                &[("test_type", "errors"), ("environment", "testing")],
                json!({"error_rate": 0.5}),
            ),
            scenario(
                "slow_responses",
                "Slow Responses",
                "Requests with inflated latency",
                500,
                &[("test_type", "performance"), ("environment", "testing")],
                json!({"response_delay": 2000}),
            ),
            scenario(
                "normal_operation",
                "Normal Operation",
                "Steady traffic with a low error rate",
                300,
                &[("environment", "production")],
                json!({"error_rate": 0.05}),
            ),
            scenario(
                "continuous_load",
                "Continuous Load",
                "Constant background traffic",
                100,
                &[("test_type", "continuous"), ("environment", "testing")],
                json!({"interval_seconds": 5}),
            ),
        ])
    }

    pub fn get(&self, scenario_type: &str) -> Option<&ScenarioType> {
        self.types.get(scenario_type)
    }

    pub fn contains(&self, scenario_type: &str) -> bool {
        self.types.contains_key(scenario_type)
    }

    /// All types, ordered by id
    pub fn list(&self) -> Vec<ScenarioType> {
        self.types.values().cloned().collect()
    }
}

fn scenario(
    id: &str,
    name: &str,
    description: &str,
    default_log_count: u32,
    labels: &[(&str, &str)],
    parameters: serde_json::Value,
) -> ScenarioType {
    ScenarioType {
        scenario_type: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        default_log_count,
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        parameters: parameters.as_object().cloned().unwrap_or_default(),
    }
}

/// Chains seeded into the chain store at startup
pub fn predefined_chains(created_at: DateTime<Utc>) -> Vec<Chain> {
    let chain = |id: &str, description: &str, steps: &[&str]| Chain {
        id: id.to_string(),
        name: id.to_string(),
        description: description.to_string(),
        defaults: ConfigMap::new(),
        steps: steps
            .iter()
            .map(|scenario_type| ChainStep {
                name: scenario_type.to_string(),
                scenario_type: scenario_type.to_string(),
                delay_before: 0,
                config: ConfigMap::new(),
            })
            .collect(),
        predefined: true,
        created_at,
    };

    vec![
        chain(
            "black_friday_rush",
            "High load followed by an error spike",
            &["load_test", "error_spike"],
        ),
        chain(
            "slow_and_steady",
            "Slow responses under normal traffic",
            &["normal_operation", "slow_responses"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let registry = ScenarioRegistry::builtin();
        let ids: Vec<String> = registry.list().into_iter().map(|t| t.scenario_type).collect();
        assert_eq!(
            ids,
            vec![
                "continuous_load",
                "error_spike",
                "load_test",
                "normal_operation",
                "slow_responses"
            ]
        );
        assert_eq!(registry.get("load_test").map(|t| t.default_log_count), Some(1000));
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn test_predefined_chains_reference_known_types() {
        let registry = ScenarioRegistry::builtin();
        for chain in predefined_chains(Utc::now()) {
            assert!(!chain.steps.is_empty());
            assert!(chain.predefined);
            for step in &chain.steps {
                assert!(registry.contains(&step.scenario_type), "{}", step.scenario_type);
            }
        }
    }
}
