// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # State Validator
//!
//! Structural and type checks, in two flavours:
//!
//! - [`StateValidator::validate_update`] checks a proposed partial update
//!   before it reaches the gate's commit path. Each subsystem patch is merged
//!   into a default subsystem and must still deserialize, so a patch that
//!   type-checks here cannot fail to apply later.
//! - [`StateValidator::validate_aggregate`] and
//!   [`StateValidator::validate_document`] check a whole aggregate, the latter
//!   working on raw JSON so the CLI can vet snapshots offline.
//!
//! Nothing here panics; every problem is reported in the result.

use serde_json::{Map, Value};

use crate::domain::state::{json_kind, AppState, ComponentStatus, Subsystem, SystemStatus};
use crate::domain::update::StateUpdate;
use crate::domain::validation::{StateValidationResult, ValidationResult};

/// Deepest nesting a patch may carry. Deeper values cannot be re-read by a
/// standard JSON parser, so they would not survive a snapshot round trip.
pub const MAX_PATCH_DEPTH: usize = 128;

pub const OPTIMIZE_RECOMMENDATION: &str = "Run the optimizer to evict stale entries and reduce state size";

const STATE_VERSION_KEY: &str = "stateVersion";

#[derive(Debug, Clone, Copy)]
pub struct StateValidator {
    max_state_size: usize,
}

impl StateValidator {
    pub fn new(max_state_size: usize) -> Self {
        Self { max_state_size }
    }

    pub fn max_state_size(&self) -> usize {
        self.max_state_size
    }

    pub fn validate_update(&self, update: &StateUpdate) -> ValidationResult {
        let mut errors = Vec::new();

        if update.is_empty() {
            errors.push("update contains no changes".to_string());
        }

        for (key, value) in update.iter() {
            if key == STATE_VERSION_KEY {
                errors.push("stateVersion is managed by the store and cannot be updated".to_string());
                continue;
            }

            let Some(subsystem) = Subsystem::from_key(key) else {
                errors.push(format!("unknown state key '{}'", key));
                continue;
            };

            let Some(patch) = value.as_object() else {
                errors.push(format!(
                    "update for '{}' must be an object, found {}",
                    key,
                    json_kind(value)
                ));
                continue;
            };

            if exceeds_depth(value, MAX_PATCH_DEPTH) {
                errors.push(format!(
                    "update for '{}' is nested deeper than {} levels and cannot be serialized",
                    key, MAX_PATCH_DEPTH
                ));
                continue;
            }

            if let Err(e) = type_check(subsystem, patch) {
                errors.push(e);
            }
        }

        ValidationResult::from_errors(errors)
    }

    pub fn validate_aggregate(&self, state: &AppState) -> StateValidationResult {
        match serde_json::to_value(state) {
            Ok(document) => self.validate_document(&document),
            Err(e) => {
                let mut result = StateValidationResult::new();
                result.error(format!("state is not serializable: {}", e));
                result
            }
        }
    }

    pub fn validate_document(&self, document: &Value) -> StateValidationResult {
        let mut result = StateValidationResult::new();

        let Some(root) = document.as_object() else {
            result.error(format!("state must be an object, found {}", json_kind(document)));
            return result;
        };

        match root.get(STATE_VERSION_KEY) {
            None => result.error("missing required key 'stateVersion'"),
            Some(v) if v.as_u64().is_none() => result.error(format!(
                "'stateVersion' must be an unsigned integer, found {}",
                json_kind(v)
            )),
            Some(_) => {}
        }

        for subsystem in Subsystem::ALL {
            match root.get(subsystem.key()) {
                None => result.error(format!("missing required key '{}'", subsystem)),
                Some(v) if !v.is_object() => {
                    result.error(format!("'{}' must be an object, found {}", subsystem, json_kind(v)))
                }
                Some(_) => {}
            }
        }

        for key in root.keys() {
            if key != STATE_VERSION_KEY && Subsystem::from_key(key).is_none() {
                result.warning(format!("unexpected top-level key '{}'", key));
            }
        }

        if let Some(system) = root.get("system").and_then(Value::as_object) {
            check_system_block(system, &mut result);
        }

        // Field-level schema check, only once the shape is known good so the
        // same problem is not reported twice.
        if result.is_valid {
            if let Err(e) = serde_json::from_value::<AppState>(document.clone()) {
                result.error(format!("state does not match the aggregate schema: {}", e));
            }
        }

        match serde_json::to_vec(document) {
            Ok(bytes) if bytes.len() > self.max_state_size => {
                result.warning(format!(
                    "state size {} bytes exceeds maxStateSize of {} bytes",
                    bytes.len(),
                    self.max_state_size
                ));
                result.recommend(OPTIMIZE_RECOMMENDATION);
            }
            Ok(_) => {}
            Err(e) => result.error(format!("state is not serializable: {}", e)),
        }

        result
    }
}

fn check_system_block(system: &Map<String, Value>, result: &mut StateValidationResult) {
    match system.get("status") {
        None => result.error("missing 'system.status'"),
        Some(status) => {
            if serde_json::from_value::<SystemStatus>(status.clone()).is_err() {
                result.error(format!("illegal system.status {}", status));
            }
        }
    }

    let Some(components) = system.get("components") else {
        result.error("missing 'system.components'");
        return;
    };
    let Some(components) = components.as_object() else {
        result.error(format!(
            "'system.components' must be an object, found {}",
            json_kind(components)
        ));
        return;
    };

    for subsystem in Subsystem::COMPONENTS {
        match components.get(subsystem.key()) {
            None => result.error(format!("system.components is missing '{}'", subsystem)),
            Some(entry) => {
                let status = entry.get("status").cloned().unwrap_or(Value::Null);
                if serde_json::from_value::<ComponentStatus>(status.clone()).is_err() {
                    result.error(format!(
                        "system.components.{} has illegal status {}",
                        subsystem, status
                    ));
                }
            }
        }
    }
}

/// Merge the patch into a default subsystem and require that it still
/// deserializes into the typed record.
fn type_check(subsystem: Subsystem, patch: &Map<String, Value>) -> Result<(), String> {
    let mut scratch = AppState::default();
    scratch
        .merge_subsystem(subsystem, patch)
        .map_err(|e| format!("update for '{}' does not type-check: {}", subsystem, e))
}

fn exceeds_depth(value: &Value, remaining: usize) -> bool {
    match value {
        Value::Array(items) => remaining == 0 || items.iter().any(|v| exceeds_depth(v, remaining - 1)),
        Value::Object(map) => remaining == 0 || map.values().any(|v| exceeds_depth(v, remaining - 1)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> StateValidator {
        StateValidator::new(10 * 1024 * 1024)
    }

    #[test]
    fn test_valid_preference_update() {
        let update = StateUpdate::new().with("user", json!({ "preferences": { "theme": "dark" } }));
        let result = validator().validate_update(&update);
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn test_unknown_and_reserved_keys_rejected() {
        let update = StateUpdate::new()
            .with("billing", json!({ "plan": "pro" }))
            .with("stateVersion", json!({ "value": 99 }));
        let result = validator().validate_update(&update);

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().any(|e| e.contains("billing")));
        assert!(result.errors.iter().any(|e| e.contains("stateVersion")));
    }

    #[test]
    fn test_non_object_patch_rejected() {
        let update = StateUpdate::new().with("memory", json!(["not", "an", "object"]));
        let result = validator().validate_update(&update);
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("array"));
    }

    #[test]
    fn test_mistyped_field_rejected() {
        let update = StateUpdate::new().with("school", json!({ "lessons": "all of them" }));
        let result = validator().validate_update(&update);
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("does not type-check"));
    }

    #[test]
    fn test_overly_deep_patch_rejected() {
        let mut deep = json!("leaf");
        for _ in 0..(MAX_PATCH_DEPTH + 2) {
            deep = json!({ "next": deep });
        }
        let update = StateUpdate::new().with("user", json!({ "preferences": deep }));
        let result = validator().validate_update(&update);
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("nested deeper"));
    }

    #[test]
    fn test_system_patch_dropping_component_keys_rejected() {
        let update = StateUpdate::new().with("system", json!({ "components": {} }));
        let result = validator().validate_update(&update);
        assert!(!result.is_valid);
        assert!(result.errors[0].contains("system.components is missing 'memory'"));

        let mut components = serde_json::to_value(AppState::new().system.components).unwrap();
        components["memory"] = json!({ "status": "active", "lastActivity": "2026-01-01T00:00:00Z" });
        let update = StateUpdate::new().with("system", json!({ "components": components }));
        assert!(validator().validate_update(&update).is_valid);
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(!validator().validate_update(&StateUpdate::new()).is_valid);
    }

    #[test]
    fn test_default_aggregate_is_valid() {
        let result = validator().validate_aggregate(&AppState::new());
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_oversized_aggregate_warns_with_recommendation() {
        let result = StateValidator::new(64).validate_aggregate(&AppState::new());
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.recommendations, vec![OPTIMIZE_RECOMMENDATION.to_string()]);
    }

    #[test]
    fn test_document_missing_subsystem_and_component() {
        let mut document = serde_json::to_value(AppState::new()).unwrap();
        let root = document.as_object_mut().unwrap();
        root.remove("ux");
        root["system"]["components"].as_object_mut().unwrap().remove("assets");
        root["system"]["status"] = json!("exploding");

        let result = validator().validate_document(&document);
        assert!(!result.is_valid);
        assert!(result.mentions("missing required key 'ux'"));
        assert!(result.mentions("missing 'assets'"));
        assert!(result.mentions("illegal system.status"));
    }

    #[test]
    fn test_document_that_is_not_an_object() {
        let result = validator().validate_document(&json!([1, 2, 3]));
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
    }
}
