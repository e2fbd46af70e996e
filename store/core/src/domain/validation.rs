// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Validation Results
//!
//! Two result shapes are used across the store:
//!
//! | Type | Produced by | Meaning |
//! |------|-------------|---------|
//! | [`ValidationResult`] | update validation | `is_valid` + error list, nothing else |
//! | [`StateValidationResult`] | aggregate validation, consistency audit, recovery | errors, warnings, inconsistencies and recommendations |
//!
//! Errors and inconsistencies make a result invalid. Warnings and
//! recommendations never do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// A detected disagreement between two parts of the aggregate, or between
/// the aggregate and an authoritative source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inconsistency {
    pub subsystem: String,
    pub description: String,
}

impl Inconsistency {
    pub fn new(subsystem: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.subsystem, self.description)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub inconsistencies: Vec<Inconsistency>,
    pub recommendations: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl Default for StateValidationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            inconsistencies: Vec::new(),
            recommendations: Vec::new(),
            checked_at: Utc::now(),
        }
    }
}

impl StateValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn inconsistency(&mut self, inconsistency: Inconsistency) {
        self.inconsistencies.push(inconsistency);
        self.is_valid = false;
    }

    /// Recommendations are de-duplicated.
    pub fn recommend(&mut self, recommendation: impl Into<String>) {
        let recommendation = recommendation.into();
        if !self.recommendations.contains(&recommendation) {
            self.recommendations.push(recommendation);
        }
    }

    pub fn merge(&mut self, other: StateValidationResult) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.inconsistencies.extend(other.inconsistencies);
        for recommendation in other.recommendations {
            self.recommend(recommendation);
        }
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.errors.iter().any(|e| e.contains(needle))
            || self.warnings.iter().any(|w| w.contains(needle))
            || self.inconsistencies.iter().any(|i| i.description.contains(needle))
    }
}
