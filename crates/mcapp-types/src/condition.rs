//! Tri-state status conditions
//!
//! A condition is True, False, or Unknown. Unknown carries the message and
//! the instant it was last refreshed; the rollout throttle reads both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Message used while a rollout is in progress
pub const UPGRADING: &str = "upgrading";

/// Condition kinds tracked on MCApps and Apps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Installed,
    Deployed,
}

/// Value of a single condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ConditionStatus {
    True,
    False {
        message: String,
    },
    Unknown {
        message: String,
        since: DateTime<Utc>,
    },
}

impl ConditionStatus {
    pub fn message(&self) -> Option<&str> {
        match self {
            ConditionStatus::True => None,
            ConditionStatus::False { message } | ConditionStatus::Unknown { message, .. } => {
                Some(message)
            }
        }
    }
}

/// Set of conditions keyed by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(BTreeMap<ConditionType, ConditionStatus>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ConditionType) -> Option<&ConditionStatus> {
        self.0.get(&kind)
    }

    pub fn set(&mut self, kind: ConditionType, status: ConditionStatus) {
        self.0.insert(kind, status);
    }

    pub fn is_true(&self, kind: ConditionType) -> bool {
        matches!(self.get(kind), Some(ConditionStatus::True))
    }

    pub fn is_unknown(&self, kind: ConditionType) -> bool {
        matches!(self.get(kind), Some(ConditionStatus::Unknown { .. }))
    }

    pub fn message(&self, kind: ConditionType) -> Option<&str> {
        self.get(kind).and_then(ConditionStatus::message)
    }

    /// When the condition is Unknown/"upgrading", the instant it was last refreshed
    pub fn upgrading_since(&self, kind: ConditionType) -> Option<DateTime<Utc>> {
        match self.get(kind) {
            Some(ConditionStatus::Unknown { message, since }) if message == UPGRADING => {
                Some(*since)
            }
            _ => None,
        }
    }

    pub fn is_upgrading(&self, kind: ConditionType) -> bool {
        self.upgrading_since(kind).is_some()
    }

    /// Mark `kind` as upgrading with a refreshed timestamp
    pub fn mark_upgrading(&mut self, kind: ConditionType, now: DateTime<Utc>) {
        self.set(
            kind,
            ConditionStatus::Unknown {
                message: UPGRADING.to_string(),
                since: now,
            },
        );
    }

    /// Mark `kind` as True, clearing any message
    pub fn mark_true(&mut self, kind: ConditionType) {
        self.set(kind, ConditionStatus::True);
    }
}
