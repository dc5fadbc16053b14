//! Rule and rule-result models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Action a matched rule asks the orchestrator to take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Approve,
    Decline,
    Review,
    Sweep,
    StepUpAuth,
    Flag,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Approve => "approve",
            RuleAction::Decline => "decline",
            RuleAction::Review => "review",
            RuleAction::Sweep => "sweep",
            RuleAction::StepUpAuth => "step_up_auth",
            RuleAction::Flag => "flag",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(RuleAction::Approve),
            "decline" => Ok(RuleAction::Decline),
            "review" => Ok(RuleAction::Review),
            "sweep" => Ok(RuleAction::Sweep),
            "step_up_auth" => Ok(RuleAction::StepUpAuth),
            "flag" => Ok(RuleAction::Flag),
            other => Err(format!("unknown rule action: {}", other)),
        }
    }
}

/// Where a rule applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "accountId")]
pub enum RuleScope {
    Global,
    Account(Uuid),
}

impl RuleScope {
    /// Nullable `account_id` column representation
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            RuleScope::Global => None,
            RuleScope::Account(id) => Some(*id),
        }
    }

    pub fn from_account_id(account_id: Option<Uuid>) -> Self {
        account_id.map_or(RuleScope::Global, RuleScope::Account)
    }
}

/// A named condition set with an action.
///
/// Lower `priority` is evaluated (and preferred) first. Top-level
/// condition keys are AND-combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub rule_id: Uuid,
    pub name: String,
    pub action: RuleAction,
    pub priority: i32,
    pub scope: RuleScope,
    pub conditions: Map<String, Value>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn active_by_default() -> bool {
    true
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        action: RuleAction,
        priority: i32,
        scope: RuleScope,
        conditions: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            rule_id: Uuid::new_v4(),
            name: name.into(),
            action,
            priority,
            scope,
            conditions,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of evaluating one rule (or one anomaly check) for a transaction.
///
/// Persisted as part of the transaction's applied-rules audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    /// Rule UUID, or `anomaly:<check>` for detector results
    pub rule_id: String,
    pub rule_name: String,
    pub action: RuleAction,
    pub priority: i32,
    pub matched: bool,
    pub conditions: Value,
    pub evaluation_time_us: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuleResult {
    pub fn is_match_for(&self, action: RuleAction) -> bool {
        self.matched && self.action == action
    }
}
