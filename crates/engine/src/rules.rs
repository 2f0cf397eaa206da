//! Categorization rules.
//!
//! A [`Rule`] binds a predicate over uncategorized masters (one or more
//! [`ConditionGroup`]s, OR'd together) to a processor and its config.
//! Batch application walks rules by descending priority and the first rule
//! to successfully process a transaction wins it for the run.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

/// How a single condition is evaluated against a master.
///
/// Text types match the description case-insensitively; amount types
/// compare against the magnitude in cents, with `match_value` parsed as a
/// decimal amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Contains,
    StartsWith,
    Exact,
    Regex,
    AmountGt,
    AmountGte,
    AmountLt,
    AmountLte,
    AmountEq,
}

/// How conditions inside a group combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub match_type: MatchType,
    pub match_value: String,
}

/// Conditions joined by one operator. Groups themselves always combine
/// with OR at the rule level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionGroup {
    pub operator: LogicalOperator,
    pub conditions: Vec<RuleCondition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub description: String,
    /// Higher priority rules are tried first.
    pub priority: i32,
    pub enabled: bool,
    /// When set, only masters imported on these real accounts match.
    pub account_filter: Option<Vec<Uuid>>,
    pub processor_type: String,
    pub processor_config: serde_json::Value,
    pub condition_groups: Vec<ConditionGroup>,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        description: String,
        priority: i32,
        enabled: bool,
        account_filter: Option<Vec<Uuid>>,
        processor_type: String,
        processor_config: serde_json::Value,
        condition_groups: Vec<ConditionGroup>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            description,
            priority,
            enabled,
            account_filter,
            processor_type,
            processor_config,
            condition_groups,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categorization_rules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub description: String,
    pub priority: i32,
    pub enabled: bool,
    /// JSON array of account ids, or NULL for no filter.
    pub account_filter: Option<String>,
    pub processor_type: String,
    /// JSON object, opaque to the store; the named processor owns it.
    pub processor_config: String,
    /// JSON array of condition groups.
    pub condition_groups: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Rule> for ActiveModel {
    type Error = EngineError;

    fn try_from(rule: &Rule) -> Result<Self, Self::Error> {
        let account_filter = rule
            .account_filter
            .as_ref()
            .map(|ids| serde_json::to_string(ids))
            .transpose()
            .map_err(|e| EngineError::InvalidRequest(format!("invalid account filter: {e}")))?;
        let condition_groups = serde_json::to_string(&rule.condition_groups)
            .map_err(|e| EngineError::InvalidRequest(format!("invalid condition groups: {e}")))?;

        let now = Utc::now();
        Ok(Self {
            id: ActiveValue::Set(rule.id.to_string()),
            description: ActiveValue::Set(rule.description.clone()),
            priority: ActiveValue::Set(rule.priority),
            enabled: ActiveValue::Set(rule.enabled),
            account_filter: ActiveValue::Set(account_filter),
            processor_type: ActiveValue::Set(rule.processor_type.clone()),
            processor_config: ActiveValue::Set(rule.processor_config.to_string()),
            condition_groups: ActiveValue::Set(condition_groups),
            created_at: ActiveValue::Set(rule.created_at),
            updated_at: ActiveValue::Set(now),
        })
    }
}

impl TryFrom<Model> for Rule {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let account_filter = model
            .account_filter
            .as_deref()
            .map(serde_json::from_str::<Vec<Uuid>>)
            .transpose()
            .map_err(|e| {
                EngineError::InvalidConfig(format!("stored account filter is not valid: {e}"))
            })?;
        let processor_config = serde_json::from_str(&model.processor_config).map_err(|e| {
            EngineError::InvalidConfig(format!("stored processor config is not valid: {e}"))
        })?;
        let condition_groups = serde_json::from_str(&model.condition_groups).map_err(|e| {
            EngineError::InvalidConfig(format!("stored condition groups are not valid: {e}"))
        })?;

        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::InvalidRequest("invalid rule id".to_string()))?,
            description: model.description,
            priority: model.priority,
            enabled: model.enabled,
            account_filter,
            processor_type: model.processor_type,
            processor_config,
            condition_groups,
            created_at: model.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_groups_round_trip_through_json() {
        let groups = vec![ConditionGroup {
            operator: LogicalOperator::And,
            conditions: vec![
                RuleCondition {
                    match_type: MatchType::Contains,
                    match_value: "carrefour".to_string(),
                },
                RuleCondition {
                    match_type: MatchType::AmountLt,
                    match_value: "150.00".to_string(),
                },
            ],
        }];
        let json = serde_json::to_string(&groups).unwrap();
        assert!(json.contains("\"AND\""));
        assert!(json.contains("\"contains\""));
        assert!(json.contains("\"amount_lt\""));
        let back: Vec<ConditionGroup> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, groups);
    }
}
