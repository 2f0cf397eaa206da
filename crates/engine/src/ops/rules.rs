//! Rule CRUD.
//!
//! Configs are validated at save time by the processor the rule names, so
//! a persisted rule is ready to run. Conditions are compiled once here as
//! well to surface bad regexes or unparsable amounts before they reach a
//! batch run.

use sea_orm::{ActiveValue, QueryFilter, QueryOrder, prelude::*};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{ConditionGroup, EngineError, ResultEngine, Rule, TransactionFilter, rules};

use super::{Engine, matching};

impl Engine {
    /// Creates a categorization rule and returns its id.
    ///
    /// The named processor must exist and accept `processor_config`; every
    /// condition must compile.
    #[allow(clippy::too_many_arguments)]
    pub async fn new_rule(
        &self,
        description: &str,
        priority: i32,
        enabled: bool,
        account_filter: Option<Vec<Uuid>>,
        processor_type: &str,
        processor_config: Value,
        condition_groups: Vec<ConditionGroup>,
    ) -> ResultEngine<Uuid> {
        let processor = self.registry().get(processor_type)?;
        processor.validate_config(&processor_config)?;
        TransactionFilter::from_config(&processor_config)?;
        for group in &condition_groups {
            for condition in &group.conditions {
                matching::compile_condition(condition)?;
            }
        }

        let rule = Rule::new(
            description.trim().to_string(),
            priority,
            enabled,
            account_filter,
            processor_type.to_string(),
            processor_config,
            condition_groups,
        );
        rules::ActiveModel::try_from(&rule)?
            .insert(&self.database)
            .await?;

        info!(rule_id = %rule.id, processor_type, priority, "created rule");
        Ok(rule.id)
    }

    /// Looks a rule up by id.
    pub async fn rule(&self, id: Uuid) -> ResultEngine<Rule> {
        let model = rules::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("rule {id}")))?;
        Rule::try_from(model)
    }

    /// Lists every rule in application order: priority descending, then
    /// creation time.
    pub async fn rules(&self) -> ResultEngine<Vec<Rule>> {
        let models = rules::Entity::find()
            .order_by_desc(rules::Column::Priority)
            .order_by_asc(rules::Column::CreatedAt)
            .all(&self.database)
            .await?;
        models.into_iter().map(Rule::try_from).collect()
    }

    /// Lists the rules a batch run applies, in order.
    pub(crate) async fn enabled_rules(&self) -> ResultEngine<Vec<Rule>> {
        let models = rules::Entity::find()
            .filter(rules::Column::Enabled.eq(true))
            .order_by_desc(rules::Column::Priority)
            .order_by_asc(rules::Column::CreatedAt)
            .all(&self.database)
            .await?;
        models.into_iter().map(Rule::try_from).collect()
    }

    /// Enables or disables a rule.
    pub async fn set_rule_enabled(&self, id: Uuid, enabled: bool) -> ResultEngine<()> {
        // Existence check first, update() alone reports nothing on a miss.
        self.rule(id).await?;

        let model = rules::ActiveModel {
            id: ActiveValue::Set(id.to_string()),
            enabled: ActiveValue::Set(enabled),
            updated_at: ActiveValue::Set(chrono::Utc::now()),
            ..Default::default()
        };
        model.update(&self.database).await?;
        info!(rule_id = %id, enabled, "toggled rule");
        Ok(())
    }

    /// Deletes a rule.
    pub async fn delete_rule(&self, id: Uuid) -> ResultEngine<()> {
        let result = rules::Entity::delete_by_id(id.to_string())
            .exec(&self.database)
            .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::NotFound(format!("rule {id}")));
        }
        info!(rule_id = %id, "deleted rule");
        Ok(())
    }
}
