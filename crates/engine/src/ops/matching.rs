//! Rule matching and batch categorization.
//!
//! Text and amount conditions compile to SQL filters on the store query;
//! regex conditions compile to [`Regex`] and run in the engine over the
//! paged results, since the backend has no portable regex operator. An
//! AND group is one query chaining every SQL filter; an OR group unions
//! per-condition queries. Groups always combine with OR at the rule
//! level.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use sea_orm::{
    JoinType, QueryFilter, QueryOrder, QuerySelect, Select, TransactionTrait,
    prelude::*,
    sea_query::{Expr, Func, SimpleExpr},
};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    ConditionGroup, EngineError, LogicalOperator, MatchType, MoneyCents, ResultEngine, Rule,
    RuleCondition, Slave, Transaction, TransactionFilter, TransactionWithSlaves, accounts, slaves,
    transactions,
};

use super::{Engine, with_tx};

/// One successful categorization in a batch run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchDetail {
    pub transaction_id: Uuid,
    pub description: String,
    pub rule_id: Uuid,
    pub rule_description: String,
}

/// Outcome of a batch run over all enabled rules.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Matched transactions handed to a processor.
    pub processed: usize,
    /// Decompositions that committed.
    pub categorized: usize,
    /// Decompositions that were refused or errored.
    pub failed: usize,
    pub details: Vec<MatchDetail>,
}

/// A condition ready to evaluate: either pushed down to the store or run
/// in the engine.
pub(crate) enum CompiledCondition {
    Sql(SimpleExpr),
    Regex(Regex),
}

fn lowered_description() -> Expr {
    Expr::expr(Func::lower(Expr::col((
        transactions::Entity,
        transactions::Column::Description,
    ))))
}

fn amount_cents(condition: &RuleCondition) -> ResultEngine<i64> {
    let amount: MoneyCents = condition.match_value.parse().map_err(|_| {
        EngineError::InvalidConfig(format!(
            "amount condition value is not a valid amount: {:?}",
            condition.match_value
        ))
    })?;
    Ok(amount.cents())
}

/// Compiles one condition. Text matching is case-insensitive on both
/// paths; amount conditions compare the master's magnitude in cents.
pub(crate) fn compile_condition(condition: &RuleCondition) -> ResultEngine<CompiledCondition> {
    let value = condition.match_value.to_lowercase();
    let amount_col = Expr::col((transactions::Entity, transactions::Column::AmountMinor));

    let compiled = match condition.match_type {
        MatchType::Contains => {
            CompiledCondition::Sql(lowered_description().like(format!("%{value}%")))
        }
        MatchType::StartsWith => {
            CompiledCondition::Sql(lowered_description().like(format!("{value}%")))
        }
        MatchType::Exact => CompiledCondition::Sql(lowered_description().eq(value)),
        MatchType::Regex => {
            let regex = RegexBuilder::new(&condition.match_value)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    EngineError::InvalidConfig(format!("invalid regex condition: {e}"))
                })?;
            CompiledCondition::Regex(regex)
        }
        MatchType::AmountGt => CompiledCondition::Sql(amount_col.gt(amount_cents(condition)?)),
        MatchType::AmountGte => CompiledCondition::Sql(amount_col.gte(amount_cents(condition)?)),
        MatchType::AmountLt => CompiledCondition::Sql(amount_col.lt(amount_cents(condition)?)),
        MatchType::AmountLte => CompiledCondition::Sql(amount_col.lte(amount_cents(condition)?)),
        MatchType::AmountEq => CompiledCondition::Sql(amount_col.eq(amount_cents(condition)?)),
    };
    Ok(compiled)
}

/// Masters that still carry a slave pointing at the Unknown sentinel,
/// restricted by the rule's account filter and entry-kind filter.
fn base_query(rule: &Rule, filter: TransactionFilter) -> Select<transactions::Entity> {
    let mut query = transactions::Entity::find()
        .join(JoinType::InnerJoin, transactions::Relation::Slaves.def())
        .join(JoinType::InnerJoin, slaves::Relation::Accounts.def())
        .filter(accounts::Column::Name.eq(accounts::UNKNOWN))
        .filter(accounts::Column::Category.eq(accounts::UNKNOWN))
        .filter(accounts::Column::SubCategory.eq(accounts::UNKNOWN))
        .filter(accounts::Column::IsReal.eq(false))
        .distinct()
        .order_by_asc(transactions::Column::Id);

    if let Some(ids) = &rule.account_filter {
        query = query.filter(
            transactions::Column::AccountId.is_in(ids.iter().map(ToString::to_string)),
        );
    }
    match filter {
        TransactionFilter::All => {}
        TransactionFilter::Debit | TransactionFilter::Credit => {
            query = query.filter(transactions::Column::Kind.eq(match filter {
                TransactionFilter::Debit => "debit",
                _ => "credit",
            }));
        }
    }
    query
}

impl Engine {
    /// Finds the uncategorized masters a rule matches, in store order,
    /// deduplicated across groups.
    pub(crate) async fn find_matching_models(
        &self,
        rule: &Rule,
    ) -> ResultEngine<Vec<transactions::Model>> {
        let filter = TransactionFilter::from_config(&rule.processor_config)?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut matched = Vec::new();
        let mut evaluated_any = false;
        for group in &rule.condition_groups {
            if group.conditions.is_empty() {
                warn!(rule_id = %rule.id, "skipping empty condition group");
                continue;
            }
            evaluated_any = true;

            let models = match group.operator {
                LogicalOperator::And => self.match_group_and(rule, filter, group).await?,
                LogicalOperator::Or => self.match_group_or(rule, filter, group).await?,
            };
            for model in models {
                if seen.insert(model.id.clone()) {
                    matched.push(model);
                }
            }
        }

        if !evaluated_any {
            warn!(rule_id = %rule.id, "rule has no conditions, matches nothing");
            return Ok(Vec::new());
        }

        self.retain_uncategorized(matched).await
    }

    /// One query chaining every SQL condition; regex conditions filter
    /// the results in the engine.
    async fn match_group_and(
        &self,
        rule: &Rule,
        filter: TransactionFilter,
        group: &ConditionGroup,
    ) -> ResultEngine<Vec<transactions::Model>> {
        let mut query = base_query(rule, filter);
        let mut regexes = Vec::new();
        for condition in &group.conditions {
            match compile_condition(condition)? {
                CompiledCondition::Sql(expr) => query = query.filter(expr),
                CompiledCondition::Regex(regex) => regexes.push(regex),
            }
        }

        let mut models = super::fetch_paged(&self.database, query).await?;
        models.retain(|m| regexes.iter().all(|r| r.is_match(&m.description)));
        Ok(models)
    }

    /// Per-condition queries, unioned.
    async fn match_group_or(
        &self,
        rule: &Rule,
        filter: TransactionFilter,
        group: &ConditionGroup,
    ) -> ResultEngine<Vec<transactions::Model>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for condition in &group.conditions {
            let models = match compile_condition(condition)? {
                CompiledCondition::Sql(expr) => {
                    super::fetch_paged(&self.database, base_query(rule, filter).filter(expr))
                        .await?
                }
                CompiledCondition::Regex(regex) => {
                    let mut models =
                        super::fetch_paged(&self.database, base_query(rule, filter)).await?;
                    models.retain(|m| regex.is_match(&m.description));
                    models
                }
            };
            for model in models {
                if seen.insert(model.id.clone()) {
                    out.push(model);
                }
            }
        }
        Ok(out)
    }

    /// Re-checks the single-Unknown-slave shape on the loaded slave sets.
    /// The join can only prove a slave points at Unknown, not that it is
    /// the sole one.
    async fn retain_uncategorized(
        &self,
        models: Vec<transactions::Model>,
    ) -> ResultEngine<Vec<transactions::Model>> {
        let ids = models
            .iter()
            .filter_map(|m| Uuid::parse_str(&m.id).ok())
            .collect::<Vec<_>>();
        let grouped = super::load_slaves_by_master(&self.database, &ids).await?;

        Ok(models
            .into_iter()
            .filter(|model| {
                let Ok(id) = Uuid::parse_str(&model.id) else {
                    return false;
                };
                matches!(
                    grouped.get(&id).map(Vec::as_slice),
                    Some([(_, account)]) if account.is_unknown()
                )
            })
            .collect())
    }

    /// Masters a rule would categorize, without mutating anything.
    pub async fn preview_rule(&self, rule_id: Uuid) -> ResultEngine<Vec<Transaction>> {
        let rule = self.rule(rule_id).await?;
        let models = self.find_matching_models(&rule).await?;
        models.into_iter().map(Transaction::try_from).collect()
    }

    /// How many masters still carry only the Unknown slave.
    pub async fn count_uncategorized(&self) -> ResultEngine<usize> {
        let query = transactions::Entity::find()
            .join(JoinType::InnerJoin, transactions::Relation::Slaves.def())
            .join(JoinType::InnerJoin, slaves::Relation::Accounts.def())
            .filter(accounts::Column::Name.eq(accounts::UNKNOWN))
            .filter(accounts::Column::Category.eq(accounts::UNKNOWN))
            .filter(accounts::Column::SubCategory.eq(accounts::UNKNOWN))
            .filter(accounts::Column::IsReal.eq(false))
            .distinct()
            .order_by_asc(transactions::Column::Id);
        let models = super::fetch_paged(&self.database, query).await?;
        Ok(self.retain_uncategorized(models).await?.len())
    }

    /// Runs every enabled rule over the uncategorized masters, priority
    /// order, first successful categorization wins a transaction for the
    /// whole run.
    pub async fn apply_rules(&self) -> ResultEngine<MatchReport> {
        let rules = self.enabled_rules().await?;

        let mut report = MatchReport::default();
        let mut committed: HashSet<Uuid> = HashSet::new();
        for rule in rules {
            let matched = match self.find_matching_models(&rule).await {
                Ok(models) => models,
                Err(err) => {
                    // A hand-edited store can hold rules that no longer
                    // compile; they contribute nothing to the run.
                    warn!(rule_id = %rule.id, error = %err, "skipping rule");
                    continue;
                }
            };

            for model in matched {
                let Ok(id) = Uuid::parse_str(&model.id) else {
                    report.failed += 1;
                    continue;
                };
                if committed.contains(&id) {
                    debug!(transaction_id = %id, rule_id = %rule.id, "already categorized in this run");
                    continue;
                }

                report.processed += 1;
                match self
                    .apply_processor(id, &rule.processor_type, &rule.processor_config)
                    .await
                {
                    Ok(_) => {
                        report.categorized += 1;
                        committed.insert(id);
                        report.details.push(MatchDetail {
                            transaction_id: id,
                            description: model.description.clone(),
                            rule_id: rule.id,
                            rule_description: rule.description.clone(),
                        });
                    }
                    Err(err) => {
                        report.failed += 1;
                        warn!(
                            transaction_id = %id,
                            rule_id = %rule.id,
                            error = %err,
                            "categorization failed"
                        );
                    }
                }
            }
        }

        info!(
            processed = report.processed,
            categorized = report.categorized,
            failed = report.failed,
            "applied categorization rules"
        );
        Ok(report)
    }

    /// Decomposes one master with the named processor, atomically
    /// replacing its current slave set with the proposed one.
    pub async fn apply_processor(
        &self,
        transaction_id: Uuid,
        processor_type: &str,
        config: &Value,
    ) -> ResultEngine<Vec<Slave>> {
        let view = super::load_view(&self.database, transaction_id).await?;
        self.replace_slaves(&view, processor_type, config).await
    }

    pub(crate) async fn replace_slaves(
        &self,
        view: &TransactionWithSlaves,
        processor_type: &str,
        config: &Value,
    ) -> ResultEngine<Vec<Slave>> {
        let processor = self.registry().get(processor_type)?;
        let drafts = processor.process(view, config)?;
        let replacements: Vec<Slave> = drafts
            .into_iter()
            .map(|draft| draft.attach(view.master.id))
            .collect();

        with_tx!(self, |tx| {
            for (old, _) in &view.slaves {
                slaves::Entity::delete_by_id(old.id.to_string())
                    .exec(&tx)
                    .await?;
            }
            for slave in &replacements {
                slaves::ActiveModel::from(slave).insert(&tx).await?;
            }
            Ok::<_, EngineError>(())
        })?;

        debug!(
            transaction_id = %view.master.id,
            processor_type,
            slaves = replacements.len(),
            "replaced slave set"
        );
        Ok(replacements)
    }
}
