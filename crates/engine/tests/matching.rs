use chrono::Utc;
use sea_orm::Database;
use serde_json::json;
use uuid::Uuid;

use engine::{
    ConditionGroup, Engine, EngineError, EntryKind, LogicalOperator, MatchType, MoneyCents,
    RuleCondition,
};
use migration::MigratorTrait;

async fn engine_with_db() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Engine::builder().database(db).build().await.unwrap()
}

async fn bank_account(engine: &Engine, name: &str) -> Uuid {
    engine
        .new_account(name, "Bank", "Checking", true, MoneyCents::ZERO)
        .await
        .unwrap()
}

async fn category_account(engine: &Engine, name: &str) -> Uuid {
    engine
        .new_account(name, "Expenses", name, false, MoneyCents::ZERO)
        .await
        .unwrap()
}

fn contains(value: &str) -> ConditionGroup {
    ConditionGroup {
        operator: LogicalOperator::And,
        conditions: vec![RuleCondition {
            match_type: MatchType::Contains,
            match_value: value.to_string(),
        }],
    }
}

fn split_config(splits: &[(Uuid, f64)]) -> serde_json::Value {
    let splits: Vec<_> = splits
        .iter()
        .map(|(id, pct)| json!({ "account_id": id, "percentage": pct }))
        .collect();
    json!({ "splits": splits })
}

#[tokio::test]
async fn import_attaches_an_unknown_slave() {
    let engine = engine_with_db().await;
    let bank = bank_account(&engine, "Main").await;

    let id = engine
        .import_transaction(
            "CARREFOUR PARIS",
            EntryKind::Debit,
            MoneyCents::new(4999),
            Utc::now(),
            bank,
        )
        .await
        .unwrap();

    let view = engine.transaction(id).await.unwrap();
    assert_eq!(view.slaves.len(), 1);
    let (slave, account) = &view.slaves[0];
    assert!(account.is_unknown());
    assert_eq!(slave.kind, EntryKind::Credit);
    assert_eq!(slave.amount, view.master.amount);
    assert!(view.is_uncategorized());

    assert_eq!(engine.count_uncategorized().await.unwrap(), 1);
}

#[tokio::test]
async fn import_requires_a_real_account() {
    let engine = engine_with_db().await;
    let groceries = category_account(&engine, "Groceries").await;

    let err = engine
        .import_transaction(
            "CARREFOUR PARIS",
            EntryKind::Debit,
            MoneyCents::new(4999),
            Utc::now(),
            groceries,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));
}

#[tokio::test]
async fn batch_run_applies_a_split_rule() {
    let engine = engine_with_db().await;
    let bank = bank_account(&engine, "Main").await;
    let groceries = category_account(&engine, "Groceries").await;
    let household = category_account(&engine, "Household").await;

    engine
        .new_rule(
            "carrefour split",
            10,
            true,
            None,
            "simple_split",
            split_config(&[(groceries, 70.0), (household, 30.0)]),
            vec![contains("carrefour")],
        )
        .await
        .unwrap();

    let id = engine
        .import_transaction(
            "CARREFOUR PARIS",
            EntryKind::Debit,
            MoneyCents::new(4999),
            Utc::now(),
            bank,
        )
        .await
        .unwrap();

    let report = engine.apply_rules().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.categorized, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.details.len(), 1);
    assert_eq!(report.details[0].transaction_id, id);

    let view = engine.transaction(id).await.unwrap();
    assert_eq!(view.slaves.len(), 2);
    let total: i64 = view.slaves.iter().map(|(s, _)| s.amount.cents()).sum();
    assert_eq!(total, 4999);
    assert!(view.slaves.iter().all(|(s, _)| s.kind == EntryKind::Credit));
    assert!(!view.is_uncategorized());

    assert_eq!(engine.count_uncategorized().await.unwrap(), 0);
}

#[tokio::test]
async fn and_groups_require_every_condition() {
    let engine = engine_with_db().await;
    let bank = bank_account(&engine, "Main").await;
    let food = category_account(&engine, "Food").await;

    let and_rule = engine
        .new_rule(
            "small uber orders",
            10,
            false,
            None,
            "simple_split",
            split_config(&[(food, 100.0)]),
            vec![ConditionGroup {
                operator: LogicalOperator::And,
                conditions: vec![
                    RuleCondition {
                        match_type: MatchType::Contains,
                        match_value: "uber".to_string(),
                    },
                    RuleCondition {
                        match_type: MatchType::AmountLt,
                        match_value: "30.00".to_string(),
                    },
                ],
            }],
        )
        .await
        .unwrap();
    let or_rule = engine
        .new_rule(
            "uber or small",
            5,
            false,
            None,
            "simple_split",
            split_config(&[(food, 100.0)]),
            vec![ConditionGroup {
                operator: LogicalOperator::Or,
                conditions: vec![
                    RuleCondition {
                        match_type: MatchType::Contains,
                        match_value: "uber".to_string(),
                    },
                    RuleCondition {
                        match_type: MatchType::AmountLt,
                        match_value: "30.00".to_string(),
                    },
                ],
            }],
        )
        .await
        .unwrap();

    for (description, cents) in [("UBER EATS", 2000), ("UBER AIRPORT", 5000), ("BAKERY", 500)] {
        engine
            .import_transaction(
                description,
                EntryKind::Debit,
                MoneyCents::new(cents),
                Utc::now(),
                bank,
            )
            .await
            .unwrap();
    }

    // AND: only the cheap uber order. OR: everything uber or cheap.
    assert_eq!(engine.preview_rule(and_rule).await.unwrap().len(), 1);
    assert_eq!(engine.preview_rule(or_rule).await.unwrap().len(), 3);
}

#[tokio::test]
async fn higher_priority_rule_wins_a_transaction() {
    let engine = engine_with_db().await;
    let bank = bank_account(&engine, "Main").await;
    let first_choice = category_account(&engine, "FirstChoice").await;
    let second_choice = category_account(&engine, "SecondChoice").await;

    engine
        .new_rule(
            "high priority",
            100,
            true,
            None,
            "simple_split",
            split_config(&[(first_choice, 100.0)]),
            vec![contains("netflix")],
        )
        .await
        .unwrap();
    engine
        .new_rule(
            "low priority",
            1,
            true,
            None,
            "simple_split",
            split_config(&[(second_choice, 100.0)]),
            vec![contains("netflix")],
        )
        .await
        .unwrap();

    let id = engine
        .import_transaction(
            "NETFLIX.COM",
            EntryKind::Debit,
            MoneyCents::new(1299),
            Utc::now(),
            bank,
        )
        .await
        .unwrap();

    let report = engine.apply_rules().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.categorized, 1);

    let view = engine.transaction(id).await.unwrap();
    assert_eq!(view.slaves.len(), 1);
    assert_eq!(view.slaves[0].0.account_id, first_choice);
}

#[tokio::test]
async fn processing_failures_are_counted_not_fatal() {
    let engine = engine_with_db().await;
    let bank = bank_account(&engine, "Main").await;
    let capital = category_account(&engine, "LoanCapital").await;
    let interest = category_account(&engine, "LoanInterest").await;

    // The loan processor refuses credit masters; the rule matches one.
    engine
        .new_rule(
            "mortgage",
            10,
            true,
            None,
            "loan",
            json!({
                "loan_amount": 200_000.0,
                "annual_rate": 3.0,
                "duration_months": 240,
                "start_date": "2024-01-01",
                "capital_account_id": capital,
                "interest_account_id": interest,
            }),
            vec![contains("loan")],
        )
        .await
        .unwrap();

    let id = engine
        .import_transaction(
            "LOAN REFUND",
            EntryKind::Credit,
            MoneyCents::new(110_920),
            Utc::now(),
            bank,
        )
        .await
        .unwrap();

    let report = engine.apply_rules().await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.categorized, 0);
    assert_eq!(report.failed, 1);

    // The transaction keeps its Unknown slave.
    assert!(engine.transaction(id).await.unwrap().is_uncategorized());
}

#[tokio::test]
async fn rule_save_validates_config_and_conditions() {
    let engine = engine_with_db().await;
    let food = category_account(&engine, "Food").await;

    // Percentages must sum to 100.
    let err = engine
        .new_rule(
            "bad split",
            10,
            true,
            None,
            "simple_split",
            split_config(&[(food, 90.0)]),
            vec![contains("x")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig(_)));

    // Unknown processor types name the known ones.
    let err = engine
        .new_rule(
            "bad processor",
            10,
            true,
            None,
            "salary",
            split_config(&[(food, 100.0)]),
            vec![contains("x")],
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("simple_split"));

    // Conditions must compile.
    let err = engine
        .new_rule(
            "bad regex",
            10,
            true,
            None,
            "simple_split",
            split_config(&[(food, 100.0)]),
            vec![ConditionGroup {
                operator: LogicalOperator::And,
                conditions: vec![RuleCondition {
                    match_type: MatchType::Regex,
                    match_value: "[unclosed".to_string(),
                }],
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig(_)));
}

#[tokio::test]
async fn preview_matches_without_mutating() {
    let engine = engine_with_db().await;
    let bank = bank_account(&engine, "Main").await;
    let food = category_account(&engine, "Food").await;

    let rule = engine
        .new_rule(
            "bakery",
            10,
            true,
            None,
            "simple_split",
            split_config(&[(food, 100.0)]),
            vec![contains("bakery")],
        )
        .await
        .unwrap();

    let id = engine
        .import_transaction(
            "BAKERY DOWNTOWN",
            EntryKind::Debit,
            MoneyCents::new(500),
            Utc::now(),
            bank,
        )
        .await
        .unwrap();

    let preview = engine.preview_rule(rule).await.unwrap();
    assert_eq!(preview.len(), 1);
    assert_eq!(preview[0].id, id);

    // Nothing changed.
    assert!(engine.transaction(id).await.unwrap().is_uncategorized());
    assert_eq!(engine.count_uncategorized().await.unwrap(), 1);
}

#[tokio::test]
async fn account_filter_restricts_matches() {
    let engine = engine_with_db().await;
    let main = bank_account(&engine, "Main").await;
    let savings = bank_account(&engine, "Savings").await;
    let food = category_account(&engine, "Food").await;

    let rule = engine
        .new_rule(
            "main only",
            10,
            true,
            Some(vec![main]),
            "simple_split",
            split_config(&[(food, 100.0)]),
            vec![contains("market")],
        )
        .await
        .unwrap();

    let on_main = engine
        .import_transaction(
            "MARKET SQUARE",
            EntryKind::Debit,
            MoneyCents::new(1500),
            Utc::now(),
            main,
        )
        .await
        .unwrap();
    engine
        .import_transaction(
            "MARKET SQUARE",
            EntryKind::Debit,
            MoneyCents::new(1500),
            Utc::now(),
            savings,
        )
        .await
        .unwrap();

    let preview = engine.preview_rule(rule).await.unwrap();
    assert_eq!(preview.len(), 1);
    assert_eq!(preview[0].id, on_main);
}

#[tokio::test]
async fn regex_conditions_match_case_insensitively() {
    let engine = engine_with_db().await;
    let bank = bank_account(&engine, "Main").await;
    let subscriptions = category_account(&engine, "Subscriptions").await;

    let rule = engine
        .new_rule(
            "spotify anchored",
            10,
            true,
            None,
            "simple_split",
            split_config(&[(subscriptions, 100.0)]),
            vec![ConditionGroup {
                operator: LogicalOperator::And,
                conditions: vec![RuleCondition {
                    match_type: MatchType::Regex,
                    match_value: "^SPOTIFY".to_string(),
                }],
            }],
        )
        .await
        .unwrap();

    let anchored = engine
        .import_transaction(
            "spotify ab stockholm",
            EntryKind::Debit,
            MoneyCents::new(999),
            Utc::now(),
            bank,
        )
        .await
        .unwrap();
    engine
        .import_transaction(
            "gift for spotify fan",
            EntryKind::Debit,
            MoneyCents::new(999),
            Utc::now(),
            bank,
        )
        .await
        .unwrap();

    let preview = engine.preview_rule(rule).await.unwrap();
    assert_eq!(preview.len(), 1);
    assert_eq!(preview[0].id, anchored);
}

#[tokio::test]
async fn disabled_rules_are_skipped() {
    let engine = engine_with_db().await;
    let bank = bank_account(&engine, "Main").await;
    let food = category_account(&engine, "Food").await;

    let rule = engine
        .new_rule(
            "bakery",
            10,
            true,
            None,
            "simple_split",
            split_config(&[(food, 100.0)]),
            vec![contains("bakery")],
        )
        .await
        .unwrap();
    engine.set_rule_enabled(rule, false).await.unwrap();

    engine
        .import_transaction(
            "BAKERY DOWNTOWN",
            EntryKind::Debit,
            MoneyCents::new(500),
            Utc::now(),
            bank,
        )
        .await
        .unwrap();

    let report = engine.apply_rules().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(engine.count_uncategorized().await.unwrap(), 1);
}
