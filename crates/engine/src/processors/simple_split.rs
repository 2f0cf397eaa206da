//! Percentage splits.
//!
//! Splits a master across accounts by percentage. Every split but the
//! last is rounded to cents; the last absorbs the remainder, so the
//! drafts always sum to the master's exact amount.

use serde::Deserialize;
use uuid::Uuid;

use crate::{
    EngineError, MoneyCents, ProcessingError, ResultEngine, SlaveDraft, TransactionWithSlaves,
    processors::{Processor, ensure_unprocessed, validate_balance},
};

#[derive(Clone, Debug, Deserialize)]
pub struct SplitItem {
    pub account_id: Uuid,
    pub percentage: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimpleSplitConfig {
    pub splits: Vec<SplitItem>,
}

impl SimpleSplitConfig {
    fn parse(config: &serde_json::Value) -> Result<Self, String> {
        let parsed: Self = serde_json::from_value(config.clone()).map_err(|e| e.to_string())?;

        if parsed.splits.is_empty() {
            return Err("splits must not be empty".to_string());
        }
        for (index, split) in parsed.splits.iter().enumerate() {
            if !(split.percentage > 0.0 && split.percentage <= 100.0) {
                return Err(format!(
                    "split #{index} percentage must be in (0, 100], got {}",
                    split.percentage
                ));
            }
        }
        let total: f64 = parsed.splits.iter().map(|s| s.percentage).sum();
        if total != 100.0 {
            return Err(format!("split percentages must sum to 100, got {total}"));
        }

        Ok(parsed)
    }
}

pub struct SimpleSplitProcessor;

impl Processor for SimpleSplitProcessor {
    fn processor_type(&self) -> &'static str {
        "simple_split"
    }

    fn validate_config(&self, config: &serde_json::Value) -> ResultEngine<()> {
        SimpleSplitConfig::parse(config)
            .map(|_| ())
            .map_err(EngineError::InvalidConfig)
    }

    fn process(
        &self,
        transaction: &TransactionWithSlaves,
        config: &serde_json::Value,
    ) -> Result<Vec<SlaveDraft>, ProcessingError> {
        ensure_unprocessed(transaction)?;
        let config = SimpleSplitConfig::parse(config).map_err(ProcessingError::InvalidConfig)?;

        let master = &transaction.master;
        let slave_kind = master.kind.opposite();

        let mut drafts = Vec::with_capacity(config.splits.len());
        let mut allocated = MoneyCents::ZERO;
        let last = config.splits.len() - 1;
        for (index, split) in config.splits.iter().enumerate() {
            // The last split takes whatever rounding left over.
            let amount = if index == last {
                master.amount - allocated
            } else {
                master.amount.percent_of(split.percentage)
            };
            allocated += amount;
            drafts.push(SlaveDraft {
                account_id: split.account_id,
                kind: slave_kind,
                amount,
                occurred_at: master.occurred_at,
            });
        }

        validate_balance(master, &drafts)?;
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::{EntryKind, processors::tests::uncategorized_view};

    fn split_config(percentages: &[f64]) -> (serde_json::Value, Vec<Uuid>) {
        let ids: Vec<Uuid> = percentages.iter().map(|_| Uuid::new_v4()).collect();
        let splits: Vec<_> = ids
            .iter()
            .zip(percentages)
            .map(|(id, pct)| json!({ "account_id": id, "percentage": pct }))
            .collect();
        (json!({ "splits": splits }), ids)
    }

    #[test]
    fn config_must_sum_to_100() {
        let (config, _) = split_config(&[60.0, 30.0]);
        let err = SimpleSplitProcessor.validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("sum to 100"));

        let (config, _) = split_config(&[60.0, 40.0]);
        assert!(SimpleSplitProcessor.validate_config(&config).is_ok());
    }

    #[test]
    fn config_rejects_out_of_range_percentages() {
        let (config, _) = split_config(&[0.0, 100.0]);
        assert!(SimpleSplitProcessor.validate_config(&config).is_err());

        let (config, _) = split_config(&[110.0, -10.0]);
        assert!(SimpleSplitProcessor.validate_config(&config).is_err());

        assert!(
            SimpleSplitProcessor
                .validate_config(&json!({ "splits": [] }))
                .is_err()
        );
    }

    #[test]
    fn last_split_absorbs_rounding() {
        // 100.01€ at 3x33.33% + 0.01%: the first three round to 33.33€,
        // the last takes the remaining 0.02€.
        let (config, ids) = split_config(&[33.33, 33.33, 33.33, 0.01]);
        let view = uncategorized_view(EntryKind::Debit, 10_001);

        let drafts = SimpleSplitProcessor.process(&view, &config).unwrap();
        assert_eq!(drafts.len(), 4);
        assert_eq!(drafts[0].amount.cents(), 3333);
        assert_eq!(drafts[1].amount.cents(), 3333);
        assert_eq!(drafts[2].amount.cents(), 3333);
        assert_eq!(drafts[3].amount.cents(), 2);
        assert_eq!(drafts[3].account_id, ids[3]);

        let total: i64 = drafts.iter().map(|d| d.amount.cents()).sum();
        assert_eq!(total, view.master.amount.cents());
    }

    #[test]
    fn slaves_run_counter_to_the_master() {
        let (config, _) = split_config(&[50.0, 50.0]);

        let debit = uncategorized_view(EntryKind::Debit, 5000);
        for draft in SimpleSplitProcessor.process(&debit, &config).unwrap() {
            assert_eq!(draft.kind, EntryKind::Credit);
        }

        let credit = uncategorized_view(EntryKind::Credit, 5000);
        for draft in SimpleSplitProcessor.process(&credit, &config).unwrap() {
            assert_eq!(draft.kind, EntryKind::Debit);
        }
    }

    #[test]
    fn already_categorized_transactions_are_refused() {
        let (config, _) = split_config(&[100.0]);
        let mut view = uncategorized_view(EntryKind::Debit, 5000);
        let extra = view.slaves[0].clone();
        view.slaves.push(extra);

        assert!(SimpleSplitProcessor.process(&view, &config).is_err());
    }
}
