//! Transaction processors.
//!
//! A [`Processor`] decomposes a single uncategorized master into a
//! balanced set of slave drafts, driven by an opaque JSON config stored on
//! the rule that selected it. Processors are pure: they never touch the
//! store, they only propose drafts for the engine to persist.
//!
//! Implementations register in a [`ProcessorRegistry`] built once at
//! engine construction; rules refer to them by their `processor_type`
//! string.

mod loan;
mod simple_split;

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    EngineError, EntryKind, MoneyCents, ProcessingError, ResultEngine, SlaveDraft, Transaction,
    TransactionWithSlaves,
};

pub use loan::{Installment, LoanConfig, LoanProcessor};
pub use simple_split::{SimpleSplitConfig, SimpleSplitProcessor, SplitItem};

/// Restricts which entry kinds a rule considers. Carried inside the
/// processor config as the optional `transaction_filter` key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransactionFilter {
    Debit,
    Credit,
    #[default]
    All,
}

impl TransactionFilter {
    /// Reads the `transaction_filter` key out of a processor config,
    /// defaulting to [`TransactionFilter::All`] when absent.
    pub fn from_config(config: &serde_json::Value) -> ResultEngine<Self> {
        match config.get("transaction_filter") {
            None | Some(serde_json::Value::Null) => Ok(Self::All),
            Some(serde_json::Value::String(s)) => match s.as_str() {
                "debit" => Ok(Self::Debit),
                "credit" => Ok(Self::Credit),
                "all" => Ok(Self::All),
                other => Err(EngineError::InvalidConfig(format!(
                    "invalid transaction_filter: {other:?}"
                ))),
            },
            Some(other) => Err(EngineError::InvalidConfig(format!(
                "transaction_filter must be a string, got {other}"
            ))),
        }
    }

    /// Whether a master of this kind passes the filter.
    #[must_use]
    pub fn accepts(self, kind: EntryKind) -> bool {
        match self {
            Self::All => true,
            Self::Debit => kind == EntryKind::Debit,
            Self::Credit => kind == EntryKind::Credit,
        }
    }
}

/// A strategy for decomposing one master into slave drafts.
pub trait Processor: Send + Sync {
    /// Stable identifier rules use to select this processor.
    fn processor_type(&self) -> &'static str;

    /// Checks a config at rule save time, before it is persisted.
    fn validate_config(&self, config: &serde_json::Value) -> ResultEngine<()>;

    /// Decomposes the transaction. The view must be uncategorized (one
    /// slave, pointing at Unknown); the returned drafts balance the
    /// master.
    fn process(
        &self,
        transaction: &TransactionWithSlaves,
        config: &serde_json::Value,
    ) -> Result<Vec<SlaveDraft>, ProcessingError>;
}

/// Processors known to an engine, keyed by type string.
pub struct ProcessorRegistry {
    processors: BTreeMap<&'static str, Box<dyn Processor>>,
}

impl ProcessorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            processors: BTreeMap::new(),
        }
    }

    /// A registry with the built-in processors.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for processor in [
            Box::new(SimpleSplitProcessor) as Box<dyn Processor>,
            Box::new(LoanProcessor),
        ] {
            let key = processor.processor_type();
            registry.processors.insert(key, processor);
            debug!(processor_type = key, "registered processor");
        }
        registry
    }

    /// Adds a processor. Duplicate type strings are a conflict.
    pub fn register(&mut self, processor: Box<dyn Processor>) -> ResultEngine<()> {
        let key = processor.processor_type();
        if self.processors.contains_key(key) {
            return Err(EngineError::Conflict(format!("processor {key:?}")));
        }
        debug!(processor_type = key, "registered processor");
        self.processors.insert(key, processor);
        Ok(())
    }

    /// Looks a processor up by type string. Unknown types name the known
    /// ones in the error.
    pub fn get(&self, processor_type: &str) -> ResultEngine<&dyn Processor> {
        self.processors
            .get(processor_type)
            .map(Box::as_ref)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "processor {processor_type:?} (known: {})",
                    self.list().join(", ")
                ))
            })
    }

    /// Registered type strings, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<&'static str> {
        self.processors.keys().copied().collect()
    }
}

/// Rejects transactions that were already decomposed: the view must carry
/// exactly one slave, and that slave must point at the Unknown sentinel.
pub fn ensure_unprocessed(transaction: &TransactionWithSlaves) -> Result<(), ProcessingError> {
    let id = transaction.master.id;
    match transaction.slaves.as_slice() {
        [(_, account)] if account.is_unknown() => Ok(()),
        [(_, account)] => Err(ProcessingError::SlaveNotUnknown {
            id,
            account: account.name.clone(),
        }),
        slaves => Err(ProcessingError::UnexpectedSlaveCount {
            id,
            count: slaves.len(),
        }),
    }
}

/// Checks the balance invariant: the master's signed amount must be the
/// exact negation of the drafts' signed sum, in integer cents.
pub fn validate_balance(
    master: &Transaction,
    drafts: &[SlaveDraft],
) -> Result<(), ProcessingError> {
    let credits: MoneyCents = drafts
        .iter()
        .filter(|d| d.kind == EntryKind::Credit)
        .map(|d| d.amount)
        .fold(MoneyCents::ZERO, |acc, a| acc + a);
    let debits: MoneyCents = drafts
        .iter()
        .filter(|d| d.kind == EntryKind::Debit)
        .map(|d| d.amount)
        .fold(MoneyCents::ZERO, |acc, a| acc + a);

    if master.signed_amount() == -(credits - debits) {
        Ok(())
    } else {
        Err(ProcessingError::BalanceMismatch {
            id: master.id,
            kind: master.kind,
            amount: master.amount,
            credits,
            debits,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::{Account, Slave};

    pub(crate) fn uncategorized_view(kind: EntryKind, cents: i64) -> TransactionWithSlaves {
        let unknown = Account::unknown_sentinel();
        let master = Transaction::new(
            "test".to_string(),
            kind,
            MoneyCents::new(cents),
            Utc::now(),
            Uuid::new_v4(),
        )
        .unwrap();
        let slave = Slave {
            id: Uuid::new_v4(),
            master_id: master.id,
            account_id: unknown.id,
            kind: kind.opposite(),
            amount: master.amount,
            occurred_at: master.occurred_at,
        };
        TransactionWithSlaves {
            master,
            slaves: vec![(slave, unknown)],
        }
    }

    #[test]
    fn registry_rejects_duplicate_types() {
        let mut registry = ProcessorRegistry::with_defaults();
        let err = registry.register(Box::new(SimpleSplitProcessor)).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[test]
    fn unknown_processor_error_names_known_types() {
        let registry = ProcessorRegistry::with_defaults();
        let err = registry.get("salary").err().unwrap();
        let message = err.to_string();
        assert!(message.contains("loan"));
        assert!(message.contains("simple_split"));
    }

    #[test]
    fn unprocessed_check_requires_single_unknown_slave() {
        let view = uncategorized_view(EntryKind::Debit, 1000);
        assert!(ensure_unprocessed(&view).is_ok());

        let mut categorized = view.clone();
        categorized.slaves[0].1 = Account::new(
            "Groceries".to_string(),
            "Food".to_string(),
            "Daily".to_string(),
            false,
            MoneyCents::ZERO,
        );
        assert!(matches!(
            ensure_unprocessed(&categorized),
            Err(ProcessingError::SlaveNotUnknown { .. })
        ));

        let mut doubled = view.clone();
        let extra = doubled.slaves[0].clone();
        doubled.slaves.push(extra);
        assert!(matches!(
            ensure_unprocessed(&doubled),
            Err(ProcessingError::UnexpectedSlaveCount { count: 2, .. })
        ));
    }

    #[test]
    fn balance_holds_for_exact_negation() {
        let view = uncategorized_view(EntryKind::Debit, 1000);
        let draft = SlaveDraft {
            account_id: Uuid::new_v4(),
            kind: EntryKind::Credit,
            amount: MoneyCents::new(1000),
            occurred_at: view.master.occurred_at,
        };
        assert!(validate_balance(&view.master, &[draft.clone()]).is_ok());

        let short = SlaveDraft {
            amount: MoneyCents::new(999),
            ..draft
        };
        assert!(matches!(
            validate_balance(&view.master, &[short]),
            Err(ProcessingError::BalanceMismatch { .. })
        ));
    }
}
