//! Ledger decomposition engine.
//!
//! Imported bank movements (master transactions) are decomposed into
//! balanced sets of signed slave entries. Categorization rules match
//! uncategorized masters and hand them to a processor; the transfer
//! engine pairs movements between real accounts and lets a reviewer
//! merge or re-split them. All state lives in the backing database; the
//! [`Engine`] is a thin handle over the connection plus the processor
//! registry.

pub use accounts::{Account, UNKNOWN};
pub use error::{EngineError, ProcessingError};
pub use money::MoneyCents;
pub use ops::{Engine, EngineBuilder, MatchDetail, MatchReport, SplitOutcome, TransferCandidate};
pub use processors::{
    Installment, LoanConfig, LoanProcessor, Processor, ProcessorRegistry, SimpleSplitConfig,
    SimpleSplitProcessor, SplitItem, TransactionFilter, ensure_unprocessed, validate_balance,
};
pub use rejected_pairs::RejectedPair;
pub use rules::{ConditionGroup, LogicalOperator, MatchType, Rule, RuleCondition};
pub use slaves::{Slave, SlaveDraft};
pub use transactions::{EntryKind, Transaction, TransactionWithSlaves};

mod accounts;
mod error;
mod money;
mod ops;
mod processors;
mod rejected_pairs;
mod rules;
mod slaves;
mod transactions;

pub type ResultEngine<T> = Result<T, EngineError>;
