use chrono::NaiveDate;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::{EntryKind, MoneyCents};

/// Error type for every fallible engine operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A processor configuration failed validation.
    #[error("invalid processor config: {0}")]
    InvalidConfig(String),

    /// The entity was not found in the store.
    #[error("{0} not found")]
    NotFound(String),

    /// The entity already exists.
    #[error("{0} already exists")]
    Conflict(String),

    /// The operation is well-formed but not allowed on this data.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Decomposition of a single transaction failed.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// Underlying database failure.
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidConfig(a), Self::InvalidConfig(b))
            | (Self::NotFound(a), Self::NotFound(b))
            | (Self::Conflict(a), Self::Conflict(b))
            | (Self::InvalidRequest(a), Self::InvalidRequest(b)) => a == b,
            (Self::Processing(a), Self::Processing(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Why a processor refused to decompose a transaction.
///
/// These are per-transaction failures: during a batch run they are counted
/// and logged without aborting the run, and the transaction keeps its
/// Unknown slave.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// The transaction does not have exactly one slave.
    #[error("transaction {id} has {count} slaves, expected exactly 1")]
    UnexpectedSlaveCount { id: Uuid, count: usize },

    /// The single slave does not point at the Unknown account.
    #[error("transaction {id} slave points at {account:?}, not the Unknown account")]
    SlaveNotUnknown { id: Uuid, account: String },

    /// Proposed slaves do not balance the master.
    #[error(
        "transaction {id} does not balance: master {kind} {amount}, \
         slave credits {credits} - debits {debits}"
    )]
    BalanceMismatch {
        id: Uuid,
        kind: EntryKind,
        amount: MoneyCents,
        credits: MoneyCents,
        debits: MoneyCents,
    },

    /// The processor requires a debit master.
    #[error("transaction {id} is a {kind}, expected a debit")]
    NotDebit { id: Uuid, kind: EntryKind },

    /// The transaction predates the loan.
    #[error("transaction date {date} is before the loan start {start}")]
    BeforeLoanStart { date: NaiveDate, start: NaiveDate },

    /// The derived payment number falls outside the loan term.
    #[error("payment #{number} is past the {duration_months}-month loan term")]
    PaymentPastTerm { number: u32, duration_months: u32 },

    /// The theoretical interest plus insurance exceeds the paid amount,
    /// which would force a negative capital leg.
    #[error("theoretical interest {interest} exceeds the paid amount {paid}")]
    InterestExceedsPayment {
        interest: MoneyCents,
        paid: MoneyCents,
    },

    /// The rule carried a config this processor cannot parse.
    #[error("invalid processor config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_compare_by_message() {
        let a = EngineError::Database(DbErr::Custom("boom".into()));
        let b = EngineError::Database(DbErr::Custom("boom".into()));
        let c = EngineError::Database(DbErr::Custom("other".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn processing_error_displays_context() {
        let err = ProcessingError::PaymentPastTerm {
            number: 121,
            duration_months: 120,
        };
        assert_eq!(
            err.to_string(),
            "payment #121 is past the 120-month loan term"
        );
    }
}
