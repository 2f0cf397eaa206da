//! Master transactions.
//!
//! A [`Transaction`] is an imported bank movement: a description, an entry
//! kind (credit or debit), a non-negative amount in cents, a timestamp and
//! the real account it happened on. Masters are immutable after import;
//! categorization only ever rewrites their slave entries.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Account, EngineError, MoneyCents, ResultEngine, Slave};

/// Direction of a money movement. Credits bring money in, debits take
/// money out; the amount itself stays a non-negative magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Credit,
    Debit,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    /// The opposite direction. Slaves produced by a processor run counter
    /// to their master so the pair nets to zero.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Credit => Self::Debit,
            Self::Debit => Self::Credit,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for EntryKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            other => Err(EngineError::InvalidRequest(format!(
                "invalid entry kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub description: String,
    pub kind: EntryKind,
    /// Non-negative magnitude; direction lives in `kind`.
    pub amount: MoneyCents,
    pub occurred_at: DateTime<Utc>,
    /// The real account this movement was imported from.
    pub account_id: Uuid,
}

impl Transaction {
    pub fn new(
        description: String,
        kind: EntryKind,
        amount: MoneyCents,
        occurred_at: DateTime<Utc>,
        account_id: Uuid,
    ) -> ResultEngine<Self> {
        if amount.is_negative() {
            return Err(EngineError::InvalidRequest(format!(
                "transaction amount must be non-negative, got {amount}"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            description,
            kind,
            amount,
            occurred_at,
            account_id,
        })
    }

    /// Signed view of the amount: credits positive, debits negative.
    #[must_use]
    pub fn signed_amount(&self) -> MoneyCents {
        match self.kind {
            EntryKind::Credit => self.amount,
            EntryKind::Debit => -self.amount,
        }
    }
}

/// A master together with its slave entries and the accounts they point at.
///
/// This is the unit processors and the transfer engine operate on.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionWithSlaves {
    pub master: Transaction,
    pub slaves: Vec<(Slave, Account)>,
}

impl TransactionWithSlaves {
    /// Whether the master is still uncategorized: exactly one slave,
    /// pointing at the Unknown sentinel.
    #[must_use]
    pub fn is_uncategorized(&self) -> bool {
        matches!(self.slaves.as_slice(), [(_, account)] if account.is_unknown())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub description: String,
    pub kind: String,
    pub amount_minor: i64,
    pub occurred_at: DateTimeUtc,
    pub account_id: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::slaves::Entity")]
    Slaves,
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Accounts,
}

impl Related<super::slaves::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Slaves.def()
    }
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        let now = Utc::now();
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            description: ActiveValue::Set(tx.description.clone()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(tx.amount.cents()),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            account_id: ActiveValue::Set(tx.account_id.to_string()),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::InvalidRequest("invalid transaction id".to_string()))?,
            description: model.description,
            kind: EntryKind::try_from(model.kind.as_str())?,
            amount: MoneyCents::new(model.amount_minor),
            occurred_at: model.occurred_at,
            account_id: Uuid::parse_str(&model.account_id)
                .map_err(|_| EngineError::InvalidRequest("invalid account id".to_string()))?,
        })
    }
}
