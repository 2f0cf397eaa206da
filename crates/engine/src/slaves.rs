//! Slave entries.
//!
//! A [`Slave`] is one leg of a master's decomposition: a signed direction
//! ([`EntryKind`]), a non-negative amount in cents and the account the
//! money is attributed to. Every master carries at least one slave at all
//! times; replacing the slave set is the only way categorization changes
//! the ledger.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, EntryKind, MoneyCents};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slave {
    pub id: Uuid,
    pub master_id: Uuid,
    pub account_id: Uuid,
    pub kind: EntryKind,
    /// Non-negative magnitude; direction lives in `kind`.
    pub amount: MoneyCents,
    pub occurred_at: DateTime<Utc>,
}

impl Slave {
    /// Signed view of the amount: credits positive, debits negative.
    #[must_use]
    pub fn signed_amount(&self) -> MoneyCents {
        match self.kind {
            EntryKind::Credit => self.amount,
            EntryKind::Debit => -self.amount,
        }
    }
}

/// A slave a processor proposes, before it gets an identity and is
/// persisted. Processors return drafts; the engine turns the accepted set
/// into [`Slave`] rows inside the replacement transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlaveDraft {
    pub account_id: Uuid,
    pub kind: EntryKind,
    pub amount: MoneyCents,
    pub occurred_at: DateTime<Utc>,
}

impl SlaveDraft {
    /// Attaches the draft to a master, assigning a fresh id.
    #[must_use]
    pub fn attach(self, master_id: Uuid) -> Slave {
        Slave {
            id: Uuid::new_v4(),
            master_id,
            account_id: self.account_id,
            kind: self.kind,
            amount: self.amount,
            occurred_at: self.occurred_at,
        }
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

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transaction_slaves")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub master_id: String,
    pub account_id: String,
    pub kind: String,
    pub amount_minor: i64,
    pub occurred_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::transactions::Entity",
        from = "Column::MasterId",
        to = "super::transactions::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Transactions,
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Accounts,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Slave> for ActiveModel {
    fn from(slave: &Slave) -> Self {
        let now = Utc::now();
        Self {
            id: ActiveValue::Set(slave.id.to_string()),
            master_id: ActiveValue::Set(slave.master_id.to_string()),
            account_id: ActiveValue::Set(slave.account_id.to_string()),
            kind: ActiveValue::Set(slave.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(slave.amount.cents()),
            occurred_at: ActiveValue::Set(slave.occurred_at),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        }
    }
}

impl TryFrom<Model> for Slave {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::InvalidRequest("invalid slave id".to_string()))?,
            master_id: Uuid::parse_str(&model.master_id)
                .map_err(|_| EngineError::InvalidRequest("invalid master id".to_string()))?,
            account_id: Uuid::parse_str(&model.account_id)
                .map_err(|_| EngineError::InvalidRequest("invalid account id".to_string()))?,
            kind: EntryKind::try_from(model.kind.as_str())?,
            amount: MoneyCents::new(model.amount_minor),
            occurred_at: model.occurred_at,
        })
    }
}
