//! Accounts.
//!
//! An [`Account`] is a destination a slave entry can point at: a spending
//! category (groceries, rent), or a *real* account that mirrors an actual
//! bank account and participates in transfer pairing.
//!
//! One account per store is the **Unknown sentinel**: name, category and
//! sub-category all equal to [`UNKNOWN`] and `is_real == false`. A master
//! whose single slave points at it is uncategorized.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents};

/// Name, category and sub-category of the Unknown sentinel account.
pub const UNKNOWN: &str = "Unknown";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub sub_category: String,
    /// Real accounts mirror actual bank accounts; only slaves pointing at
    /// them are eligible for transfer pairing and slave splitting.
    pub is_real: bool,
    pub active: bool,
    /// Opening balance at import time.
    pub original_amount: MoneyCents,
}

impl Account {
    pub fn new(
        name: String,
        category: String,
        sub_category: String,
        is_real: bool,
        original_amount: MoneyCents,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            category,
            sub_category,
            is_real,
            active: true,
            original_amount,
        }
    }

    /// The Unknown sentinel, as created on first use.
    pub(crate) fn unknown_sentinel() -> Self {
        Self::new(
            UNKNOWN.to_string(),
            UNKNOWN.to_string(),
            UNKNOWN.to_string(),
            false,
            MoneyCents::ZERO,
        )
    }

    /// Whether this account is the Unknown sentinel.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        !self.is_real
            && self.name == UNKNOWN
            && self.category == UNKNOWN
            && self.sub_category == UNKNOWN
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub category: String,
    pub sub_category: String,
    pub is_real: bool,
    pub active: bool,
    pub original_amount_minor: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::slaves::Entity")]
    Slaves,
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::slaves::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Slaves.def()
    }
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::Set(account.id.to_string()),
            name: ActiveValue::Set(account.name.clone()),
            category: ActiveValue::Set(account.category.clone()),
            sub_category: ActiveValue::Set(account.sub_category.clone()),
            is_real: ActiveValue::Set(account.is_real),
            active: ActiveValue::Set(account.active),
            original_amount_minor: ActiveValue::Set(account.original_amount.cents()),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::InvalidRequest("invalid account id".to_string()))?,
            name: model.name,
            category: model.category,
            sub_category: model.sub_category,
            is_real: model.is_real,
            active: model.active,
            original_amount: MoneyCents::new(model.original_amount_minor),
        })
    }
}
