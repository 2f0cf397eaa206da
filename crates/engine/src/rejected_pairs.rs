//! Rejected transfer pairs.
//!
//! When a reviewer dismisses a proposed transfer candidate, the pair is
//! remembered so it never resurfaces. Pairs are stored in canonical order
//! (smaller uuid first) so `(a, b)` and `(b, a)` are the same rejection.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedPair {
    pub first: Uuid,
    pub second: Uuid,
    pub rejected_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl RejectedPair {
    /// Builds a rejection in canonical order, whatever order the ids come
    /// in.
    pub fn new(a: Uuid, b: Uuid, reason: Option<String>) -> Self {
        let (first, second) = canonical(a, b);
        Self {
            first,
            second,
            rejected_at: Utc::now(),
            reason,
        }
    }

    /// Canonical lookup key for this pair.
    #[must_use]
    pub fn key(&self) -> (Uuid, Uuid) {
        (self.first, self.second)
    }
}

/// Orders two transaction ids into the canonical (smaller first) form.
pub(crate) fn canonical(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rejected_transfer_pairs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub transaction_id_1: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub transaction_id_2: String,
    pub rejected_at: DateTimeUtc,
    pub reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&RejectedPair> for ActiveModel {
    fn from(pair: &RejectedPair) -> Self {
        Self {
            transaction_id_1: ActiveValue::Set(pair.first.to_string()),
            transaction_id_2: ActiveValue::Set(pair.second.to_string()),
            rejected_at: ActiveValue::Set(pair.rejected_at),
            reason: ActiveValue::Set(pair.reason.clone()),
        }
    }
}

impl TryFrom<Model> for RejectedPair {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            first: Uuid::parse_str(&model.transaction_id_1)
                .map_err(|_| EngineError::InvalidRequest("invalid rejected pair id".to_string()))?,
            second: Uuid::parse_str(&model.transaction_id_2)
                .map_err(|_| EngineError::InvalidRequest("invalid rejected pair id".to_string()))?,
            rejected_at: model.rejected_at,
            reason: model.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_canonicalized() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let one = RejectedPair::new(a, b, None);
        let two = RejectedPair::new(b, a, None);
        assert_eq!(one.key(), two.key());
        assert!(one.first <= one.second);
    }
}
