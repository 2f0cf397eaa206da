//! Transaction import.
//!
//! Importing creates the master and its initial Unknown slave in one
//! store transaction, so a master is never observable without a slave.

use chrono::{DateTime, Utc};
use sea_orm::{TransactionTrait, prelude::*};
use tracing::info;
use uuid::Uuid;

use crate::{
    EngineError, EntryKind, MoneyCents, ResultEngine, Slave, Transaction, TransactionWithSlaves,
    slaves, transactions,
};

use super::{Engine, with_tx};

impl Engine {
    /// Imports a bank movement onto a real account, attaching the initial
    /// Unknown slave. Returns the new master id.
    pub async fn import_transaction(
        &self,
        description: &str,
        kind: EntryKind,
        amount: MoneyCents,
        occurred_at: DateTime<Utc>,
        account_id: Uuid,
    ) -> ResultEngine<Uuid> {
        let account = self.account(account_id).await?;
        if !account.is_real {
            return Err(EngineError::InvalidRequest(format!(
                "transactions can only be imported on real accounts, {:?} is not",
                account.name
            )));
        }

        let master = Transaction::new(
            description.trim().to_string(),
            kind,
            amount,
            occurred_at,
            account_id,
        )?;

        let id = with_tx!(self, |tx| {
            let unknown = super::unknown_account(&tx).await?;
            let slave = Slave {
                id: Uuid::new_v4(),
                master_id: master.id,
                account_id: unknown.id,
                kind: kind.opposite(),
                amount,
                occurred_at,
            };

            transactions::ActiveModel::from(&master).insert(&tx).await?;
            slaves::ActiveModel::from(&slave).insert(&tx).await?;
            Ok::<_, EngineError>(master.id)
        })?;

        info!(transaction_id = %id, kind = kind.as_str(), "imported transaction");
        Ok(id)
    }

    /// Loads a master with its slaves and their accounts.
    pub async fn transaction(&self, id: Uuid) -> ResultEngine<TransactionWithSlaves> {
        super::load_view(&self.database, id).await
    }
}
