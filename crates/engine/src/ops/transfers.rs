//! Transfer pairing, merge and split.
//!
//! A transfer between two real accounts imports as two masters: a debit
//! on the source and a credit on the destination. The pairing engine
//! proposes (credit, debit) candidates that share a calendar day and an
//! amount; a reviewer merges a true pair into one transaction, rejects a
//! false one for good, or re-splits a merged transfer back out.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use sea_orm::{
    ActiveValue, JoinType, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    EngineError, EntryKind, MoneyCents, RejectedPair, ResultEngine, Slave, Transaction,
    TransactionWithSlaves, accounts, rejected_pairs, slaves, transactions,
};

use super::{Engine, with_tx};

/// A proposed (credit, debit) pair: same calendar day, same amount, both
/// still unpaired.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferCandidate {
    pub credit: Transaction,
    pub debit: Transaction,
    pub amount: MoneyCents,
    pub date: NaiveDate,
    /// Pairing offers no disambiguation today; every candidate scores 1.
    pub match_confidence: f64,
}

/// What a slave split produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitOutcome {
    pub new_transaction_id: Uuid,
    pub new_slave_id: Uuid,
    pub original_slave_id: Uuid,
}

fn debit_credit_totals(entries: &[(EntryKind, MoneyCents)]) -> (MoneyCents, MoneyCents) {
    let mut debits = MoneyCents::ZERO;
    let mut credits = MoneyCents::ZERO;
    for (kind, amount) in entries {
        match kind {
            EntryKind::Debit => debits += *amount,
            EntryKind::Credit => credits += *amount,
        }
    }
    (debits, credits)
}

impl Engine {
    /// Proposes transfer candidates: the full cross product of unpaired
    /// credits and debits within each `(day, amount)` bucket, minus the
    /// pairs a reviewer already rejected.
    pub async fn transfer_candidates(&self) -> ResultEngine<Vec<TransferCandidate>> {
        let rejected: HashSet<(Uuid, Uuid)> = self
            .rejected_pairs()
            .await?
            .into_iter()
            .map(|pair| pair.key())
            .collect();

        let unpaired = self.unpaired_transactions().await?;

        let mut buckets: BTreeMap<(NaiveDate, i64), (Vec<Transaction>, Vec<Transaction>)> =
            BTreeMap::new();
        for tx in unpaired {
            let key = (tx.occurred_at.date_naive(), tx.amount.cents());
            let bucket = buckets.entry(key).or_default();
            match tx.kind {
                EntryKind::Credit => bucket.0.push(tx),
                EntryKind::Debit => bucket.1.push(tx),
            }
        }

        let mut candidates = Vec::new();
        for ((date, cents), (credits, debits)) in buckets {
            for credit in &credits {
                for debit in &debits {
                    if rejected.contains(&crate::rejected_pairs::canonical(credit.id, debit.id)) {
                        continue;
                    }
                    candidates.push(TransferCandidate {
                        credit: credit.clone(),
                        debit: debit.clone(),
                        amount: MoneyCents::new(cents),
                        date,
                        match_confidence: 1.0,
                    });
                }
            }
        }
        Ok(candidates)
    }

    /// Transactions eligible for pairing: a single slave pointing at a
    /// non-real account (Unknown or a category), meaning the movement has
    /// not been tied to another real account yet.
    async fn unpaired_transactions(&self) -> ResultEngine<Vec<Transaction>> {
        let models = super::fetch_paged(
            &self.database,
            transactions::Entity::find().order_by_asc(transactions::Column::Id),
        )
        .await?;

        let ids: Vec<Uuid> = models
            .iter()
            .filter_map(|m| Uuid::parse_str(&m.id).ok())
            .collect();
        let grouped = super::load_slaves_by_master(&self.database, &ids).await?;

        let mut out = Vec::with_capacity(models.len());
        for model in models {
            let tx = Transaction::try_from(model)?;
            let eligible = matches!(
                grouped.get(&tx.id).map(Vec::as_slice),
                Some([(_, account)]) if !account.is_real
            );
            if eligible {
                out.push(tx);
            }
        }
        Ok(out)
    }

    /// Remembers a dismissed candidate so it never resurfaces. The pair
    /// is stored in canonical order, so argument order does not matter.
    pub async fn reject_candidate(
        &self,
        a: Uuid,
        b: Uuid,
        reason: Option<String>,
    ) -> ResultEngine<()> {
        self.transaction(a).await?;
        self.transaction(b).await?;

        let pair = RejectedPair::new(a, b, reason);
        let existing = rejected_pairs::Entity::find_by_id((
            pair.first.to_string(),
            pair.second.to_string(),
        ))
        .one(&self.database)
        .await?;
        if existing.is_some() {
            return Err(EngineError::Conflict(format!(
                "rejected pair ({}, {})",
                pair.first, pair.second
            )));
        }

        rejected_pairs::ActiveModel::from(&pair)
            .insert(&self.database)
            .await?;
        info!(first = %pair.first, second = %pair.second, "rejected transfer pair");
        Ok(())
    }

    /// Forgets a rejection, letting the pair surface as a candidate
    /// again.
    pub async fn unreject_candidate(&self, a: Uuid, b: Uuid) -> ResultEngine<()> {
        let (first, second) = crate::rejected_pairs::canonical(a, b);
        let result =
            rejected_pairs::Entity::delete_by_id((first.to_string(), second.to_string()))
                .exec(&self.database)
                .await?;
        if result.rows_affected == 0 {
            return Err(EngineError::NotFound(format!(
                "rejected pair ({first}, {second})"
            )));
        }
        info!(%first, %second, "unrejected transfer pair");
        Ok(())
    }

    /// Every remembered rejection.
    pub async fn rejected_pairs(&self) -> ResultEngine<Vec<RejectedPair>> {
        let models = rejected_pairs::Entity::find()
            .order_by_desc(rejected_pairs::Column::RejectedAt)
            .all(&self.database)
            .await?;
        models.into_iter().map(RejectedPair::try_from).collect()
    }

    /// Merges a confirmed pair into one transaction.
    ///
    /// The credit side survives: its slave set is replaced by a single
    /// debit slave pointing at the account the money left, and the debit
    /// master (with its slaves) is deleted. Returns the surviving id.
    pub async fn merge_transfer(&self, credit_id: Uuid, debit_id: Uuid) -> ResultEngine<Uuid> {
        let credit = self.transaction(credit_id).await?;
        let debit = self.transaction(debit_id).await?;

        if credit.master.kind != EntryKind::Credit {
            return Err(EngineError::InvalidRequest(format!(
                "transaction {credit_id} is a {}, expected the credit side",
                credit.master.kind
            )));
        }
        if debit.master.kind != EntryKind::Debit {
            return Err(EngineError::InvalidRequest(format!(
                "transaction {debit_id} is a {}, expected the debit side",
                debit.master.kind
            )));
        }
        if credit.master.amount != debit.master.amount {
            return Err(EngineError::InvalidRequest(format!(
                "amounts differ: credit {} vs debit {}",
                credit.master.amount, debit.master.amount
            )));
        }
        if credit.master.occurred_at.date_naive() != debit.master.occurred_at.date_naive() {
            return Err(EngineError::InvalidRequest(format!(
                "dates differ: credit {} vs debit {}",
                credit.master.occurred_at.date_naive(),
                debit.master.occurred_at.date_naive()
            )));
        }

        let replacement = Slave {
            id: Uuid::new_v4(),
            master_id: credit.master.id,
            account_id: debit.master.account_id,
            kind: EntryKind::Debit,
            amount: credit.master.amount,
            occurred_at: credit.master.occurred_at,
        };

        with_tx!(self, |tx| {
            for (old, _) in &credit.slaves {
                slaves::Entity::delete_by_id(old.id.to_string())
                    .exec(&tx)
                    .await?;
            }
            slaves::ActiveModel::from(&replacement).insert(&tx).await?;

            for (old, _) in &debit.slaves {
                slaves::Entity::delete_by_id(old.id.to_string())
                    .exec(&tx)
                    .await?;
            }
            transactions::Entity::delete_by_id(debit_id.to_string())
                .exec(&tx)
                .await?;
            Ok::<_, EngineError>(())
        })?;

        info!(
            kept = %credit_id,
            removed = %debit_id,
            amount = %credit.master.amount,
            "merged transfer pair"
        );
        Ok(credit_id)
    }

    /// Reverses a merge for one slave: carves the slave out into a new
    /// master on the account it pointed at, and repoints the original
    /// slave to Unknown so both sides can be re-reviewed.
    pub async fn split_slave(
        &self,
        transaction_id: Uuid,
        slave_id: Uuid,
    ) -> ResultEngine<SplitOutcome> {
        let view = self.transaction(transaction_id).await?;
        let (slave, account) = view
            .slaves
            .iter()
            .find(|(s, _)| s.id == slave_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!("slave {slave_id} of transaction {transaction_id}"))
            })?;
        if !account.is_real {
            return Err(EngineError::InvalidRequest(format!(
                "slave {slave_id} points at {:?}, only slaves on real accounts can be split",
                account.name
            )));
        }

        let unknown = super::unknown_account(&self.database).await?;

        let new_master = Transaction::new(
            format!("Split from transaction {transaction_id}"),
            slave.kind,
            slave.amount,
            slave.occurred_at,
            slave.account_id,
        )?;
        let new_slave = Slave {
            id: Uuid::new_v4(),
            master_id: new_master.id,
            account_id: view.master.account_id,
            kind: slave.kind.opposite(),
            amount: slave.amount,
            occurred_at: slave.occurred_at,
        };

        // The {master, slave} pair and the {new master, new slave} pair
        // must carry the same debit and credit totals. A slave that does
        // not mirror its master, like a partial decomposition leg, cannot
        // be carved back out into its own transaction.
        let before = debit_credit_totals(&[
            (view.master.kind, view.master.amount),
            (slave.kind, slave.amount),
        ]);
        let after = debit_credit_totals(&[
            (new_master.kind, new_master.amount),
            (new_slave.kind, new_slave.amount),
        ]);
        if before != after {
            return Err(EngineError::InvalidRequest(format!(
                "split would not conserve totals: debits {} -> {}, credits {} -> {}",
                before.0, after.0, before.1, after.1
            )));
        }

        with_tx!(self, |tx| {
            transactions::ActiveModel::from(&new_master).insert(&tx).await?;
            slaves::ActiveModel::from(&new_slave).insert(&tx).await?;

            let repointed = slaves::ActiveModel {
                id: ActiveValue::Set(slave.id.to_string()),
                account_id: ActiveValue::Set(unknown.id.to_string()),
                updated_at: ActiveValue::Set(chrono::Utc::now()),
                ..Default::default()
            };
            repointed.update(&tx).await?;
            Ok::<_, EngineError>(())
        })?;

        info!(
            original = %transaction_id,
            new_transaction = %new_master.id,
            amount = %slave.amount,
            "split slave into new transaction"
        );
        Ok(SplitOutcome {
            new_transaction_id: new_master.id,
            new_slave_id: new_slave.id,
            original_slave_id: slave.id,
        })
    }

    /// Confirmed transfers: masters with at least one slave pointing at a
    /// real account, newest first.
    pub async fn transfers(&self) -> ResultEngine<Vec<TransactionWithSlaves>> {
        let slave_models = super::fetch_paged(
            &self.database,
            slaves::Entity::find()
                .join(JoinType::InnerJoin, slaves::Relation::Accounts.def())
                .filter(accounts::Column::IsReal.eq(true))
                .order_by_asc(slaves::Column::Id),
        )
        .await?;

        let mut master_ids = Vec::new();
        let mut seen = HashSet::new();
        for model in &slave_models {
            if let Ok(id) = Uuid::parse_str(&model.master_id) {
                if seen.insert(id) {
                    master_ids.push(id);
                }
            }
        }

        let grouped = super::load_slaves_by_master(&self.database, &master_ids).await?;

        let mut out = Vec::with_capacity(master_ids.len());
        for chunk in master_ids.chunks(super::PAGE_SIZE as usize) {
            let models = transactions::Entity::find()
                .filter(transactions::Column::Id.is_in(chunk.iter().map(ToString::to_string)))
                .all(&self.database)
                .await?;
            for model in models {
                let master = Transaction::try_from(model)?;
                let slaves = grouped.get(&master.id).cloned().unwrap_or_default();
                out.push(TransactionWithSlaves { master, slaves });
            }
        }
        out.sort_by(|a, b| b.master.occurred_at.cmp(&a.master.occurred_at));
        Ok(out)
    }
}
