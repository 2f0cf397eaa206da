use std::collections::HashMap;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, QueryFilter, QuerySelect, Select, prelude::*,
};
use uuid::Uuid;

use crate::{
    Account, EngineError, ProcessorRegistry, ResultEngine, Slave, Transaction,
    TransactionWithSlaves,
};

mod accounts;
mod imports;
mod matching;
mod rules;
mod transfers;

pub use matching::{MatchDetail, MatchReport};
pub use transfers::{SplitOutcome, TransferCandidate};

/// Offset pagination size for store reads that may exceed the backend's
/// result window.
pub(crate) const PAGE_SIZE: u64 = 1000;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Handle over the backing store plus the processors registered at
/// construction time.
pub struct Engine {
    database: DatabaseConnection,
    registry: ProcessorRegistry,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The processors this engine was built with.
    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }
}

/// Fetches every row of a query in [`PAGE_SIZE`] pages.
pub(crate) async fn fetch_paged<C, E>(db: &C, query: Select<E>) -> ResultEngine<Vec<E::Model>>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let mut out = Vec::new();
    let mut offset = 0;
    loop {
        let page = query
            .clone()
            .offset(offset)
            .limit(PAGE_SIZE)
            .all(db)
            .await?;
        let fetched = page.len() as u64;
        out.extend(page);
        if fetched < PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }
    Ok(out)
}

/// Loads a master with its slaves and their accounts.
pub(crate) async fn load_view<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> ResultEngine<TransactionWithSlaves> {
    let model = crate::transactions::Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("transaction {id}")))?;
    let master = Transaction::try_from(model)?;

    let rows = crate::slaves::Entity::find()
        .filter(crate::slaves::Column::MasterId.eq(id.to_string()))
        .find_also_related(crate::accounts::Entity)
        .all(db)
        .await?;

    let mut slave_pairs = Vec::with_capacity(rows.len());
    for (slave_model, account_model) in rows {
        let account_model = account_model.ok_or_else(|| {
            EngineError::NotFound(format!("account for slave {}", slave_model.id))
        })?;
        slave_pairs.push((
            Slave::try_from(slave_model)?,
            Account::try_from(account_model)?,
        ));
    }

    Ok(TransactionWithSlaves {
        master,
        slaves: slave_pairs,
    })
}

/// Loads the slaves (with accounts) of many masters at once, grouped by
/// master id.
pub(crate) async fn load_slaves_by_master<C: ConnectionTrait>(
    db: &C,
    master_ids: &[Uuid],
) -> ResultEngine<HashMap<Uuid, Vec<(Slave, Account)>>> {
    let mut grouped: HashMap<Uuid, Vec<(Slave, Account)>> = HashMap::new();
    for chunk in master_ids.chunks(PAGE_SIZE as usize) {
        let rows = crate::slaves::Entity::find()
            .filter(crate::slaves::Column::MasterId.is_in(chunk.iter().map(ToString::to_string)))
            .find_also_related(crate::accounts::Entity)
            .all(db)
            .await?;
        for (slave_model, account_model) in rows {
            let account_model = account_model.ok_or_else(|| {
                EngineError::NotFound(format!("account for slave {}", slave_model.id))
            })?;
            let slave = Slave::try_from(slave_model)?;
            grouped
                .entry(slave.master_id)
                .or_default()
                .push((slave, Account::try_from(account_model)?));
        }
    }
    Ok(grouped)
}

/// Finds the Unknown sentinel account, creating it on first use.
pub(crate) async fn unknown_account<C: ConnectionTrait>(db: &C) -> ResultEngine<Account> {
    let existing = crate::accounts::Entity::find()
        .filter(crate::accounts::Column::Name.eq(crate::accounts::UNKNOWN))
        .filter(crate::accounts::Column::Category.eq(crate::accounts::UNKNOWN))
        .filter(crate::accounts::Column::SubCategory.eq(crate::accounts::UNKNOWN))
        .filter(crate::accounts::Column::IsReal.eq(false))
        .one(db)
        .await?;
    if let Some(model) = existing {
        return Account::try_from(model);
    }

    let sentinel = Account::unknown_sentinel();
    crate::accounts::ActiveModel::from(&sentinel).insert(db).await?;
    Ok(sentinel)
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    registry: Option<ProcessorRegistry>,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Replace the default processor set.
    pub fn registry(mut self, registry: ProcessorRegistry) -> EngineBuilder {
        self.registry = Some(registry);
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            registry: self
                .registry
                .unwrap_or_else(ProcessorRegistry::with_defaults),
        })
    }
}
