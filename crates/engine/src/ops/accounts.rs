//! Account operations.

use sea_orm::{QueryOrder, prelude::*};
use uuid::Uuid;

use crate::{Account, EngineError, MoneyCents, ResultEngine, accounts};

use super::Engine;

impl Engine {
    /// Creates an account and returns its id.
    pub async fn new_account(
        &self,
        name: &str,
        category: &str,
        sub_category: &str,
        is_real: bool,
        original_amount: MoneyCents,
    ) -> ResultEngine<Uuid> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidRequest(
                "account name must not be empty".to_string(),
            ));
        }

        let account = Account::new(
            name.to_string(),
            category.trim().to_string(),
            sub_category.trim().to_string(),
            is_real,
            original_amount,
        );
        if account.is_unknown() {
            return Err(EngineError::Conflict(
                "the Unknown account is managed by the engine".to_string(),
            ));
        }

        accounts::ActiveModel::from(&account)
            .insert(&self.database)
            .await?;
        Ok(account.id)
    }

    /// Looks an account up by id.
    pub async fn account(&self, id: Uuid) -> ResultEngine<Account> {
        let model = accounts::Entity::find_by_id(id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("account {id}")))?;
        Account::try_from(model)
    }

    /// Lists every account, real ones first.
    pub async fn accounts(&self) -> ResultEngine<Vec<Account>> {
        let models = accounts::Entity::find()
            .order_by_desc(accounts::Column::IsReal)
            .order_by_asc(accounts::Column::Name)
            .all(&self.database)
            .await?;
        models.into_iter().map(Account::try_from).collect()
    }

    /// The Unknown sentinel, created on first use.
    pub async fn unknown_account(&self) -> ResultEngine<Account> {
        super::unknown_account(&self.database).await
    }
}
