//! Initial schema migration - creates all tables from scratch.
//!
//! - `accounts`: categories and real bank accounts, plus the Unknown sentinel
//! - `transactions`: imported master movements
//! - `transaction_slaves`: decomposition legs attached to a master
//! - `categorization_rules`: persisted matching rules with processor configs
//! - `rejected_transfer_pairs`: dismissed transfer candidates, canonical order

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    Name,
    Category,
    SubCategory,
    IsReal,
    Active,
    OriginalAmountMinor,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    Description,
    Kind,
    AmountMinor,
    OccurredAt,
    AccountId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum TransactionSlaves {
    Table,
    Id,
    MasterId,
    AccountId,
    Kind,
    AmountMinor,
    OccurredAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum CategorizationRules {
    Table,
    Id,
    Description,
    Priority,
    Enabled,
    AccountFilter,
    ProcessorType,
    ProcessorConfig,
    ConditionGroups,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum RejectedTransferPairs {
    Table,
    #[iden = "transaction_id_1"]
    TransactionId1,
    #[iden = "transaction_id_2"]
    TransactionId2,
    RejectedAt,
    Reason,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Accounts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::Name).string().not_null())
                    .col(ColumnDef::new(Accounts::Category).string().not_null())
                    .col(ColumnDef::new(Accounts::SubCategory).string().not_null())
                    .col(ColumnDef::new(Accounts::IsReal).boolean().not_null())
                    .col(ColumnDef::new(Accounts::Active).boolean().not_null())
                    .col(
                        ColumnDef::new(Accounts::OriginalAmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-name-category-sub_category-unique")
                    .table(Accounts::Table)
                    .col(Accounts::Name)
                    .col(Accounts::Category)
                    .col(Accounts::SubCategory)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Transactions::Description)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::AccountId).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-account_id")
                            .from(Transactions::Table, Transactions::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-occurred_at")
                    .table(Transactions::Table)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-account_id")
                    .table(Transactions::Table)
                    .col(Transactions::AccountId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Transaction slaves
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(TransactionSlaves::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionSlaves::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TransactionSlaves::MasterId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionSlaves::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TransactionSlaves::Kind).string().not_null())
                    .col(
                        ColumnDef::new(TransactionSlaves::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionSlaves::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionSlaves::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionSlaves::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transaction_slaves-master_id")
                            .from(TransactionSlaves::Table, TransactionSlaves::MasterId)
                            .to(Transactions::Table, Transactions::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transaction_slaves-account_id")
                            .from(TransactionSlaves::Table, TransactionSlaves::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transaction_slaves-master_id")
                    .table(TransactionSlaves::Table)
                    .col(TransactionSlaves::MasterId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transaction_slaves-account_id")
                    .table(TransactionSlaves::Table)
                    .col(TransactionSlaves::AccountId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Categorization rules
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(CategorizationRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CategorizationRules::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CategorizationRules::Description)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategorizationRules::Priority)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategorizationRules::Enabled)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CategorizationRules::AccountFilter).string())
                    .col(
                        ColumnDef::new(CategorizationRules::ProcessorType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategorizationRules::ProcessorConfig)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategorizationRules::ConditionGroups)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategorizationRules::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CategorizationRules::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-categorization_rules-priority")
                    .table(CategorizationRules::Table)
                    .col(CategorizationRules::Priority)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Rejected transfer pairs
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(RejectedTransferPairs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RejectedTransferPairs::TransactionId1)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RejectedTransferPairs::TransactionId2)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RejectedTransferPairs::RejectedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RejectedTransferPairs::Reason).string())
                    .primary_key(
                        Index::create()
                            .col(RejectedTransferPairs::TransactionId1)
                            .col(RejectedTransferPairs::TransactionId2),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(RejectedTransferPairs::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(CategorizationRules::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(TransactionSlaves::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(Transactions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
