use sea_orm_migration::prelude::*;

/// Users (仅中奖过的用户才有记录)
#[derive(DeriveIden)]
enum Users {
    Table,
    Name,
    Wins,
}

/// Activated codes (已激活的兑换码，一经写入永不修改)
#[derive(DeriveIden)]
enum Activated {
    Table,
    Code,
    ActivatedAt,
}

/// Counters (全局激活计数器)
#[derive(DeriveIden)]
enum Counters {
    Table,
    Name,
    Value,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Primary keys double as the uniqueness arbiters for concurrent redemptions:
/// - users.name rejects a second insert of the same brand-new winner
/// - activated.code rejects a second activation of the same code
///
/// The global counter row `a` is seeded with 0 so it is always lockable.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Name)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Wins)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Activated::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Activated::Code)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Activated::ActivatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Counters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Counters::Name)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Counters::Value)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // 初始化计数器 'a'，已存在则跳过
        let seed = Query::insert()
            .into_table(Counters::Table)
            .columns([Counters::Name, Counters::Value])
            .values_panic(["a".into(), 0i64.into()])
            .on_conflict(OnConflict::column(Counters::Name).do_nothing().to_owned())
            .to_owned();
        manager.exec_stmt(seed).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(Counters::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().if_exists().table(Activated::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().if_exists().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}
