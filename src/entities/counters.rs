use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Name of the single global activation counter row.
pub const GLOBAL_COUNTER: &str = "a";

/// 计数器实体
/// value 等于已激活兑换码的总数，每次成功兑换严格加 1
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub value: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
