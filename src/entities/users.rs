use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 用户中奖统计
/// - name: 用户名 (5 位字母数字)
/// - wins: 累计中奖次数，不会超过配置的上限
///
/// 只有至少中过一次奖的用户才会有记录。
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub wins: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
