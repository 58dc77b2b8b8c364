//! Product Model
//!
//! 充值产品与「产品 → 平台 API」的路由关系。关系表的 sort 决定
//! 故障切换时的候选顺序（升序优先）。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// 面值
    pub denom: f64,
    /// 0 上架 / 1 下架
    pub disabled: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// 产品与平台 API 的路由关系
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ProductApiRelation {
    pub id: i64,
    pub product_id: i64,
    pub api_id: i64,
    /// 该 API 下的套餐参数
    pub api_param_id: i64,
    /// 候选顺序，升序优先
    pub sort: i64,
    /// 0 启用 / 1 停用
    pub disabled: i64,
}
