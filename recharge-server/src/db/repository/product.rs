//! Product Repository
//!
//! 产品与「产品 -> 平台 API」路由关系的查询。候选列表按 sort
//! 升序返回，是故障切换的遍历顺序。

use super::{RepoError, RepoResult};
use shared::models::product::{Product, ProductApiRelation};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, product: &Product) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO products (id, name, denom, disabled, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.denom)
        .bind(product.disabled)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> RepoResult<Product> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        product.ok_or_else(|| RepoError::NotFound(format!("product {id}")))
    }

    pub async fn insert_relation(&self, rel: &ProductApiRelation) -> RepoResult<()> {
        sqlx::query(
            r#"INSERT INTO product_api_relations
               (id, product_id, api_id, api_param_id, sort, disabled)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(rel.id)
        .bind(rel.product_id)
        .bind(rel.api_id)
        .bind(rel.api_param_id)
        .bind(rel.sort)
        .bind(rel.disabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 产品的可用平台候选，sort 升序。只返回 API 和套餐都启用的关系。
    pub async fn candidates(&self, product_id: i64) -> RepoResult<Vec<ProductApiRelation>> {
        let rels = sqlx::query_as::<_, ProductApiRelation>(
            r#"SELECT r.* FROM product_api_relations r
               JOIN platform_apis a ON a.id = r.api_id AND a.disabled = 0
               JOIN platform_api_params p ON p.id = r.api_param_id AND p.disabled = 0
               WHERE r.product_id = ? AND r.disabled = 0
               ORDER BY r.sort ASC, r.id ASC"#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rels)
    }
}
