//! Check history queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::db::entities::health_check;
use crate::db::models::CheckResult;
use crate::db::repository::{CheckRepository, RepoResult};

pub async fn insert_check(db: &DatabaseConnection, check: &CheckResult) -> Result<(), DbErr> {
    health_check::ActiveModel::from(check.clone()).insert(db).await?;
    Ok(())
}

pub async fn get_latest_check(
    db: &DatabaseConnection,
    site_id: Uuid,
) -> Result<Option<CheckResult>, DbErr> {
    health_check::Entity::find()
        .filter(health_check::Column::SiteId.eq(site_id))
        .order_by_desc(health_check::Column::CheckedAt)
        .one(db)
        .await
}

/// Checks for one site since `since`, newest first.
pub async fn get_checks_since(
    db: &DatabaseConnection,
    site_id: Uuid,
    since: DateTime<Utc>,
    limit: Option<u64>,
) -> Result<Vec<CheckResult>, DbErr> {
    let mut query = health_check::Entity::find()
        .filter(health_check::Column::SiteId.eq(site_id))
        .filter(health_check::Column::CheckedAt.gte(since))
        .order_by_desc(health_check::Column::CheckedAt);
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    query.all(db).await
}

pub async fn delete_checks_before(
    db: &DatabaseConnection,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let result = health_check::Entity::delete_many()
        .filter(health_check::Column::CheckedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[derive(Clone)]
pub struct PgCheckRepository {
    db: DatabaseConnection,
}

impl PgCheckRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckRepository for PgCheckRepository {
    async fn insert(&self, check: &CheckResult) -> RepoResult<()> {
        Ok(insert_check(&self.db, check).await?)
    }

    async fn latest(&self, site_id: Uuid) -> RepoResult<Option<CheckResult>> {
        Ok(get_latest_check(&self.db, site_id).await?)
    }

    async fn history(
        &self,
        site_id: Uuid,
        since: DateTime<Utc>,
        limit: Option<u64>,
    ) -> RepoResult<Vec<CheckResult>> {
        Ok(get_checks_since(&self.db, site_id, since, limit).await?)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        Ok(delete_checks_before(&self.db, cutoff).await?)
    }
}
