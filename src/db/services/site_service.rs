//! Site registry queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::db::entities::site;
use crate::db::models::Site;
use crate::db::repository::{RepoResult, SiteRepository};

pub async fn get_active_sites(db: &DatabaseConnection) -> Result<Vec<Site>, DbErr> {
    site::Entity::find()
        .filter(site::Column::IsActive.eq(true))
        .filter(site::Column::DeletedAt.is_null())
        .order_by_asc(site::Column::Name)
        .all(db)
        .await
}

pub async fn get_all_sites(db: &DatabaseConnection) -> Result<Vec<Site>, DbErr> {
    site::Entity::find()
        .filter(site::Column::DeletedAt.is_null())
        .order_by_asc(site::Column::Name)
        .all(db)
        .await
}

pub async fn get_site_by_id(db: &DatabaseConnection, id: Uuid) -> Result<Option<Site>, DbErr> {
    site::Entity::find_by_id(id)
        .filter(site::Column::DeletedAt.is_null())
        .one(db)
        .await
}

/// Looks a site up regardless of its active flag or soft-delete marker.
pub async fn get_any_site_by_id(db: &DatabaseConnection, id: Uuid) -> Result<Option<Site>, DbErr> {
    site::Entity::find_by_id(id).one(db).await
}

pub async fn find_site_by_name_or_url(
    db: &DatabaseConnection,
    name: &str,
    url: &str,
) -> Result<Option<Site>, DbErr> {
    site::Entity::find()
        .filter(
            Condition::any()
                .add(site::Column::Name.eq(name))
                .add(site::Column::Url.eq(url)),
        )
        .one(db)
        .await
}

pub async fn create_site(db: &DatabaseConnection, site: Site) -> Result<Site, DbErr> {
    site::ActiveModel::from(site).insert(db).await
}

/// Rewrites every column of an existing site row.
pub async fn update_site(db: &DatabaseConnection, site: Site) -> Result<Site, DbErr> {
    site.into_active_model().reset_all().update(db).await
}

pub async fn soft_delete_site(
    db: &DatabaseConnection,
    id: Uuid,
    at: DateTime<Utc>,
) -> Result<bool, DbErr> {
    let result = site::Entity::update_many()
        .col_expr(site::Column::DeletedAt, Expr::value(Some(at)))
        .col_expr(site::Column::UpdatedAt, Expr::value(at))
        .filter(site::Column::Id.eq(id))
        .filter(site::Column::DeletedAt.is_null())
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

#[derive(Clone)]
pub struct PgSiteRepository {
    db: DatabaseConnection,
}

impl PgSiteRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SiteRepository for PgSiteRepository {
    async fn list_active(&self) -> RepoResult<Vec<Site>> {
        Ok(get_active_sites(&self.db).await?)
    }

    async fn list_all(&self) -> RepoResult<Vec<Site>> {
        Ok(get_all_sites(&self.db).await?)
    }

    async fn get_by_id(&self, id: Uuid) -> RepoResult<Option<Site>> {
        Ok(get_site_by_id(&self.db, id).await?)
    }

    async fn get_by_id_including_inactive(&self, id: Uuid) -> RepoResult<Option<Site>> {
        Ok(get_any_site_by_id(&self.db, id).await?)
    }

    async fn find_by_name_or_url(&self, name: &str, url: &str) -> RepoResult<Option<Site>> {
        Ok(find_site_by_name_or_url(&self.db, name, url).await?)
    }

    async fn insert(&self, site: Site) -> RepoResult<Site> {
        Ok(create_site(&self.db, site).await?)
    }

    async fn update(&self, site: Site) -> RepoResult<Site> {
        Ok(update_site(&self.db, site).await?)
    }

    async fn soft_delete(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<bool> {
        Ok(soft_delete_site(&self.db, id, at).await?)
    }
}
