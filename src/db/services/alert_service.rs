//! Alert store queries.
//!
//! Every state change is a single `UPDATE ... WHERE` whose filter carries the
//! precondition, so two sweeps racing on the same alert cannot both win.
//! `rows_affected` tells the caller whether it did.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, SqlErr,
};
use uuid::Uuid;

use crate::db::entities::alert;
use crate::db::enums::{AlertType, NotificationChannel, Severity};
use crate::db::models::Alert;
use crate::db::repository::{AlertRepository, RepoResult};

pub async fn create_alert(db: &DatabaseConnection, alert: Alert) -> Result<Alert, DbErr> {
    alert::ActiveModel::from(alert).insert(db).await
}

/// Inserts an OPEN alert, relying on the `uq_alerts_open_per_type` partial
/// index to reject a second open alert for the same site and type.
pub async fn create_alert_if_none_open(
    db: &DatabaseConnection,
    alert: Alert,
) -> Result<Option<Alert>, DbErr> {
    match alert::ActiveModel::from(alert).insert(db).await {
        Ok(created) => Ok(Some(created)),
        Err(e) => match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Ok(None),
            _ => Err(e),
        },
    }
}

pub async fn get_alert_by_id(db: &DatabaseConnection, id: Uuid) -> Result<Option<Alert>, DbErr> {
    alert::Entity::find_by_id(id).one(db).await
}

pub async fn get_open_alert(
    db: &DatabaseConnection,
    site_id: Uuid,
    alert_type: AlertType,
) -> Result<Option<Alert>, DbErr> {
    alert::Entity::find()
        .filter(alert::Column::SiteId.eq(site_id))
        .filter(alert::Column::AlertType.eq(alert_type))
        .filter(alert::Column::Resolved.eq(false))
        .one(db)
        .await
}

pub async fn get_alerts_due(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Alert>, DbErr> {
    alert::Entity::find()
        .filter(alert::Column::Resolved.eq(false))
        .filter(alert::Column::EmailSent.eq(false))
        .filter(alert::Column::NextRetryAt.lte(now))
        .order_by_desc(alert::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn get_open_critical_alerts_before(
    db: &DatabaseConnection,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Alert>, DbErr> {
    alert::Entity::find()
        .filter(alert::Column::Resolved.eq(false))
        .filter(alert::Column::Severity.eq(Severity::Critical))
        .filter(alert::Column::CreatedAt.lt(cutoff))
        .order_by_desc(alert::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn get_open_alerts(
    db: &DatabaseConnection,
    site_id: Option<Uuid>,
) -> Result<Vec<Alert>, DbErr> {
    let mut query = alert::Entity::find().filter(alert::Column::Resolved.eq(false));
    if let Some(site_id) = site_id {
        query = query.filter(alert::Column::SiteId.eq(site_id));
    }
    query.order_by_desc(alert::Column::CreatedAt).all(db).await
}

pub async fn get_recent_alerts(
    db: &DatabaseConnection,
    site_id: Option<Uuid>,
    limit: u64,
) -> Result<Vec<Alert>, DbErr> {
    let mut query = alert::Entity::find();
    if let Some(site_id) = site_id {
        query = query.filter(alert::Column::SiteId.eq(site_id));
    }
    query
        .order_by_desc(alert::Column::CreatedAt)
        .limit(limit)
        .all(db)
        .await
}

pub async fn get_alerts_created_since(
    db: &DatabaseConnection,
    since: DateTime<Utc>,
) -> Result<Vec<Alert>, DbErr> {
    alert::Entity::find()
        .filter(alert::Column::CreatedAt.gte(since))
        .order_by_desc(alert::Column::CreatedAt)
        .all(db)
        .await
}

pub async fn resolve_alert(
    db: &DatabaseConnection,
    id: Uuid,
    resolved_at: DateTime<Utc>,
    resolved_by: Option<String>,
) -> Result<bool, DbErr> {
    let result = alert::Entity::update_many()
        .col_expr(alert::Column::Resolved, Expr::value(true))
        .col_expr(alert::Column::ResolvedAt, Expr::value(resolved_at))
        .col_expr(alert::Column::ResolvedBy, Expr::value(resolved_by))
        .filter(alert::Column::Id.eq(id))
        .filter(alert::Column::Resolved.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn claim_critical_dispatch(db: &DatabaseConnection, id: Uuid) -> Result<bool, DbErr> {
    let result = alert::Entity::update_many()
        .col_expr(alert::Column::EmailSent, Expr::value(true))
        .col_expr(alert::Column::WhatsappSent, Expr::value(true))
        .filter(alert::Column::Id.eq(id))
        .filter(alert::Column::Resolved.eq(false))
        .filter(alert::Column::EmailSent.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn release_critical_dispatch(
    db: &DatabaseConnection,
    id: Uuid,
    next_retry_at: DateTime<Utc>,
) -> Result<(), DbErr> {
    alert::Entity::update_many()
        .col_expr(alert::Column::EmailSent, Expr::value(false))
        .col_expr(alert::Column::WhatsappSent, Expr::value(false))
        .col_expr(
            alert::Column::NotificationAttempts,
            Expr::col(alert::Column::NotificationAttempts).add(1),
        )
        .col_expr(alert::Column::NextRetryAt, Expr::value(next_retry_at))
        .filter(alert::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn claim_retry(
    db: &DatabaseConnection,
    id: Uuid,
    expected_attempts: i32,
    next_retry_at: DateTime<Utc>,
) -> Result<bool, DbErr> {
    let result = alert::Entity::update_many()
        .col_expr(
            alert::Column::NotificationAttempts,
            Expr::value(expected_attempts + 1),
        )
        .col_expr(alert::Column::NextRetryAt, Expr::value(next_retry_at))
        .filter(alert::Column::Id.eq(id))
        .filter(alert::Column::Resolved.eq(false))
        .filter(alert::Column::NotificationAttempts.eq(expected_attempts))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

pub async fn mark_channel_sent(
    db: &DatabaseConnection,
    id: Uuid,
    channel: NotificationChannel,
) -> Result<(), DbErr> {
    let column = match channel {
        NotificationChannel::Email => alert::Column::EmailSent,
        NotificationChannel::Whatsapp => alert::Column::WhatsappSent,
        NotificationChannel::Sms => alert::Column::SmsSent,
        NotificationChannel::Push => alert::Column::PushSent,
    };
    alert::Entity::update_many()
        .col_expr(column, Expr::value(true))
        .filter(alert::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn increment_attempts(db: &DatabaseConnection, id: Uuid) -> Result<(), DbErr> {
    alert::Entity::update_many()
        .col_expr(
            alert::Column::NotificationAttempts,
            Expr::col(alert::Column::NotificationAttempts).add(1),
        )
        .filter(alert::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgAlertRepository {
    db: DatabaseConnection,
}

impl PgAlertRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AlertRepository for PgAlertRepository {
    async fn insert(&self, alert: Alert) -> RepoResult<Alert> {
        Ok(create_alert(&self.db, alert).await?)
    }

    async fn insert_if_no_open(&self, alert: Alert) -> RepoResult<Option<Alert>> {
        Ok(create_alert_if_none_open(&self.db, alert).await?)
    }

    async fn get_by_id(&self, id: Uuid) -> RepoResult<Option<Alert>> {
        Ok(get_alert_by_id(&self.db, id).await?)
    }

    async fn find_open_by_type_and_site(
        &self,
        site_id: Uuid,
        alert_type: AlertType,
    ) -> RepoResult<Option<Alert>> {
        Ok(get_open_alert(&self.db, site_id, alert_type).await?)
    }

    async fn find_pending_for_processing(&self, now: DateTime<Utc>) -> RepoResult<Vec<Alert>> {
        Ok(get_alerts_due(&self.db, now).await?)
    }

    async fn find_open_critical_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<Vec<Alert>> {
        Ok(get_open_critical_alerts_before(&self.db, cutoff).await?)
    }

    async fn list_open(&self, site_id: Option<Uuid>) -> RepoResult<Vec<Alert>> {
        Ok(get_open_alerts(&self.db, site_id).await?)
    }

    async fn list_recent(&self, site_id: Option<Uuid>, limit: u64) -> RepoResult<Vec<Alert>> {
        Ok(get_recent_alerts(&self.db, site_id, limit).await?)
    }

    async fn list_created_since(&self, since: DateTime<Utc>) -> RepoResult<Vec<Alert>> {
        Ok(get_alerts_created_since(&self.db, since).await?)
    }

    async fn mark_resolved(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
        resolved_by: Option<String>,
    ) -> RepoResult<bool> {
        Ok(resolve_alert(&self.db, id, resolved_at, resolved_by).await?)
    }

    async fn claim_critical_dispatch(&self, id: Uuid) -> RepoResult<bool> {
        Ok(claim_critical_dispatch(&self.db, id).await?)
    }

    async fn release_critical_dispatch(
        &self,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
    ) -> RepoResult<()> {
        Ok(release_critical_dispatch(&self.db, id, next_retry_at).await?)
    }

    async fn claim_retry(
        &self,
        id: Uuid,
        expected_attempts: i32,
        next_retry_at: DateTime<Utc>,
    ) -> RepoResult<bool> {
        Ok(claim_retry(&self.db, id, expected_attempts, next_retry_at).await?)
    }

    async fn mark_channel_sent(&self, id: Uuid, channel: NotificationChannel) -> RepoResult<()> {
        Ok(mark_channel_sent(&self.db, id, channel).await?)
    }

    async fn increment_attempts(&self, id: Uuid) -> RepoResult<()> {
        Ok(increment_attempts(&self.db, id).await?)
    }
}
