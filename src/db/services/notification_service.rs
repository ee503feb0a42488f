use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::db::entities::notification;
use crate::db::models::Notification;
use crate::db::repository::{NotificationLog, RepoResult};

pub async fn insert_notification(
    db: &DatabaseConnection,
    row: Notification,
) -> Result<(), DbErr> {
    notification::ActiveModel::from(row).insert(db).await?;
    Ok(())
}

pub async fn get_notifications_for_alert(
    db: &DatabaseConnection,
    alert_id: Uuid,
) -> Result<Vec<Notification>, DbErr> {
    notification::Entity::find()
        .filter(notification::Column::AlertId.eq(alert_id))
        .order_by_asc(notification::Column::SentAt)
        .all(db)
        .await
}

#[derive(Clone)]
pub struct PgNotificationLog {
    db: DatabaseConnection,
}

impl PgNotificationLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationLog for PgNotificationLog {
    async fn record(&self, notification: Notification) -> RepoResult<()> {
        Ok(insert_notification(&self.db, notification).await?)
    }

    async fn list_for_alert(&self, alert_id: Uuid) -> RepoResult<Vec<Notification>> {
        Ok(get_notifications_for_alert(&self.db, alert_id).await?)
    }
}
