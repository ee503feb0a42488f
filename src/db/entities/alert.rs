use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{AlertType, Severity};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub site_id: Uuid,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub resolved: bool,
    pub created_at: ChronoDateTimeUtc,
    #[sea_orm(nullable)]
    pub resolved_at: Option<ChronoDateTimeUtc>,
    #[sea_orm(nullable)]
    pub resolved_by: Option<String>,
    pub email_sent: bool,
    pub whatsapp_sent: bool,
    pub sms_sent: bool,
    pub push_sent: bool,
    pub notification_attempts: i32,
    #[sea_orm(nullable)]
    pub next_retry_at: Option<ChronoDateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::site::Entity",
        from = "Column::SiteId",
        to = "super::site::Column::Id",
        on_update = "Cascade"
    )]
    Site,
    #[sea_orm(has_many = "super::notification::Entity")]
    Notification,
}

impl Related<super::site::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Site.def()
    }
}

impl Related<super::notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notification.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
