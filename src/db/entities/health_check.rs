use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{ComponentStatus, HealthStatus, SslStatus};

/// One probe outcome. Rows are inserted once and never updated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "health_checks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub site_id: Uuid,
    pub status: HealthStatus,
    #[sea_orm(nullable)]
    pub http_code: Option<i32>,
    #[sea_orm(nullable)]
    pub response_time_ms: Option<i32>,
    #[sea_orm(nullable)]
    pub error_rate: Option<f64>,
    #[sea_orm(nullable)]
    pub database_status: Option<ComponentStatus>,
    #[sea_orm(nullable)]
    pub cache_status: Option<ComponentStatus>,
    #[sea_orm(nullable)]
    pub ssl_status: Option<SslStatus>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub checked_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::site::Entity",
        from = "Column::SiteId",
        to = "super::site::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    Site,
}

impl Related<super::site::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Site.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
