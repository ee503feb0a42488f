//! PostgreSQL implementations of the repository traits.
//!
//! Each sub-module holds the free query functions for one table plus a thin
//! repository struct wrapping a `DatabaseConnection` that exposes them through
//! the matching trait in `crate::db::repository`.

pub mod alert_service;
pub mod health_check_service;
pub mod notification_service;
pub mod site_service;

pub use alert_service::PgAlertRepository;
pub use health_check_service::PgCheckRepository;
pub use notification_service::PgNotificationLog;
pub use site_service::PgSiteRepository;
