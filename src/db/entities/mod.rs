//! SeaORM entities for the monitoring tables.

pub mod alert;
pub mod health_check;
pub mod notification;
pub mod site;
