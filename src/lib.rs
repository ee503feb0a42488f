pub mod alerting;
pub mod db;
pub mod error;
pub mod monitoring;
pub mod notifications;
pub mod scheduler;
pub mod server;
pub mod web;
