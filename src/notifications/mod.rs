pub mod models;
pub mod senders;
pub mod service;
pub mod templates;

pub use service::{NotificationError, NotificationService, Notifier};

#[cfg(test)]
pub(crate) mod testing;
