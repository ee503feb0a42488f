pub mod lifecycle;
pub mod report;
