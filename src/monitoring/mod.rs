pub mod detector;
pub mod pipeline;
pub mod prober;
pub mod recorder;
