pub mod monitor;
pub mod sources;

pub use monitor::MonitorConfig;
