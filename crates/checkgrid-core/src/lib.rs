pub mod check;
pub mod config;
pub mod status;

pub use check::{CheckConfig, Digest};
pub use config::{ApiConfig, CheckgridConfig, ConfigError, DispatcherConfig};
pub use status::NodeStatus;
