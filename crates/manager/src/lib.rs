pub mod command;
pub mod config;
pub mod error;
mod flush;
mod legacy;
pub mod manager;
mod rehydrate;

pub use command::Command;
pub use config::{ConfigError, ManagerConfig};
pub use error::LayerError;
pub use manager::{LayerManager, ManagerEvent};
