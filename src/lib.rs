pub mod bridge;
pub mod config;
pub mod error;

pub mod delivery;
pub mod record;

pub use bridge::{register, Bridge, HostStatus};
pub use config::{BridgeConfig, ConfigSource};
pub use error::{Error, Result};
