pub mod accessories;
pub mod api;
pub mod bridge;
pub mod config;
pub mod hap;
pub mod hub;

pub use bridge::Bridge;
pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use hap::HapError;
pub use hub::EntitySnapshot;
pub use hub::Hub;
pub use hub::ServiceCall;
