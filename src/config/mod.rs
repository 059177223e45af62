//! Application configuration
//!
//! `AppConfig` is persisted as TOML by [`ConfigStore`].

mod schema;
mod store;

pub use schema::{AppConfig, CardConfig, HassConfig, WebRtcConfig};
pub use store::{ConfigChange, ConfigStore};
