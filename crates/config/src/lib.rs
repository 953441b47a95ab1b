//! Configuration for the fieldgate gateway.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The binary applies CLI flags on top.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{CONFIG_FILE_NAME, apply_env, discover_and_load, load_config},
    schema::{
        DEFAULT_BIND, DEFAULT_ENDPOINT, DEFAULT_PORT, DEFAULT_SUBSCRIPTION_EVENTS,
        FieldgateConfig, ServerConfig, UpstreamConfig,
    },
};
