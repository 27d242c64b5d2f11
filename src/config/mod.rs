//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (read & deserialize, apply CLI / environment overrides)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable for the process lifetime)
//! ```
//!
//! # Design Decisions
//! - One upstream origin per process; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError, ConfigOverrides};
pub use schema::{
    LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
