//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed to HttpServer at construction time
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server is built; no runtime mutation
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AccessLogConfig, LifecycleConfig, LimitsConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, ServerConfig, ServiceConfig, TimeoutConfig,
};
