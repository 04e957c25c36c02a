//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AgentConfig (validated, immutable)
//!     → shared with the Tracer and pipeline adapter at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; hosting and reload are external
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::load_config;
pub use schema::AgentConfig;
pub use schema::ObservabilityConfig;
pub use schema::PipelineTracingConfig;
pub use schema::ServiceConfig;
