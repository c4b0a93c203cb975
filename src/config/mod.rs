//! Run configuration
//!
//! One TOML file (or JSON, for `.json` paths) describes a whole run: the log
//! level, the pipeline shape, file logging, and the `[anonymization]` rules
//! with their keys and shared settings. Loading goes through three steps:
//!
//! 1. `${VAR_NAME}` placeholders are replaced from the environment; every
//!    missing variable is reported in one error
//! 2. `VEIL_<SECTION>_<KEY>` variables override parsed values
//! 3. Sections validate themselves; rule problems are left to the compiler
//!
//! ```rust,no_run
//! use veil::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("veil.toml")?;
//! println!("{} rules for {}", config.anonymization.rules.len(), config.processing.format);
//! # Ok(())
//! # }
//! ```
//!
//! A minimal file:
//!
//! ```toml
//! [processing]
//! format = "fhir"
//! partition_count = 4
//!
//! [anonymization.parameters]
//! crypto_hash_key = "${VEIL_HASH_KEY}"
//! date_shift_key = "${VEIL_DATE_SHIFT_KEY}"
//!
//! [[anonymization.rules]]
//! selector = "nodesByType('HumanName')"
//! method = "redact"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::load_config;
pub use schema::{ApplicationConfig, LoggingConfig, ProcessingConfig, VeilConfig};
pub use secret::{secret_string, SecretString, SecretValue};
