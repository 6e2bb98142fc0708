//! tidelink Core - Configuration and token types
//!
//! This crate holds the pieces shared by the Provider client and the
//! applications that embed it:
//! - **Configuration** - `ClientConfig` (YAML, builder, validation) and the
//!   environment-driven `EmbeddingConfig`
//! - **Tokens** - the serde-serializable `TokenSet` an embedding persists

pub mod config;
pub mod tokens;

pub use config::{ClientAuthMethod, ClientConfig, ConfigError, EmbeddingConfig, ValidationError};
pub use tokens::TokenSet;
