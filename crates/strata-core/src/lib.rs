//! Core types, configuration, and error handling for strata.
//!
//! This crate provides the shared foundation used by the other strata crates:
//! - [`StrataError`]: unified error type using `thiserror`
//! - [`StrataConfig`]: configuration loaded from `.strata.toml`
//! - Shared types: [`SourceKind`], [`LineRange`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    EmbeddingConfig, HistoryConfig, IndexConfig, SearchConfig, StrataConfig, CONFIG_FILE_NAME,
};
pub use error::StrataError;
pub use types::{LineRange, OutputFormat, SourceKind};

/// A convenience `Result` type for strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;
