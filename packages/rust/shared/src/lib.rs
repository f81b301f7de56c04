//! Shared types, error model, and configuration for venuebot.
//!
//! This crate is the foundation depended on by all other venuebot crates.
//! It provides:
//! - [`VenueBotError`] — the unified error type
//! - The graph payload model ([`StoragePayload`], [`ResultCollection`], [`Flags`])
//! - Configuration ([`AppConfig`], config loading)
//! - Vocabulary constants ([`namespace`])

pub mod config;
pub mod error;
pub mod namespace;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BotConfig, FoursquareConfig, MaintainerConfig, SearchConfig, StorageConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, save_config_to,
    set_credentials,
};
pub use error::{Result, VenueBotError};
pub use types::{
    Credentials, FindResult, Flags, Literal, MessageKind, Request, Response, ResultCollection,
    StoragePayload,
};
