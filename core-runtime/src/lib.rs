//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the offline core:
//! - Logging and tracing infrastructure
//! - Configuration management and host bridge injection
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one. It establishes the logging
//! conventions, the `CoreConfig` contract with the host, and the broadcast
//! channel that connectivity, sync, and media components publish to.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{
    ConnectivityConfig, CoreConfig, CoreConfigBuilder, DownloadConfig, MediaCacheConfig,
    SyncConfig,
};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
