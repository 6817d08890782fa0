//! Workspace placeholder crate.
//!
//! This crate exposes a feature flag that maps to the `core-service` crate so
//! host applications can depend on `offline-core-workspace`, enable
//! `desktop-shims`, and get the desktop adapters wired in without naming each
//! workspace crate.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
