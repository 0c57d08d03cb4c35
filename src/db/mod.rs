//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: view models returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `yt_likesbot::db` — we re-export the
//! repository API and commonly used models for convenience.

pub mod model;
pub mod repo;

// Re-export the repository API at `crate::db::*`.
pub use repo::*;

pub use model::StoreStats;
