//! # atelier-rehydrate
//!
//! Startup for the Atelier media catalog. A [`Rehydrator`] loads and merges
//! the persisted partitions, repairs dangling folder references, ensures
//! the system folders, and then starts a [`MigrationScan`] that moves
//! inline-encoded assets to durable storage without blocking startup.

pub mod migration;
pub mod rehydrator;

pub use migration::{migrate_inline_references, MigrationReport, MigrationScan};
pub use rehydrator::{Rehydrated, Rehydrator};
