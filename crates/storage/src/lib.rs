//! Store abstraction and SQLite backend for rdburn.
//!
//! This crate provides a trait-based store interface with a SQLite
//! implementation backed by sqlx.

#![warn(missing_docs)]

pub mod sqlite_store;
pub mod trait_;

pub use sqlite_store::SqliteStore;
pub use trait_::{Result, Store, StoreError};
