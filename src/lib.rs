#![forbid(unsafe_code)]

//! Database layer for the TechTalk backend.
//!
//! Two independent pieces share one connection string:
//! - [`db::DatabaseManager`] owns the pooled engine, creates application
//!   tables and hands out scoped sessions.
//! - [`db::migrate`] is the standalone additive patch that brings the
//!   `notifications` table of an already-deployed database up to date,
//!   shipped as the `run-migration` binary.

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable at least one database backend feature: `sqlite` or `postgres`");

pub mod config;
pub mod db;
pub mod utils;

pub use config::{DatabaseConfig, DbType};
pub use db::{DatabaseError, DatabaseManager, Session};
