//! Versync Server Library
//!
//! Versioned incremental sync for clients that keep a local cache of
//! server-side entities. The server binary is in main.rs; the modules are
//! exposed for integration tests and for embedding the engine.
//!
//! # Modules
//!
//! - `sync`: version allocation, change log, deltas, conflicts, integrity
//! - `db`: SQLite pool and schema
//! - `routes`: HTTP surface

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod sync;
