//! # Connections Module
//!
//! Drivers for the external durable stores the servers talk to. Currently
//! this is a single pooled PostgreSQL connection manager.

/// Pooled PostgreSQL connection manager.
pub mod db_postgres;
