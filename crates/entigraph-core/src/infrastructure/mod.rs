//! Infrastructure layer
//!
//! Contains the SQLite implementations of the domain repositories.

pub mod graph;
