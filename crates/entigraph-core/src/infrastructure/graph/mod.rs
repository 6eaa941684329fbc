//! Entity graph infrastructure implementations
//!
//! This module contains concrete implementations of the graph repository
//! traits and the message source using SQLite.

mod messages;
mod repository;

pub use messages::SqliteMessageSource;
pub use repository::SqliteGraphRepository;
