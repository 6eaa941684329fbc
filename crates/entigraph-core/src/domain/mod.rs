//! Domain layer
//!
//! Contains the entity graph model and the services that maintain it.

pub mod graph;
