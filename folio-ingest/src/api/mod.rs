//! HTTP API handlers

pub mod entities;
pub mod health;
pub mod search;

pub use entities::{book_routes, contributor_routes};
pub use health::health_routes;
pub use search::search_routes;
