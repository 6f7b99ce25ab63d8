//! # Folio Common Library
//!
//! Shared code for the Folio metadata services including:
//! - Error types and the Permanent/Temporary disposition model
//! - Configuration loading
//! - Canonical JSON serialization and source hashing
//! - Event types (FolioEvent enum) and the EventBus

pub mod canonical;
pub mod config;
pub mod error;
pub mod events;

pub use error::{Disposition, Error, Result};
