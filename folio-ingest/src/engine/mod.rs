//! The reconciliation engine
//!
//! Pure, CPU-bound document transformations: annotation, merging, key
//! extraction and the revisions view. Nothing in this module touches a
//! store; purity here is the main correctness lever for the pipeline.

pub mod annotate;
pub mod enrich;
pub mod keys;
pub mod merge;
pub mod node;
pub mod revisions;
