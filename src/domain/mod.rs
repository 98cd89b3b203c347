//! Domain types
//!
//! Document analysis shapes, attachment kinds and the persisted mapping
//! documents.

pub mod analysis;
pub mod attachment;
pub mod mapping;
