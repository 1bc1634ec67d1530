// src/fossil/mod.rs

pub mod category; // fixed canonical categories
pub mod entry;    // ad hoc records, candidates, patches

pub use category::CanonicalCategory;
pub use entry::{
    content_hash, FossilEntry, FossilPatch, FossilSource, FossilType, Metadata, NewFossil,
    ValidEntry, VersionSnapshot,
};
