// src/services/mod.rs

pub mod validator;    // gate in front of every entry write
pub mod similarity;   // token-overlap scoring for dedup
pub mod repository;   // the ONLY writer of entries/
pub mod query;        // read-only filters over the repository corpus
pub mod canonical;    // the ONLY writer of canonical/ and archive/
pub mod traceability; // git-correlated change records, written via canonical

// Public API
pub use canonical::{CanonicalManager, CanonicalWrite, ContextSnapshot};
pub use query::{DateRange, QueryEngine, QueryFilter, QueryPage, SortOrder, StoreStats};
pub use repository::{CreateOutcome, FossilRepository};
pub use similarity::{SimilarMatch, SimilarityEngine};
pub use traceability::{TraceabilityRecord, TraceabilityReport, TraceabilityTracker};
pub use validator::Validator;
