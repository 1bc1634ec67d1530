//! Fossil store: a deduplicating, queryable record store with stable-named
//! canonical snapshots, archive-before-overwrite history and git-correlated
//! traceability, all kept as plain files under one root.
//!
//! Layout under the root:
//!   entries/{id}.json                   ad hoc entries (repository)
//!   canonical/{category}.json           one live file per category
//!   canonical/context.yml               aggregate context view
//!   archive/{YYYY}/{MM}/{category}-*    immutable prior versions
//!   .locks/                             fs2 lock files
//!   logbook.jsonl                       append-only event log

pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod faults;
pub mod fossil;
pub mod services;
pub mod utils;
pub mod vcs;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{ensure_initialized, FossilStore, InitReport};
pub use config::StoreConfig;
pub use error::{FossilError, Result, ValidationIssue};
pub use fossil::{
    CanonicalCategory, FossilEntry, FossilPatch, FossilSource, FossilType, Metadata, NewFossil,
};
pub use services::{
    CanonicalWrite, CreateOutcome, DateRange, QueryFilter, QueryPage, SimilarMatch, SortOrder,
    StoreStats, TraceabilityRecord, TraceabilityReport,
};
pub use vcs::{Author, ChangeKind, FileChange, GitCli, StaticVcs, VersionControl};
