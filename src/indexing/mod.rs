//! # Indexing
//!
//! Crawls every vault reachable through a [`crate::source::VaultDataSource`]
//! and writes the results into the cache layers.
//!
//! At most one pass runs at a time. A vault that fails or times out is
//! recorded in the pass report and the pass moves on.

pub mod coordinator;
pub mod job;
pub mod scheduler;

pub use coordinator::{CoordinatorBuilder, CoordinatorSettings, IndexingCoordinator, PassHandle};
pub use job::{IndexFailure, IndexingJob, JobStatus, PassOutcome, PassReport};
pub use scheduler::{spawn_scheduler, SchedulerHandle};
