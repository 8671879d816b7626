//! # Cache Layers
//!
//! - [`persistent`]: password-encrypted, metadata-only store that survives restarts
//! - [`ephemeral`]: session-keyed in-memory store that may also hold values
//!
//! Both are keyed by vault identifier and replace a vault's record as a whole.

pub mod ephemeral;
pub mod persistent;

pub use ephemeral::{EphemeralSessionIndex, SessionSearchOptions};
pub use persistent::{CacheFiles, CacheStats, LoadOutcome, PersistentVaultCache};
