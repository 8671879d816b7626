//! Service layer
//!
//! Components that compose the cache layers and the coordinator into the
//! operations the CLI and embedding applications call.

pub mod vault_index;

pub use vault_index::VaultIndexService;
