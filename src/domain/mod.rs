//! Domain layer
//!
//! Pure data types shared by the cache layers, the search engine and the
//! indexing coordinator. Nothing here performs I/O.
//!
//! - `vault`: vault records, per-kind metadata, discovery types
//! - `sensitive`: the redacting [`SecretString`] used for values and passwords
//! - `hit`: search results derived from cached records

pub mod hit;
pub mod sensitive;
pub mod vault;

pub use hit::{MatchField, SearchHit};
pub use sensitive::SecretString;
pub use vault::{
    CertMeta, KeyMeta, Resource, ResourceMeta, ResourceRef, ResourceType, SecretMeta,
    SessionVaultRecord, Subscription, VaultInfo, VaultRecord,
};
