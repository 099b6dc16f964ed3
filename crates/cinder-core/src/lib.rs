//! cinder-core: shared types, config schema, and error types
//!
//! Everything here is plain data: the vault record model, the public
//! crypto parameter block, access policy, the error taxonomy, and the
//! TOML config schema. No I/O, no crypto.

pub mod config;
pub mod error;
pub mod types;

pub use error::{CinderError, CinderResult};
pub use types::{
    AccessPolicy, ChunkDescriptor, ChunkEntry, ContentType, CryptoParams, UploadStatus,
    VaultRecord, VaultSummary,
};

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
