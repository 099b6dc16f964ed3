//! cinder-store: persistence for vault records and ciphertext blobs
//!
//! Two narrow interfaces, per the core's storage contract:
//!   - [`VaultStore`]: single-document metadata store with two atomic
//!     primitives (`consume_view`, `record_failed_attempt`) plus ordinary
//!     read-modify-write for everything else
//!   - [`BlobStore`]: content-addressable byte store
//!     (`put`/`get`/`delete`), timeout-bounded, backed by OpenDAL
//!
//! [`MemoryVaultStore`] is the in-process implementation used by the
//! daemon and by tests; a distributed deployment swaps in a store whose
//! `consume_view` maps to the backend's conditional-update primitive.

pub mod blob;
pub mod record;

pub use blob::BlobStore;
pub use record::{MemoryVaultStore, VaultStore};
