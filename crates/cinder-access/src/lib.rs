//! cinder-access: the server-side half of the protocol
//!
//! State machine over `upload_status × is_deleted × time × counters`:
//! ```text
//! pending --finalize(all chunks present)--> complete-accessible
//! pending --abort or stale timeout-------> terminal (swept later)
//! complete-accessible --views exhausted--> complete-inaccessible(no_views)
//! any --expires_at elapses--------------> complete-inaccessible(expired)
//! any --explicit delete-----------------> deleted
//! complete-accessible --failed_attempts-> complete-inaccessible(locked_out)
//! ```
//!
//! The controller never sees plaintext or key material: it stores
//! ciphertext chunks, checks policy, consumes views atomically, and
//! issues short-lived retrieval-only capability tokens.

pub mod access;
pub mod sweep;
pub mod tokens;

pub use access::{
    AccessController, AccessGrant, DenialReason, FailedAttemptResponse, InitVaultRequest,
    InitVaultResponse, PolicyRequest, UploadChunkResponse,
};
pub use sweep::{Reconciler, SweepStats};
pub use tokens::ServerSecret;
