//! cinder-transfer: drives the full sender and receiver sequences
//!
//! Sender: chunk → encrypt → hash → Merkle root → register vault →
//! upload chunks (idempotent retries) → finalize. Receiver: fetch
//! metadata → re-derive keys → password check (strictly before any
//! view-consuming call) → access → download → hash + Merkle verify →
//! decrypt → reassemble.
//!
//! No cryptographic logic lives here; this crate sequences the crypto
//! engine against the access controller. The content key travels only
//! inside [`SendOutcome::key_fragment`]: the caller puts it in the
//! link fragment, never in a request.

pub mod recv;
pub mod send;

pub use recv::{receive, ReceiveOutcome};
pub use send::{send, ChunkPipeline, EncryptedChunk, SendOptions, SendOutcome};

use cinder_core::CinderError;
use cinder_crypto::CryptoError;

/// Default plaintext chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

pub(crate) fn crypto_err(e: CryptoError) -> CinderError {
    match e {
        CryptoError::Integrity => CinderError::Integrity("decryption failed".into()),
        CryptoError::InvalidInput(msg) => CinderError::Validation(msg),
        CryptoError::Kdf(msg) => CinderError::Validation(msg),
    }
}
