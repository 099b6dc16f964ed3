//! Server-held secret material: vault ids, delete tokens, metadata HMAC,
//! and session capability tokens
//!
//! None of these carry decryption capability. The session token only
//! authorizes chunk retrieval for one vault for a few minutes after a
//! view has been granted; the delete token only authorizes deletion and
//! is stored hash-only at rest.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Entropy in a vault id (192-bit, above the 128-bit floor).
const VAULT_ID_BYTES: usize = 24;

/// Entropy in a delete token.
const DELETE_TOKEN_BYTES: usize = 32;

/// The server's HMAC secret for metadata tags and session tokens.
#[derive(Clone)]
pub struct ServerSecret {
    bytes: [u8; 32],
}

impl ServerSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Random per-process secret. Sessions and metadata tags do not
    /// survive a restart with an ephemeral secret; production deploys
    /// load a stable one from the environment.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.bytes).expect("HMAC accepts any key length")
    }
}

impl std::fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Random opaque vault identifier, base64url.
pub fn generate_vault_id() -> String {
    let mut bytes = [0u8; VAULT_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random delete token, base64url. Returned once to the sender; only its
/// hash is persisted.
pub fn generate_delete_token() -> String {
    let mut bytes = [0u8; DELETE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of a token, hex. What the vault record stores.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time comparison of a presented token against a stored hash.
pub fn token_matches(token: &str, stored_hash: &str) -> bool {
    let presented = hash_token(token);
    if presented.len() != stored_hash.len() {
        return false;
    }
    presented
        .bytes()
        .zip(stored_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Tamper-evidence tag over the vault's policy-relevant fields.
///
/// Recomputed and compared whenever policy fields feed an access
/// decision; a mismatch means the record was altered behind the
/// controller's back.
pub fn metadata_hmac(
    secret: &ServerSecret,
    vault_id: &str,
    merkle_root: &str,
    expires_at: u64,
    max_views: u32,
) -> String {
    let mut mac = secret.mac();
    mac.update(b"cinder-metadata-v1\n");
    mac.update(vault_id.as_bytes());
    mac.update(b"\n");
    mac.update(merkle_root.as_bytes());
    mac.update(b"\n");
    mac.update(&expires_at.to_be_bytes());
    mac.update(&max_views.to_be_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Issue a session token bound to `vault_id`, valid until `now + ttl`.
///
/// Format: base64url(`vault_id \n expiry \n hmac_hex`). Carries
/// retrieval capability only, no key material.
pub fn issue_session(secret: &ServerSecret, vault_id: &str, now: u64, ttl_secs: u64) -> String {
    let expiry = now + ttl_secs;
    let tag = session_tag(secret, vault_id, expiry);
    URL_SAFE_NO_PAD.encode(format!("{vault_id}\n{expiry}\n{tag}"))
}

/// Check a session token against the vault it claims and the clock.
pub fn verify_session(secret: &ServerSecret, token: &str, vault_id: &str, now: u64) -> bool {
    let Ok(raw) = URL_SAFE_NO_PAD.decode(token) else {
        return false;
    };
    let Ok(text) = String::from_utf8(raw) else {
        return false;
    };
    let mut parts = text.splitn(3, '\n');
    let (Some(token_vault), Some(expiry_str), Some(tag_hex)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let Ok(expiry) = expiry_str.parse::<u64>() else {
        return false;
    };
    let Ok(tag) = hex::decode(tag_hex) else {
        return false;
    };

    if token_vault != vault_id || expiry <= now {
        return false;
    }

    let mut mac = secret.mac();
    mac.update(b"cinder-session-v1\n");
    mac.update(token_vault.as_bytes());
    mac.update(b"\n");
    mac.update(&expiry.to_be_bytes());
    mac.verify_slice(&tag).is_ok()
}

fn session_tag(secret: &ServerSecret, vault_id: &str, expiry: u64) -> String {
    let mut mac = secret.mac();
    mac.update(b"cinder-session-v1\n");
    mac.update(vault_id.as_bytes());
    mac.update(b"\n");
    mac.update(&expiry.to_be_bytes());
    hex::encode(mac.finalize().into_bytes())
}
