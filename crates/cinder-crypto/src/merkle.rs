//! Ciphertext hashing and Merkle tree construction
//!
//! Chunk hashes are SHA-256 over ciphertext, never plaintext, so
//! integrity can be checked before any decryption is attempted and the
//! untrusted server can keep hash bookkeeping without seeing content.
//!
//! Tree rule (protocol constant, must match on both endpoints): leaves
//! are the ordered chunk digests; a level with an odd node count
//! duplicates its LAST node before pairing; an interior node is
//! SHA-256(left || right) over raw digest bytes; a single-leaf tree's
//! root is that leaf unchanged; an empty tree has no root.

use sha2::{Digest, Sha256};

use crate::{CryptoError, CryptoResult};

/// SHA-256 digest of a ciphertext chunk, as lowercase hex.
pub fn hash_chunk(ciphertext: &[u8]) -> String {
    hex::encode(Sha256::digest(ciphertext))
}

/// Compute the Merkle root of an ordered list of hex chunk digests.
///
/// Returns `Ok(None)` for an empty list. Fails if any leaf is not a
/// 64-char hex SHA-256 digest.
pub fn merkle_root(leaves: &[String]) -> CryptoResult<Option<String>> {
    if leaves.is_empty() {
        return Ok(None);
    }

    let mut level: Vec<[u8; 32]> = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let bytes = hex::decode(leaf)
            .map_err(|_| CryptoError::InvalidInput(format!("leaf is not hex: {leaf}")))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("leaf is not a 32-byte digest".into()))?;
        level.push(digest);
    }

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            // Odd level: duplicate the last node, never promote it
            let last = *level.last().unwrap_or(&[0u8; 32]);
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut hasher = Sha256::new();
                hasher.update(pair[0]);
                hasher.update(pair[1]);
                hasher.finalize().into()
            })
            .collect();
    }

    Ok(Some(hex::encode(level[0])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves_of(data: &[&[u8]]) -> Vec<String> {
        data.iter().map(|d| hash_chunk(d)).collect()
    }

    #[test]
    fn test_hash_chunk_hex_shape() {
        let h = hash_chunk(b"ciphertext bytes");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_list_has_no_root() {
        assert_eq!(merkle_root(&[]).unwrap(), None);
    }

    #[test]
    fn test_single_leaf_is_root_unchanged() {
        let leaf = hash_chunk(b"only chunk");
        let root = merkle_root(std::slice::from_ref(&leaf)).unwrap();
        assert_eq!(root, Some(leaf));
    }

    #[test]
    fn test_root_is_deterministic() {
        let leaves = leaves_of(&[b"a", b"b", b"c"]);
        let r1 = merkle_root(&leaves).unwrap();
        let r2 = merkle_root(&leaves).unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_root_is_order_sensitive() {
        let leaves = leaves_of(&[b"a", b"b", b"c"]);
        let mut reordered = leaves.clone();
        reordered.swap(0, 2);

        assert_ne!(
            merkle_root(&leaves).unwrap(),
            merkle_root(&reordered).unwrap()
        );
    }

    #[test]
    fn test_odd_level_duplicates_last_node() {
        // With three leaves [a, b, c] the bottom level pairs (a,b) and
        // (c,c); a rule that promoted c instead would pair the top level
        // as (ab, c) and produce a different root.
        let leaves = leaves_of(&[b"a", b"b", b"c"]);
        let root = merkle_root(&leaves).unwrap().unwrap();

        let d = |s: &str| -> [u8; 32] { hex::decode(s).unwrap().try_into().unwrap() };
        let pair = |l: [u8; 32], r: [u8; 32]| -> [u8; 32] {
            let mut h = Sha256::new();
            h.update(l);
            h.update(r);
            h.finalize().into()
        };

        let ab = pair(d(&leaves[0]), d(&leaves[1]));
        let cc = pair(d(&leaves[2]), d(&leaves[2]));
        let expected = hex::encode(pair(ab, cc));

        assert_eq!(root, expected);
    }

    #[test]
    fn test_invalid_leaf_rejected() {
        let result = merkle_root(&["not-hex!".to_string()]);
        assert!(matches!(result, Err(CryptoError::InvalidInput(_))));

        let short = merkle_root(&["abcd".to_string()]);
        assert!(matches!(short, Err(CryptoError::InvalidInput(_))));
    }

    proptest! {
        #[test]
        fn root_exists_for_nonempty_lists(count in 1usize..=33) {
            let leaves: Vec<String> = (0..count)
                .map(|i| hash_chunk(&[i as u8]))
                .collect();
            let root = merkle_root(&leaves).unwrap();
            prop_assert!(root.is_some());
            prop_assert_eq!(root.unwrap().len(), 64);
        }

        #[test]
        fn swapping_distinct_leaves_changes_root(
            count in 2usize..=17,
            i in 0usize..16,
            j in 0usize..16,
        ) {
            let i = i % count;
            let j = j % count;
            prop_assume!(i != j);

            let leaves: Vec<String> = (0..count)
                .map(|n| hash_chunk(&[n as u8]))
                .collect();
            let mut swapped = leaves.clone();
            swapped.swap(i, j);

            prop_assert_ne!(
                merkle_root(&leaves).unwrap(),
                merkle_root(&swapped).unwrap()
            );
        }
    }
}
