//! Salted API key hashing.
//!
//! Stored form: `<salt>$<lowercase hex of sha256(salt || apikey)>`.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const DIGEST_HEX_LEN: usize = 64;

fn digest_hex(salt: &str, apikey: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(apikey.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash `apikey` under a fresh random salt.
pub fn hash_api_key(apikey: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    hash_with_salt(&salt, apikey)
}

/// Hash `apikey` under a given salt. The salt must not contain `$`.
pub fn hash_with_salt(salt: &str, apikey: &str) -> String {
    format!("{salt}${}", digest_hex(salt, apikey))
}

/// Whether `stored` has the `<salt>$<64 hex digits>` shape.
pub fn is_valid_hash(stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, digest)) => {
            !salt.is_empty()
                && digest.len() == DIGEST_HEX_LEN
                && digest.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Check `apikey` against a stored hash in constant time.
pub fn verify_api_key(apikey: &str, stored: &str) -> bool {
    if !is_valid_hash(stored) {
        return false;
    }
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let actual = digest_hex(salt, apikey);
    actual
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b.to_ascii_lowercase()))
        == 0
}
