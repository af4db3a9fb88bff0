//! Password hashing for stored user records.
//!
//! Stored form is `<salt hex>$<key hex>`: a per-user 16-byte random salt and
//! a 32-byte PBKDF2-HMAC-SHA256 key.

use rand::RngCore;
use sha2::Sha256;

const SALT_BYTES: usize = 16;
const KEY_BYTES: usize = 32;
const PBKDF2_ROUNDS: u32 = 100_000;

/// Salt used to burn the same work when the user does not exist.
const DUMMY_SALT: [u8; SALT_BYTES] = [0; SALT_BYTES];

fn derive(password: &str, salt: &[u8]) -> [u8; KEY_BYTES] {
    pbkdf2::pbkdf2_hmac_array::<Sha256, KEY_BYTES>(password.as_bytes(), salt, PBKDF2_ROUNDS)
}

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    format!("{}${}", hex::encode(salt), hex::encode(derive(password, &salt)))
}

/// Check `password` against a stored `salt$key` string. Anything that does
/// not parse never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parsed = stored
        .split_once('$')
        .and_then(|(salt, key)| Some((hex::decode(salt).ok()?, hex::decode(key).ok()?)));
    let Some((salt, expected)) = parsed else {
        return false;
    };
    if salt.is_empty() || expected.len() != KEY_BYTES {
        return false;
    }

    let attempt = derive(password, &salt);
    // Touch every byte regardless of where the first mismatch is.
    attempt
        .iter()
        .zip(&expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Spend one derivation worth of time so a missing account is not
/// distinguishable by latency from a wrong password.
pub fn burn_verification(password: &str) {
    let _ = derive(password, &DUMMY_SALT);
}
