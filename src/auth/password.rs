//! Salted double-MD5 password derivation.
//!
//! Stored hashes must stay bit-compatible with existing databases:
//! `hex(md5(hex(md5(password)) + hex(md5(salt))))`, where the salt itself is
//! the hex encoding of 16 random bytes.

use md5::{Digest, Md5};
use rand::Rng;

use crate::types::PasswordChange;

const SALT_BYTES: usize = 16;

fn md5_hex(input: &[u8]) -> String {
    hex::encode(Md5::digest(input))
}

/// Generates a fresh random salt.
#[must_use]
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[must_use]
pub fn derive(password: &str, salt: &str) -> String {
    let hashed_input = md5_hex(password.as_bytes());
    let hashed_salt = md5_hex(salt.as_bytes());
    md5_hex(format!("{hashed_input}{hashed_salt}").as_bytes())
}

/// Recomputes the hash from `password` and the stored salt and compares it
/// with the stored hash.
#[must_use]
pub fn verify(password: &str, salt: &str, stored_hash: &str) -> bool {
    derive(password, salt) == stored_hash
}

/// Derives credentials for a new or changed password with a fresh salt.
#[must_use]
pub fn hash_new(password: &str) -> PasswordChange {
    let salt = generate_salt();
    PasswordChange {
        password_hash: derive(password, &salt),
        salt,
    }
}
