//! Fresh key material from the OS CSPRNG.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde_json::{json, Value};

use crate::config::defaults::{ENCRYPTION_CIPHER, GENERATED_KEY_BYTES, GENERATED_SECRET_LEN};

const SECRET_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*(-_=+)";

const PASSWORD_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Base64 of 32 random bytes.
pub fn generate_base64_key() -> String {
    let mut bytes = [0u8; GENERATED_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// 64-character framework secret.
pub fn generate_secret_key() -> String {
    random_string(SECRET_CHARSET, GENERATED_SECRET_LEN)
}

/// Alphanumeric password, safe to embed in URLs and env files unquoted.
pub fn generate_password() -> String {
    random_string(PASSWORD_CHARSET, 32)
}

fn random_string(charset: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| char::from(charset[OsRng.gen_range(0..charset.len())]))
        .collect()
}

/// One active encryption-key entry. Returns the entry and its id.
pub fn encryption_key_entry() -> (Value, String) {
    let id = uuid::Uuid::new_v4().to_string();
    let entry = json!({
        "id": id,
        "key": generate_base64_key(),
        "cipher": ENCRYPTION_CIPHER,
        "revoked": false,
    });
    (entry, id)
}

/// A one-entry key list serialized as compact JSON, plus the entry's id.
pub fn generate_encryption_keys() -> (String, String) {
    let (entry, id) = encryption_key_entry();
    (Value::Array(vec![entry]).to_string(), id)
}
