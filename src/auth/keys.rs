use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::Rng;
use sha2::{Digest, Sha256};

const KEY_PREFIX: &str = "sk-twr-";
const KEY_RANDOM_LEN: usize = 32;
const SALT_LEN: usize = 16;

/// A freshly generated API key: the plaintext (shown once) and its hash.
#[derive(Debug)]
pub struct GeneratedKey {
    pub plaintext: String,
    /// Argon2 hash stored in the database.
    pub hash: String,
    /// Short display prefix for key listings (e.g. "sk-twr-a1b2c3d4...").
    pub prefix: String,
}

/// Generate a new API key with the format `sk-twr-{32 alphanumeric}`.
pub fn generate_api_key() -> Result<GeneratedKey, argon2::password_hash::Error> {
    let random_part = generate_random_alphanumeric(KEY_RANDOM_LEN);
    let plaintext = format!("{KEY_PREFIX}{random_part}");
    let prefix = format!("{KEY_PREFIX}{}...", &random_part[..8]);
    let hash = hash_key(&plaintext)?;

    Ok(GeneratedKey {
        plaintext,
        hash,
        prefix,
    })
}

/// Hash a plaintext API key using argon2id.
///
/// The key is SHA-256'd first so argon2 always gets a fixed-length input.
pub fn hash_key(plaintext: &str) -> Result<String, argon2::password_hash::Error> {
    let sha_digest = sha256_key(plaintext);
    let salt = generate_salt()?;
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(sha_digest.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn generate_salt() -> Result<SaltString, argon2::password_hash::Error> {
    let mut rng = rand::rng();
    let mut salt_bytes = [0u8; SALT_LEN];
    rng.fill(&mut salt_bytes);
    SaltString::encode_b64(&salt_bytes)
}

/// Verify a plaintext API key against a stored argon2 hash.
pub fn verify_key(plaintext: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let sha_digest = sha256_key(plaintext);
    let parsed_hash = PasswordHash::new(hash)?;
    Ok(Argon2::default()
        .verify_password(sha_digest.as_bytes(), &parsed_hash)
        .is_ok())
}

fn sha256_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_random_alphanumeric(len: usize) -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
