use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::{error, warn};

lazy_static! {
    /// Real Argon2 digest that no account owns, so a login for an unknown
    /// email costs the same as one with a wrong password.
    static ref DUMMY_HASH: String =
        hash_password("no-account-has-this-password").expect("argon2 hashing with default params");
}

/// Argon2id hash in PHC string format with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// False on mismatch and on a digest that does not parse.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "stored password hash is malformed");
            return false;
        }
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Verifies against the account's digest, or against `DUMMY_HASH` when there
/// is no account. Always false in the latter case.
pub fn verify_password_or_dummy(plain: &str, hash: Option<&str>) -> bool {
    match hash {
        Some(hash) => verify_password(plain, hash),
        None => {
            let _ = verify_password(plain, &DUMMY_HASH);
            false
        }
    }
}
