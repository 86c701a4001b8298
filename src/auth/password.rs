use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

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

/// Rolling 32-bit hash written by earlier clients: `h = h * 31 + unit` over
/// UTF-16 code units with signed wraparound, rendered as signed hex.
/// Not a password hash; only used to recognise records that predate Argon2.
pub fn legacy_hash(plain: &str) -> String {
    let h = plain
        .encode_utf16()
        .fold(0i32, |h, unit| (h << 5).wrapping_sub(h).wrapping_add(unit as i32));
    if h < 0 {
        format!("-{:x}", -(h as i64))
    } else {
        format!("{:x}", h)
    }
}

/// True when the stored hash is in the legacy format rather than a PHC string.
pub fn is_legacy_hash(hash: &str) -> bool {
    !hash.starts_with('$')
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    if is_legacy_hash(hash) {
        return Ok(legacy_hash(plain) == hash);
    }
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
