use rand::rngs::OsRng;
use rand::RngCore;

const TOKEN_BYTES: usize = 32;

/// Issue an opaque capability token: 32 random bytes from the OS, hex encoded.
///
/// Uniqueness is enforced by the store's unique indexes, not here. Callers
/// re-issue when a write reports a unique violation.
pub fn issue() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Random lowercase hex of `len` bytes, for storage key suffixes.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
