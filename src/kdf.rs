//! Deterministic key derivation from a passphrase and salt.
//!
//! A single entry point, [`derive`], dispatches on a version tag so that
//! future algorithm changes don't require touching every call site — only
//! version 1 (scrypt) exists today.

use crate::error::KdfError;
use rand::rngs::OsRng;
use rand::RngCore;

/// Salt length in bytes, fixed across all kdf versions.
pub const SALT_LEN: usize = 32;

/// scrypt parameters for kdf version 1: `N = 2^19, r = 8, p = 1`.
const V1_LOG_N: u8 = 19;
const V1_R: u32 = 8;
const V1_P: u32 = 1;

/// Derived key length for kdf version 1: `32 + 32 + 16 + 16` (the cipher
/// suite's four sub-keys, see [`crate::cipher_suite`]).
pub const V1_KEY_SIZE: usize = 96;

/// Returns the derived key length for a given kdf version.
pub fn key_size(version: u32) -> Result<usize, KdfError> {
  match version {
    1 => Ok(V1_KEY_SIZE),
    v => Err(KdfError::UnsupportedVersion(v)),
  }
}

/// Generates a fresh, cryptographically random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
  let mut salt = [0u8; SALT_LEN];
  OsRng.fill_bytes(&mut salt);
  salt
}

/// Derives `key_size(version)` bytes from `passphrase` and `salt`.
pub fn derive(version: u32, passphrase: &str, salt: &[u8]) -> Result<Vec<u8>, KdfError> {
  if salt.len() != SALT_LEN {
    return Err(KdfError::InvalidSalt { expected: SALT_LEN, got: salt.len() });
  }

  match version {
    1 => derive_v1(passphrase, salt),
    v => Err(KdfError::UnsupportedVersion(v)),
  }
}

fn derive_v1(passphrase: &str, salt: &[u8]) -> Result<Vec<u8>, KdfError> {
  let params = scrypt::Params::new(V1_LOG_N, V1_R, V1_P, V1_KEY_SIZE)
    .map_err(|e| KdfError::Derivation(format!("scrypt params: {e}")))?;

  let mut key = vec![0u8; V1_KEY_SIZE];
  scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut key)
    .map_err(|e| KdfError::Derivation(format!("scrypt: {e}")))?;

  Ok(key)
}

/// Generates a fresh random alphanumeric passphrase of the given length, used
/// by [`crate::envelope::Params::rekey_all`].
pub fn random_passphrase(len: usize) -> String {
  use rand::distributions::Alphanumeric;
  use rand::Rng;

  OsRng.sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn derive_is_deterministic() {
    let salt = generate_salt();
    let a = derive(1, "hunter42", &salt).unwrap();
    let b = derive(1, "hunter42", &salt).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), V1_KEY_SIZE);
  }

  #[test]
  fn different_passphrases_differ() {
    let salt = generate_salt();
    let a = derive(1, "hunter42", &salt).unwrap();
    let b = derive(1, "hunter43", &salt).unwrap();
    assert_ne!(a, b);
  }

  #[test]
  fn rejects_bad_salt_len() {
    assert!(matches!(derive(1, "x", &[0u8; 4]), Err(KdfError::InvalidSalt { .. })));
  }

  #[test]
  fn rejects_unsupported_version() {
    let salt = generate_salt();
    assert!(matches!(derive(2, "x", &salt), Err(KdfError::UnsupportedVersion(2))));
  }

  #[test]
  fn random_passphrase_has_requested_length_and_charset() {
    let p = random_passphrase(32);
    assert_eq!(p.len(), 32);
    assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
  }
}
