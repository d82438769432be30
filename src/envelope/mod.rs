//! Versioned envelope file format (§3, §4.2-§4.4).
//!
//! On disk:
//!
//! ```text
//! MAGIC(8) VERSION(4 ascii digits) N_USERS(4 ascii digits)
//! single-user:  SALT(32) IV(16)
//! multi-user:   N x [ SHA256(name)(32) SALT(32) IV(16) MKEY(32) ]  IVM(16)
//! cascade_encrypt( SHA512(header || plaintext) || plaintext )
//! ```
//!
//! `N_USERS == 0` marks the single-user layout. In the multi-user layout the
//! payload is encrypted under the shared master key; each user's own
//! key/salt/iv only unlocks that user's copy of the master key (`MKEY`,
//! encrypted unpadded via [`cipher_suite::encrypt_raw`]).

pub mod params;

pub use params::{Params, ParamsDiff};

use crate::cipher_suite;
use crate::error::EnvelopeError;
use crate::kdf;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

/// 8-byte file magic.
pub const MAGIC: &[u8; 8] = b"VAULTLOG";

/// Current on-disk format version. Stored as 4 ASCII digits in the header.
pub const VERSION: u32 = 1;

const SHA256_LEN: usize = 32;
const MKEY_LEN: usize = cipher_suite::KEY_LEN;
const DIGEST_LEN: usize = 64;

/// How the caller is authenticating to the envelope.
pub enum Credential<'a> {
  /// Derive the key from a passphrase, paying the full kdf cost.
  Passphrase(&'a str),
  /// Skip derivation: an already-derived key plus the salt it came from.
  /// Used by the sync engine, which keeps keys resident across a session.
  KeyAndSalt { key: &'a [u8], salt: &'a [u8] },
}

fn format_digits(value: u32) -> [u8; 4] {
  let s = format!("{value:04}");
  debug_assert_eq!(s.len(), 4, "value {value} does not fit in 4 ascii digits");
  let mut out = [0u8; 4];
  out.copy_from_slice(s.as_bytes());
  out
}

fn parse_digits(bytes: &[u8]) -> Result<u32, EnvelopeError> {
  let s = std::str::from_utf8(bytes)
    .map_err(|_| EnvelopeError::InvalidFileFormat("header digits are not utf8".into()))?;
  s.parse()
    .map_err(|_| EnvelopeError::InvalidFileFormat(format!("header digits {s:?} are not a number")))
}

struct Header {
  version: u32,
  n_users: u32,
  body_start: usize,
}

fn parse_header(data: &[u8]) -> Result<Header, EnvelopeError> {
  if data.len() < 16 {
    return Err(EnvelopeError::InvalidFileFormat("truncated header".into()));
  }
  if &data[0..8] != MAGIC {
    return Err(EnvelopeError::InvalidFileFormat("bad magic".into()));
  }
  let version = parse_digits(&data[8..12])?;
  let n_users = parse_digits(&data[12..16])?;
  Ok(Header { version, n_users, body_start: 16 })
}

fn write_header(out: &mut Vec<u8>, n_users: u32) {
  out.extend_from_slice(MAGIC);
  out.extend_from_slice(&format_digits(VERSION));
  out.extend_from_slice(&format_digits(n_users));
}

fn digest_prefixed(header_and_params: &[u8], plaintext: &[u8]) -> Vec<u8> {
  let mut hasher = Sha512::new();
  hasher.update(header_and_params);
  hasher.update(plaintext);
  let digest = hasher.finalize();

  let mut out = Vec::with_capacity(DIGEST_LEN + plaintext.len());
  out.extend_from_slice(&digest);
  out.extend_from_slice(plaintext);
  out
}

fn resolve_credential(cred: &Credential<'_>, existing_salt: Option<&[u8]>) -> Result<(Vec<u8>, Vec<u8>), EnvelopeError> {
  match cred {
    Credential::KeyAndSalt { key, salt } => Ok((key.to_vec(), salt.to_vec())),
    Credential::Passphrase(passphrase) => {
      let salt = match existing_salt {
        Some(s) => s.to_vec(),
        None => kdf::generate_salt().to_vec(),
      };
      let key = kdf::derive(VERSION, passphrase, &salt).map_err(|_| EnvelopeError::InvalidKey)?;
      Ok((key, salt))
    }
  }
}

/// Encrypts `plaintext` to a brand new single-user envelope.
pub fn encrypt_single_user(params: &Params, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
  if params.n_users != 0 {
    return Err(EnvelopeError::InvalidFileFormat("params is multi-user".into()));
  }
  if params.kdf_version != VERSION {
    return Err(EnvelopeError::NeedFullRekey);
  }

  let key = params.opener_key().ok_or(EnvelopeError::InvalidKey)?;
  let salt = &params.salts[0];
  let iv = params.ivs.first().copied().flatten().unwrap_or_else(params::Params::fresh_iv);

  let mut header = Vec::new();
  write_header(&mut header, 0);
  header.extend_from_slice(salt);
  header.extend_from_slice(&iv);

  let body = digest_prefixed(&header, plaintext);
  let ciphertext = cipher_suite::encrypt(key, &iv, &body)?;

  let mut out = header;
  out.extend_from_slice(&ciphertext);
  Ok(out)
}

/// Encrypts `plaintext` to a multi-user envelope under `params`'s shared
/// master key, (re)generating any missing per-user IV/master-key slots.
pub fn encrypt_multi_user(params: &mut Params, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
  if params.n_users == 0 {
    return Err(EnvelopeError::InvalidFileFormat("params is single-user".into()));
  }
  if params.kdf_version != VERSION {
    return Err(EnvelopeError::NeedFullRekey);
  }

  let master = params.master.clone().ok_or(EnvelopeError::InvalidKey)?;
  let ivm = params.ivm.unwrap_or_else(params::Params::fresh_iv);
  params.ivm = Some(ivm);

  for i in 0..params.users.len() {
    if params.ivs[i].is_none() {
      params.ivs[i] = Some(params::Params::fresh_iv());
    }
    if params.mkeys[i].is_none() {
      let key = params.keys[i].as_deref().ok_or(EnvelopeError::InvalidKey)?;
      let iv = params.ivs[i].expect("just set above");
      let mkey = cipher_suite::encrypt_raw(key, &iv, &master)?;
      params.mkeys[i] = Some(mkey);
    }
  }

  let mut header = Vec::new();
  write_header(&mut header, params.n_users);
  for i in 0..params.users.len() {
    header.extend_from_slice(&params.users[i]);
    header.extend_from_slice(&params.salts[i]);
    header.extend_from_slice(&params.ivs[i].expect("filled above"));
    header.extend_from_slice(params.mkeys[i].as_deref().expect("filled above"));
  }
  header.extend_from_slice(&ivm);

  let body = digest_prefixed(&header, plaintext);
  let ciphertext = cipher_suite::encrypt(&master, &ivm, &body)?;

  let mut out = header;
  out.extend_from_slice(&ciphertext);
  Ok(out)
}

/// Result of a successful [`decrypt`]: the recovered plaintext plus the
/// `Params` reconstructed from the file (so the caller can inspect users,
/// rekey, or re-encrypt without re-deriving everything).
pub struct Opened {
  pub plaintext: Vec<u8>,
  pub params: Params,
}

fn verify_and_strip(body: &[u8], header: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
  if body.len() < DIGEST_LEN {
    return Err(EnvelopeError::InvalidFileFormat("body shorter than digest".into()));
  }
  let (digest, plaintext) = body.split_at(DIGEST_LEN);

  let mut hasher = Sha512::new();
  hasher.update(header);
  hasher.update(plaintext);
  let expected = hasher.finalize();

  if digest.ct_eq(expected.as_slice()).unwrap_u8() != 1 {
    return Err(EnvelopeError::WrongPassphrase);
  }
  Ok(plaintext.to_vec())
}

/// Decrypts an envelope file, dispatching on its header to the single- or
/// multi-user path. `user` selects which slot to open in a multi-user file;
/// ignored for single-user files.
pub fn decrypt(data: &[u8], cred: Credential<'_>, user: Option<&str>) -> Result<Opened, EnvelopeError> {
  let header = parse_header(data)?;
  if header.version != VERSION {
    return Err(EnvelopeError::InvalidFileFormat(format!(
      "unsupported envelope version {}",
      header.version
    )));
  }

  if header.n_users == 0 {
    decrypt_single_user(data, &header, cred)
  } else {
    decrypt_multi_user(data, &header, cred, user)
  }
}

fn decrypt_single_user(data: &[u8], header: &Header, cred: Credential<'_>) -> Result<Opened, EnvelopeError> {
  let rest = &data[header.body_start..];
  if rest.len() < kdf::SALT_LEN + params::IV_LEN {
    return Err(EnvelopeError::InvalidFileFormat("truncated single-user header".into()));
  }
  let salt = &rest[..kdf::SALT_LEN];
  let iv_bytes = &rest[kdf::SALT_LEN..kdf::SALT_LEN + params::IV_LEN];
  let mut iv = [0u8; params::IV_LEN];
  iv.copy_from_slice(iv_bytes);
  let ciphertext = &rest[kdf::SALT_LEN + params::IV_LEN..];

  let (key, salt) = resolve_credential(&cred, Some(salt))?;

  let header_prefix_end = header.body_start + kdf::SALT_LEN + params::IV_LEN;
  let header_bytes = &data[..header_prefix_end];

  let body = cipher_suite::decrypt(&key, &iv, ciphertext)?;
  let plaintext = verify_and_strip(&body, header_bytes)?;

  let mut params = Params::new_single_user(key, salt);
  params.ivs = vec![Some(iv)];
  Ok(Opened { plaintext, params })
}

fn decrypt_multi_user(
  data: &[u8],
  header: &Header,
  cred: Credential<'_>,
  user: Option<&str>,
) -> Result<Opened, EnvelopeError> {
  let user = user.filter(|u| !u.is_empty()).ok_or(EnvelopeError::NeedUser)?;
  let target_sha: [u8; 32] = {
    let mut hasher = sha2::Sha256::new();
    hasher.update(user.as_bytes());
    hasher.finalize().into()
  };

  let slot_len = SHA256_LEN + kdf::SALT_LEN + params::IV_LEN + MKEY_LEN;
  let mut users = Vec::with_capacity(header.n_users as usize);
  let mut salts = Vec::with_capacity(header.n_users as usize);
  let mut ivs = Vec::with_capacity(header.n_users as usize);
  let mut mkeys = Vec::with_capacity(header.n_users as usize);

  let mut cursor = header.body_start;
  for _ in 0..header.n_users {
    if data.len() < cursor + slot_len {
      return Err(EnvelopeError::InvalidFileFormat("truncated user slot".into()));
    }
    let slot = &data[cursor..cursor + slot_len];
    let mut sha = [0u8; SHA256_LEN];
    sha.copy_from_slice(&slot[0..SHA256_LEN]);
    let salt = slot[SHA256_LEN..SHA256_LEN + kdf::SALT_LEN].to_vec();
    let mut iv = [0u8; params::IV_LEN];
    iv.copy_from_slice(&slot[SHA256_LEN + kdf::SALT_LEN..SHA256_LEN + kdf::SALT_LEN + params::IV_LEN]);
    let mkey = slot[SHA256_LEN + kdf::SALT_LEN + params::IV_LEN..].to_vec();

    users.push(sha);
    salts.push(salt);
    ivs.push(Some(iv));
    mkeys.push(Some(mkey));
    cursor += slot_len;
  }

  if data.len() < cursor + params::IV_LEN {
    return Err(EnvelopeError::InvalidFileFormat("truncated ivm".into()));
  }
  let mut ivm = [0u8; params::IV_LEN];
  ivm.copy_from_slice(&data[cursor..cursor + params::IV_LEN]);
  cursor += params::IV_LEN;

  let header_bytes = &data[..cursor];
  let ciphertext = &data[cursor..];

  let index = users
    .iter()
    .position(|s| s == &target_sha)
    .ok_or(EnvelopeError::UnknownUser)?;

  let (key, salt) = resolve_credential(&cred, Some(&salts[index]))?;
  let iv = ivs[index].expect("filled above");
  let mkey_ct = mkeys[index].as_deref().expect("filled above");
  let master = cipher_suite::decrypt_raw(&key, &iv, mkey_ct)?;

  let body = cipher_suite::decrypt(&master, &ivm, ciphertext)?;
  let plaintext = verify_and_strip(&body, header_bytes)?;

  let mut keys = vec![None; users.len()];
  keys[index] = Some(zeroize::Zeroizing::new(key));
  let mut all_salts = salts;
  all_salts[index] = salt;

  let params = Params {
    n_users: header.n_users,
    user: index,
    users,
    keys,
    salts: all_salts,
    ivs,
    mkeys,
    ivm: Some(ivm),
    master: Some(zeroize::Zeroizing::new(master)),
    kdf_version: header.version,
  };

  Ok(Opened { plaintext, params })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_user_roundtrip() {
    let params = Params::create_single_user("correct horse battery staple").unwrap();
    let plaintext = b"{\"entries\":{}}";
    let file = encrypt_single_user(&params, plaintext).unwrap();

    let opened = decrypt(&file, Credential::Passphrase("correct horse battery staple"), None).unwrap();
    assert_eq!(opened.plaintext, plaintext);
  }

  #[test]
  fn single_user_wrong_passphrase_fails() {
    let params = Params::create_single_user("right passphrase").unwrap();
    let file = encrypt_single_user(&params, b"secret data").unwrap();

    let err = decrypt(&file, Credential::Passphrase("wrong passphrase"), None).unwrap_err();
    assert!(matches!(err, EnvelopeError::WrongPassphrase));
  }

  #[test]
  fn multi_user_roundtrip_each_user_can_open() {
    let mut params = Params::create_single_user("owner pass").unwrap();
    let salt_a = kdf::generate_salt().to_vec();
    let key_a = kdf::derive(1, "alice pass", &salt_a).unwrap();
    params.add_user("alice", key_a, salt_a).unwrap();
    let salt_b = kdf::generate_salt().to_vec();
    let key_b = kdf::derive(1, "bob pass", &salt_b).unwrap();
    params.add_user("bob", key_b, salt_b).unwrap();

    let plaintext = b"{\"entries\":{\"x\":1}}";
    let file = encrypt_multi_user(&mut params, plaintext).unwrap();

    let opened_alice = decrypt(&file, Credential::Passphrase("alice pass"), Some("alice")).unwrap();
    assert_eq!(opened_alice.plaintext, plaintext);

    let opened_bob = decrypt(&file, Credential::Passphrase("bob pass"), Some("bob")).unwrap();
    assert_eq!(opened_bob.plaintext, plaintext);
  }

  #[test]
  fn multi_user_unknown_user_rejected() {
    let mut params = Params::create_single_user("owner pass").unwrap();
    let salt_a = kdf::generate_salt().to_vec();
    let key_a = kdf::derive(1, "alice pass", &salt_a).unwrap();
    params.add_user("alice", key_a, salt_a).unwrap();

    let file = encrypt_multi_user(&mut params, b"data").unwrap();
    let err = decrypt(&file, Credential::Passphrase("alice pass"), Some("carol")).unwrap_err();
    assert!(matches!(err, EnvelopeError::UnknownUser));
  }

  #[test]
  fn multi_user_requires_user_name() {
    let mut params = Params::create_single_user("owner pass").unwrap();
    let salt_a = kdf::generate_salt().to_vec();
    let key_a = kdf::derive(1, "alice pass", &salt_a).unwrap();
    params.add_user("alice", key_a, salt_a).unwrap();

    let file = encrypt_multi_user(&mut params, b"data").unwrap();
    let err = decrypt(&file, Credential::Passphrase("alice pass"), None).unwrap_err();
    assert!(matches!(err, EnvelopeError::NeedUser));
  }

  #[test]
  fn encrypt_under_different_kdf_version_requires_full_rekey() {
    let mut params = Params::create_single_user("owner pass").unwrap();
    params.kdf_version = 2;
    let err = encrypt_single_user(&params, b"data").unwrap_err();
    assert!(matches!(err, EnvelopeError::NeedFullRekey));
  }

  #[test]
  fn multi_user_empty_user_name_is_need_user() {
    let mut params = Params::create_single_user("owner pass").unwrap();
    let salt_a = kdf::generate_salt().to_vec();
    let key_a = kdf::derive(1, "alice pass", &salt_a).unwrap();
    params.add_user("alice", key_a, salt_a).unwrap();

    let file = encrypt_multi_user(&mut params, b"data").unwrap();
    let err = decrypt(&file, Credential::Passphrase("alice pass"), Some("")).unwrap_err();
    assert!(matches!(err, EnvelopeError::NeedUser));
  }
}
