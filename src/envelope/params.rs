//! `Params`: the per-file encryption state (§3, §4.4).

use crate::cipher_suite;
use crate::error::EnvelopeError;
use crate::kdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Length of the per-stage IV fields (`iv`, `ivm`, `ivs[i]`).
pub const IV_LEN: usize = cipher_suite::IV_POOL_LEN;

/// Per-file encryption state. Single-user iff `n_users == 0`.
#[derive(Clone)]
pub struct Params {
  pub n_users: u32,
  pub user: usize,
  pub users: Vec<[u8; 32]>,
  pub keys: Vec<Option<Zeroizing<Vec<u8>>>>,
  pub salts: Vec<Vec<u8>>,
  pub ivs: Vec<Option<[u8; IV_LEN]>>,
  pub mkeys: Vec<Option<Vec<u8>>>,
  pub ivm: Option<[u8; IV_LEN]>,
  pub master: Option<Zeroizing<Vec<u8>>>,
  /// kdf version these credentials were derived under.
  pub kdf_version: u32,
}

impl std::fmt::Debug for Params {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Params")
      .field("n_users", &self.n_users)
      .field("user", &self.user)
      .field("users", &self.users.iter().map(|u| hex::encode(u)).collect::<Vec<_>>())
      .field("has_master", &self.master.is_some())
      .field("kdf_version", &self.kdf_version)
      .finish()
  }
}

/// Thin hex-encode helper so `Debug` never touches secret bytes.
mod hex {
  pub fn encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
  }
}

fn sha256(data: &[u8]) -> [u8; 32] {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hasher.finalize().into()
}

fn random_iv() -> [u8; IV_LEN] {
  let mut iv = [0u8; IV_LEN];
  OsRng.fill_bytes(&mut iv);
  iv
}

/// A single difference between a local `Params` and a remote one, consumed
/// by the sync engine to decide which credential updates to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamsDiff {
  AddUser { sha: [u8; 32], index: usize },
  DelUser { sha: [u8; 32] },
  DelSelf,
  RekeyUser { sha: [u8; 32], index: usize },
  RekeySelf { sha: [u8; 32] },
  MultiFile,
  SingleFile,
}

impl Params {
  /// Creates fresh single-user params for a brand new vault.
  pub fn create_single_user(passphrase: &str) -> Result<Params, EnvelopeError> {
    let salt = kdf::generate_salt().to_vec();
    let key = kdf::derive(1, passphrase, &salt).map_err(|_| EnvelopeError::InvalidKey)?;
    Ok(Params::new_single_user(key, salt))
  }

  /// Builds single-user params directly from an already-derived key/salt.
  pub fn new_single_user(key: Vec<u8>, salt: Vec<u8>) -> Params {
    Params {
      n_users: 0,
      user: 0,
      users: Vec::new(),
      keys: vec![Some(Zeroizing::new(key))],
      salts: vec![salt],
      ivs: Vec::new(),
      mkeys: Vec::new(),
      ivm: None,
      master: None,
      kdf_version: 1,
    }
  }

  /// Overwrites these params to a fresh single-user state, discarding every
  /// multi-user field.
  pub fn set_single_user(&mut self, key: Vec<u8>, salt: Vec<u8>) {
    *self = Params::new_single_user(key, salt);
  }

  /// Index of the slot whose name hashes to `sha`, if any.
  fn index_of(&self, sha: &[u8; 32]) -> Option<usize> {
    self.users.iter().position(|u| u == sha)
  }

  /// Appends a new user. The first call on a single-user `Params` converts
  /// it to multi-user, discarding the single slot.
  pub fn add_user(&mut self, name: &str, key: Vec<u8>, salt: Vec<u8>) -> Result<(), EnvelopeError> {
    if self.n_users == 0 {
      self.users.clear();
      self.keys.clear();
      self.salts.clear();
      self.ivs.clear();
      self.mkeys.clear();
      self.n_users = 0;
      if self.master.is_none() {
        let mut master = vec![0u8; cipher_suite::KEY_LEN];
        OsRng.fill_bytes(&mut master);
        self.master = Some(Zeroizing::new(master));
      }
    }

    let sha = sha256(name.as_bytes());
    if self.index_of(&sha).is_some() {
      return Err(EnvelopeError::DuplicateUser);
    }

    self.users.push(sha);
    self.keys.push(Some(Zeroizing::new(key)));
    self.salts.push(salt);
    self.ivs.push(None);
    self.mkeys.push(None);
    self.n_users += 1;
    Ok(())
  }

  /// Removes the user named `name`. If it is the sole user, transitions
  /// back to single-user using that user's own key/salt. Refuses to remove
  /// the currently-opened user while others remain.
  pub fn remove_user(&mut self, name: &str) -> Result<(), EnvelopeError> {
    let sha = sha256(name.as_bytes());
    let index = self.index_of(&sha).ok_or(EnvelopeError::UnknownUser)?;

    if self.n_users == 1 {
      let key = self.keys[0].take().ok_or(EnvelopeError::InvalidKey)?;
      let salt = self.salts[0].clone();
      *self = Params::new_single_user(key.to_vec(), salt);
      return Ok(());
    }

    if index == self.user {
      return Err(EnvelopeError::CannotRemoveSelf);
    }

    self.users.remove(index);
    self.keys.remove(index);
    self.salts.remove(index);
    self.ivs.remove(index);
    self.mkeys.remove(index);
    self.n_users -= 1;
    if index < self.user {
      self.user -= 1;
    }
    Ok(())
  }

  /// Sets a user's credentials and invalidates their cached master-key
  /// ciphertext so it regenerates on next encrypt. `name = None` means the
  /// currently-opened user.
  pub fn rekey(&mut self, name: Option<&str>, key: Vec<u8>, salt: Vec<u8>) -> Result<(), EnvelopeError> {
    if self.n_users == 0 {
      self.set_single_user(key, salt);
      return Ok(());
    }

    let index = match name {
      None => self.user,
      Some(n) => self.index_of(&sha256(n.as_bytes())).ok_or(EnvelopeError::UnknownUser)?,
    };

    self.keys[index] = Some(Zeroizing::new(key));
    self.salts[index] = salt;
    self.ivs[index] = None;
    self.mkeys[index] = None;
    Ok(())
  }

  /// The nuclear "I have lost trust" reset: fresh random passphrase per
  /// user, invalidates the master key and every per-user IV/master-key
  /// blob. Returns the new passphrases in user order.
  pub fn rekey_all(&mut self, version: u32) -> Result<Vec<String>, EnvelopeError> {
    if self.n_users == 0 {
      let passphrase = kdf::random_passphrase(32);
      let salt = kdf::generate_salt().to_vec();
      let key = kdf::derive(version, &passphrase, &salt).map_err(|_| EnvelopeError::InvalidKey)?;
      self.set_single_user(key, salt);
      self.kdf_version = version;
      return Ok(vec![passphrase]);
    }

    let mut passphrases = Vec::with_capacity(self.users.len());
    for i in 0..self.users.len() {
      let passphrase = kdf::random_passphrase(32);
      let salt = kdf::generate_salt().to_vec();
      let key = kdf::derive(version, &passphrase, &salt).map_err(|_| EnvelopeError::InvalidKey)?;
      self.keys[i] = Some(Zeroizing::new(key));
      self.salts[i] = salt;
      self.ivs[i] = None;
      self.mkeys[i] = None;
      passphrases.push(passphrase);
    }

    self.master = None;
    self.ivm = None;
    self.kdf_version = version;
    Ok(passphrases)
  }

  /// Regenerates a fresh random IV for a given per-user slot, used when
  /// onboarding or rekeying requires a new master-key ciphertext.
  pub(crate) fn fresh_iv() -> [u8; IV_LEN] {
    random_iv()
  }

  /// Differences between `self` (the local opener) and `other` (a remote
  /// copy), describing what changed in `other`.
  pub fn diff(&self, other: &Params) -> Vec<ParamsDiff> {
    let mut out = Vec::new();

    if self.n_users == 0 && other.n_users > 0 {
      out.push(ParamsDiff::MultiFile);
    } else if self.n_users > 0 && other.n_users == 0 {
      out.push(ParamsDiff::SingleFile);
    }

    if self.n_users == 0 || other.n_users == 0 {
      return out;
    }

    for (i, sha) in other.users.iter().enumerate() {
      if self.index_of(sha).is_none() {
        out.push(ParamsDiff::AddUser { sha: *sha, index: i });
      }
    }

    for sha in self.users.iter() {
      if !other.users.contains(sha) {
        if self.users.get(self.user) == Some(sha) {
          out.push(ParamsDiff::DelSelf);
        } else {
          out.push(ParamsDiff::DelUser { sha: *sha });
        }
      }
    }

    for (i, sha) in other.users.iter().enumerate() {
      if let Some(j) = self.index_of(sha) {
        if self.salts[j] != other.salts[i] {
          if j == self.user {
            out.push(ParamsDiff::RekeySelf { sha: *sha });
          } else {
            out.push(ParamsDiff::RekeyUser { sha: *sha, index: i });
          }
        }
      }
    }

    out
  }

  /// The currently-opened user's derived key, if known.
  pub fn opener_key(&self) -> Option<&[u8]> {
    if self.n_users == 0 {
      self.keys.first().and_then(|k| k.as_deref()).map(|v| v.as_slice())
    } else {
      self.keys.get(self.user).and_then(|k| k.as_deref()).map(|v| v.as_slice())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key_salt(tag: u8) -> (Vec<u8>, Vec<u8>) {
    (vec![tag; cipher_suite::KEY_LEN], vec![tag; kdf::SALT_LEN])
  }

  #[test]
  fn single_user_add_converts_to_multi() {
    let (k0, s0) = key_salt(1);
    let mut p = Params::new_single_user(k0, s0);
    assert_eq!(p.n_users, 0);

    let (k1, s1) = key_salt(2);
    p.add_user("alice", k1, s1).unwrap();
    assert_eq!(p.n_users, 1);
    assert!(p.master.is_some());
  }

  #[test]
  fn add_user_rejects_duplicate_name() {
    let (k0, s0) = key_salt(1);
    let mut p = Params::new_single_user(k0, s0);
    let (k1, s1) = key_salt(2);
    p.add_user("alice", k1, s1).unwrap();

    let (k2, s2) = key_salt(3);
    assert_eq!(p.add_user("alice", k2, s2), Err(EnvelopeError::DuplicateUser));
  }

  #[test]
  fn remove_sole_user_reverts_to_single() {
    let (k0, s0) = key_salt(1);
    let mut p = Params::new_single_user(k0, s0);
    let (k1, s1) = key_salt(2);
    p.add_user("alice", k1.clone(), s1.clone()).unwrap();

    p.remove_user("alice").unwrap();
    assert_eq!(p.n_users, 0);
    assert_eq!(p.opener_key(), Some(k1.as_slice()));
  }

  #[test]
  fn cannot_remove_self_while_others_remain() {
    let (k0, s0) = key_salt(1);
    let mut p = Params::new_single_user(k0, s0);
    let (k1, s1) = key_salt(2);
    p.add_user("alice", k1, s1).unwrap();
    let (k2, s2) = key_salt(3);
    p.add_user("bob", k2, s2).unwrap();

    p.user = 0; // alice is "self"
    assert_eq!(p.remove_user("alice"), Err(EnvelopeError::CannotRemoveSelf));
    assert!(p.remove_user("bob").is_ok());
  }

  #[test]
  fn rekey_all_invalidates_master_and_returns_passphrases() {
    let (k0, s0) = key_salt(1);
    let mut p = Params::new_single_user(k0, s0);
    let (k1, s1) = key_salt(2);
    p.add_user("alice", k1, s1).unwrap();
    let (k2, s2) = key_salt(3);
    p.add_user("bob", k2, s2).unwrap();

    let before_master = p.master.clone();
    let passphrases = p.rekey_all(1).unwrap();
    assert_eq!(passphrases.len(), 2);
    assert!(p.master.is_none());
    assert_ne!(p.master, before_master);
    assert!(p.ivs.iter().all(|iv| iv.is_none()));
  }

  #[test]
  fn diff_detects_add_del_and_rekey() {
    let (k0, s0) = key_salt(1);
    let mut local = Params::new_single_user(k0, s0);
    let (k1, s1) = key_salt(2);
    local.add_user("alice", k1.clone(), s1.clone()).unwrap();
    local.user = 0;

    let mut remote = local.clone();
    let (k2, s2) = key_salt(3);
    remote.add_user("bob", k2, s2).unwrap();

    let diffs = local.diff(&remote);
    assert!(diffs.iter().any(|d| matches!(d, ParamsDiff::AddUser { .. })));
  }
}
