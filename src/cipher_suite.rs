//! The cascaded symmetric cipher chain: AES-256 → Camellia-256 → CAST5 →
//! SEED, each in CBC mode with its own pkcs7-padded round, sharing one
//! 16-byte IV pool per envelope section.
//!
//! # IV pool slicing
//!
//! The pool is exactly [`IV_POOL_LEN`] (16) bytes — the size of the file
//! format's `iv`/`ivm` field. Each stage in suite order consumes a
//! `block_size`-long slice starting at an offset cursor that begins at 0 and
//! advances by each stage's `block_size` in turn; since the cursor can run
//! past the pool's length (CAST5 and SEED together need 24 bytes beyond
//! where AES+Camellia left off), slices wrap circularly around the pool.
//! Decryption must read from the exact same offsets computed in the forward
//! direction — it does not recompute them walking backwards. Getting this
//! wrong silently breaks cross-machine compatibility with no other symptom.

use crate::error::CipherError;
use crate::pkcs7;
use cipher::{Block, BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit};

/// `(key_size, block_size)` for each stage, in cascade order.
const SUITE: [(usize, usize); 4] = [
  (32, 16), // AES-256
  (32, 16), // Camellia-256
  (16, 8),  // CAST5
  (16, 16), // SEED
];

/// Total concatenated key length consumed by the suite (kdf v1's output).
pub const KEY_LEN: usize = 96;

/// Length of the shared IV pool buffer.
pub const IV_POOL_LEN: usize = 16;

fn split_keys(key: &[u8]) -> Result<[&[u8]; 4], CipherError> {
  if key.len() != KEY_LEN {
    return Err(CipherError::InvalidKey { expected: KEY_LEN, got: key.len() });
  }
  Ok([&key[0..32], &key[32..64], &key[64..80], &key[80..96]])
}

/// Forward-direction `(offset, len)` pairs into the IV pool, one per stage.
fn forward_offsets() -> [(usize, usize); 4] {
  let mut offsets = [(0usize, 0usize); 4];
  let mut cursor = 0usize;
  for (i, &(_, block_size)) in SUITE.iter().enumerate() {
    offsets[i] = (cursor, block_size);
    cursor += block_size;
  }
  offsets
}

fn iv_slice(pool: &[u8], offset: usize, len: usize) -> Vec<u8> {
  (0..len).map(|i| pool[(offset + i) % pool.len()]).collect()
}

fn cbc_encrypt_generic<C: BlockEncrypt + KeyInit + BlockSizeUser>(
  key: &[u8],
  iv: &[u8],
  data: &[u8],
) -> Vec<u8> {
  let cipher = C::new_from_slice(key).expect("key length validated by split_keys");
  let bs = C::block_size();
  debug_assert_eq!(iv.len(), bs);
  debug_assert_eq!(data.len() % bs, 0);

  let mut prev = iv.to_vec();
  let mut out = Vec::with_capacity(data.len());
  for chunk in data.chunks(bs) {
    let mut buf = vec![0u8; bs];
    for i in 0..bs {
      buf[i] = chunk[i] ^ prev[i];
    }
    let mut block = Block::<C>::clone_from_slice(&buf);
    cipher.encrypt_block(&mut block);
    out.extend_from_slice(&block);
    prev = block.to_vec();
  }
  out
}

fn cbc_decrypt_generic<C: BlockDecrypt + KeyInit + BlockSizeUser>(
  key: &[u8],
  iv: &[u8],
  data: &[u8],
) -> Vec<u8> {
  let cipher = C::new_from_slice(key).expect("key length validated by split_keys");
  let bs = C::block_size();
  debug_assert_eq!(iv.len(), bs);
  debug_assert_eq!(data.len() % bs, 0);

  let mut prev = iv.to_vec();
  let mut out = Vec::with_capacity(data.len());
  for chunk in data.chunks(bs) {
    let mut block = Block::<C>::clone_from_slice(chunk);
    cipher.decrypt_block(&mut block);
    let mut buf = vec![0u8; bs];
    for i in 0..bs {
      buf[i] = block[i] ^ prev[i];
    }
    out.extend_from_slice(&buf);
    prev = chunk.to_vec();
  }
  out
}

fn stage_encrypt(idx: usize, key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
  match idx {
    0 => cbc_encrypt_generic::<aes::Aes256>(key, iv, data),
    1 => cbc_encrypt_generic::<camellia::Camellia256>(key, iv, data),
    2 => cbc_encrypt_generic::<cast5::Cast5>(key, iv, data),
    3 => cbc_encrypt_generic::<seed::Seed>(key, iv, data),
    _ => unreachable!("suite has exactly 4 stages"),
  }
}

fn stage_decrypt(idx: usize, key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
  match idx {
    0 => cbc_decrypt_generic::<aes::Aes256>(key, iv, data),
    1 => cbc_decrypt_generic::<camellia::Camellia256>(key, iv, data),
    2 => cbc_decrypt_generic::<cast5::Cast5>(key, iv, data),
    3 => cbc_decrypt_generic::<seed::Seed>(key, iv, data),
    _ => unreachable!("suite has exactly 4 stages"),
  }
}

fn cascade_encrypt(key: &[u8], iv_pool: &[u8], data: &[u8], pad: bool) -> Result<Vec<u8>, CipherError> {
  let keys = split_keys(key)?;
  if iv_pool.len() != IV_POOL_LEN {
    return Err(CipherError::InvalidIv { expected: IV_POOL_LEN, got: iv_pool.len() });
  }

  let offsets = forward_offsets();
  let mut buf = data.to_vec();
  for idx in 0..4 {
    if pad {
      buf = pkcs7::pad(&buf, SUITE[idx].1);
    }
    let (offset, len) = offsets[idx];
    let iv = iv_slice(iv_pool, offset, len);
    buf = stage_encrypt(idx, keys[idx], &iv, &buf);
  }
  Ok(buf)
}

fn cascade_decrypt(key: &[u8], iv_pool: &[u8], data: &[u8], unpad: bool) -> Result<Vec<u8>, CipherError> {
  let keys = split_keys(key)?;
  if iv_pool.len() != IV_POOL_LEN {
    return Err(CipherError::InvalidIv { expected: IV_POOL_LEN, got: iv_pool.len() });
  }

  let offsets = forward_offsets();
  let mut buf = data.to_vec();
  for idx in (0..4).rev() {
    let (offset, len) = offsets[idx];
    let iv = iv_slice(iv_pool, offset, len);
    buf = stage_decrypt(idx, keys[idx], &iv, &buf);
    if unpad {
      buf = pkcs7::unpad(&buf)?.to_vec();
    }
  }
  Ok(buf)
}

/// Encrypts `plaintext` under the full cascade, padding each stage.
pub fn encrypt(key: &[u8], iv_pool: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
  cascade_encrypt(key, iv_pool, plaintext, true)
}

/// Reverses [`encrypt`].
pub fn decrypt(key: &[u8], iv_pool: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
  cascade_decrypt(key, iv_pool, ciphertext, true)
}

/// Encrypts key-sized `data` (already a multiple of every stage's block
/// size) with no padding round. Used for master-key encryption in the
/// envelope, where the cleartext is itself a key and padding would change
/// its length.
pub fn encrypt_raw(key: &[u8], iv_pool: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError> {
  cascade_encrypt(key, iv_pool, data, false)
}

/// Reverses [`encrypt_raw`].
pub fn decrypt_raw(key: &[u8], iv_pool: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError> {
  cascade_decrypt(key, iv_pool, data, false)
}
