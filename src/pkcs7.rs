//! RFC 5652 block padding.
//!
//! Padding always appends at least one byte: an input that is already a
//! multiple of the block size gets a full extra block. This is what makes
//! unpad unambiguous.

use crate::error::Pkcs7Error;

/// Pads `data` to a multiple of `block_size` bytes.
///
/// `block_size` must be in `1..256`; the padding byte value is the number of
/// padding bytes appended, so it must fit in a `u8`.
pub fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
  debug_assert!(block_size >= 1 && block_size < 256);

  let remainder = data.len() % block_size;
  let amount = block_size - remainder;

  let mut out = Vec::with_capacity(data.len() + amount);
  out.extend_from_slice(data);
  out.resize(data.len() + amount, amount as u8);
  out
}

/// Strips RFC 5652 padding from `data`, returning the original prefix.
pub fn unpad(data: &[u8]) -> Result<&[u8], Pkcs7Error> {
  if data.is_empty() {
    return Err(Pkcs7Error::EmptyInput);
  }

  let amount = *data.last().unwrap() as usize;
  if amount == 0 || amount > data.len() {
    return Err(Pkcs7Error::PaddingAmount { amount, len: data.len() });
  }

  let padding_start = data.len() - amount;
  if data[padding_start..].iter().any(|&b| b as usize != amount) {
    return Err(Pkcs7Error::PaddingInvalid);
  }

  Ok(&data[..padding_start])
}
