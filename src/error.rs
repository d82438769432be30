//! Crate-wide error types.
//!
//! Each component gets its own error enum so call sites can match on the
//! specific kind spec'd for that component; [`VaultError`] threads them all
//! together for code that just wants to propagate with `?`.

use thiserror::Error;

/// Errors from [`crate::pkcs7`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Pkcs7Error {
  #[error("padding amount {amount} is invalid for {len}-byte input")]
  PaddingAmount { amount: usize, len: usize },
  #[error("padding bytes do not all equal the padding amount")]
  PaddingInvalid,
  #[error("cannot unpad empty input")]
  EmptyInput,
}

/// Errors from [`crate::kdf`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum KdfError {
  #[error("unsupported kdf version {0}")]
  UnsupportedVersion(u32),
  #[error("invalid salt length: expected {expected}, got {got}")]
  InvalidSalt { expected: usize, got: usize },
  #[error("key derivation failed: {0}")]
  Derivation(String),
}

/// Errors from [`crate::cipher_suite`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CipherError {
  #[error("invalid key length: expected {expected}, got {got}")]
  InvalidKey { expected: usize, got: usize },
  #[error("invalid iv pool length: expected at least {expected}, got {got}")]
  InvalidIv { expected: usize, got: usize },
  #[error(transparent)]
  Padding(#[from] Pkcs7Error),
}

/// Errors from [`crate::envelope`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EnvelopeError {
  #[error("invalid file format: {0}")]
  InvalidFileFormat(String),
  #[error("invalid key")]
  InvalidKey,
  #[error("invalid salt")]
  InvalidSalt,
  #[error("wrong passphrase")]
  WrongPassphrase,
  #[error("multi-user file requires a user name")]
  NeedUser,
  #[error("unknown user")]
  UnknownUser,
  #[error("full rekey required before encrypting under a different kdf version")]
  NeedFullRekey,
  #[error("duplicate user name")]
  DuplicateUser,
  #[error("cannot remove the currently-opened user while other users remain")]
  CannotRemoveSelf,
  #[error(transparent)]
  Cipher(#[from] CipherError),
}

/// Errors from [`crate::txlog`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TxLogError {
  #[error("key not found: uuid={uuid:?} key={key:?}")]
  KeyNotFound { uuid: Option<String>, key: Option<String> },
  #[error("entry not found: {0}")]
  EntryNotFound(String),
  #[error("entry already exists: {0}")]
  EntryExists(String),
  #[error("merge has unresolved conflicts")]
  MergeUnresolved,
  #[error("root fork: logs share no common ancestry")]
  RootFork,
  #[error("a transaction is already open")]
  TransactionAlreadyOpen,
  #[error("no transaction is open")]
  NoTransactionOpen,
  #[error("malformed log json: {0}")]
  Malformed(String),
}

/// Errors from [`crate::blob`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BlobError {
  #[error("name is not unique: {0}")]
  NameNotUnique(String),
  #[error("key {0:?} is reserved and cannot be set directly")]
  ReservedKey(String),
  #[error("invalid totp uri: {0}")]
  InvalidTotpUri(String),
  #[error(transparent)]
  TxLog(#[from] TxLogError),
}

/// Errors from [`crate::sync`].
#[derive(Debug, Error)]
pub enum SyncError {
  #[error("remote not found")]
  NotFound,
  #[error("unsupported remote url scheme: {0}")]
  UnsupportedScheme(String),
  #[error("transport error: {0}")]
  Transport(String),
  #[error("merge aborted: {0}")]
  MergeAborted(String),
  #[error(transparent)]
  Envelope(#[from] EnvelopeError),
  #[error(transparent)]
  TxLog(#[from] TxLogError),
}

/// Top-level crate error, used by the CLI and anywhere components compose.
#[derive(Debug, Error)]
pub enum VaultError {
  #[error(transparent)]
  Pkcs7(#[from] Pkcs7Error),
  #[error(transparent)]
  Kdf(#[from] KdfError),
  #[error(transparent)]
  Cipher(#[from] CipherError),
  #[error(transparent)]
  Envelope(#[from] EnvelopeError),
  #[error(transparent)]
  TxLog(#[from] TxLogError),
  #[error(transparent)]
  Blob(#[from] BlobError),
  #[error(transparent)]
  Sync(#[from] SyncError),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}
