//! vaultlog - a local-first encrypted password vault.
//!
//! The on-disk file is the authoritative state. Three subsystems make
//! multi-device editing safe:
//!
//! - [`envelope`] - versioned, multi-cipher, single/multi-user encrypted
//!   file format with integrity verification and a two-stage key hierarchy.
//! - [`txlog`] - an append-only transaction log with a cached snapshot,
//!   point-in-time history, and deterministic three-way merge.
//! - [`sync`] - pulls remote ciphertext over `scp`/`file`, merges logs and
//!   encryption parameters with the local copy, and pushes the result back.
//!
//! [`blob`] is the domain adapter sitting on top of `txlog` (named entries,
//! labels, TOTP). [`pkcs7`], [`kdf`], and [`cipher_suite`] are the layered
//! primitives `envelope` builds on.
//!
//! # Architecture
//!
//! ```text
//! open:  file bytes -> envelope::decrypt -> txlog::load -> blob::Blob
//! save:  blob::Blob -> txlog::save -> envelope::encrypt -> file bytes
//! sync:  for each remote: pull -> envelope::decrypt -> txlog::merge -> envelope::encrypt -> push
//! ```

pub mod blob;
pub mod cipher_suite;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fileio;
pub mod kdf;
pub mod pkcs7;
pub mod sync;
pub mod txlog;

pub use error::VaultError;
