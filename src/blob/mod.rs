//! The domain adapter: named entries, fuzzy find, labels/notes/known-hosts
//! lists, and TOTP URIs layered over the raw `txlog` key/value store (§4.6).

pub mod lists;
pub mod totp;

pub use totp::{OtpUriValidator, UrlOtpValidator};

use crate::error::BlobError;
use crate::txlog::Log;
use chrono::Utc;
use uuid::Uuid;

/// Keys that only the system may set, via the dedicated methods below —
/// never through [`Blob::set`] directly.
pub const RESERVED_KEYS: &[&str] =
  &["name", "updated", "snapshots", "totp", "labels", "notes", "knownhosts", "sync", "lastsync", "iv", "salt", "mkey"];

fn now_nanos() -> i64 {
  Utc::now().timestamp_nanos_opt().expect("current time overflows i64 nanoseconds")
}

/// A thin typed lens over a [`Log`], enforcing the reserved-key and
/// name-uniqueness rules that give entries their domain meaning.
pub struct Blob<'a> {
  log: &'a mut Log,
}

impl<'a> Blob<'a> {
  pub fn new(log: &'a mut Log) -> Blob<'a> {
    Blob { log }
  }

  fn touch(&mut self, uuid: Uuid) {
    self.log.set(uuid, "updated", now_nanos().to_string());
  }

  /// Unchecked set used by the dedicated setters below; always touches.
  fn set_raw(&mut self, uuid: Uuid, key: &str, value: String) {
    self.log.set(uuid, key, value);
    self.touch(uuid);
  }

  fn name_taken(&mut self, name: &str) -> Result<bool, BlobError> {
    let snap = self.log.update_snapshot()?;
    Ok(snap.entries.values().any(|e| e.get("name").map(String::as_str) == Some(name)))
  }

  /// Creates a new entry named `name`. Fails with `NameNotUnique` if an
  /// entry with that exact name already exists.
  pub fn new_entry(&mut self, name: &str) -> Result<Uuid, BlobError> {
    if self.name_taken(name)? {
      return Err(BlobError::NameNotUnique(name.to_string()));
    }
    let uuid = self.log.add();
    self.set_raw(uuid, "name", name.to_string());
    Ok(uuid)
  }

  pub fn rename(&mut self, uuid: Uuid, new_name: &str) -> Result<(), BlobError> {
    if self.name_taken(new_name)? {
      return Err(BlobError::NameNotUnique(new_name.to_string()));
    }
    self.set_raw(uuid, "name", new_name.to_string());
    Ok(())
  }

  /// Sets an arbitrary field. Rejects reserved keys — use the dedicated
  /// setter for those.
  pub fn set(&mut self, uuid: Uuid, key: &str, value: &str) -> Result<(), BlobError> {
    if RESERVED_KEYS.contains(&key) {
      return Err(BlobError::ReservedKey(key.to_string()));
    }
    self.set_raw(uuid, key, value.to_string());
    Ok(())
  }

  pub fn delete_key(&mut self, uuid: Uuid, key: &str) -> Result<(), BlobError> {
    if RESERVED_KEYS.contains(&key) {
      return Err(BlobError::ReservedKey(key.to_string()));
    }
    self.log.delete_key(uuid, key);
    self.touch(uuid);
    Ok(())
  }

  pub fn delete_entry(&mut self, uuid: Uuid) {
    self.log.delete(uuid);
  }

  /// Sets the TOTP field, wrapping a bare secret and validating the
  /// resulting `otpauth://` URI before it's stored.
  pub fn set_totp(&mut self, validator: &impl OtpUriValidator, uuid: Uuid, name: &str, secret_or_uri: &str) -> Result<(), BlobError> {
    let uri = totp::prepare(validator, name, secret_or_uri)?;
    self.set_raw(uuid, "totp", uri);
    Ok(())
  }

  fn list_field(&mut self, uuid: Uuid, key: &str) -> Result<String, BlobError> {
    let snap = self.log.update_snapshot()?;
    Ok(snap.entries.get(&uuid).and_then(|e| e.get(key)).cloned().unwrap_or_default())
  }

  pub fn add_label(&mut self, uuid: Uuid, label: &str) -> Result<(), BlobError> {
    let current = self.list_field(uuid, "labels")?;
    self.set_raw(uuid, "labels", lists::add(&current, label));
    Ok(())
  }

  pub fn delete_label(&mut self, uuid: Uuid, label: &str) -> Result<(), BlobError> {
    let current = self.list_field(uuid, "labels")?;
    self.set_raw(uuid, "labels", lists::remove_value(&current, label));
    Ok(())
  }

  pub fn add_note(&mut self, uuid: Uuid, note: &str) -> Result<(), BlobError> {
    let current = self.list_field(uuid, "notes")?;
    self.set_raw(uuid, "notes", lists::add(&current, note));
    Ok(())
  }

  pub fn delete_note_at(&mut self, uuid: Uuid, index: usize) -> Result<(), BlobError> {
    let current = self.list_field(uuid, "notes")?;
    self.set_raw(uuid, "notes", lists::remove_index(&current, index));
    Ok(())
  }

  pub fn add_known_host(&mut self, uuid: Uuid, host: &lists::KnownHost) -> Result<(), BlobError> {
    let current = self.list_field(uuid, "knownhosts")?;
    self.set_raw(uuid, "knownhosts", lists::add(&current, &host.to_line()));
    Ok(())
  }

  pub fn known_hosts(&mut self, uuid: Uuid) -> Result<Vec<lists::KnownHost>, BlobError> {
    let current = self.list_field(uuid, "knownhosts")?;
    Ok(lists::parse_known_hosts(&current))
  }

  /// Fuzzy substring match of `query` against every entry's `name`, with
  /// `/` as a folder separator: a query of N segments matches a name of at
  /// least N segments where each query segment is a case-insensitive
  /// substring of the corresponding name segment.
  pub fn find(&mut self, query: &str) -> Result<Vec<Uuid>, BlobError> {
    let snap = self.log.update_snapshot()?;
    let query_segments: Vec<String> = query.split('/').map(|s| s.to_lowercase()).collect();

    let mut matches: Vec<Uuid> = snap
      .entries
      .iter()
      .filter_map(|(uuid, entry)| {
        let name = entry.get("name")?;
        let name_segments: Vec<&str> = name.split('/').collect();
        if name_segments.len() < query_segments.len() {
          return None;
        }
        let offset = name_segments.len() - query_segments.len();
        let matched = query_segments
          .iter()
          .enumerate()
          .all(|(i, qseg)| name_segments[offset + i].to_lowercase().contains(qseg.as_str()));
        matched.then_some(*uuid)
      })
      .collect();

    matches.sort();
    Ok(matches)
  }
}
