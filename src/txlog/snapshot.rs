//! Snapshot folding and point-in-time views (§4.5).

use super::tx::{Kind, Tx};
use crate::error::TxLogError;
use std::collections::HashMap;
use uuid::Uuid;

/// A materialized entry: string keys to string values.
pub type Entry = HashMap<String, String>;

/// The materialized entry table at some log length (`version`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
  pub entries: HashMap<Uuid, Entry>,
  pub version: usize,
}

impl Snapshot {
  pub fn new() -> Snapshot {
    Snapshot::default()
  }
}

/// Applies a single transaction to `dst`, per §4.5's fold rules.
pub fn apply(dst: &mut HashMap<Uuid, Entry>, tx: &Tx) -> Result<(), TxLogError> {
  match tx.kind {
    Kind::Add => {
      if dst.contains_key(&tx.uuid) {
        return Err(TxLogError::EntryExists(tx.uuid.to_string()));
      }
      dst.insert(tx.uuid, Entry::new());
    }
    Kind::Delete => {
      if dst.remove(&tx.uuid).is_none() {
        return Err(TxLogError::EntryNotFound(tx.uuid.to_string()));
      }
    }
    Kind::SetKey => {
      let entry = dst.get_mut(&tx.uuid).ok_or_else(|| TxLogError::EntryNotFound(tx.uuid.to_string()))?;
      let key = tx.key.clone().expect("SetKey always carries a key");
      let value = tx.value.clone().expect("SetKey always carries a value");
      entry.insert(key, value);
    }
    Kind::DeleteKey => {
      let entry = dst.get_mut(&tx.uuid).ok_or_else(|| TxLogError::EntryNotFound(tx.uuid.to_string()))?;
      let key = tx.key.as_deref().expect("DeleteKey always carries a key");
      entry.remove(key);
    }
  }
  Ok(())
}

/// Folds the entire `log` into a fresh snapshot.
pub fn fold(log: &[Tx]) -> Result<Snapshot, TxLogError> {
  let mut entries = HashMap::new();
  for tx in log {
    apply(&mut entries, tx)?;
  }
  Ok(Snapshot { entries, version: log.len() })
}

/// Replays `log[0 .. len(log) - 1 - k]` into a new snapshot — "k
/// transactions ago".
pub fn snapshot_at(log: &[Tx], k: usize) -> Result<Snapshot, TxLogError> {
  let cutoff = log.len().saturating_sub(1 + k);
  fold(&log[..cutoff.min(log.len())])
}

/// Replays only the transactions touching `uuid`, stopping after the
/// `(last - k)`-th such transaction; fails with `KeyNotFound` if the
/// resulting entry doesn't exist.
pub fn entry_snapshot_at(log: &[Tx], uuid: Uuid, k: usize) -> Result<Entry, TxLogError> {
  let touching: Vec<&Tx> = log.iter().filter(|tx| tx.uuid == uuid).collect();
  if touching.is_empty() {
    return Err(TxLogError::KeyNotFound { uuid: Some(uuid.to_string()), key: None });
  }

  let cutoff = touching.len().saturating_sub(k);
  let mut entries = HashMap::new();
  for tx in &touching[..cutoff.min(touching.len())] {
    apply(&mut entries, tx)?;
  }

  entries
    .remove(&uuid)
    .ok_or(TxLogError::KeyNotFound { uuid: Some(uuid.to_string()), key: None })
}

/// Truncates `log` to the prefix where `tx.time <= cutoff`, for read-only
/// history mode on open.
pub fn truncate_to_time(log: &[Tx], cutoff: i64) -> Vec<Tx> {
  log.iter().take_while(|tx| tx.time <= cutoff).cloned().collect()
}
