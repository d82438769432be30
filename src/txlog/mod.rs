//! The transactional log store: typed transactions, snapshot folding,
//! point-in-time history, and deterministic three-way merge (§4.5).

pub mod log;
pub mod merge;
pub mod snapshot;
pub mod tx;

pub use log::Log;
pub use merge::{merge, Conflict, ConflictKind, Resolution};
pub use snapshot::{Entry, Snapshot};
pub use tx::{Kind, Tx};

use crate::error::TxLogError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Canonical on-disk JSON shape of a log, per §6: `{ version, snapshot, log }`.
/// `snapshot` is optional on write; if present on read it must be consistent
/// with `version`, and is recomputed from the log when it is not.
#[derive(Debug, Serialize, Deserialize)]
struct TxLogFile {
  version: u32,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  snapshot: Option<HashMap<Uuid, Entry>>,
  log: Vec<Tx>,
}

/// Serializes `log` to its canonical JSON payload. Set `include_snapshot`
/// to embed the folded snapshot inline, saving the cost of refolding on the
/// next open at the expense of file size.
pub fn save(log: &Log, include_snapshot: bool) -> Result<Vec<u8>, TxLogError> {
  let version = log.txs().len() as u32;
  let snapshot = if include_snapshot {
    Some(snapshot::fold(log.txs())?.entries)
  } else {
    None
  };

  let file = TxLogFile { version, snapshot, log: log.txs().to_vec() };
  serde_json::to_vec(&file).map_err(|e| TxLogError::Malformed(format!("serialize: {e}")))
}

/// Parses a log from its canonical JSON payload. An inline snapshot whose
/// `version` doesn't match the log length is discarded and recomputed
/// lazily instead of trusted.
pub fn load(bytes: &[u8]) -> Result<Log, TxLogError> {
  let file: TxLogFile =
    serde_json::from_slice(bytes).map_err(|e| TxLogError::Malformed(format!("parse: {e}")))?;

  let mut log = Log::from_txs(file.log);

  if let Some(entries) = file.snapshot {
    if file.version as usize == log.txs().len() {
      log.set_cached_snapshot(Snapshot { entries, version: file.version as usize });
    } else {
      tracing::warn!(
        stated_version = file.version,
        log_len = log.txs().len(),
        "discarding inline snapshot: version does not match log length"
      );
    }
  }

  Ok(log)
}

/// Parses a log, then, if `cutoff` is given, truncates it to the prefix
/// where `tx.time <= cutoff` before any snapshot is built — read-only
/// history mode on open (§4.5). Any inline snapshot is dropped rather than
/// reused, since it was folded over transactions this cutoff may exclude.
pub fn load_with_cutoff(bytes: &[u8], cutoff: Option<i64>) -> Result<Log, TxLogError> {
  let log = load(bytes)?;
  match cutoff {
    None => Ok(log),
    Some(t) => Ok(Log::from_txs(snapshot::truncate_to_time(log.txs(), t))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn save_without_snapshot_then_load_recomputes() {
    let mut log = Log::new();
    let u1 = log.add();
    log.set(u1, "name", "x");

    let bytes = save(&log, false).unwrap();
    let mut loaded = load(&bytes).unwrap();
    let snap = loaded.update_snapshot().unwrap();
    assert_eq!(snap.entries[&u1]["name"], "x");
  }

  #[test]
  fn save_with_snapshot_round_trips_inline() {
    let mut log = Log::new();
    let u1 = log.add();
    log.set(u1, "name", "x");

    let bytes = save(&log, true).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(value.get("snapshot").is_some());

    let mut loaded = load(&bytes).unwrap();
    let snap = loaded.update_snapshot().unwrap();
    assert_eq!(snap.entries[&u1]["name"], "x");
  }

  #[test]
  fn load_with_cutoff_truncates_before_snapshot() {
    let mut log = Log::new();
    let u1 = log.add();
    log.set(u1, "k", "v");
    let bytes = save(&log, false).unwrap();

    let mut loaded = load_with_cutoff(&bytes, Some(log.txs()[0].time)).unwrap();
    assert_eq!(loaded.txs().len(), 1);
    let snap = loaded.update_snapshot().unwrap();
    assert_eq!(snap.entries[&u1].get("k"), None);
  }

  #[test]
  fn mismatched_inline_snapshot_is_discarded_not_trusted() {
    let mut log = Log::new();
    let u1 = log.add();
    log.set(u1, "name", "x");

    let mut bytes_value: serde_json::Value = serde_json::from_slice(&save(&log, true).unwrap()).unwrap();
    bytes_value["version"] = serde_json::json!(999);
    let tampered = serde_json::to_vec(&bytes_value).unwrap();

    let mut loaded = load(&tampered).unwrap();
    let snap = loaded.update_snapshot().unwrap();
    assert_eq!(snap.entries[&u1]["name"], "x");
  }
}
