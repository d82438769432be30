//! The mutable `Log`: append operations, the snapshot cache, and the
//! begin/commit/rollback transaction window (§4.5, §5).

use super::snapshot::{self, Snapshot};
use super::tx::Tx;
use crate::error::TxLogError;
use chrono::Utc;
use uuid::Uuid;

fn now_nanos() -> i64 {
  Utc::now().timestamp_nanos_opt().expect("current time overflows i64 nanoseconds")
}

/// An append-only transaction log plus its cached snapshot.
#[derive(Debug, Clone)]
pub struct Log {
  txs: Vec<Tx>,
  snapshot: Option<Snapshot>,
  /// Set while a `begin()..commit()/rollback()` window is open: the log
  /// length recorded at `begin()` time.
  tx_mark: Option<usize>,
}

impl Default for Log {
  fn default() -> Log {
    Log::new()
  }
}

impl Log {
  pub fn new() -> Log {
    Log { txs: Vec::new(), snapshot: None, tx_mark: None }
  }

  /// Rebuilds a `Log` from a previously-persisted transaction list (used
  /// when loading from disk).
  pub fn from_txs(txs: Vec<Tx>) -> Log {
    Log { txs, snapshot: None, tx_mark: None }
  }

  pub fn txs(&self) -> &[Tx] {
    &self.txs
  }

  pub fn is_transaction_open(&self) -> bool {
    self.tx_mark.is_some()
  }

  fn push(&mut self, tx: Tx) {
    self.txs.push(tx);
  }

  pub fn add(&mut self) -> Uuid {
    let uuid = Uuid::new_v4();
    self.push(Tx::add(now_nanos(), uuid));
    uuid
  }

  pub fn set(&mut self, uuid: Uuid, key: impl Into<String>, value: impl Into<String>) {
    self.push(Tx::set_key(now_nanos(), uuid, key.into(), value.into()));
  }

  pub fn delete(&mut self, uuid: Uuid) {
    self.push(Tx::delete(now_nanos(), uuid));
  }

  pub fn delete_key(&mut self, uuid: Uuid, key: impl Into<String>) {
    self.push(Tx::delete_key(now_nanos(), uuid, key.into()));
  }

  /// Folds any unapplied transactions into the cached snapshot. Idempotent.
  pub fn update_snapshot(&mut self) -> Result<&Snapshot, TxLogError> {
    let applied = self.snapshot.as_ref().map(|s| s.version).unwrap_or(0);
    if applied > self.txs.len() {
      // the log was rolled back past the snapshot; rebuild from scratch.
      self.snapshot = None;
    }
    let applied = self.snapshot.as_ref().map(|s| s.version).unwrap_or(0);

    if self.snapshot.is_none() {
      self.snapshot = Some(snapshot::fold(&self.txs)?);
      return Ok(self.snapshot.as_ref().unwrap());
    }

    if applied < self.txs.len() {
      let mut entries = self.snapshot.as_ref().unwrap().entries.clone();
      for tx in &self.txs[applied..] {
        snapshot::apply(&mut entries, tx)?;
      }
      self.snapshot = Some(Snapshot { entries, version: self.txs.len() });
    }

    Ok(self.snapshot.as_ref().unwrap())
  }

  /// Drops the cached snapshot; the next `update_snapshot` rebuilds from
  /// scratch.
  pub fn reset_snapshot(&mut self) {
    self.snapshot = None;
  }

  /// Installs a pre-computed snapshot as the cache, trusting the caller to
  /// have verified `snapshot.version` matches the log it was folded from.
  pub(crate) fn set_cached_snapshot(&mut self, snapshot: Snapshot) {
    self.snapshot = Some(snapshot);
  }

  pub fn snapshot_at(&self, k: usize) -> Result<Snapshot, TxLogError> {
    snapshot::snapshot_at(&self.txs, k)
  }

  pub fn entry_snapshot_at(&self, uuid: Uuid, k: usize) -> Result<snapshot::Entry, TxLogError> {
    snapshot::entry_snapshot_at(&self.txs, uuid, k)
  }

  /// Opens a transaction window. Not re-entrant: panics if one is already
  /// open, matching the single-threaded cooperative model (§5).
  pub fn begin(&mut self) {
    if self.tx_mark.is_some() {
      panic!("Log::begin called with a transaction already open");
    }
    self.tx_mark = Some(self.txs.len() + 1);
  }

  /// Closes the transaction window, keeping every transaction appended
  /// since `begin()`.
  pub fn commit(&mut self) -> Result<(), TxLogError> {
    if self.tx_mark.take().is_none() {
      return Err(TxLogError::NoTransactionOpen);
    }
    Ok(())
  }

  /// Truncates the log back to the point marked by `begin()`, invalidating
  /// the cached snapshot if it covered any rolled-back transaction.
  pub fn rollback(&mut self) -> Result<(), TxLogError> {
    let mark = self.tx_mark.take().ok_or(TxLogError::NoTransactionOpen)?;
    let cutoff = mark.saturating_sub(1).min(self.txs.len());
    self.truncate_to(cutoff);
    Ok(())
  }

  /// Unconditionally truncates the last `n` transactions, invalidating the
  /// snapshot if needed.
  pub fn rollback_n(&mut self, n: usize) {
    let cutoff = self.txs.len().saturating_sub(n);
    self.truncate_to(cutoff);
  }

  fn truncate_to(&mut self, cutoff: usize) {
    self.txs.truncate(cutoff);
    if let Some(snap) = &self.snapshot {
      if snap.version > cutoff {
        self.snapshot = None;
      }
    }
  }

  /// Runs `f` inside a `begin()/commit()` window, rolling back on error.
  /// The primary atomicity boundary for multi-step operations.
  pub fn do_in_transaction<T, E>(&mut self, f: impl FnOnce(&mut Log) -> Result<T, E>) -> Result<T, E>
  where
    E: From<TxLogError>,
  {
    self.begin();
    match f(self) {
      Ok(value) => {
        self.commit()?;
        Ok(value)
      }
      Err(err) => {
        let _ = self.rollback();
        Err(err)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_set_delete_key_fold_matches_spec_scenario() {
    let mut log = Log::new();
    let u1 = log.add();
    log.set(u1, "name", "x");
    log.set(u1, "name", "y");
    log.delete_key(u1, "name");

    let snap = log.update_snapshot().unwrap();
    assert_eq!(snap.entries[&u1].get("name"), None);

    assert_eq!(log.entry_snapshot_at(u1, 1).unwrap()["name"], "y");
    assert_eq!(log.entry_snapshot_at(u1, 2).unwrap()["name"], "x");
  }

  #[test]
  fn update_snapshot_is_idempotent() {
    let mut log = Log::new();
    let u1 = log.add();
    log.set(u1, "k", "v");
    let first = log.update_snapshot().unwrap().clone();
    let second = log.update_snapshot().unwrap().clone();
    assert_eq!(first, second);
  }

  #[test]
  fn reset_then_update_yields_same_snapshot() {
    let mut log = Log::new();
    let u1 = log.add();
    log.set(u1, "k", "v");
    let before = log.update_snapshot().unwrap().clone();
    log.reset_snapshot();
    let after = log.update_snapshot().unwrap().clone();
    assert_eq!(before, after);
  }

  #[test]
  fn begin_rollback_discards_appended_transactions() {
    let mut log = Log::new();
    let u1 = log.add();
    log.update_snapshot().unwrap();

    log.begin();
    log.set(u1, "k", "v");
    log.rollback().unwrap();

    assert_eq!(log.txs().len(), 1);
    let snap = log.update_snapshot().unwrap();
    assert!(snap.entries[&u1].get("k").is_none());
  }

  #[test]
  fn do_in_transaction_rolls_back_on_error() {
    let mut log = Log::new();
    let u1 = log.add();

    let result: Result<(), TxLogError> = log.do_in_transaction(|log| {
      log.set(u1, "k", "v");
      Err(TxLogError::EntryNotFound("boom".into()))
    });
    assert!(result.is_err());
    assert_eq!(log.txs().len(), 1);
  }

  #[test]
  #[should_panic]
  fn begin_is_not_reentrant() {
    let mut log = Log::new();
    log.begin();
    log.begin();
  }
}
