//! The `Tx` transaction type and its on-disk JSON schema (§3, §6).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four kinds of mutation a transaction can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
  #[serde(rename = "add")]
  Add,
  #[serde(rename = "del")]
  Delete,
  #[serde(rename = "setk")]
  SetKey,
  #[serde(rename = "delk")]
  DeleteKey,
}

/// An immutable log record. `key`/`value` are only present for `SetKey`;
/// `key` only for `DeleteKey`. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
  pub time: i64,
  pub kind: Kind,
  pub uuid: Uuid,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub key: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none", default)]
  pub value: Option<String>,
}

impl Tx {
  pub fn add(time: i64, uuid: Uuid) -> Tx {
    Tx { time, kind: Kind::Add, uuid, key: None, value: None }
  }

  pub fn delete(time: i64, uuid: Uuid) -> Tx {
    Tx { time, kind: Kind::Delete, uuid, key: None, value: None }
  }

  pub fn set_key(time: i64, uuid: Uuid, key: String, value: String) -> Tx {
    Tx { time, kind: Kind::SetKey, uuid, key: Some(key), value: Some(value) }
  }

  pub fn delete_key(time: i64, uuid: Uuid, key: String) -> Tx {
    Tx { time, kind: Kind::DeleteKey, uuid, key: Some(key), value: None }
  }

  /// Ordering/content key used to break merge ties deterministically:
  /// `(time, uuid, key, value)`.
  pub fn sort_key(&self) -> (i64, Uuid, Option<&str>, Option<&str>) {
    (self.time, self.uuid, self.key.as_deref(), self.value.as_deref())
  }
}
