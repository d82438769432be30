//! Deterministic three-way merge with explicit conflict objects (§4.5).

use super::tx::{Kind, Tx};
use std::collections::HashMap;
use uuid::Uuid;

/// A conflict surfaced by [`merge`], pending resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
  pub kind: ConflictKind,
  pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
  /// The two logs share no common ancestry: their first transactions differ.
  Root { a0: Tx, b0: Tx },
  /// `conflict` operates on an entry that `initial` (a `Delete`) removed.
  DeleteSet { initial: Tx, conflict: Tx },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
  /// Root only: merge anyway, treating the logs as unrelated but mergeable.
  Force,
  /// DeleteSet only: restore the entry — drop the delete.
  DiscardInitial,
  /// DeleteSet only: respect the delete — drop the conflicting operation.
  DiscardConflict,
}

fn root_matches(kind: &ConflictKind) -> bool {
  matches!(kind, ConflictKind::Root { .. })
}

fn discard_initial_for(resolved: &[Conflict], delete_tx: &Tx) -> bool {
  resolved.iter().any(|r| match &r.kind {
    ConflictKind::DeleteSet { initial, .. } => {
      r.resolution == Some(Resolution::DiscardInitial) && initial.time == delete_tx.time && initial.uuid == delete_tx.uuid
    }
    _ => false,
  })
}

fn discard_conflict_for(resolved: &[Conflict], initial: &Tx, conflict_tx: &Tx) -> bool {
  resolved.iter().any(|r| match &r.kind {
    ConflictKind::DeleteSet { initial: ri, conflict: rc } => {
      r.resolution == Some(Resolution::DiscardConflict)
        && ri.time == initial.time
        && ri.uuid == initial.uuid
        && rc.time == conflict_tx.time
        && rc.uuid == conflict_tx.uuid
    }
    _ => false,
  })
}

/// Appends `tx` to `c`, running the delete/delete-set bookkeeping described
/// in §4.5's check-conflict step. Pushes a new unresolved conflict onto
/// `conflicts` if one arises.
fn push_checked(c: &mut Vec<Tx>, tx: Tx, deleted: &mut HashMap<Uuid, Tx>, resolved: &[Conflict], conflicts: &mut Vec<Conflict>) {
  let is_delete = tx.kind == Kind::Delete;
  c.push(tx.clone());

  if is_delete {
    if discard_initial_for(resolved, &tx) {
      c.pop();
    } else {
      deleted.insert(tx.uuid, tx);
    }
    return;
  }

  if let Some(initial) = deleted.get(&tx.uuid).cloned() {
    if discard_conflict_for(resolved, &initial, &tx) {
      c.pop();
    } else {
      conflicts.push(Conflict { kind: ConflictKind::DeleteSet { initial, conflict: tx }, resolution: None });
    }
  }
}

/// Total order used to pick the "earlier" of two diverging transactions:
/// time, then uuid, then (key, value) — guarantees determinism on ties.
fn earlier(a: &Tx, b: &Tx) -> bool {
  a.sort_key() <= b.sort_key()
}

/// Three-way merges `a` and `b`, consuming previously-surfaced `resolved`
/// conflicts. Returns `(merged_log, [])` on success or `([], conflicts)`
/// when conflicts remain unresolved.
pub fn merge(a: &[Tx], b: &[Tx], resolved: &[Conflict]) -> (Vec<Tx>, Vec<Conflict>) {
  if resolved.iter().any(|c| c.resolution.is_none()) {
    return (Vec::new(), resolved.to_vec());
  }

  if a.is_empty() && b.is_empty() {
    return (Vec::new(), Vec::new());
  }

  if !a.is_empty()
    && !b.is_empty()
    && a.len() == b.len()
    && a[0].time == b[0].time
    && a.last().unwrap().time == b.last().unwrap().time
  {
    return (a.to_vec(), Vec::new());
  }

  let force_root = resolved
    .first()
    .map(|r| root_matches(&r.kind) && r.resolution == Some(Resolution::Force))
    .unwrap_or(false);

  let mut c: Vec<Tx> = Vec::new();
  let mut deleted: HashMap<Uuid, Tx> = HashMap::new();
  let mut conflicts: Vec<Conflict> = Vec::new();

  let mut i = 0usize;
  let mut j = 0usize;

  while i < a.len() && j < b.len() {
    if a[i].time == b[j].time && a[i] == b[j] {
      push_checked(&mut c, a[i].clone(), &mut deleted, resolved, &mut conflicts);
      i += 1;
      j += 1;
    } else if i == 0 && j == 0 && !force_root {
      return (Vec::new(), vec![Conflict { kind: ConflictKind::Root { a0: a[0].clone(), b0: b[0].clone() }, resolution: None }]);
    } else if earlier(&a[i], &b[j]) {
      push_checked(&mut c, a[i].clone(), &mut deleted, resolved, &mut conflicts);
      i += 1;
    } else {
      push_checked(&mut c, b[j].clone(), &mut deleted, resolved, &mut conflicts);
      j += 1;
    }
  }

  while i < a.len() {
    push_checked(&mut c, a[i].clone(), &mut deleted, resolved, &mut conflicts);
    i += 1;
  }
  while j < b.len() {
    push_checked(&mut c, b[j].clone(), &mut deleted, resolved, &mut conflicts);
    j += 1;
  }

  if !conflicts.is_empty() {
    return (Vec::new(), conflicts);
  }
  (c, Vec::new())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn u(n: u8) -> Uuid {
    Uuid::from_bytes([n; 16])
  }

  #[test]
  fn fast_path_identical_logs() {
    let u1 = u(1);
    let a = vec![Tx::add(1, u1), Tx::set_key(2, u1, "k".into(), "v".into())];
    let (c, conflicts) = merge(&a, &a, &[]);
    assert_eq!(c, a);
    assert!(conflicts.is_empty());
  }

  #[test]
  fn append_when_b_is_prefix_of_a() {
    let u1 = u(1);
    let b = vec![Tx::add(1, u1)];
    let a = vec![Tx::add(1, u1), Tx::set_key(2, u1, "k".into(), "v".into())];
    let (c, conflicts) = merge(&a, &b, &[]);
    assert_eq!(c, a);
    assert!(conflicts.is_empty());
  }

  #[test]
  fn delete_set_conflict_and_resolutions() {
    let u1 = u(1);
    let a = vec![Tx::add(1, u1), Tx::set_key(3, u1, "k".into(), "v".into())];
    let b = vec![Tx::add(1, u1), Tx::delete(2, u1)];

    let (c, conflicts) = merge(&a, &b, &[]);
    assert!(c.is_empty());
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    match &conflict.kind {
      ConflictKind::DeleteSet { initial, conflict } => {
        assert_eq!(initial.time, 2);
        assert_eq!(conflict.time, 3);
      }
      _ => panic!("expected DeleteSet"),
    }

    let resolved_restore = vec![Conflict { kind: conflict.kind.clone(), resolution: Some(Resolution::DiscardInitial) }];
    let (merged, remaining) = merge(&a, &b, &resolved_restore);
    assert!(remaining.is_empty());
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].kind, Kind::Add);
    assert_eq!(merged[1].kind, Kind::SetKey);
    assert_eq!(merged[1].time, 3);

    let resolved_respect = vec![Conflict { kind: conflict.kind.clone(), resolution: Some(Resolution::DiscardConflict) }];
    let (merged2, remaining2) = merge(&a, &b, &resolved_respect);
    assert!(remaining2.is_empty());
    assert_eq!(merged2.len(), 2);
    assert_eq!(merged2[1].kind, Kind::Delete);
    assert_eq!(merged2[1].time, 2);
  }

  #[test]
  fn root_fork_requires_force() {
    let u1 = u(1);
    let u2 = u(2);
    let a = vec![Tx::add(1, u1)];
    let b = vec![Tx::add(2, u2)];

    let (c, conflicts) = merge(&a, &b, &[]);
    assert!(c.is_empty());
    assert_eq!(conflicts.len(), 1);
    assert!(matches!(conflicts[0].kind, ConflictKind::Root { .. }));

    let resolved = vec![Conflict { kind: conflicts[0].kind.clone(), resolution: Some(Resolution::Force) }];
    let (merged, remaining) = merge(&a, &b, &resolved);
    assert!(remaining.is_empty());
    assert_eq!(merged, vec![Tx::add(1, u1), Tx::add(2, u2)]);
  }

  #[test]
  fn unresolved_conflict_blocks_reentry() {
    let u1 = u(1);
    let a = vec![Tx::add(1, u1)];
    let b = vec![Tx::add(1, u1)];
    let pending = vec![Conflict { kind: ConflictKind::Root { a0: a[0].clone(), b0: b[0].clone() }, resolution: None }];
    let (c, conflicts) = merge(&a, &b, &pending);
    assert!(c.is_empty());
    assert_eq!(conflicts, pending);
  }

  #[test]
  fn merge_collects_every_independent_conflict_in_one_pass() {
    let u1 = u(1);
    let u2 = u(2);
    // u1 and u2's histories occupy disjoint time ranges so the two-pointer
    // walk can align on each uuid's shared `Add` before its fork, instead of
    // interleaving both conflicts into a single walk step.
    let a = vec![
      Tx::add(1, u1),
      Tx::set_key(5, u1, "k".into(), "v".into()),
      Tx::add(20, u2),
      Tx::set_key(25, u2, "k".into(), "v".into()),
    ];
    let b = vec![Tx::add(1, u1), Tx::delete(3, u1), Tx::add(20, u2), Tx::delete(23, u2)];

    let (c, conflicts) = merge(&a, &b, &[]);
    assert!(c.is_empty());
    assert_eq!(conflicts.len(), 2, "both independent DeleteSet conflicts must surface in one pass");

    let resolved: Vec<Conflict> =
      conflicts.iter().map(|conflict| Conflict { kind: conflict.kind.clone(), resolution: Some(Resolution::DiscardConflict) }).collect();

    let (merged, remaining) = merge(&a, &b, &resolved);
    assert!(remaining.is_empty(), "conflict closure: resolving every surfaced conflict must yield a clean merge");
    assert_eq!(merged.iter().filter(|tx| tx.kind == Kind::Delete).count(), 2);
  }

  #[test]
  fn merge_is_deterministic() {
    let u1 = u(1);
    let u2 = u(2);
    let a = vec![Tx::add(1, u1), Tx::set_key(5, u1, "k".into(), "v".into())];
    let b = vec![Tx::add(1, u1), Tx::add(3, u2)];
    let (c1, _) = merge(&a, &b, &[]);
    let (c2, _) = merge(&a, &b, &[]);
    assert_eq!(c1, c2);
  }
}
