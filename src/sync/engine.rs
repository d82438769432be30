//! Pull/merge/push orchestration over a single remote (§4, scenario 6).
//!
//! One round: fetch the remote ciphertext, decrypt it (possibly under
//! different credentials than the local copy), merge its log with the
//! local one — prompting through [`UiSink`] for any conflict — reconcile
//! `Params`, then re-encrypt and push the unified result back.

use super::transport::{self, Remote, ScpClient};
use super::ui::UiSink;
use crate::envelope::{self, Credential, Opened, Params, ParamsDiff};
use crate::error::SyncError;
use crate::txlog::{self, merge, Conflict, ConflictKind, Log, Resolution, Tx};
use tracing::{info, warn};

/// Where a remote lives and, for multi-user remotes, which slot to open.
pub struct RemoteSpec {
  pub url: String,
  pub user: Option<String>,
}

/// What happened during one sync round, for the caller to report to the
/// user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// The remote had nothing yet; the local state was pushed as-is.
  SeededRemote,
  /// Logs merged cleanly with no conflicts.
  MergedClean,
  /// Logs merged after resolving one or more conflicts through the UI.
  MergedWithResolutions,
}

/// Runs one pull/merge/push round against `remote`, mutating `local_log`
/// and `local_params` in place on success.
pub fn sync_one(
  local_log: &mut Log,
  local_params: &mut Params,
  remote: &RemoteSpec,
  local_credential: Credential<'_>,
  scp: &dyn ScpClient,
  ui: &mut dyn UiSink,
) -> Result<Outcome, SyncError> {
  let parsed_remote = transport::parse_remote_url(&remote.url)?;

  let remote_bytes = match transport::fetch(&parsed_remote, scp) {
    Ok(bytes) => bytes,
    Err(SyncError::NotFound) => {
      info!(url = %remote.url, "remote has no existing file, seeding it");
      let bytes = encrypt_for_push(local_params, &txlog::save(local_log, false)?)?;
      transport::push(&parsed_remote, scp, &bytes)?;
      return Ok(Outcome::SeededRemote);
    }
    Err(e) => return Err(e),
  };

  let Opened { plaintext, params: remote_params } =
    envelope::decrypt(&remote_bytes, local_credential, remote.user.as_deref())?;

  let remote_log = txlog::load(&plaintext)?;

  let had_conflicts = reconcile_logs(local_log, &remote_log, ui)?;
  reconcile_params(local_params, &remote_params);

  let merged_bytes = encrypt_for_push(local_params, &txlog::save(local_log, false)?)?;
  transport::push(&parsed_remote, scp, &merged_bytes)?;

  Ok(if had_conflicts { Outcome::MergedWithResolutions } else { Outcome::MergedClean })
}

fn encrypt_for_push(params: &mut Params, plaintext: &[u8]) -> Result<Vec<u8>, SyncError> {
  let bytes = if params.n_users == 0 {
    envelope::encrypt_single_user(params, plaintext)?
  } else {
    envelope::encrypt_multi_user(params, plaintext)?
  };
  Ok(bytes)
}

/// Merges `remote_log`'s transactions into `local_log`, replacing its
/// contents with the merged result. Returns whether any conflict needed an
/// interactive resolution.
fn reconcile_logs(local_log: &mut Log, remote_log: &Log, ui: &mut dyn UiSink) -> Result<bool, SyncError> {
  let a = local_log.txs();
  let b = remote_log.txs();

  let mut resolved: Vec<Conflict> = Vec::new();
  let mut any_resolution = false;

  loop {
    let (merged, conflicts) = merge(a, b, &resolved);
    if conflicts.is_empty() {
      *local_log = Log::from_txs(merged);
      return Ok(any_resolution);
    }

    any_resolution = true;
    let mut next_resolved = Vec::with_capacity(conflicts.len());
    for conflict in conflicts {
      if conflict.resolution.is_some() {
        next_resolved.push(conflict);
        continue;
      }
      let resolution = prompt_resolution(ui, &conflict)?;
      next_resolved.push(Conflict { kind: conflict.kind, resolution: Some(resolution) });
    }
    resolved = next_resolved;
  }
}

fn prompt_resolution(ui: &mut dyn UiSink, conflict: &Conflict) -> Result<Resolution, SyncError> {
  match &conflict.kind {
    ConflictKind::Root { .. } => {
      let proceed = ui
        .prompt_yes_no("These logs share no common history. Merge them anyway?")
        .map_err(|_| SyncError::MergeAborted("interrupted at root-fork prompt".into()))?;
      if proceed {
        Ok(Resolution::Force)
      } else {
        Err(SyncError::MergeAborted("root fork refused by user".into()))
      }
    }
    ConflictKind::DeleteSet { .. } => {
      let choice = ui
        .prompt_menu(
          "One side deleted this entry while the other modified it. Keep which?",
          &["Restore the entry", "Keep it deleted"],
        )
        .map_err(|_| SyncError::MergeAborted("interrupted at delete-set prompt".into()))?;
      Ok(if choice == 0 { Resolution::DiscardInitial } else { Resolution::DiscardConflict })
    }
  }
}

/// Reconciles `Params` after a successful merge, per §4.4's diff rules.
/// A topology change (single⇄multi) or any user/rekey difference on the
/// remote is adopted wholesale: post-merge, the remote's encryption state
/// becomes authoritative and local credentials follow it.
fn reconcile_params(local: &mut Params, remote: &Params) {
  let diffs = local.diff(remote);
  if diffs.is_empty() {
    return;
  }

  for diff in &diffs {
    match diff {
      ParamsDiff::MultiFile => warn!("remote converted this vault to multi-user; adopting its params"),
      ParamsDiff::SingleFile => warn!("remote reverted this vault to single-user; adopting its params"),
      ParamsDiff::AddUser { .. } => info!("remote added a user; adopting its params"),
      ParamsDiff::DelUser { .. } => info!("remote removed a user; adopting its params"),
      ParamsDiff::DelSelf => warn!("remote removed the locally-opened user"),
      ParamsDiff::RekeyUser { .. } | ParamsDiff::RekeySelf { .. } => info!("remote rekeyed a user; adopting its params"),
    }
  }

  let local_user_slot = if local.n_users == 0 { None } else { local.users.get(local.user).copied() };
  *local = remote.clone();
  if local.n_users != 0 {
    if let Some(sha) = local_user_slot {
      if let Some(index) = local.users.iter().position(|u| u == &sha) {
        local.user = index;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::ui::ScriptedUi;

  fn uuid_tx(n: u8) -> uuid::Uuid {
    uuid::Uuid::from_bytes([n; 16])
  }

  #[test]
  fn reconcile_logs_merges_cleanly_with_no_conflicts() {
    let u1 = uuid_tx(1);
    let mut local = Log::from_txs(vec![Tx::add(1, u1)]);
    let remote = Log::from_txs(vec![Tx::add(1, u1), Tx::set_key(2, u1, "k".into(), "v".into())]);

    let mut ui = ScriptedUi::new();
    let had_conflicts = reconcile_logs(&mut local, &remote, &mut ui).unwrap();
    assert!(!had_conflicts);
    assert_eq!(local.txs().len(), 2);
  }

  #[test]
  fn reconcile_logs_resolves_root_fork_via_ui() {
    let u1 = uuid_tx(1);
    let u2 = uuid_tx(2);
    let mut local = Log::from_txs(vec![Tx::add(1, u1)]);
    let remote = Log::from_txs(vec![Tx::add(2, u2)]);

    let mut ui = ScriptedUi::new().with_bool(true);
    let had_conflicts = reconcile_logs(&mut local, &remote, &mut ui).unwrap();
    assert!(had_conflicts);
    assert_eq!(local.txs().len(), 2);
  }

  #[test]
  fn reconcile_logs_aborts_when_root_fork_refused() {
    let u1 = uuid_tx(1);
    let u2 = uuid_tx(2);
    let mut local = Log::from_txs(vec![Tx::add(1, u1)]);
    let remote = Log::from_txs(vec![Tx::add(2, u2)]);

    let mut ui = ScriptedUi::new().with_bool(false);
    let err = reconcile_logs(&mut local, &remote, &mut ui).unwrap_err();
    assert!(matches!(err, SyncError::MergeAborted(_)));
  }

  #[test]
  fn reconcile_params_adopts_remote_on_topology_change() {
    let mut local = Params::create_single_user("owner pass").unwrap();
    let mut remote = local.clone();
    let salt = crate::kdf::generate_salt().to_vec();
    let key = crate::kdf::derive(1, "alice pass", &salt).unwrap();
    remote.add_user("alice", key, salt).unwrap();

    reconcile_params(&mut local, &remote);
    assert_eq!(local.n_users, 1);
  }
}
