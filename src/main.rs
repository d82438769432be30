//! `vaultlog` - a thin CLI smoke-test harness over the library.
//!
//! This deliberately does not reimplement the excluded REPL/TUI: each
//! subcommand is a single non-interactive pass (init, unlock-and-list, add,
//! sync) that proves the three subsystems wire together end to end.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vaultlog::blob::Blob;
use vaultlog::envelope::{self, Credential};
use vaultlog::error::VaultError;
use vaultlog::sync::{self, NullUi, RemoteSpec, ScpClient, SshConfig};
use vaultlog::txlog;

#[derive(Parser)]
#[command(name = "vaultlog", about = "Local-first encrypted password vault")]
struct Cli {
  /// Path to the vault file on disk.
  #[arg(long, default_value = "vault.blob")]
  vault: PathBuf,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Creates a brand new single-user vault.
  Init {
    #[arg(long)]
    passphrase: String,
  },
  /// Decrypts the vault and prints every entry's name.
  Unlock {
    #[arg(long)]
    passphrase: String,
    /// Read-only history cutoff: only show entries as of this many
    /// nanoseconds since the Unix epoch (§4.5).
    #[arg(long)]
    history_limit: Option<i64>,
  },
  /// Adds a new, empty, named entry.
  Add {
    #[arg(long)]
    passphrase: String,
    #[arg(long)]
    name: String,
  },
  /// Runs one pull/merge/push sync round against a remote.
  Sync {
    #[arg(long)]
    passphrase: String,
    #[arg(long)]
    remote_url: String,
    #[arg(long)]
    remote_user: Option<String>,
  },
}

/// A placeholder `ScpClient`: the CLI only exercises `file://` remotes.
struct NoScp;

impl ScpClient for NoScp {
  fn recv(&self, _cfg: &SshConfig, _path: &str) -> Result<Vec<u8>, vaultlog::error::SyncError> {
    Err(vaultlog::error::SyncError::Transport("scp is not wired into the CLI smoke-test harness".into()))
  }
  fn send(&self, _cfg: &SshConfig, _path: &str, _mode: u32, _bytes: &[u8]) -> Result<(), vaultlog::error::SyncError> {
    Err(vaultlog::error::SyncError::Transport("scp is not wired into the CLI smoke-test harness".into()))
  }
}

fn main() {
  tracing_subscriber::fmt::init();
  let cli = Cli::parse();

  let result = match cli.command {
    Command::Init { passphrase } => cmd_init(&cli.vault, &passphrase),
    Command::Unlock { passphrase, history_limit } => cmd_unlock(&cli.vault, &passphrase, history_limit),
    Command::Add { passphrase, name } => cmd_add(&cli.vault, &passphrase, &name),
    Command::Sync { passphrase, remote_url, remote_user } => cmd_sync(&cli.vault, &passphrase, &remote_url, remote_user),
  };

  if let Err(err) = result {
    eprintln!("error: {err}");
    std::process::exit(1);
  }
}

fn cmd_init(path: &PathBuf, passphrase: &str) -> Result<(), VaultError> {
  let params = envelope::Params::create_single_user(passphrase)?;
  let log = txlog::Log::new();
  let plaintext = txlog::save(&log, false)?;
  let bytes = envelope::encrypt_single_user(&params, &plaintext)?;
  vaultlog::fileio::write_restricted(path, &bytes)?;
  println!("created vault at {}", path.display());
  Ok(())
}

fn cmd_unlock(path: &PathBuf, passphrase: &str, history_limit: Option<i64>) -> Result<(), VaultError> {
  let bytes = std::fs::read(path)?;
  let opened = envelope::decrypt(&bytes, Credential::Passphrase(passphrase), None)?;
  let mut log = txlog::load_with_cutoff(&opened.plaintext, history_limit)?;
  let snap = log.update_snapshot()?;

  let mut names: Vec<&str> = snap.entries.values().filter_map(|e| e.get("name").map(String::as_str)).collect();
  names.sort_unstable();
  for name in names {
    println!("{name}");
  }
  Ok(())
}

fn cmd_add(path: &PathBuf, passphrase: &str, name: &str) -> Result<(), VaultError> {
  let bytes = std::fs::read(path)?;
  let mut opened = envelope::decrypt(&bytes, Credential::Passphrase(passphrase), None)?;
  let mut log = txlog::load(&opened.plaintext)?;

  {
    let mut blob = Blob::new(&mut log);
    blob.new_entry(name)?;
  }

  let plaintext = txlog::save(&log, false)?;
  let out = if opened.params.n_users == 0 {
    envelope::encrypt_single_user(&opened.params, &plaintext)?
  } else {
    envelope::encrypt_multi_user(&mut opened.params, &plaintext)?
  };
  vaultlog::fileio::write_restricted(path, &out)?;
  println!("added {name}");
  Ok(())
}

fn cmd_sync(path: &PathBuf, passphrase: &str, remote_url: &str, remote_user: Option<String>) -> Result<(), VaultError> {
  let bytes = std::fs::read(path)?;
  let opened = envelope::decrypt(&bytes, Credential::Passphrase(passphrase), None)?;
  let mut log = txlog::load(&opened.plaintext)?;
  let mut params = opened.params;

  let remote = RemoteSpec { url: remote_url.to_string(), user: remote_user };
  let mut ui = NullUi;
  let outcome = sync::sync_one(&mut log, &mut params, &remote, Credential::Passphrase(passphrase), &NoScp, &mut ui)?;
  println!("sync finished: {outcome:?}");
  Ok(())
}
