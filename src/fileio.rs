//! `[AMBIENT]` file write helper enforcing mode `0600` (§5): the vault file
//! and any pushed remote copy are full-file rewrites, never write-then-rename,
//! so a crash mid-write can corrupt the file; callers rely on remote replicas
//! and the history log for recovery instead.

use std::io;
use std::path::Path;

#[cfg(unix)]
pub fn write_restricted(path: &Path, bytes: &[u8]) -> io::Result<()> {
  use std::fs::OpenOptions;
  use std::io::Write;
  use std::os::unix::fs::OpenOptionsExt;

  let mut file = OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)?;
  file.write_all(bytes)
}

#[cfg(not(unix))]
pub fn write_restricted(path: &Path, bytes: &[u8]) -> io::Result<()> {
  std::fs::write(path, bytes)
}
