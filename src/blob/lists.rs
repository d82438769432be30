//! Newline-joined list-valued fields: `labels`, `notes`, `knownhosts` (§4.6).

/// Splits a stored list-valued field into its lines, dropping trailing
/// empties so an unset/empty field parses as `[]`.
pub fn split(value: &str) -> Vec<String> {
  if value.is_empty() {
    return Vec::new();
  }
  value.lines().map(str::to_string).collect()
}

/// Joins lines back into the newline-separated storage form.
pub fn join(lines: &[String]) -> String {
  lines.join("\n")
}

/// Appends `line` to the stored value.
pub fn add(value: &str, line: &str) -> String {
  let mut lines = split(value);
  lines.push(line.to_string());
  join(&lines)
}

/// Removes the first line equal to `line`. No-op if absent.
pub fn remove_value(value: &str, line: &str) -> String {
  let mut lines = split(value);
  if let Some(pos) = lines.iter().position(|l| l == line) {
    lines.remove(pos);
  }
  join(&lines)
}

/// Removes the line at `index`. No-op if out of range.
pub fn remove_index(value: &str, index: usize) -> String {
  let mut lines = split(value);
  if index < lines.len() {
    lines.remove(index);
  }
  join(&lines)
}

/// A single known-host line: `hostname address key-type sha256hex`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownHost {
  pub hostname: String,
  pub address: String,
  pub key_type: String,
  pub fingerprint: String,
}

impl KnownHost {
  pub fn to_line(&self) -> String {
    format!("{} {} {} {}", self.hostname, self.address, self.key_type, self.fingerprint)
  }

  pub fn parse_line(line: &str) -> Option<KnownHost> {
    let mut parts = line.split_whitespace();
    Some(KnownHost {
      hostname: parts.next()?.to_string(),
      address: parts.next()?.to_string(),
      key_type: parts.next()?.to_string(),
      fingerprint: parts.next()?.to_string(),
    })
  }
}

/// Parses every well-formed known-host line, silently skipping malformed
/// ones.
pub fn parse_known_hosts(value: &str) -> Vec<KnownHost> {
  split(value).iter().filter_map(|line| KnownHost::parse_line(line)).collect()
}
