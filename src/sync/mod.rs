//! Synchronization engine: pull remote ciphertext, merge with the local
//! log, reconcile encryption parameters, push the unified result back
//! (§1, §4, scenario 6).

pub mod engine;
pub mod transport;
pub mod ui;

pub use engine::{sync_one, Outcome, RemoteSpec};
pub use transport::{parse_remote_url, Remote, ScpClient, SshConfig};
pub use ui::{Interrupt, NullUi, ScriptedUi, UiSink};
