//! Interactive prompts consumed by the sync conflict flow (§5, §6). The
//! line editor and TUI themselves are out of scope; this is just the small
//! surface the engine calls through, externalized so the core library has
//! no global UI state (§9).

/// A user interruption during a prompt (e.g. Ctrl-C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt;

pub trait UiSink {
  fn prompt(&mut self, message: &str) -> Result<String, Interrupt>;
  fn prompt_password(&mut self, message: &str) -> Result<String, Interrupt>;
  fn prompt_yes_no(&mut self, message: &str) -> Result<bool, Interrupt>;
  fn prompt_menu(&mut self, message: &str, options: &[&str]) -> Result<usize, Interrupt>;
}

/// A sink that never prompts — every call fails as interrupted. Suitable
/// for non-interactive sync runs (cron jobs, CI) where conflicts must be
/// resolved ahead of time or not at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUi;

impl UiSink for NullUi {
  fn prompt(&mut self, _message: &str) -> Result<String, Interrupt> {
    Err(Interrupt)
  }
  fn prompt_password(&mut self, _message: &str) -> Result<String, Interrupt> {
    Err(Interrupt)
  }
  fn prompt_yes_no(&mut self, _message: &str) -> Result<bool, Interrupt> {
    Err(Interrupt)
  }
  fn prompt_menu(&mut self, _message: &str, _options: &[&str]) -> Result<usize, Interrupt> {
    Err(Interrupt)
  }
}

/// A scripted test double: replays a fixed sequence of answers, one per
/// call, regardless of which prompt method is invoked.
#[derive(Debug, Default, Clone)]
pub struct ScriptedUi {
  strings: std::collections::VecDeque<String>,
  bools: std::collections::VecDeque<bool>,
  choices: std::collections::VecDeque<usize>,
}

impl ScriptedUi {
  pub fn new() -> ScriptedUi {
    ScriptedUi::default()
  }

  pub fn with_string(mut self, answer: impl Into<String>) -> ScriptedUi {
    self.strings.push_back(answer.into());
    self
  }

  pub fn with_bool(mut self, answer: bool) -> ScriptedUi {
    self.bools.push_back(answer);
    self
  }

  pub fn with_choice(mut self, choice: usize) -> ScriptedUi {
    self.choices.push_back(choice);
    self
  }
}

impl UiSink for ScriptedUi {
  fn prompt(&mut self, _message: &str) -> Result<String, Interrupt> {
    self.strings.pop_front().ok_or(Interrupt)
  }
  fn prompt_password(&mut self, _message: &str) -> Result<String, Interrupt> {
    self.strings.pop_front().ok_or(Interrupt)
  }
  fn prompt_yes_no(&mut self, _message: &str) -> Result<bool, Interrupt> {
    self.bools.pop_front().ok_or(Interrupt)
  }
  fn prompt_menu(&mut self, _message: &str, _options: &[&str]) -> Result<usize, Interrupt> {
    self.choices.pop_front().ok_or(Interrupt)
  }
}
