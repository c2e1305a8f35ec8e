//! Human-readable record of every decision a configure run makes.
//!
//! Each entry is mirrored to `tracing` as it is recorded, so `-v` shows the
//! same trail the log file does.

use std::fmt;

use serde::Serialize;

use crate::util::diagnostic::Severity;

/// Pipeline stage a decision belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Platform,
    Options,
    Features,
    Modules,
    Artifacts,
    Emit,
    Parity,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Platform => "platform",
            Stage::Options => "options",
            Stage::Features => "features",
            Stage::Modules => "modules",
            Stage::Artifacts => "artifacts",
            Stage::Emit => "emit",
            Stage::Parity => "parity",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded decision.
#[derive(Debug, Clone)]
pub struct Decision {
    pub stage: Stage,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Note | Severity::Help => write!(f, "[{}] {}", self.stage, self.message),
            _ => write!(f, "[{}] {}: {}", self.stage, self.severity, self.message),
        }
    }
}

/// Append-only decision log.
#[derive(Debug, Clone, Default)]
pub struct DecisionLog {
    entries: Vec<Decision>,
}

impl DecisionLog {
    pub fn new() -> Self {
        DecisionLog::default()
    }

    /// Record an ordinary decision.
    pub fn note(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(stage = stage.as_str(), "{}", message);
        self.push(stage, Severity::Note, message);
    }

    /// Record a decision the user should look at.
    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(stage = stage.as_str(), "{}", message);
        self.push(stage, Severity::Warning, message);
    }

    /// Record the reason a run is about to fail.
    pub fn error(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(stage = stage.as_str(), "{}", message);
        self.push(stage, Severity::Error, message);
    }

    fn push(&mut self, stage: Stage, severity: Severity, message: String) {
        self.entries.push(Decision {
            stage,
            severity,
            message,
        });
    }

    pub fn entries(&self) -> &[Decision] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded for one stage.
    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &Decision> {
        self.entries.iter().filter(move |d| d.stage == stage)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Decision> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Render one line per decision.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_renders_one_line_per_entry() {
        let mut log = DecisionLog::new();
        log.note(Stage::Platform, "resolved linux/x86_64 to `linux-x86_64`");
        log.warn(Stage::Platform, "no canonical target for arch `riscv32`");
        log.note(Stage::Features, "disable `engine` (requires disabled `dso`)");

        let rendered = log.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[platform] resolved linux/x86_64 to `linux-x86_64`");
        assert_eq!(
            lines[1],
            "[platform] warning: no canonical target for arch `riscv32`"
        );
    }

    #[test]
    fn test_filters() {
        let mut log = DecisionLog::new();
        log.note(Stage::Features, "a");
        log.warn(Stage::Parity, "b");
        log.error(Stage::Artifacts, "c");

        assert_eq!(log.for_stage(Stage::Features).count(), 1);
        assert_eq!(log.warnings().count(), 1);
        assert_eq!(log.entries().len(), 3);
    }
}
