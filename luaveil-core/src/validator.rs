//! Syntax validation through the external linter.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::time::timeout;

use crate::errors::Result;

pub const DEFAULT_VALIDATION_BUDGET: Duration = Duration::from_secs(8);

/// Outcome of one linter run. The diagnostic text is always the raw tool
/// output so it can be surfaced verbatim to the requester or operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid(String),
    Invalid(String),
    /// The linter exceeded its wall-clock budget. Distinct from `Invalid`
    /// so callers can say "try again" instead of "fix your syntax".
    Aborted(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid(_))
    }

    pub fn diagnostic(&self) -> &str {
        match self {
            ValidationResult::Valid(text)
            | ValidationResult::Invalid(text)
            | ValidationResult::Aborted(text) => text,
        }
    }
}

/// Stateless apart from the linter path and budget; every invocation gets
/// its own temp file and subprocess, so concurrent jobs can share one
/// validator freely.
#[derive(Debug, Clone)]
pub struct SyntaxValidator {
    linter: PathBuf,
    budget: Duration,
    temp_dir: Option<PathBuf>,
}

impl SyntaxValidator {
    pub fn new(linter: impl Into<PathBuf>) -> Self {
        Self {
            linter: linter.into(),
            budget: DEFAULT_VALIDATION_BUDGET,
            temp_dir: None,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Directs validator-owned temp files into a specific directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Validates raw source text. The text is persisted to a temporary
    /// `.lua` file (the linter only takes paths) which is removed on every
    /// outcome, including timeout.
    pub async fn validate_source(&self, code: &str) -> Result<ValidationResult> {
        let mut builder = tempfile::Builder::new();
        builder.suffix(".lua");
        let temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        tokio::fs::write(temp.path(), code).await?;
        // temp removed on drop, whichever way run_linter exits
        self.run_linter(temp.path()).await
    }

    /// Validates an existing file. Ownership of the path stays with the
    /// caller; nothing is removed here.
    pub async fn validate_file(&self, path: &Path) -> Result<ValidationResult> {
        self.run_linter(path).await
    }

    async fn run_linter(&self, path: &Path) -> Result<ValidationResult> {
        let mut cmd = tokio::process::Command::new(&self.linter);
        cmd.arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.budget, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Ok(ValidationResult::Aborted(format!(
                    "validation aborted: linter exceeded the {} second budget",
                    self.budget.as_secs_f64()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        // exit 0 is clean, exit 1 is warnings-only; both count as valid
        match output.status.code() {
            Some(0) | Some(1) => Ok(ValidationResult::Valid(stdout)),
            _ => Ok(ValidationResult::Invalid(stdout)),
        }
    }
}
