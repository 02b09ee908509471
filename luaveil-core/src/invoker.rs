//! Invocation of the external obfuscation engine.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tracing::{error, info};

use crate::bitmask;
use crate::errors::Result;
use crate::registry::MethodRegistry;
use crate::toolchain::Toolchain;
use crate::validator::{SyntaxValidator, ValidationResult};

/// Intensity tier appended as one extra engine flag, orthogonal to the
/// method bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntensityPreset {
    Minimal,
    Moderate,
    Maximum,
}

impl IntensityPreset {
    /// The engine's flag vocabulary for presets.
    pub fn flag(self) -> &'static str {
        match self {
            IntensityPreset::Minimal => "--min",
            IntensityPreset::Moderate => "--mid",
            IntensityPreset::Maximum => "--max",
        }
    }
}

/// One engine run. Process failure and post-validation corruption carry
/// distinct diagnostics: the former points at the input or flags, the
/// latter at a defect in the engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    Success(String),
    ProcessFailed(String),
    CorruptOutput(String),
}

impl InvokeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvokeOutcome::Success(_))
    }

    pub fn diagnostic(&self) -> &str {
        match self {
            InvokeOutcome::Success(text)
            | InvokeOutcome::ProcessFailed(text)
            | InvokeOutcome::CorruptOutput(text) => text,
        }
    }
}

pub struct ObfuscationInvoker {
    toolchain: Arc<Toolchain>,
    registry: Arc<MethodRegistry>,
    validator: SyntaxValidator,
}

impl ObfuscationInvoker {
    pub fn new(
        toolchain: Arc<Toolchain>,
        registry: Arc<MethodRegistry>,
        validator: SyntaxValidator,
    ) -> Self {
        Self {
            toolchain,
            registry,
            validator,
        }
    }

    /// Runs the engine against `file`, which is overwritten in place.
    ///
    /// The engine's working directory is passed to the spawn primitive;
    /// our own process cwd is never touched, so concurrent invocations
    /// cannot interfere with each other. No retries happen here: every
    /// failure is reported upward for a human decision.
    pub async fn obfuscate(
        &self,
        file: &Path,
        mask: u64,
        preset: Option<IntensityPreset>,
    ) -> Result<InvokeOutcome> {
        // An out-of-range mask is a contract violation; nothing is spawned.
        let keys = bitmask::active_keys(&self.registry, mask)?;

        let mut flags: Vec<String> = keys.iter().map(|key| format!("--{key}")).collect();
        if let Some(preset) = preset {
            flags.push(preset.flag().to_string());
        }
        info!(file = %file.display(), ?flags, "obfuscating");

        let output = tokio::process::Command::new(&self.toolchain.interpreter)
            .arg(&self.toolchain.entry_script)
            .arg(file)
            .args(&flags)
            .arg("--overwrite")
            .current_dir(&self.toolchain.engine_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            error!(
                file = %file.display(),
                status = output.status.code(),
                "obfuscation engine failed"
            );
            return Ok(InvokeOutcome::ProcessFailed(combined));
        }

        // The engine exited clean; make sure what it wrote still parses.
        match self.validator.validate_file(file).await? {
            ValidationResult::Valid(diag) => Ok(InvokeOutcome::Success(diag)),
            ValidationResult::Invalid(diag) | ValidationResult::Aborted(diag) => {
                error!(
                    file = %file.display(),
                    "obfuscation produced output that fails syntax validation"
                );
                Ok(InvokeOutcome::CorruptOutput(diag))
            }
        }
    }
}
