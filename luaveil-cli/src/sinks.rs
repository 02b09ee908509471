//! Filesystem implementations of the delivery and escalation seams.

use std::path::PathBuf;

use async_trait::async_trait;
use luaveil_core::delivery::TransportPayload;
use luaveil_core::orchestrator::{ArtifactSink, DebugReport, DebugSink};
use luaveil_core::Result;
use rand::Rng;
use tracing::{info, warn};

/// Writes escalated failures into an operator-review directory: the
/// original input, the failed output when readable, and the diagnostic
/// (inline in the report for short text, as a separate file otherwise).
pub struct DirectoryDebugSink {
    dir: PathBuf,
    inline_limit: usize,
}

impl DirectoryDebugSink {
    pub fn new(dir: PathBuf, inline_limit: usize) -> Self {
        Self { dir, inline_limit }
    }
}

#[async_trait]
impl DebugSink for DirectoryDebugSink {
    async fn ship(&self, report: &DebugReport) -> Result<()> {
        let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
        let report_dir = self.dir.join(format!("{}_{suffix}", report.requester));
        tokio::fs::create_dir_all(&report_dir).await?;

        tokio::fs::write(report_dir.join("Input.lua"), &report.original_source).await?;
        if let Some(output) = &report.failed_output {
            tokio::fs::write(report_dir.join("Output.lua"), output).await?;
        }

        let mut summary = format!(
            "An error appeared during/after obfuscation, submitted by {}.\n",
            report.requester
        );
        if report.diagnostic.len() <= self.inline_limit {
            summary.push_str(&report.diagnostic);
        } else {
            tokio::fs::write(report_dir.join("ErrorMessage.txt"), &report.diagnostic).await?;
            summary.push_str("Diagnostic in ErrorMessage.txt.\n");
        }
        tokio::fs::write(report_dir.join("report.txt"), summary).await?;

        info!(dir = %report_dir.display(), "debug report shipped");
        Ok(())
    }
}

/// Copies the packaged artifact to the requested output path, or next to
/// the working directory when none was given.
pub struct FileArtifactSink {
    output: Option<PathBuf>,
}

impl FileArtifactSink {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactSink {
    async fn deliver(
        &self,
        payload: &TransportPayload,
        _requester: &str,
    ) -> Result<Option<PathBuf>> {
        match payload {
            TransportPayload::File(path) => {
                let dest = match &self.output {
                    Some(output) => output.clone(),
                    None => PathBuf::from(path.file_name().unwrap_or(path.as_os_str())),
                };
                tokio::fs::copy(path, &dest).await?;
                Ok(Some(dest))
            }
            TransportPayload::Zipped(path) => {
                let dest = match &self.output {
                    Some(output) => output.with_extension("zip"),
                    None => PathBuf::from(path.file_name().unwrap_or(path.as_os_str())),
                };
                tokio::fs::copy(path, &dest).await?;
                Ok(Some(dest))
            }
            TransportPayload::TooLarge { size, limit } => {
                warn!(size, limit, "artifact untransportable even after compression");
                Ok(None)
            }
        }
    }
}
