//! Per-job request orchestration.
//!
//! One job takes untrusted input through validation, interactive method
//! selection, the external engine, post-validation and delivery. Jobs are
//! independent and may interleave freely; every suspension point is an
//! await, and every temporary file is owned by exactly one job and
//! removed on all terminal paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::bitmask::MethodSelection;
use crate::config::AppConfig;
use crate::delivery::{self, TransportPayload};
use crate::encoding;
use crate::errors::{CoreError, Result};
use crate::fetch;
use crate::invoker::{IntensityPreset, InvokeOutcome, ObfuscationInvoker};
use crate::metrics::Metrics;
use crate::registry::MethodRegistry;
use crate::validator::{SyntaxValidator, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    AwaitingInput,
    InputValidated,
    SelectingMethods,
    Obfuscating,
    Delivered,
    FailedRecoverable,
}

/// One user request: a remote URL or uploaded bytes.
#[derive(Debug, Clone)]
pub enum Submission {
    Url(String),
    Upload { filename: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BadSubmission,
    InvalidSyntax,
    /// The linter timed out; the requester should retry rather than fix
    /// their syntax.
    ValidationTimedOut,
    EmptySelection,
}

/// How the requester answered the debug-escalation offer. A timeout is
/// deliberately distinct from an explicit decline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationChoice {
    Accepted,
    Declined,
    TimedOut,
}

#[derive(Debug)]
pub enum JobOutcome {
    Delivered { artifact: Option<PathBuf> },
    Rejected { reason: RejectReason, diagnostic: String },
    Failed { diagnostic: String, escalation: EscalationChoice },
}

/// Everything shipped to the operator-review destination on an accepted
/// escalation.
#[derive(Debug, Clone)]
pub struct DebugReport {
    pub requester: String,
    pub original_source: String,
    /// Contents of the working file after the failed run, when readable.
    pub failed_output: Option<Vec<u8>>,
    pub diagnostic: String,
}

/// Interactive method selection. Implementations publish every confirmed
/// toggle through `selection` as it happens; returning ends the exchange.
/// The orchestrator bounds the wait and, when the bound expires first,
/// proceeds with whatever was last published (the defaults, if nothing
/// was).
#[async_trait]
pub trait MethodPrompt: Send + Sync {
    async fn select_methods(
        &self,
        registry: &MethodRegistry,
        selection: &watch::Sender<MethodSelection>,
    ) -> Result<()>;
}

/// Yes/no offer to forward a failed job for operator review.
#[async_trait]
pub trait EscalationPrompt: Send + Sync {
    async fn confirm_escalation(&self, diagnostic: &str) -> Result<bool>;
}

/// Operator-review destination for escalated failures.
#[async_trait]
pub trait DebugSink: Send + Sync {
    async fn ship(&self, report: &DebugReport) -> Result<()>;
}

/// Delivery collaborator. Returns where the artifact ended up, or `None`
/// when the payload was untransportable.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn deliver(&self, payload: &TransportPayload, requester: &str)
        -> Result<Option<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct JobLimits {
    pub buffer_dir: PathBuf,
    pub max_source_bytes: u64,
    pub select_timeout: Duration,
    pub escalate_timeout: Duration,
    pub attachment_limit: u64,
}

impl JobLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            buffer_dir: PathBuf::from(&config.buffer_dir),
            max_source_bytes: config.max_source_bytes,
            select_timeout: Duration::from_secs(config.selection_timeout_secs),
            escalate_timeout: Duration::from_secs(config.escalation_timeout_secs),
            attachment_limit: config.attachment_limit_bytes,
        }
    }
}

pub struct Orchestrator {
    registry: Arc<MethodRegistry>,
    validator: SyntaxValidator,
    invoker: ObfuscationInvoker,
    http: reqwest::Client,
    metrics: Arc<Metrics>,
    limits: JobLimits,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<MethodRegistry>,
        validator: SyntaxValidator,
        invoker: ObfuscationInvoker,
        metrics: Arc<Metrics>,
        limits: JobLimits,
    ) -> Self {
        Self {
            registry,
            validator,
            invoker,
            http: reqwest::Client::new(),
            metrics,
            limits,
        }
    }

    /// Drives one job from submission to a terminal state. Within the job
    /// the steps are strictly sequential; the working file is removed on
    /// every exit path.
    pub async fn run_job(
        &self,
        requester: &str,
        submission: Submission,
        preset: Option<IntensityPreset>,
        methods: &dyn MethodPrompt,
        escalation: &dyn EscalationPrompt,
        debug_sink: &dyn DebugSink,
        artifacts: &dyn ArtifactSink,
    ) -> Result<JobOutcome> {
        self.metrics.jobs_started.inc();
        let mut state = JobState::AwaitingInput;

        let source = match self.intake(&submission).await {
            Ok(code) => code,
            Err(
                err @ (CoreError::UrlRejected(_)
                | CoreError::SourceTooLarge { .. }
                | CoreError::NotLua(_)),
            ) => {
                return Ok(self.reject(RejectReason::BadSubmission, err.to_string()));
            }
            Err(err) => return Err(err),
        };

        self.metrics.validations_run.inc();
        match self.validator.validate_source(&source).await? {
            ValidationResult::Valid(_) => {
                state = advance(state, JobState::InputValidated);
            }
            ValidationResult::Invalid(diag) => {
                return Ok(self.reject(RejectReason::InvalidSyntax, diag));
            }
            ValidationResult::Aborted(diag) => {
                return Ok(self.reject(RejectReason::ValidationTimedOut, diag));
            }
        }

        state = advance(state, JobState::SelectingMethods);
        let (updates, confirmed) = watch::channel(MethodSelection::defaults(&self.registry));
        match tokio::time::timeout(self.limits.select_timeout, async {
            methods.select_methods(&self.registry, &updates).await
        })
        .await
        {
            Ok(done) => done?,
            Err(_) => {
                debug!("method selection timed out, keeping the last updated mask");
            }
        }
        let selection = *confirmed.borrow();
        if selection.is_empty() {
            return Ok(self.reject(
                RejectReason::EmptySelection,
                "at least one obfuscation method must be selected".into(),
            ));
        }

        state = advance(state, JobState::Obfuscating);
        let buffer = BufferFile::create(&self.limits.buffer_dir, requester, &source)?;
        let outcome = self
            .invoker
            .obfuscate(buffer.path(), selection.mask(), preset)
            .await?;

        match outcome {
            InvokeOutcome::Success(_) => {
                let payload = delivery::package(
                    buffer.path(),
                    self.limits.attachment_limit,
                    &self.limits.buffer_dir,
                )?;
                let delivered = artifacts.deliver(&payload, requester).await;
                // the zip is job-owned; it goes away whether delivery
                // worked or not
                if let TransportPayload::Zipped(zip_path) = &payload {
                    let _ = std::fs::remove_file(zip_path);
                }
                let artifact = delivered?;
                advance(state, JobState::Delivered);
                self.metrics.jobs_delivered.inc();
                Ok(JobOutcome::Delivered { artifact })
            }
            InvokeOutcome::ProcessFailed(diag) | InvokeOutcome::CorruptOutput(diag) => {
                let failed_output = std::fs::read(buffer.path()).ok();
                let choice = match tokio::time::timeout(self.limits.escalate_timeout, async {
                    escalation.confirm_escalation(&diag).await
                })
                .await
                {
                    Ok(Ok(true)) => {
                        let report = DebugReport {
                            requester: requester.to_string(),
                            original_source: source,
                            failed_output,
                            diagnostic: diag.clone(),
                        };
                        if let Err(err) = debug_sink.ship(&report).await {
                            warn!("failed to ship debug report: {err}");
                        }
                        EscalationChoice::Accepted
                    }
                    Ok(Ok(false)) => EscalationChoice::Declined,
                    Ok(Err(err)) => return Err(err),
                    Err(_) => {
                        debug!("escalation offer timed out, no action taken");
                        EscalationChoice::TimedOut
                    }
                };
                advance(state, JobState::FailedRecoverable);
                self.metrics.jobs_failed.inc();
                Ok(JobOutcome::Failed {
                    diagnostic: diag,
                    escalation: choice,
                })
            }
        }
    }

    fn reject(&self, reason: RejectReason, diagnostic: String) -> JobOutcome {
        self.metrics.jobs_rejected.inc();
        debug!(?reason, "job rejected");
        JobOutcome::Rejected { reason, diagnostic }
    }

    async fn intake(&self, submission: &Submission) -> Result<String> {
        match submission {
            Submission::Url(url) => {
                fetch::fetch_lua_source(&self.http, url, self.limits.max_source_bytes).await
            }
            Submission::Upload { filename, bytes } => {
                if !filename.to_ascii_lowercase().ends_with(".lua") {
                    return Err(CoreError::NotLua(filename.clone()));
                }
                if bytes.len() as u64 > self.limits.max_source_bytes {
                    return Err(CoreError::SourceTooLarge {
                        size: bytes.len() as u64,
                        limit: self.limits.max_source_bytes,
                    });
                }
                Ok(encoding::decode_lua_bytes(bytes))
            }
        }
    }
}

fn advance(from: JobState, to: JobState) -> JobState {
    debug!(?from, ?to, "job state transition");
    to
}

/// The job's working file: namespaced by requester plus a random suffix
/// so no two jobs share a path, and removed when the job reaches any
/// terminal state.
struct BufferFile {
    path: PathBuf,
}

impl BufferFile {
    fn create(dir: &Path, requester: &str, contents: &str) -> Result<Self> {
        use std::io::Write;

        std::fs::create_dir_all(dir)?;
        let owner: String = requester
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        // create_new makes ownership exclusive; a suffix collision with a
        // concurrent job just draws again
        for _ in 0..64 {
            let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
            let path = dir.join(format!("{owner}_{suffix}.lua"));
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(contents.as_bytes())?;
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(CoreError::Other(format!(
            "could not allocate a working file for '{owner}' in {}",
            dir.display()
        )))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BufferFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
