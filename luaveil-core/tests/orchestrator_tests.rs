#![cfg(unix)]

mod common;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use luaveil_core::bitmask::MethodSelection;
use luaveil_core::delivery::TransportPayload;
use luaveil_core::invoker::ObfuscationInvoker;
use luaveil_core::metrics::Metrics;
use luaveil_core::orchestrator::{
    ArtifactSink, DebugReport, DebugSink, EscalationChoice, EscalationPrompt, JobLimits,
    JobOutcome, MethodPrompt, Orchestrator, RejectReason, Submission,
};
use luaveil_core::registry::MethodRegistry;
use luaveil_core::toolchain::Toolchain;
use luaveil_core::validator::SyntaxValidator;
use luaveil_core::{CoreError, Result};
use tokio::sync::watch;

struct FixedMask(u64);

#[async_trait]
impl MethodPrompt for FixedMask {
    async fn select_methods(
        &self,
        registry: &MethodRegistry,
        selection: &watch::Sender<MethodSelection>,
    ) -> Result<()> {
        let _ = selection.send(MethodSelection::from_mask(registry, self.0)?);
        Ok(())
    }
}

/// Publishes a mask, then never returns. Exercises the selection bound.
struct ToggleThenStall(u64);

#[async_trait]
impl MethodPrompt for ToggleThenStall {
    async fn select_methods(
        &self,
        registry: &MethodRegistry,
        selection: &watch::Sender<MethodSelection>,
    ) -> Result<()> {
        let _ = selection.send(MethodSelection::from_mask(registry, self.0)?);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

struct AnswerEscalation(bool);

#[async_trait]
impl EscalationPrompt for AnswerEscalation {
    async fn confirm_escalation(&self, _diagnostic: &str) -> Result<bool> {
        Ok(self.0)
    }
}

struct NeverAnswer;

#[async_trait]
impl EscalationPrompt for NeverAnswer {
    async fn confirm_escalation(&self, _diagnostic: &str) -> Result<bool> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(false)
    }
}

#[derive(Default)]
struct RecordingDebugSink {
    reports: Mutex<Vec<DebugReport>>,
}

#[async_trait]
impl DebugSink for RecordingDebugSink {
    async fn ship(&self, report: &DebugReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl ArtifactSink for FailingSink {
    async fn deliver(
        &self,
        _payload: &TransportPayload,
        _requester: &str,
    ) -> Result<Option<PathBuf>> {
        Err(CoreError::Other("transport refused the attachment".into()))
    }
}

struct CopySink {
    dir: PathBuf,
}

#[async_trait]
impl ArtifactSink for CopySink {
    async fn deliver(
        &self,
        payload: &TransportPayload,
        _requester: &str,
    ) -> Result<Option<PathBuf>> {
        match payload {
            TransportPayload::File(path) | TransportPayload::Zipped(path) => {
                let dest = self.dir.join(path.file_name().unwrap());
                tokio::fs::copy(path, &dest).await?;
                Ok(Some(dest))
            }
            TransportPayload::TooLarge { .. } => Ok(None),
        }
    }
}

struct Fixture {
    orchestrator: Orchestrator,
    work_dir: PathBuf,
    buffer_dir: PathBuf,
    _dir: tempfile::TempDir,
}

fn fixture(engine_body: &str, linter: PathBuf, dir: tempfile::TempDir) -> Fixture {
    fixture_with_limits(
        engine_body,
        linter,
        dir,
        Duration::from_secs(5),
        1024 * 1024,
    )
}

fn fixture_with_limits(
    engine_body: &str,
    linter: PathBuf,
    dir: tempfile::TempDir,
    select_timeout: Duration,
    attachment_limit: u64,
) -> Fixture {
    let work_dir = dir.path().to_path_buf();
    let engine = common::write_script(&work_dir, "engine.sh", engine_body);
    let toolchain = Arc::new(Toolchain {
        interpreter: "/bin/sh".into(),
        engine_dir: work_dir.clone(),
        entry_script: engine,
        linter: linter.clone(),
    });
    let registry = Arc::new(MethodRegistry::standard());
    let validator = SyntaxValidator::new(&linter);
    let invoker = ObfuscationInvoker::new(toolchain, registry.clone(), validator.clone());
    let buffer_dir = work_dir.join("buffer");
    let limits = JobLimits {
        buffer_dir: buffer_dir.clone(),
        max_source_bytes: 5 * 1024 * 1024,
        select_timeout,
        escalate_timeout: Duration::from_millis(300),
        attachment_limit,
    };
    let orchestrator = Orchestrator::new(
        registry,
        validator,
        invoker,
        Arc::new(Metrics::new()),
        limits,
    );
    Fixture {
        orchestrator,
        work_dir,
        buffer_dir,
        _dir: dir,
    }
}

fn upload(source: &str) -> Submission {
    Submission::Upload {
        filename: "input.lua".into(),
        bytes: source.as_bytes().to_vec(),
    }
}

fn buffer_is_empty(buffer_dir: &Path) -> bool {
    !buffer_dir.exists()
        || std::fs::read_dir(buffer_dir)
            .unwrap()
            .next()
            .is_none()
}

#[tokio::test]
async fn happy_path_delivers_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    let fx = fixture("printf 'return 2' > \"$1\"\nexit 0", linter, dir);
    let out_dir = fx.work_dir.join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let outcome = fx
        .orchestrator
        .run_job(
            "alice",
            upload("local x = 1\nprint(x)"),
            None,
            &FixedMask(0b10),
            &AnswerEscalation(false),
            &RecordingDebugSink::default(),
            &CopySink { dir: out_dir },
        )
        .await
        .unwrap();

    match outcome {
        JobOutcome::Delivered { artifact } => {
            let delivered = artifact.expect("artifact path");
            assert_eq!(std::fs::read_to_string(delivered).unwrap(), "return 2");
        }
        other => panic!("expected Delivered, got {other:?}"),
    }
    assert!(buffer_is_empty(&fx.buffer_dir));
}

#[tokio::test]
async fn zero_mask_is_rejected_before_the_engine_runs() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    let fx = fixture(
        "touch \"$(dirname \"$0\")/engine_ran\"\nexit 0",
        linter,
        dir,
    );

    let outcome = fx
        .orchestrator
        .run_job(
            "bob",
            upload("return 1"),
            None,
            &FixedMask(0),
            &AnswerEscalation(false),
            &RecordingDebugSink::default(),
            &CopySink {
                dir: fx.work_dir.clone(),
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        JobOutcome::Rejected {
            reason: RejectReason::EmptySelection,
            ..
        }
    ));
    assert!(!fx.work_dir.join("engine_ran").exists());
    assert!(buffer_is_empty(&fx.buffer_dir));
}

#[tokio::test]
async fn invalid_syntax_ends_the_job_with_the_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::failing_linter(dir.path());
    let fx = fixture("exit 0", linter, dir);

    let outcome = fx
        .orchestrator
        .run_job(
            "carol",
            upload("if then end"),
            None,
            &FixedMask(0b1),
            &AnswerEscalation(false),
            &RecordingDebugSink::default(),
            &CopySink {
                dir: fx.work_dir.clone(),
            },
        )
        .await
        .unwrap();

    match outcome {
        JobOutcome::Rejected {
            reason: RejectReason::InvalidSyntax,
            diagnostic,
        } => assert!(diagnostic.contains("syntax error")),
        other => panic!("expected InvalidSyntax rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn wrong_extension_is_a_bad_submission() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    let fx = fixture("exit 0", linter, dir);

    let outcome = fx
        .orchestrator
        .run_job(
            "dave",
            Submission::Upload {
                filename: "input.txt".into(),
                bytes: b"return 1".to_vec(),
            },
            None,
            &FixedMask(0b1),
            &AnswerEscalation(false),
            &RecordingDebugSink::default(),
            &CopySink {
                dir: fx.work_dir.clone(),
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        JobOutcome::Rejected {
            reason: RejectReason::BadSubmission,
            ..
        }
    ));
}

#[tokio::test]
async fn accepted_escalation_ships_the_debug_report() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    let fx = fixture("echo \"engine blew up\"\nexit 1", linter, dir);
    let sink = RecordingDebugSink::default();

    let outcome = fx
        .orchestrator
        .run_job(
            "erin",
            upload("return 1"),
            None,
            &FixedMask(0b1),
            &AnswerEscalation(true),
            &sink,
            &CopySink {
                dir: fx.work_dir.clone(),
            },
        )
        .await
        .unwrap();

    match outcome {
        JobOutcome::Failed {
            diagnostic,
            escalation,
        } => {
            assert!(diagnostic.contains("engine blew up"));
            assert_eq!(escalation, EscalationChoice::Accepted);
        }
        other => panic!("expected Failed, got {other:?}"),
    }

    let reports = sink.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].requester, "erin");
    assert_eq!(reports[0].original_source, "return 1");
    assert!(reports[0].diagnostic.contains("engine blew up"));
    drop(reports);
    assert!(buffer_is_empty(&fx.buffer_dir));
}

#[tokio::test]
async fn declined_escalation_ships_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    let fx = fixture("exit 1", linter, dir);
    let sink = RecordingDebugSink::default();

    let outcome = fx
        .orchestrator
        .run_job(
            "frank",
            upload("return 1"),
            None,
            &FixedMask(0b1),
            &AnswerEscalation(false),
            &sink,
            &CopySink {
                dir: fx.work_dir.clone(),
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            escalation: EscalationChoice::Declined,
            ..
        }
    ));
    assert!(sink.reports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn selection_timeout_keeps_the_last_updated_mask() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    // record the argument vector, leave the file alone
    let fx = fixture_with_limits(
        "args=\"$@\"\nprintf '%s' \"$args\" > \"$(dirname \"$0\")/argv\"\nexit 0",
        linter,
        dir,
        Duration::from_millis(300),
        1024 * 1024,
    );
    let out_dir = fx.work_dir.join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    // defaults off, bytecode_encoder on, then the prompt stalls past the bound
    let outcome = fx
        .orchestrator
        .run_job(
            "henry",
            upload("return 1"),
            None,
            &ToggleThenStall(0b1_0000),
            &AnswerEscalation(false),
            &RecordingDebugSink::default(),
            &CopySink { dir: out_dir },
        )
        .await
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Delivered { .. }));
    let argv = std::fs::read_to_string(fx.work_dir.join("argv")).unwrap();
    assert!(
        argv.contains("--bytecode_encoder"),
        "pre-timeout toggle was discarded: {argv}"
    );
    assert!(
        !argv.contains("--control_flow"),
        "timeout fell back to the defaults: {argv}"
    );
}

#[tokio::test]
async fn failed_delivery_still_removes_the_temporary_zip() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    // 64 KiB of zeros: over the limit raw, tiny once deflated
    let fx = fixture_with_limits(
        "dd if=/dev/zero of=\"$1\" bs=1024 count=64 2>/dev/null",
        linter,
        dir,
        Duration::from_secs(5),
        512,
    );

    let result = fx
        .orchestrator
        .run_job(
            "alice",
            upload("return 1"),
            None,
            &FixedMask(0b1),
            &AnswerEscalation(false),
            &RecordingDebugSink::default(),
            &FailingSink,
        )
        .await;

    assert!(result.is_err());
    assert!(
        buffer_is_empty(&fx.buffer_dir),
        "job-owned files survived the failed delivery"
    );
}

#[tokio::test]
async fn concurrent_jobs_from_one_requester_do_not_clobber_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    // identity engine: the delivered artifact is the submitted source
    let fx = fixture("exit 0", linter, dir);
    let out_a = fx.work_dir.join("out_a");
    let out_b = fx.work_dir.join("out_b");
    std::fs::create_dir_all(&out_a).unwrap();
    std::fs::create_dir_all(&out_b).unwrap();

    let sink_a = RecordingDebugSink::default();
    let copy_a = CopySink { dir: out_a };
    let sink_b = RecordingDebugSink::default();
    let copy_b = CopySink { dir: out_b };
    let job_a = fx.orchestrator.run_job(
        "heidi",
        upload("return 10"),
        None,
        &FixedMask(0b1),
        &AnswerEscalation(false),
        &sink_a,
        &copy_a,
    );
    let job_b = fx.orchestrator.run_job(
        "heidi",
        upload("return 20"),
        None,
        &FixedMask(0b1),
        &AnswerEscalation(false),
        &sink_b,
        &copy_b,
    );
    let (outcome_a, outcome_b) = tokio::join!(job_a, job_b);

    match (outcome_a.unwrap(), outcome_b.unwrap()) {
        (JobOutcome::Delivered { artifact: a }, JobOutcome::Delivered { artifact: b }) => {
            let a = a.expect("artifact path");
            let b = b.expect("artifact path");
            assert_eq!(std::fs::read_to_string(a).unwrap(), "return 10");
            assert_eq!(std::fs::read_to_string(b).unwrap(), "return 20");
        }
        other => panic!("expected both jobs delivered, got {other:?}"),
    }
    assert!(buffer_is_empty(&fx.buffer_dir));
}

#[tokio::test]
async fn unanswered_escalation_times_out_distinctly() {
    let dir = tempfile::tempdir().unwrap();
    let linter = common::passing_linter(dir.path());
    let fx = fixture("exit 1", linter, dir);
    let sink = RecordingDebugSink::default();

    let outcome = fx
        .orchestrator
        .run_job(
            "grace",
            upload("return 1"),
            None,
            &FixedMask(0b1),
            &NeverAnswer,
            &sink,
            &CopySink {
                dir: fx.work_dir.clone(),
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            escalation: EscalationChoice::TimedOut,
            ..
        }
    ));
    assert!(sink.reports.lock().unwrap().is_empty());
    assert!(buffer_is_empty(&fx.buffer_dir));
}
