use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use luaveil_core::{
    AppConfig, ConfigOverrides, IntensityPreset, JobLimits, JobOutcome, MethodPrompt, Metrics,
    MethodRegistry, ObfuscationInvoker, Orchestrator, RejectReason, Submission, SyntaxValidator,
    Toolchain, ValidationResult,
};
use tracing::info;

use crate::logs::LogsTarget;
use crate::prompt::{StaticSelection, TerminalEscalationPrompt, TerminalMethodPrompt};
use crate::sinks::{DirectoryDebugSink, FileArtifactSink};

#[derive(Parser)]
#[command(name = "luaveil", version)]
#[command(about = "Validate and obfuscate Lua source through an external engine")]
pub struct Cli {
    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct OverrideArgs {
    /// Install root of the obfuscation engine
    #[arg(long, global = true)]
    pub engine_dir: Option<String>,
    /// Lua interpreter path (skips the PATH probe)
    #[arg(long, global = true)]
    pub interpreter: Option<String>,
    /// Linter binary name or path
    #[arg(long, global = true)]
    pub linter: Option<String>,
    #[arg(long, global = true)]
    pub buffer_dir: Option<String>,
    #[arg(long, global = true)]
    pub debug_dir: Option<String>,
    #[arg(long, global = true)]
    pub log_dir: Option<String>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        ConfigOverrides {
            engine_dir: args.engine_dir,
            entry_script: None,
            linter: args.linter,
            interpreter: args.interpreter,
            buffer_dir: args.buffer_dir,
            log_dir: args.log_dir,
            debug_dir: args.debug_dir,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check Lua syntax of a file or URL
    Check {
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short, long, conflicts_with = "file")]
        url: Option<String>,
    },
    /// Run a full obfuscation job
    Obfuscate {
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short, long, conflicts_with = "file")]
        url: Option<String>,
        /// Intensity preset forwarded to the engine
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,
        /// Method keys to enable, skipping the interactive prompt
        #[arg(long, value_delimiter = ',')]
        methods: Vec<String>,
        /// Where to put the obfuscated artifact
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Requester identity, for audit and debug routing
        #[arg(long, default_value = "local")]
        requester: String,
    },
    /// List the obfuscation method registry
    Methods {
        #[arg(long)]
        json: bool,
    },
    /// Retrieve log files
    Logs {
        #[command(subcommand)]
        target: LogsTarget,
    },
    /// Serve the health and metrics endpoints
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PresetArg {
    /// Minimal parameters for lighter obfuscation
    Min,
    /// Moderate parameters for balanced obfuscation
    Mid,
    /// Maximum parameters for heavier obfuscation
    Max,
}

impl From<PresetArg> for IntensityPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Min => IntensityPreset::Minimal,
            PresetArg::Mid => IntensityPreset::Moderate,
            PresetArg::Max => IntensityPreset::Maximum,
        }
    }
}

pub async fn check_command(
    config: &AppConfig,
    file: Option<PathBuf>,
    url: Option<String>,
) -> Result<()> {
    let linter = Toolchain::discover_linter(config)?;
    let validator = SyntaxValidator::new(linter)
        .with_budget(Duration::from_secs(config.validation_timeout_secs));

    let source = read_source(config, file, url).await?;
    match validator.validate_source(&source).await? {
        ValidationResult::Valid(diag) => {
            println!("Valid Lua syntax.");
            if !diag.trim().is_empty() {
                println!("{diag}");
            }
            Ok(())
        }
        ValidationResult::Invalid(diag) => {
            print_diagnostic(config, &diag)?;
            bail!("invalid Lua syntax");
        }
        ValidationResult::Aborted(diag) => {
            println!("{diag}");
            bail!("validation timed out, try again");
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn obfuscate_command(
    config: &AppConfig,
    file: Option<PathBuf>,
    url: Option<String>,
    preset: Option<PresetArg>,
    methods: Vec<String>,
    output: Option<PathBuf>,
    requester: String,
) -> Result<()> {
    let toolchain = Arc::new(Toolchain::discover(config).await?);
    let registry = Arc::new(MethodRegistry::standard());
    let validator = SyntaxValidator::new(&toolchain.linter)
        .with_budget(Duration::from_secs(config.validation_timeout_secs));
    let invoker = ObfuscationInvoker::new(toolchain, registry.clone(), validator.clone());
    let orchestrator = Orchestrator::new(
        registry.clone(),
        validator,
        invoker,
        Arc::new(Metrics::new()),
        JobLimits::from_config(config),
    );

    let submission = match (file, url) {
        (Some(path), None) => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .context("file has no usable name")?
                .to_string();
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            Submission::Upload { filename, bytes }
        }
        (None, Some(url)) => Submission::Url(url),
        _ => bail!("provide exactly one of --file or --url"),
    };

    let prompt: Box<dyn MethodPrompt> = if methods.is_empty() {
        Box::new(TerminalMethodPrompt)
    } else {
        Box::new(StaticSelection(resolve_methods(&registry, &methods)?))
    };
    let escalation = TerminalEscalationPrompt;
    let debug_sink = DirectoryDebugSink::new(
        PathBuf::from(&config.debug_dir),
        config.inline_diagnostic_limit,
    );
    let artifact_sink = FileArtifactSink::new(output);

    let outcome = orchestrator
        .run_job(
            &requester,
            submission,
            preset.map(IntensityPreset::from),
            prompt.as_ref(),
            &escalation,
            &debug_sink,
            &artifact_sink,
        )
        .await?;

    match outcome {
        JobOutcome::Delivered { artifact } => {
            match artifact {
                Some(path) => println!("Obfuscation complete: {}", path.display()),
                None => println!(
                    "Obfuscation complete, but the artifact is too large to deliver \
                     even after compression."
                ),
            }
            Ok(())
        }
        JobOutcome::Rejected { reason, diagnostic } => {
            let headline = match reason {
                RejectReason::BadSubmission => "Submission rejected.",
                RejectReason::InvalidSyntax => "The input does not contain valid Lua syntax.",
                RejectReason::ValidationTimedOut => "Validation timed out, try again.",
                RejectReason::EmptySelection => {
                    "You must select at least one obfuscation method."
                }
            };
            println!("{headline}");
            print_diagnostic(config, &diagnostic)?;
            bail!("job rejected");
        }
        JobOutcome::Failed {
            diagnostic,
            escalation,
        } => {
            println!("Obfuscation failed. Please try again.");
            print_diagnostic(config, &diagnostic)?;
            info!(?escalation, "debug escalation resolved");
            bail!("obfuscation failed");
        }
    }
}

pub fn methods_command(json: bool) -> Result<()> {
    let registry = MethodRegistry::standard();
    if json {
        println!("{}", serde_json::to_string_pretty(registry.methods())?);
        return Ok(());
    }
    for method in registry.methods() {
        let marker = if method.enabled_by_default { "on " } else { "off" };
        println!(
            "[{marker}] bit {:>2}  {:<22} {}",
            method.bit_position, method.display_name, method.description
        );
    }
    Ok(())
}

async fn read_source(
    config: &AppConfig,
    file: Option<PathBuf>,
    url: Option<String>,
) -> Result<String> {
    match (file, url) {
        (Some(path), None) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(luaveil_core::encoding::decode_lua_bytes(&bytes))
        }
        (None, Some(url)) => {
            let client = reqwest_client();
            Ok(luaveil_core::fetch::fetch_lua_source(&client, &url, config.max_source_bytes)
                .await?)
        }
        _ => bail!("provide exactly one of --file or --url"),
    }
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::new()
}

fn resolve_methods(registry: &MethodRegistry, keys: &[String]) -> Result<u64> {
    let mut mask = 0u64;
    for key in keys {
        let method = registry.find_by_key(key).with_context(|| {
            let known: Vec<&str> = registry.methods().iter().map(|m| m.key).collect();
            format!("unknown method '{key}', known methods: {}", known.join(", "))
        })?;
        mask |= 1 << method.bit_position;
    }
    Ok(mask)
}

/// Short diagnostics are printed inline; long ones land in the buffer
/// directory so they stay readable.
fn print_diagnostic(config: &AppConfig, diagnostic: &str) -> Result<()> {
    if diagnostic.trim().is_empty() {
        return Ok(());
    }
    if diagnostic.len() <= config.inline_diagnostic_limit {
        println!("{diagnostic}");
        return Ok(());
    }
    let buffer_dir = Path::new(&config.buffer_dir);
    std::fs::create_dir_all(buffer_dir)?;
    let path = buffer_dir.join("error_output.txt");
    std::fs::write(&path, diagnostic)?;
    println!("Details written to {}", path.display());
    Ok(())
}
