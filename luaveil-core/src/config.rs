//! Process configuration: defaults, layered with `LUAVEIL_*` environment
//! variables and CLI overrides (flags take precedence).

use serde::Deserialize;

use crate::errors::Result;

pub const MAX_SOURCE_BYTES: u64 = 5 * 1024 * 1024;
pub const INLINE_DIAGNOSTIC_LIMIT: usize = 1900;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Install root of the obfuscation engine; the engine resolves its
    /// internal resources relative to this directory.
    pub engine_dir: String,
    /// Entry script, relative to `engine_dir`.
    pub entry_script: String,
    /// Linter binary name or path.
    pub linter: String,
    /// Explicit interpreter path; when unset the PATH probe runs.
    #[serde(default)]
    pub interpreter: Option<String>,
    pub buffer_dir: String,
    pub log_dir: String,
    /// Operator-review destination for escalated failures.
    pub debug_dir: String,
    pub max_source_bytes: u64,
    pub validation_timeout_secs: u64,
    pub selection_timeout_secs: u64,
    pub escalation_timeout_secs: u64,
    /// Diagnostics longer than this go out as attachments, not inline.
    pub inline_diagnostic_limit: usize,
    pub attachment_limit_bytes: u64,
    pub health_port: u16,
}

/// CLI-provided values layered on top of defaults and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub engine_dir: Option<String>,
    pub entry_script: Option<String>,
    pub linter: Option<String>,
    pub interpreter: Option<String>,
    pub buffer_dir: Option<String>,
    pub log_dir: Option<String>,
    pub debug_dir: Option<String>,
}

pub fn load(overrides: &ConfigOverrides) -> Result<AppConfig> {
    let mut builder = config::Config::builder()
        .set_default("engine_dir", "Obfuscator/src")?
        .set_default("entry_script", "hercules.lua")?
        .set_default("linter", "luacheck")?
        .set_default("buffer_dir", "buffer")?
        .set_default("log_dir", "logs")?
        .set_default("debug_dir", "debug")?
        .set_default("max_source_bytes", MAX_SOURCE_BYTES)?
        .set_default("validation_timeout_secs", 8u64)?
        .set_default("selection_timeout_secs", 30u64)?
        .set_default("escalation_timeout_secs", 20u64)?
        .set_default("inline_diagnostic_limit", INLINE_DIAGNOSTIC_LIMIT as u64)?
        .set_default("attachment_limit_bytes", 8u64 * 1024 * 1024)?
        .set_default("health_port", 5000u64)?
        .add_source(config::Environment::with_prefix("LUAVEIL"));

    builder = builder
        .set_override_option("engine_dir", overrides.engine_dir.clone())?
        .set_override_option("entry_script", overrides.entry_script.clone())?
        .set_override_option("linter", overrides.linter.clone())?
        .set_override_option("interpreter", overrides.interpreter.clone())?
        .set_override_option("buffer_dir", overrides.buffer_dir.clone())?
        .set_override_option("log_dir", overrides.log_dir.clone())?
        .set_override_option("debug_dir", overrides.debug_dir.clone())?;

    Ok(builder.build()?.try_deserialize()?)
}
