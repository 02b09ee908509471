//! Startup discovery of the Lua interpreter, the obfuscation engine and
//! the linter. Any absence is fatal to the process; everything else in
//! the system assumes these paths are good.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::AppConfig;
use crate::errors::{CoreError, Result};

/// Interpreter names probed in order. The bare `lua` binary only
/// qualifies after its version string confirms 5.4.
const INTERPRETER_CANDIDATES: &[&str] = &["lua54", "lua5.4", "lua"];

/// Resolved tool paths, discovered once and passed by reference into
/// every component that spawns processes.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub interpreter: PathBuf,
    /// The engine resolves internal resources relative to this directory;
    /// it is handed to the spawn primitive as the child's working
    /// directory, never set on our own process.
    pub engine_dir: PathBuf,
    pub entry_script: PathBuf,
    pub linter: PathBuf,
}

impl Toolchain {
    pub async fn discover(config: &AppConfig) -> Result<Self> {
        let interpreter = match &config.interpreter {
            Some(explicit) => {
                let path = PathBuf::from(explicit);
                if !path.is_file() {
                    return Err(CoreError::ToolMissing(format!(
                        "configured interpreter '{explicit}' does not exist"
                    )));
                }
                path
            }
            None => find_lua54().await?,
        };

        let engine_dir = std::fs::canonicalize(&config.engine_dir).map_err(|_| {
            CoreError::ToolMissing(format!(
                "obfuscation engine directory '{}' not found",
                config.engine_dir
            ))
        })?;
        let entry_script = engine_dir.join(&config.entry_script);
        if !entry_script.is_file() {
            return Err(CoreError::ToolMissing(format!(
                "engine entry script '{}' not found",
                entry_script.display()
            )));
        }

        let linter = Self::discover_linter(config)?;

        info!(
            interpreter = %interpreter.display(),
            engine = %entry_script.display(),
            linter = %linter.display(),
            "toolchain resolved"
        );
        Ok(Self {
            interpreter,
            engine_dir,
            entry_script,
            linter,
        })
    }

    /// Linter-only discovery, for callers that never obfuscate.
    pub fn discover_linter(config: &AppConfig) -> Result<PathBuf> {
        find_in_path(&config.linter)
            .ok_or_else(|| CoreError::ToolMissing(format!("linter '{}' not on PATH", config.linter)))
    }
}

async fn find_lua54() -> Result<PathBuf> {
    for name in INTERPRETER_CANDIDATES {
        let Some(path) = find_in_path(name) else {
            continue;
        };
        if *name == "lua" && !reports_lua54(&path).await {
            continue;
        }
        return Ok(path);
    }
    Err(CoreError::ToolMissing(
        "no Lua 5.4 interpreter on PATH (tried lua54, lua5.4, lua)".into(),
    ))
}

/// `lua -v` prints the version banner; 5.4 writes it to stdout but older
/// builds use stderr, so both streams are checked.
async fn reports_lua54(path: &Path) -> bool {
    match tokio::process::Command::new(path).arg("-v").output().await {
        Ok(out) => {
            let banner = format!(
                "{}{}",
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            );
            banner.contains("5.4")
        }
        Err(_) => false,
    }
}

/// Resolves a bare binary name against PATH. Names containing a path
/// separator are taken as-is.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        return path.is_file().then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}
