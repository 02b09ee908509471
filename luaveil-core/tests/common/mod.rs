#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Writes an executable shell script standing in for an external tool.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Linter stub that accepts anything (exit 0).
#[cfg(unix)]
pub fn passing_linter(dir: &Path) -> PathBuf {
    write_script(dir, "lint_ok.sh", "echo \"checked: $1\"\nexit 0")
}

/// Linter stub that reports warnings only (exit 1).
#[cfg(unix)]
pub fn warning_linter(dir: &Path) -> PathBuf {
    write_script(dir, "lint_warn.sh", "echo \"warning: unused variable\"\nexit 1")
}

/// Linter stub that rejects anything (exit 2).
#[cfg(unix)]
pub fn failing_linter(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "lint_bad.sh",
        "echo \"syntax error near 'end'\"\nexit 2",
    )
}

/// Linter stub that leaves a marker file beside itself when invoked, then
/// accepts. Lets tests assert whether post-validation ever ran.
#[cfg(unix)]
pub fn marking_linter(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "lint_mark.sh",
        "touch \"$(dirname \"$0\")/lint_ran\"\necho ok\nexit 0",
    )
}
