//! Shell build scripts
//!
//! A build script is a shell file. Loading runs the interpreter's syntax
//! check; the generation entry point is a shell function named `gen_code`,
//! which receives the scratch directory as its only argument.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::build_script::{LoadedScript, ScriptHost};

const ENTRY_POINT: &str = "gen_code";

pub struct ShellHost {
    interpreter: String,
}

impl ShellHost {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl Default for ShellHost {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl ScriptHost for ShellHost {
    fn load(&self, script: &Path) -> Result<Box<dyn LoadedScript>, String> {
        let source = fs::read_to_string(script).map_err(|e| format!("cannot read script: {}", e))?;

        let check = Command::new(&self.interpreter)
            .arg("-n")
            .arg(script)
            .output()
            .map_err(|e| format!("cannot start {}: {}", self.interpreter, e))?;
        if !check.status.success() {
            return Err(format!(
                "syntax check failed: {}",
                String::from_utf8_lossy(&check.stderr).trim()
            ));
        }

        // The script runs from its own directory, so both paths it sees are absolute.
        let path = std::path::absolute(script).map_err(|e| format!("cannot locate script: {}", e))?;
        Ok(Box::new(ShellScript {
            interpreter: self.interpreter.clone(),
            path,
            has_gen_code: find_entry_point(&source)?,
        }))
    }
}

struct ShellScript {
    interpreter: String,
    path: PathBuf,
    has_gen_code: bool,
}

impl LoadedScript for ShellScript {
    fn has_gen_code(&self) -> bool {
        self.has_gen_code
    }

    fn gen_code(&mut self, out_dir: &Path) -> Result<(), String> {
        let out_dir =
            std::path::absolute(out_dir).map_err(|e| format!("cannot locate output: {}", e))?;
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(format!(". \"$0\" && {} \"$1\"", ENTRY_POINT))
            .arg(&self.path)
            .arg(&out_dir);
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .map_err(|e| format!("cannot start {}: {}", self.interpreter, e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "{} exited with {}: {}",
                ENTRY_POINT,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

/// Look for a `gen_code` function definition. Defining `gen_code` as a
/// variable instead is an error.
fn find_entry_point(source: &str) -> Result<bool, String> {
    for line in source.lines() {
        let line = line.trim_start();
        let line = line.strip_prefix("function ").map(str::trim_start).unwrap_or(line);
        let Some(rest) = line.strip_prefix(ENTRY_POINT) else {
            continue;
        };
        let rest = rest.trim_start();
        if rest.starts_with('(') || rest.starts_with('{') {
            return Ok(true);
        }
        if rest.starts_with('=') {
            return Err(format!("{} must be a function, not a variable", ENTRY_POINT));
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_entry_point() {
        assert_eq!(find_entry_point("gen_code() {\n  :\n}"), Ok(true));
        assert_eq!(find_entry_point("  gen_code () { :; }"), Ok(true));
        assert_eq!(find_entry_point("function gen_code {\n:\n}"), Ok(true));
        assert_eq!(find_entry_point("echo hi\n"), Ok(false));
        assert_eq!(find_entry_point("gen_code_helper() { :; }"), Ok(false));
        assert!(find_entry_point("gen_code=1").is_err());
    }

    #[cfg(unix)]
    mod shell {
        use super::super::*;
        use tempfile::TempDir;

        #[test]
        fn test_shell_script_generates_files() {
            let temp = TempDir::new().unwrap();
            let script = temp.path().join("build.sh");
            fs::write(&script, "gen_code() {\n  echo 'x' > \"$1/gen.stl\"\n}\n").unwrap();
            let out = temp.path().join("out");
            fs::create_dir(&out).unwrap();

            let mut loaded = ShellHost::default().load(&script).unwrap();
            assert!(loaded.has_gen_code());
            loaded.gen_code(&out).unwrap();
            assert!(out.join("gen.stl").exists());
        }

        #[test]
        fn test_shell_script_failure_is_reported() {
            let temp = TempDir::new().unwrap();
            let script = temp.path().join("build.sh");
            fs::write(&script, "gen_code() {\n  echo nope >&2\n  return 3\n}\n").unwrap();

            let mut loaded = ShellHost::default().load(&script).unwrap();
            let err = loaded.gen_code(temp.path()).unwrap_err();
            assert!(err.contains("nope"));
        }

        #[test]
        fn test_syntax_error_fails_load() {
            let temp = TempDir::new().unwrap();
            let script = temp.path().join("build.sh");
            fs::write(&script, "gen_code() {\n").unwrap();
            assert!(ShellHost::default().load(&script).is_err());
        }
    }
}
