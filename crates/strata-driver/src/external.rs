//! Running the compiler as an external command
//!
//! The command gets `--preload <module>` for every preloaded module and the
//! input path as its last argument. Generated code is read from stdout;
//! diagnostics are read from stderr, one per line:
//!
//! ```text
//! src/a.stl:3:7: error: expected number, got string
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use strata_project::{Compiler, Diagnostic, DiagnosticKind, Processed};

pub struct ExternalCompiler {
    program: String,
    args: Vec<String>,
}

impl ExternalCompiler {
    /// Build from a command line; `None` when it is empty
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Compiler for ExternalCompiler {
    type Ast = String;
    type Env = Vec<String>;

    fn new_env(&mut self, preload_modules: &[String]) -> Result<Vec<String>, String> {
        Ok(preload_modules.to_vec())
    }

    fn process(&mut self, file: &Path, env: &mut Vec<String>) -> Result<Processed<String>, String> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(env.iter().flat_map(|module| ["--preload", module.as_str()]))
            .arg(file)
            .output()
            .map_err(|e| format!("cannot run {}: {}", self.program, e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut processed = Processed {
            ast: String::from_utf8_lossy(&output.stdout).into_owned(),
            ..Processed::default()
        };
        for diagnostic in stderr.lines().filter_map(parse_diagnostic) {
            match diagnostic.kind {
                DiagnosticKind::SyntaxError => processed.syntax_errors.push(diagnostic),
                DiagnosticKind::TypeError => processed.type_errors.push(diagnostic),
                DiagnosticKind::Warning => processed.warnings.push(diagnostic),
                DiagnosticKind::Unknown => processed.unknowns.push(diagnostic),
            }
        }

        // A failing exit without any reported error is a crash, not a diagnostic.
        if !output.status.success() && !processed.has_errors() {
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }
        Ok(processed)
    }

    fn pretty_print(&self, ast: &String) -> String {
        ast.clone()
    }
}

/// Parse `file:line:col: kind: message`
pub fn parse_diagnostic(line: &str) -> Option<Diagnostic> {
    let (location, rest) = line.split_once(": ")?;
    let mut parts = location.rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line_no = parts.next()?.parse().ok()?;
    let file = parts.next()?;

    let (kind, message) = rest.split_once(": ")?;
    let kind = match kind {
        "syntax error" => DiagnosticKind::SyntaxError,
        "error" => DiagnosticKind::TypeError,
        "warning" => DiagnosticKind::Warning,
        "unknown" | "unknown variable" => DiagnosticKind::Unknown,
        _ => return None,
    };

    Some(Diagnostic {
        kind,
        file: PathBuf::from(file),
        line: line_no,
        column,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_diagnostic() {
        let d = parse_diagnostic("src/a.stl:3:7: error: expected number, got string").unwrap();
        assert_eq!(d.kind, DiagnosticKind::TypeError);
        assert_eq!(d.file, PathBuf::from("src/a.stl"));
        assert_eq!((d.line, d.column), (3, 7));
        assert_eq!(d.message, "expected number, got string");

        let d = parse_diagnostic("a.stl:1:1: syntax error: unexpected 'end'").unwrap();
        assert_eq!(d.kind, DiagnosticKind::SyntaxError);
    }

    #[test]
    fn test_parse_diagnostic_ignores_noise() {
        assert!(parse_diagnostic("compiling a.stl").is_none());
        assert!(parse_diagnostic("a.stl:x:1: error: nope").is_none());
        assert!(parse_diagnostic("a.stl:1:1: note: hi").is_none());
    }

    #[test]
    fn test_from_command() {
        assert!(ExternalCompiler::from_command(&[]).is_none());
        let compiler =
            ExternalCompiler::from_command(&["stlc".to_string(), "--emit".to_string()]).unwrap();
        assert_eq!(compiler.program, "stlc");
        assert_eq!(compiler.args, vec!["--emit"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_reads_stdout_and_stderr() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("a.stl");
        std::fs::write(&file, "local x = 1").unwrap();

        let script = "cat \"$0\"; echo \"$0:1:7: warning: unused x\" >&2";
        let mut compiler = ExternalCompiler::from_command(&[
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ])
        .unwrap();

        let mut env = compiler.new_env(&[]).unwrap();
        let processed = compiler.process(&file, &mut env).unwrap();
        assert_eq!(processed.ast, "local x = 1");
        assert_eq!(processed.warnings.len(), 1);
        assert!(!processed.has_errors());
    }
}
