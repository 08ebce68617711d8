//! Strata project resolution
//!
//! Decides which source files of a project are compiled and where their
//! output goes: scans the project tree, runs the user's build script when
//! its generated files are stale, filters sources through include/exclude
//! patterns and maps every selected file to an output path. The compiler
//! itself is plugged in through the [`Compiler`] trait.

pub mod build_script;
pub mod compiler;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod glob;
pub mod output;
pub mod path;
pub mod pipeline;
pub mod script_host;
pub mod tree;

pub use build_script::{BuildScriptRunner, LoadedScript, RunnerState, ScriptHost};
pub use compiler::{Compiler, Diagnostic, DiagnosticKind, Processed};
pub use config::ProjectConfig;
pub use error::{Error, Result};
pub use glob::{Pattern, SelectionRules};
pub use output::OutputResolver;
pub use pipeline::{maybe_run_build_script, resolve_project, BuildReport, Project, ResolvedFile};
pub use script_host::ShellHost;
pub use tree::{NodeId, ProjectTree};
