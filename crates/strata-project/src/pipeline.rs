//! Project resolution and the build pass
//!
//! Resolution scans the project, overlays generated files, enumerates the
//! selected sources and maps each one to its output. A build pass runs the
//! build script when stale, resolves, creates output directories, then
//! compiles the files one at a time in sorted order.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::build_script::{self, BuildScriptRunner, ScriptHost};
use crate::compiler::{Compiler, Diagnostic};
use crate::config::{ProjectConfig, INTERNAL_DIR};
use crate::enumerate::enumerate;
use crate::error::{Error, Result};
use crate::glob::SelectionRules;
use crate::output::{self, OutputResolver};
use crate::path;
use crate::tree::{NodeId, ProjectTree};

/// One input file and where its output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Where the file lives on disk, relative to the project root
    pub input: String,
    /// Position in the project tree; generated files appear where they
    /// were overlaid. Results are sorted by this path.
    pub logical: String,
    pub output: String,
    pub generated: bool,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    /// Whether the build script regenerated its files
    pub regenerated: bool,
    pub written: Vec<ResolvedFile>,
    /// Files left unwritten because of syntax or type errors
    pub failed: Vec<ResolvedFile>,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A project root with validated configuration
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: ProjectConfig,
    rules: SelectionRules,
}

impl Project {
    /// `root` is made absolute against the current directory, so paths
    /// handed to build scripts and compilers stay valid from any directory.
    pub fn new(root: impl Into<PathBuf>, mut config: ProjectConfig) -> Result<Self> {
        let root = root.into();
        let root = std::path::absolute(&root).map_err(|e| Error::io(&root, e))?;
        let rules = config.validate()?;
        Ok(Self {
            root,
            config,
            rules,
        })
    }

    /// Load `strata.toml` from `root` and validate it
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = ProjectConfig::load(&root)?;
        Self::new(root, config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    fn scratch_dir(&self) -> PathBuf {
        self.root.join(&self.config.build_scratch_dir)
    }

    fn cache_record(&self) -> PathBuf {
        self.root.join(&self.config.build_cache_record)
    }

    /// Run the build script if one is configured and it is stale.
    /// Returns whether regeneration ran.
    pub fn maybe_run_build_script(&self, host: &dyn ScriptHost, force: bool) -> Result<bool> {
        let Some(script) = &self.config.build_script else {
            return Ok(false);
        };
        let mut runner = BuildScriptRunner::new(
            host,
            self.root.join(script),
            self.scratch_dir(),
            self.cache_record(),
        );
        runner.run(force)
    }

    /// Remove generated files and the build cache record
    pub fn clean(&self) -> Result<()> {
        info!("removing {}", self.scratch_dir().display());
        build_script::clean(&self.scratch_dir(), &self.cache_record())
    }

    /// Every input paired with its output, sorted by logical path
    pub fn resolve(&self) -> Result<Vec<ResolvedFile>> {
        let tree = self.load_tree()?;
        let resolver = OutputResolver::new(
            self.config.source_dir.clone(),
            self.config.build_dir.clone(),
            &self.config.source_ext,
            &self.config.target_ext,
        );

        let mut selected: BTreeMap<String, ResolvedFile> = BTreeMap::new();
        let mut add = |id: NodeId| -> Result<()> {
            let logical = tree.path_of(id).unwrap_or_default().to_string();
            let input = tree.origin(id).unwrap_or(&logical).to_string();
            let output = resolver.resolve(&logical)?;
            debug!("{} -> {}", input, output);
            selected.insert(
                logical.clone(),
                ResolvedFile {
                    input,
                    logical,
                    output,
                    generated: tree.is_generated(id),
                },
            );
            Ok(())
        };

        let entries = enumerate(&tree, &self.rules, self.config.source_dir.as_deref())?;
        let source_suffix = format!(".{}", self.config.source_ext);
        match &self.config.files {
            None => {
                for entry in entries.filter(|e| e.path.ends_with(&source_suffix)) {
                    add(entry.id)?;
                }
            }
            Some(files) => {
                for entry in entries.filter(|e| e.generated && e.path.ends_with(&source_suffix)) {
                    add(entry.id)?;
                }
                for file in files {
                    let id = tree
                        .lookup(file)
                        .filter(|id| !tree.node(*id).is_dir())
                        .ok_or_else(|| Error::config(format!("listed file {} not found", file)))?;
                    add(id)?;
                }
            }
        }

        let files: Vec<ResolvedFile> = selected.into_values().collect();
        check_output_collisions(&files)?;
        info!("{} files resolved", files.len());
        Ok(files)
    }

    /// Scan the project and overlay previously generated files
    fn load_tree(&self) -> Result<ProjectTree> {
        let mut tree = ProjectTree::scan(&self.root, &self.scan_skips())?;

        let scratch = self.scratch_dir();
        if self.config.build_script.is_some() && scratch.is_dir() {
            let generated = ProjectTree::scan(&scratch, &[])?;
            let at = match &self.config.source_dir {
                Some(dir) => tree
                    .lookup(dir)
                    .ok_or_else(|| Error::config(format!("source directory {} not found", dir)))?,
                None => tree.root(),
            };
            debug!("overlaying {} generated entries", generated.index().len().saturating_sub(1));
            tree.overlay(at, &generated, &self.config.build_scratch_dir)?;
        }

        Ok(tree)
    }

    /// Paths left out of the real-tree scan: the driver's own state and the
    /// build output, unless sources live inside the build directory.
    fn scan_skips(&self) -> Vec<String> {
        let config = &self.config;
        let mut skips = vec![
            INTERNAL_DIR.to_string(),
            config.build_scratch_dir.clone(),
            config.build_cache_record.clone(),
        ];
        if let Some(build_dir) = &config.build_dir {
            let holds_sources = match &config.source_dir {
                Some(source_dir) => path::is_within(build_dir, source_dir),
                None => build_dir.is_empty(),
            };
            if !holds_sources {
                skips.push(build_dir.clone());
            }
        }
        skips.retain(|s| !s.is_empty() && !s.starts_with(path::SEPARATOR));
        skips
    }

    /// Run a full build pass with `compiler`
    pub fn build<C: Compiler>(
        &self,
        host: &dyn ScriptHost,
        compiler: &mut C,
    ) -> Result<BuildReport> {
        let regenerated = self.maybe_run_build_script(host, false)?;
        let files = self.resolve()?;

        let outputs: Vec<&str> = files.iter().map(|f| f.output.as_str()).collect();
        output::ensure_parents(&self.root, &outputs)?;

        let mut env = compiler
            .new_env(&self.config.preload_modules)
            .map_err(|message| Error::Compile {
                file: self.root.clone(),
                message,
            })?;

        let mut report = BuildReport {
            regenerated,
            ..BuildReport::default()
        };
        for file in files {
            let input = self.root.join(&file.input);
            debug!("compiling {}", input.display());
            let processed = compiler.process(&input, &mut env).map_err(|message| Error::Compile {
                file: input.clone(),
                message,
            })?;
            report.diagnostics.extend(processed.diagnostics().cloned());

            if processed.has_errors() {
                report.failed.push(file);
                continue;
            }

            let out = self.root.join(&file.output);
            fs::write(&out, compiler.pretty_print(&processed.ast)).map_err(|e| Error::io(&out, e))?;
            report.written.push(file);
        }

        info!(
            "{} written, {} failed",
            report.written.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

fn check_output_collisions(files: &[ResolvedFile]) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for file in files {
        if let Some(previous) = seen.insert(&file.output, &file.input) {
            return Err(Error::config(format!(
                "{} and {} both compile to {}",
                previous, file.input, file.output
            )));
        }
    }
    Ok(())
}

/// List the project's inputs and outputs, sorted by logical input path
pub fn resolve_project(root: &Path, config: &ProjectConfig) -> Result<Vec<ResolvedFile>> {
    Project::new(root, config.clone())?.resolve()
}

/// Run the configured build script if it is stale
pub fn maybe_run_build_script(
    root: &Path,
    config: &ProjectConfig,
    host: &dyn ScriptHost,
) -> Result<bool> {
    Project::new(root, config.clone())?.maybe_run_build_script(host, false)
}
