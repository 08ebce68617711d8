//! Loading and conditionally running the user's build script
//!
//! The runner moves through three states: Idle, Loaded and Executed. A
//! script is loaded (read and checked) before anything else; it is only
//! executed when it defines a `gen_code` entry point and the cache record
//! says the last generation is older than the script.

use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::error::{Error, Result};

/// A build script that has been read and checked
pub trait LoadedScript {
    /// Whether the script defines a generation entry point
    fn has_gen_code(&self) -> bool;

    /// Generate source files into `out_dir`
    fn gen_code(&mut self, out_dir: &Path) -> std::result::Result<(), String>;
}

/// Knows how to load build scripts of one kind
pub trait ScriptHost {
    fn load(&self, script: &Path) -> std::result::Result<Box<dyn LoadedScript>, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Loaded,
    Executed,
}

pub struct BuildScriptRunner<'h> {
    host: &'h dyn ScriptHost,
    script: PathBuf,
    scratch_dir: PathBuf,
    cache_record: PathBuf,
    loaded: Option<Box<dyn LoadedScript>>,
    state: RunnerState,
}

impl<'h> BuildScriptRunner<'h> {
    pub fn new(
        host: &'h dyn ScriptHost,
        script: PathBuf,
        scratch_dir: PathBuf,
        cache_record: PathBuf,
    ) -> Self {
        Self {
            host,
            script,
            scratch_dir,
            cache_record,
            loaded: None,
            state: RunnerState::Idle,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Idle → Loaded. Loading twice is a no-op.
    pub fn load(&mut self) -> Result<()> {
        if self.state != RunnerState::Idle {
            return Ok(());
        }
        debug!("loading build script {}", self.script.display());
        let loaded = self
            .host
            .load(&self.script)
            .map_err(|message| Error::build_script(&self.script, message))?;
        self.loaded = Some(loaded);
        self.state = RunnerState::Loaded;
        Ok(())
    }

    /// Whether the last successful generation predates the script
    pub fn is_stale(&self) -> Result<bool> {
        let script_time = modified(&self.script)?;
        match read_record(&self.cache_record)? {
            Some(recorded) => Ok(recorded < script_time),
            None => Ok(true),
        }
    }

    /// Load the script and regenerate if needed. Returns whether `gen_code` ran.
    ///
    /// With `force`, the cache record is ignored.
    pub fn run(&mut self, force: bool) -> Result<bool> {
        self.load()?;

        let has_gen_code = self.loaded.as_ref().is_some_and(|s| s.has_gen_code());
        if !has_gen_code {
            debug!("{} has no gen_code entry point", self.script.display());
            return Ok(false);
        }
        if self.state == RunnerState::Executed {
            return Ok(false);
        }
        if !force && !self.is_stale()? {
            info!("skipping build script: generated files are up to date");
            return Ok(false);
        }

        // Taken before running so a script that touches itself is regenerated next time.
        let script_time = modified(&self.script)?;
        self.reset_scratch_dir()?;

        info!("running build script {}", self.script.display());
        let script = self
            .loaded
            .as_mut()
            .ok_or_else(|| Error::build_script(&self.script, "script is not loaded"))?;
        let scratch = self.scratch_dir.as_path();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| script.gen_code(scratch)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(Error::build_script(&self.script, message)),
            Err(_) => return Err(Error::build_script(&self.script, "gen_code panicked")),
        }

        write_record(&self.cache_record, script_time)?;
        self.state = RunnerState::Executed;
        Ok(true)
    }

    fn reset_scratch_dir(&self) -> Result<()> {
        match fs::symlink_metadata(&self.scratch_dir) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&self.scratch_dir)
                .map_err(|e| Error::io(&self.scratch_dir, e))?,
            Ok(_) => {
                return Err(Error::config(format!(
                    "build scratch path {} exists and is not a directory",
                    self.scratch_dir.display()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&self.scratch_dir, e)),
        }
        fs::create_dir_all(&self.scratch_dir).map_err(|e| Error::io(&self.scratch_dir, e))
    }
}

/// Remove the scratch directory and the cache record, if present
pub fn clean(scratch_dir: &Path, cache_record: &Path) -> Result<()> {
    if scratch_dir.is_dir() {
        fs::remove_dir_all(scratch_dir).map_err(|e| Error::io(scratch_dir, e))?;
    }
    match fs::remove_file(cache_record) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(cache_record, e)),
    }
}

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| Error::io(path, e))
}

/// The recorded generation time. The file holds nanoseconds since the UNIX
/// epoch; if that cannot be read, the file's own mtime stands in.
fn read_record(record: &Path) -> Result<Option<SystemTime>> {
    let content = match fs::read_to_string(record) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(record, e)),
    };

    match content.trim().parse::<u64>() {
        Ok(nanos) => Ok(Some(UNIX_EPOCH + Duration::from_nanos(nanos))),
        Err(_) => {
            debug!("unreadable cache record {}, using its mtime", record.display());
            modified(record).map(Some)
        }
    }
}

fn write_record(record: &Path, script_time: SystemTime) -> Result<()> {
    let nanos = script_time
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_nanos()).ok())
        .unwrap_or(0);

    if let Some(parent) = record.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::write(record, nanos.to_string()).map_err(|e| Error::io(record, e))?;
    fs::File::options()
        .write(true)
        .open(record)
        .and_then(|file| file.set_modified(script_time))
        .map_err(|e| Error::io(record, e))
}
