//! Mapping input files to their compiled output paths

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::path;

/// Output path resolution settings
#[derive(Debug, Clone)]
pub struct OutputResolver {
    source_dir: Option<String>,
    build_dir: Option<String>,
    source_ext: String,
    target_ext: String,
}

impl OutputResolver {
    pub fn new(
        source_dir: Option<String>,
        build_dir: Option<String>,
        source_ext: impl Into<String>,
        target_ext: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.filter(|dir| !dir.is_empty()),
            build_dir: build_dir.filter(|dir| !dir.is_empty()),
            source_ext: source_ext.into(),
            target_ext: target_ext.into(),
        }
    }

    /// Compute the output path for a project-relative input path.
    ///
    /// `src/pkg/a.stl` with source dir `src` and build dir `out` becomes
    /// `out/pkg/a.lua`. An input that already carries the target extension
    /// gets `.out` inserted before it so hand-written output is not replaced.
    pub fn resolve(&self, input: &str) -> Result<String> {
        let input = path::normalize(input)?;

        let relative = match &self.source_dir {
            Some(dir) => {
                if !path::is_within(dir, &input) || input == *dir {
                    return Err(Error::config(format!(
                        "{} is outside the source directory {}",
                        input, dir
                    )));
                }
                path::strip_prefix(dir, &input)
            }
            None => input.as_str(),
        };

        let renamed = self.rename(relative)?;
        match &self.build_dir {
            Some(dir) => path::join(&[dir, &renamed]),
            None => Ok(renamed),
        }
    }

    fn rename(&self, relative: &str) -> Result<String> {
        if let Some(stem) = strip_extension(relative, &self.source_ext) {
            Ok(format!("{}.{}", stem, self.target_ext))
        } else if let Some(stem) = strip_extension(relative, &self.target_ext) {
            Ok(format!("{}.out.{}", stem, self.target_ext))
        } else {
            Err(Error::config(format!(
                "{} does not have the .{} extension",
                relative, self.source_ext
            )))
        }
    }
}

/// `a/b.stl` with `stl` → `a/b`. A bare `.stl` file name does not count.
fn strip_extension<'a>(path: &'a str, ext: &str) -> Option<&'a str> {
    let stem = path.strip_suffix(ext)?.strip_suffix('.')?;
    let name = stem.rsplit('/').next().unwrap_or(stem);
    (!name.is_empty()).then_some(stem)
}

/// Create every missing ancestor directory of `outputs` under `root`.
///
/// All ancestors are checked before anything is created, so a pass either
/// gets every directory it needs or fails without creating any.
pub fn ensure_parents<S: AsRef<str>>(root: &Path, outputs: &[S]) -> Result<()> {
    let dirs: BTreeSet<&str> = outputs
        .iter()
        .flat_map(|output| path::ancestors(output.as_ref()))
        .collect();

    let mut missing = Vec::new();
    for dir in dirs {
        let full = root.join(dir);
        match fs::metadata(&full) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::config(format!(
                    "{} exists and is not a directory",
                    full.display()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => missing.push(full),
            Err(e) => return Err(Error::io(full, e)),
        }
    }

    // Shallowest first: a missing parent is created before its children.
    for dir in missing {
        debug!("creating {}", dir.display());
        match fs::create_dir(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => return Err(Error::io(dir, e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver(source_dir: Option<&str>, build_dir: Option<&str>) -> OutputResolver {
        OutputResolver::new(
            source_dir.map(String::from),
            build_dir.map(String::from),
            "src",
            "ext",
        )
    }

    #[test]
    fn test_resolve_with_source_and_build_dir() {
        let r = resolver(Some("src"), Some("out"));
        assert_eq!(r.resolve("src/pkg/a.src").unwrap(), "out/pkg/a.ext");
        assert_eq!(r.resolve("./src//a.src").unwrap(), "out/a.ext");
    }

    #[test]
    fn test_resolve_target_extension_gets_out_suffix() {
        let r = resolver(None, None);
        assert_eq!(r.resolve("a.ext").unwrap(), "a.out.ext");
        assert_eq!(r.resolve("pkg/a.src").unwrap(), "pkg/a.ext");
    }

    #[test]
    fn test_resolve_outside_source_dir() {
        let r = resolver(Some("src"), None);
        assert!(matches!(r.resolve("lib/a.src"), Err(Error::Config { .. })));
        assert!(matches!(r.resolve("srcx/a.src"), Err(Error::Config { .. })));
    }

    #[test]
    fn test_resolve_rejects_other_extensions() {
        let r = resolver(None, Some("out"));
        assert!(r.resolve("notes.txt").is_err());
        assert!(r.resolve(".src").is_err());
        assert!(r.resolve("../a.src").is_err());
    }

    #[test]
    fn test_ensure_parents_creates_missing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("out")).unwrap();

        ensure_parents(temp.path(), &["out/a/b/x.ext", "out/a/y.ext", "out/z.ext"]).unwrap();
        assert!(temp.path().join("out/a/b").is_dir());

        // Idempotent.
        ensure_parents(temp.path(), &["out/a/b/x.ext"]).unwrap();
    }

    #[test]
    fn test_ensure_parents_fails_before_creating_anything() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("blocker"), "").unwrap();

        let result = ensure_parents(temp.path(), &["aaa/x.ext", "blocker/y.ext"]);
        assert!(matches!(result, Err(Error::Config { .. })));
        assert!(!temp.path().join("aaa").exists());
    }
}
