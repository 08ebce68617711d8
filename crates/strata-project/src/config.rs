//! Project configuration (`strata.toml`)

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::glob::SelectionRules;
use crate::path;

pub const CONFIG_FILE: &str = "strata.toml";

/// Directory for the driver's own state, skipped when scanning
pub const INTERNAL_DIR: &str = ".strata";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub source_dir: Option<String>,
    pub build_dir: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Explicit allow-list replacing enumeration of real files
    pub files: Option<Vec<String>>,
    pub source_ext: String,
    pub target_ext: String,
    pub preload_modules: Vec<String>,
    pub build_script: Option<String>,
    pub build_scratch_dir: String,
    pub build_cache_record: String,
    pub build_interpreter: String,
    /// Compiler command and leading arguments
    pub compiler: Option<Vec<String>>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            build_dir: None,
            include: Vec::new(),
            exclude: Vec::new(),
            files: None,
            source_ext: "stl".to_string(),
            target_ext: "lua".to_string(),
            preload_modules: Vec::new(),
            build_script: None,
            build_scratch_dir: format!("{}/generated", INTERNAL_DIR),
            build_cache_record: format!("{}/build-script.stamp", INTERNAL_DIR),
            build_interpreter: "sh".to_string(),
            compiler: None,
        }
    }
}

impl ProjectConfig {
    /// Load `strata.toml` from the project root; defaults when it is absent
    pub fn load(root: &Path) -> Result<Self> {
        let file = root.join(CONFIG_FILE);
        match fs::read_to_string(&file) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| Error::config(format!("{}: {}", file.display(), e.message()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::io(file, e)),
        }
    }

    /// Normalize paths and compile the selection rules.
    ///
    /// Runs before any traversal, so pattern and path mistakes surface
    /// without touching the filesystem.
    pub fn validate(&mut self) -> Result<SelectionRules> {
        for ext in [&mut self.source_ext, &mut self.target_ext] {
            let trimmed = ext.trim_start_matches('.').to_string();
            if trimmed.is_empty() || trimmed.contains('/') {
                return Err(Error::config(format!("invalid extension {:?}", ext)));
            }
            *ext = trimmed;
        }
        if self.source_ext == self.target_ext {
            return Err(Error::config("source_ext and target_ext must differ"));
        }

        for dir in [&mut self.source_dir, &mut self.build_dir, &mut self.build_script]
            .into_iter()
            .flatten()
        {
            *dir = path::normalize(dir)?;
        }
        self.build_scratch_dir = path::normalize(&self.build_scratch_dir)?;
        self.build_cache_record = path::normalize(&self.build_cache_record)?;
        self.check_scratch_dir()?;
        if let Some(files) = &mut self.files {
            for file in files.iter_mut() {
                *file = path::normalize(file)?;
            }
        }
        if self.compiler.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(Error::config("compiler command is empty"));
        }

        SelectionRules::new(&self.include, &self.exclude)
    }

    /// The scratch directory is deleted before every regeneration, so it
    /// must be a project-relative directory holding no sources and not the
    /// build script itself.
    fn check_scratch_dir(&self) -> Result<()> {
        let scratch = &self.build_scratch_dir;
        if scratch.is_empty() {
            return Err(Error::config("build_scratch_dir cannot be the project root"));
        }
        if scratch.starts_with(path::SEPARATOR) {
            return Err(Error::config(format!(
                "build_scratch_dir {:?} must be relative to the project root",
                scratch
            )));
        }
        if let Some(source_dir) = &self.source_dir {
            if path::is_within(scratch, source_dir) {
                return Err(Error::config(format!(
                    "build_scratch_dir {:?} would hold the sources in {:?}",
                    scratch, source_dir
                )));
            }
        }
        if let Some(script) = &self.build_script {
            if path::is_within(scratch, script) {
                return Err(Error::config(format!(
                    "build_scratch_dir {:?} would hold the build script {:?}",
                    scratch, script
                )));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for ProjectConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::config(e.message().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config: ProjectConfig = r#"
source_dir = "src"
build_dir = "out"
include = ["**/*.stl"]
exclude = ["**/fixtures/**"]
build_script = "build.sh"
preload_modules = ["prelude"]
compiler = ["stlc", "--emit"]
"#
        .parse()
        .unwrap();

        assert_eq!(config.source_dir.as_deref(), Some("src"));
        assert_eq!(config.include, vec!["**/*.stl"]);
        assert_eq!(config.target_ext, "lua");
        assert_eq!(config.build_scratch_dir, ".strata/generated");
        assert_eq!(config.compiler.unwrap()[0], "stlc");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!("sourcedir = \"src\"".parse::<ProjectConfig>().is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        assert_eq!(ProjectConfig::load(temp.path()).unwrap(), ProjectConfig::default());
    }

    #[test]
    fn test_validate_normalizes_paths() {
        let mut config = ProjectConfig {
            source_dir: Some("./src/".to_string()),
            files: Some(vec!["src//a.stl".to_string()]),
            source_ext: ".stl".to_string(),
            ..ProjectConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(config.source_dir.as_deref(), Some("src"));
        assert_eq!(config.files, Some(vec!["src/a.stl".to_string()]));
        assert_eq!(config.source_ext, "stl");
    }

    #[test]
    fn test_validate_rejects_escaping_paths() {
        let mut config = ProjectConfig {
            build_dir: Some("../out".to_string()),
            ..ProjectConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_absolute_scratch_dir() {
        let mut config = ProjectConfig {
            build_scratch_dir: "/".to_string(),
            ..ProjectConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let mut config = ProjectConfig {
            build_scratch_dir: "/tmp/generated".to_string(),
            ..ProjectConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_validate_rejects_scratch_dir_holding_sources() {
        let mut config = ProjectConfig {
            source_dir: Some("src".to_string()),
            build_scratch_dir: "./src/".to_string(),
            ..ProjectConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let mut config = ProjectConfig {
            source_dir: Some("code/src".to_string()),
            build_scratch_dir: "code".to_string(),
            ..ProjectConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let mut config = ProjectConfig {
            source_dir: Some("src".to_string()),
            build_scratch_dir: "src/gen".to_string(),
            ..ProjectConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_scratch_dir_holding_build_script() {
        let mut config = ProjectConfig {
            build_script: Some("tools/build.sh".to_string()),
            build_scratch_dir: "tools".to_string(),
            ..ProjectConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let mut config = ProjectConfig {
            build_script: Some("tools/build.sh".to_string()),
            build_scratch_dir: "toolsgen".to_string(),
            ..ProjectConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_patterns() {
        let mut config = ProjectConfig {
            include: vec![String::new()],
            ..ProjectConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::GlobCompile { .. })));
    }

    #[test]
    fn test_validate_rejects_same_extensions() {
        let mut config = ProjectConfig {
            target_ext: "stl".to_string(),
            ..ProjectConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
