//! XDG-compliant path resolution for lifeplan.
//!
//! Provides `LifeplanPaths`: where the config file, the task database and the
//! daemon PID file live, following the XDG Base Directory Specification.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(lifeplan::paths::no_home),
        help("Set the HOME environment variable or pass --data-dir explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(lifeplan::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories for lifeplan.
#[derive(Debug, Clone)]
pub struct LifeplanPaths {
    /// `$XDG_CONFIG_HOME/lifeplan/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/lifeplan/`
    pub data_dir: PathBuf,
    /// `$XDG_STATE_HOME/lifeplan/`
    pub state_dir: PathBuf,
    /// `$XDG_RUNTIME_DIR/lifeplan/` (falls back to `state_dir/run/`)
    pub runtime_dir: PathBuf,
}

impl LifeplanPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("lifeplan");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("lifeplan");

        let state_dir = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/state"))
            .join("lifeplan");

        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(|d| PathBuf::from(d).join("lifeplan"))
            .unwrap_or_else(|_| state_dir.join("run"));

        Ok(Self {
            config_dir,
            data_dir,
            state_dir,
            runtime_dir,
        })
    }

    /// Place every directory under a single root (used by `--data-dir` and tests).
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            state_dir: root.join("state"),
            runtime_dir: root.join("state").join("run"),
        }
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.state_dir,
            &self.runtime_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the planner config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Directory holding the task database.
    pub fn db_dir(&self) -> PathBuf {
        self.data_dir.join("db")
    }

    /// PID file written by a running `lifeplanned`.
    pub fn pid_file(&self) -> PathBuf {
        self.runtime_dir.join("lifeplanned.pid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_paths_use_xdg_layout() {
        // No env mutation here: `set_var` is unsafe in edition 2024.
        let paths = LifeplanPaths::resolve().unwrap();
        assert!(
            paths.config_dir.to_string_lossy().contains("lifeplan"),
            "config_dir should contain 'lifeplan': {}",
            paths.config_dir.display()
        );
        assert!(paths.config_file().starts_with(&paths.config_dir));
        assert!(paths.db_dir().starts_with(&paths.data_dir));
    }

    #[test]
    fn rooted_paths_stay_under_root() {
        let paths = LifeplanPaths::rooted(Path::new("/tmp/lp"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/lp/config/config.toml"));
        assert_eq!(paths.db_dir(), PathBuf::from("/tmp/lp/data/db"));
        assert_eq!(
            paths.pid_file(),
            PathBuf::from("/tmp/lp/state/run/lifeplanned.pid")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = LifeplanPaths::rooted(dir.path());
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.runtime_dir.is_dir());
    }
}
