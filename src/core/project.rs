//! Installation discovery and layout

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the installation directory
pub const STATE_DIR: &str = ".storyline";

/// Represents a storyline installation
#[derive(Debug, Clone)]
pub struct Project {
    /// Root directory of the installation (parent of .storyline/)
    root: PathBuf,
}

impl Project {
    /// Find the installation root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current =
            std::env::current_dir().map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find the installation root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(STATE_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create the installation directory and default config at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let state_dir = root.join(STATE_DIR);
        if state_dir.exists() {
            return Err(ProjectError::AlreadyExists(root));
        }
        Self::write_layout(root)
    }

    /// Initialize even if .storyline/ exists; the config file is rewritten
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::write_layout(root)
    }

    fn write_layout(root: PathBuf) -> Result<Self, ProjectError> {
        let state_dir = root.join(STATE_DIR);
        std::fs::create_dir_all(&state_dir).map_err(|e| ProjectError::IoError(e.to_string()))?;

        std::fs::write(state_dir.join("config.yaml"), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        std::fs::write(state_dir.join(".gitignore"), "storyline.db*\n")
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# storyline installation configuration

database:
  # SQLite file, relative to the installation root
  path: .storyline/storyline.db
  max_connections: 100
  busy_timeout_ms: 5000
  max_retries: 3

cache:
  enabled: true
  ttl_secs: 300
  max_entries: 10000

# Default deadline for a single operation
request_timeout_ms: 30000

comments:
  # root=0, so 3 levels allows replies to depth 2
  max_thread_levels: 3

# Acting username for CLI commands (overridden by --as / STORYLINE_USER)
# user: ""
"#
    }

    /// Get the installation root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .storyline state directory
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config.yaml")
    }

    /// Resolve a possibly relative path against the installation root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Errors that can occur during installation discovery
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not a storyline installation (searched from {searched_from:?}). Run 'storyline init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("storyline installation already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_creates_state_dir_and_config() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.state_dir().is_dir());
        assert!(project.config_path().exists());
        let contents = std::fs::read_to_string(project.config_path()).unwrap();
        assert!(contents.contains("max_thread_levels: 3"));
    }

    #[test]
    fn test_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let err = Project::init(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
        assert!(Project::init_force(tmp.path()).is_ok());
    }

    #[test]
    fn test_discover_walks_up() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("docs/nested");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_discover_fails_without_state_dir() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let resolved = project.resolve(Path::new(".storyline/storyline.db"));
        assert!(resolved.starts_with(project.root()));
        assert_eq!(project.resolve(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
    }
}
