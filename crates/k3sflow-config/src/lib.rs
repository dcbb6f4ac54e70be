pub mod env;
pub mod error;

pub use env::{CONFIG_PATH_VAR, EnvOverrides, JOIN_TOKEN_VAR};
pub use error::*;

use std::path::{Path, PathBuf};

/// File names tried in each search directory, highest priority first
pub const CLUSTER_FILE_CANDIDATES: [&str; 4] = [
    "cluster.local.kdl",
    ".cluster.local.kdl",
    "cluster.kdl",
    ".cluster.kdl",
];

/// Project-local directory searched after the working directory
pub const PROJECT_DIR: &str = ".k3sflow";

/// Global k3sflow config directory (`~/.config/k3sflow` on Linux)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("k3sflow"))
}

/// Locate the cluster file.
///
/// Search order:
/// 1. `K3SFLOW_CONFIG_PATH`
/// 2. working directory: cluster.local.kdl, .cluster.local.kdl, cluster.kdl, .cluster.kdl
/// 3. `./.k3sflow/`, same order
/// 4. `~/.config/k3sflow/cluster.kdl`
///
/// `Ok(None)` means no file exists and built-in defaults apply.
pub fn find_cluster_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_VAR)
        && !config_path.is_empty()
    {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfigPathMissing(path));
        }
        return Ok(Some(path));
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_in(&current_dir) {
        return Ok(Some(path));
    }

    let project_dir = current_dir.join(PROJECT_DIR);
    if project_dir.is_dir()
        && let Some(path) = find_in(&project_dir)
    {
        return Ok(Some(path));
    }

    if let Ok(config_dir) = get_config_dir() {
        let global = config_dir.join("cluster.kdl");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    tracing::debug!("No cluster file found, using defaults");
    Ok(None)
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CLUSTER_FILE_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn in_dir<T>(dir: &Path, f: impl FnOnce() -> T) -> T {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_PATH_VAR, f);
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("k3sflow"));
    }

    #[test]
    #[serial]
    fn test_find_cluster_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("cluster.kdl"), "// test").unwrap();

        let found = in_dir(temp_dir.path(), find_cluster_file).unwrap().unwrap();
        assert!(found.ends_with("cluster.kdl"));
    }

    #[test]
    #[serial]
    fn test_local_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("cluster.kdl"), "// shared").unwrap();
        fs::write(temp_dir.path().join(".cluster.local.kdl"), "// local").unwrap();

        let found = in_dir(temp_dir.path(), find_cluster_file).unwrap().unwrap();
        assert!(found.ends_with(".cluster.local.kdl"));
    }

    #[test]
    #[serial]
    fn test_find_cluster_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(PROJECT_DIR);
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("cluster.kdl"), "// project").unwrap();

        let found = in_dir(temp_dir.path(), find_cluster_file).unwrap().unwrap();
        assert!(found.ends_with(".k3sflow/cluster.kdl"));
    }

    #[test]
    #[serial]
    fn test_env_var_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        let found = temp_env::with_var(CONFIG_PATH_VAR, Some(&config_path), find_cluster_file);
        assert_eq!(found.unwrap(), Some(config_path));
    }

    #[test]
    #[serial]
    fn test_env_var_missing_file() {
        let found = temp_env::with_var(
            CONFIG_PATH_VAR,
            Some("/nonexistent/k3sflow/cluster.kdl"),
            find_cluster_file,
        );
        assert!(matches!(found, Err(ConfigError::ConfigPathMissing(_))));
    }
}
