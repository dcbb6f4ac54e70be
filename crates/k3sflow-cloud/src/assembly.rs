//! Cloud assembly output directory
//!
//! Manages the `k3sflow.out/` directory: one `<Stack>.template.json` per
//! synthesized stack plus a `manifest.json` listing stacks in deployment
//! order. The last written assembly is what `diff` compares against, so a
//! save replaces it only once the new one is completely written.

use crate::app::{CloudAssembly, SynthesizedStack};
use crate::error::{CloudError, Result};
use crate::stack::{Environment, StackDependency};
use crate::template::Template;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const MANIFEST_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const STAGING_SUFFIX: &str = ".tmp";
const LOCK_FILE: &str = "lock.json";

/// Default output directory, relative to the working directory
pub const DEFAULT_OUT_DIR: &str = "k3sflow.out";

/// Index of an assembly directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version
    pub version: u32,

    /// When the assembly was written
    pub synthesized_at: DateTime<Utc>,

    /// Stacks in deployment order
    pub stacks: Vec<ManifestStack>,
}

/// One stack entry of the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestStack {
    pub name: String,
    pub environment: Environment,
    pub template_file: String,
    pub dependencies: Vec<StackDependency>,
}

/// Template file name for a stack
pub fn template_file_name(stack: &str) -> String {
    format!("{}.template.json", stack)
}

/// Reads and writes assembly directories
pub struct AssemblyManager {
    out_dir: PathBuf,
}

impl AssemblyManager {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.out_dir.join(MANIFEST_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.out_dir.join(LOCK_FILE)
    }

    async fn ensure_out_dir(&self) -> Result<()> {
        if !self.out_dir.exists() {
            fs::create_dir_all(&self.out_dir).await?;
            tracing::debug!("Created assembly directory: {}", self.out_dir.display());
        }
        Ok(())
    }

    /// Load the last written assembly, if any
    pub async fn load(&self) -> Result<Option<CloudAssembly>> {
        let path = self.manifest_path();
        if !path.exists() {
            tracing::debug!("Manifest not found, no previous assembly");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let manifest: Manifest = serde_json::from_str(&content)?;

        if manifest.version > MANIFEST_VERSION {
            return Err(CloudError::AssemblyError(format!(
                "Manifest version {} is newer than supported version {}",
                manifest.version, MANIFEST_VERSION
            )));
        }

        let mut assembly = CloudAssembly::default();
        for entry in manifest.stacks {
            let template_path = self.out_dir.join(&entry.template_file);
            let content = fs::read_to_string(&template_path).await.map_err(|e| {
                CloudError::AssemblyError(format!(
                    "Cannot read {}: {}",
                    template_path.display(),
                    e
                ))
            })?;
            assembly.stacks.push(SynthesizedStack {
                name: entry.name,
                environment: entry.environment,
                template: Template::from_json(&content)?,
                dependencies: entry.dependencies,
            });
        }

        tracing::debug!("Loaded assembly with {} stacks", assembly.stacks.len());
        Ok(Some(assembly))
    }

    /// Write an assembly.
    ///
    /// Templates and the manifest are staged next to their final names and
    /// renamed into place only once every file is written, manifest last. A
    /// failed save leaves the previous assembly loadable. Templates of stacks
    /// that are no longer synthesized are removed.
    pub async fn save(&self, assembly: &CloudAssembly) -> Result<Manifest> {
        self.ensure_out_dir().await?;

        let previous_files = self.manifest_template_files().await;

        let mut stacks = Vec::with_capacity(assembly.stacks.len());
        let mut files = Vec::with_capacity(assembly.stacks.len() + 1);
        for stack in &assembly.stacks {
            let template_file = template_file_name(&stack.name);
            files.push((
                self.out_dir.join(&template_file),
                stack.template.to_json_pretty()?,
            ));
            stacks.push(ManifestStack {
                name: stack.name.clone(),
                environment: stack.environment.clone(),
                template_file,
                dependencies: stack.dependencies.clone(),
            });
        }
        let manifest = Manifest {
            version: MANIFEST_VERSION,
            synthesized_at: Utc::now(),
            stacks,
        };
        files.push((self.manifest_path(), serde_json::to_string_pretty(&manifest)?));

        let mut staged = Vec::with_capacity(files.len());
        for (target, content) in &files {
            let staging = staging_path(target);
            if let Err(e) = fs::write(&staging, content).await {
                discard(&staged).await;
                discard(std::slice::from_ref(&staging)).await;
                return Err(CloudError::AssemblyError(format!(
                    "Cannot write {}: {}",
                    staging.display(),
                    e
                )));
            }
            staged.push(staging);
        }

        for (i, (target, _)) in files.iter().enumerate() {
            if let Err(e) = fs::rename(&staged[i], target).await {
                discard(&staged[i..]).await;
                return Err(CloudError::AssemblyError(format!(
                    "Cannot write {}: {}",
                    target.display(),
                    e
                )));
            }
        }

        for file in previous_files {
            if manifest.stacks.iter().any(|s| s.template_file == file) {
                continue;
            }
            let stale = self.out_dir.join(&file);
            match fs::remove_file(&stale).await {
                Ok(()) => tracing::debug!("Removed stale template {}", stale.display()),
                Err(e) => tracing::warn!("Cannot remove stale template {}: {}", stale.display(), e),
            }
        }

        tracing::debug!("Saved assembly with {} stacks", manifest.stacks.len());
        Ok(manifest)
    }

    /// Template files named by the current manifest; empty when there is no
    /// readable manifest
    async fn manifest_template_files(&self) -> Vec<String> {
        let Ok(content) = fs::read_to_string(self.manifest_path()).await else {
            return Vec::new();
        };
        match serde_json::from_str::<Manifest>(&content) {
            Ok(manifest) => manifest
                .stacks
                .into_iter()
                .map(|s| s.template_file)
                .collect(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable manifest: {}", e);
                Vec::new()
            }
        }
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<AssemblyLock> {
        self.ensure_out_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are stale
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "Assembly is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired assembly lock");
        Ok(AssemblyLock {
            lock_path,
            released: false,
        })
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// Best-effort removal of staged files after a failed save
async fn discard(staged: &[PathBuf]) {
    for path in staged {
        if let Err(e) = fs::remove_file(path).await {
            tracing::debug!("Cannot remove staged file {}: {}", path.display(), e);
        }
    }
}

/// RAII guard for the assembly lock
pub struct AssemblyLock {
    lock_path: PathBuf,
    released: bool,
}

impl AssemblyLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released assembly lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for AssemblyLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::stack::{Output, Stack};
    use tempfile::tempdir;

    fn assembly() -> CloudAssembly {
        let mut base = Stack::new("Base", Environment::new(None, Some("ap-northeast-1".into())));
        let vpc = base
            .add_resource(base.new_resource(&["vpc"], "AWS::EC2::VPC"))
            .unwrap();
        let export = base
            .add_output("vpcId", Output::new(vpc).with_export_name("vpcId"))
            .unwrap()
            .unwrap();
        let mut rules = Stack::new("Rules", Environment::default());
        let imported = rules.import_value(&export);
        let r = rules
            .new_resource(&["sg"], "AWS::EC2::SecurityGroup")
            .with_property("VpcId", imported);
        rules.add_resource(r).unwrap();

        let mut app = App::new();
        app.add_stack(base).unwrap();
        app.add_stack(rules).unwrap();
        app.synth().unwrap()
    }

    #[tokio::test]
    async fn test_assembly_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = AssemblyManager::new(temp_dir.path());
        let assembly = assembly();

        let manifest = manager.save(&assembly).await.unwrap();
        assert_eq!(manifest.stacks.len(), 2);
        assert!(temp_dir.path().join("Base.template.json").exists());
        assert_eq!(manifest.stacks[1].dependencies[0].stack, "Base");

        let loaded = manager.load().await.unwrap().unwrap();
        assert_eq!(loaded, assembly);
    }

    #[tokio::test]
    async fn test_empty_assembly_dir() {
        let temp_dir = tempdir().unwrap();
        let manager = AssemblyManager::new(temp_dir.path());
        assert!(manager.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_assembly() {
        let temp_dir = tempdir().unwrap();
        let manager = AssemblyManager::new(temp_dir.path());
        let previous = assembly();
        manager.save(&previous).await.unwrap();

        // A directory in the way of the staged rules template
        std::fs::create_dir(temp_dir.path().join("Rules.template.json.tmp")).unwrap();
        let mut next = assembly();
        next.stacks[0].template.description = Some("changed".into());
        assert!(manager.save(&next).await.is_err());

        assert_eq!(manager.load().await.unwrap(), Some(previous));
        assert!(!temp_dir.path().join("Base.template.json.tmp").exists());
        assert!(!temp_dir.path().join("manifest.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_dropped_stack_template_removed() {
        let temp_dir = tempdir().unwrap();
        let manager = AssemblyManager::new(temp_dir.path());
        manager.save(&assembly()).await.unwrap();
        assert!(temp_dir.path().join("Rules.template.json").exists());

        let mut base_only = assembly();
        base_only.stacks.retain(|s| s.name == "Base");
        manager.save(&base_only).await.unwrap();

        assert!(!temp_dir.path().join("Rules.template.json").exists());
        assert!(temp_dir.path().join("Base.template.json").exists());
        assert_eq!(manager.load().await.unwrap(), Some(base_only));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = AssemblyManager::new(temp_dir.path());
        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));
        lock.release().await.unwrap();
        assert!(manager.acquire_lock().await.is_ok());
    }
}
