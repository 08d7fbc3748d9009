//! Package Repository
//!
//! Each sub-directory of the repo holds one `package.yml`. Descriptors are
//! loaded once and handed out as `Arc<Package>`; nothing mutates them
//! afterwards.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use types::Package;

pub const PACKAGE_FILE: &str = "package.yml";

#[derive(Debug, Clone, Default)]
pub struct PackageRepo {
    root: Option<PathBuf>,
    packages: BTreeMap<String, Arc<Package>>,
}

impl PackageRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every `<dir>/<typeKey>/package.yml`.
    ///
    /// Unreadable descriptors are logged and skipped.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut repo = Self {
            root: Some(dir.to_path_buf()),
            packages: BTreeMap::new(),
        };

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read package repo {:?}", dir))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(key) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            match Self::read_package(&path, &key) {
                Ok(pkg) => {
                    debug!("Loaded package {} from {:?}", key, path);
                    repo.packages.insert(key, Arc::new(pkg));
                }
                Err(e) => warn!("Skipping package in {:?}: {:#}", path, e),
            }
        }

        Ok(repo)
    }

    fn read_package(dir: &Path, key: &str) -> Result<Package> {
        let file = dir.join(PACKAGE_FILE);
        let contents = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {:?}", file))?;
        let mut pkg: Package =
            serde_yaml::from_str(&contents).with_context(|| format!("Invalid {:?}", file))?;

        if pkg.type_key.is_empty() {
            pkg.type_key = key.to_string();
        }
        if pkg.cwd.is_none() {
            pkg.cwd = Some(dir.to_string_lossy().to_string());
        }
        Ok(pkg)
    }

    /// Add a descriptor; a descriptor already loaded under the key wins
    pub fn insert(&mut self, key: impl Into<String>, pkg: Package) {
        self.packages.entry(key.into()).or_insert_with(|| Arc::new(pkg));
    }

    pub fn get(&self, key: &str) -> Option<Arc<Package>> {
        self.packages.get(key).cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn packages(&self) -> impl Iterator<Item = (&str, &Arc<Package>)> {
        self.packages.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
