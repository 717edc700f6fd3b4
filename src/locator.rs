//! Locating globally installed npm packages.
//!
//! Frida agents are commonly distributed as npm packages. This module finds such a package in the
//! global `node_modules` directory and loads the file its manifest names as `main`.

use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Where older npm releases installed packages they depended on themselves.
const NESTED_NODE_MODULES: &str = "npm/node_modules";

/// Node's default entry point when a manifest has no `main`.
const DEFAULT_MAIN: &str = "index.js";

#[derive(thiserror::Error, Debug)]
pub enum LocateError {
    #[error("error running `{0} root -g`: {1}")]
    SpawningManager(String, std::io::Error),
    #[error("`{0} root -g` failed: {1}")]
    ManagerFailed(String, String),
    #[error("Cannot find global module '{0}'")]
    NotFound(String),
    #[error("error reading {0}: {1}")]
    ReadingManifest(PathBuf, std::io::Error),
    #[error("error parsing {0}: {1}")]
    ParsingManifest(PathBuf, serde_json::Error),
    #[error("error reading entry point {0}: {1}")]
    ReadingEntry(PathBuf, std::io::Error),
}

type Result<T, E = LocateError> = std::result::Result<T, E>;

/// Something which knows the global module root.
pub trait GlobalRoot {
    fn global_root(&self) -> Result<PathBuf>;
}

/// Ask a package manager executable, e.g. `npm`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PackageManager {
    program: OsString,
}

impl Default for PackageManager {
    fn default() -> Self {
        Self::new("npm")
    }
}

impl PackageManager {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl GlobalRoot for PackageManager {
    fn global_root(&self) -> Result<PathBuf> {
        let output = Command::new(&self.program)
            .args(["root", "-g"])
            .output()
            .map_err(|e| LocateError::SpawningManager(self.name(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            return Err(LocateError::ManagerFailed(self.name(), stderr));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        log::debug!("global module root: {}", root);
        Ok(PathBuf::from(root))
    }
}

/// A fixed, already-known root.
impl GlobalRoot for PathBuf {
    fn global_root(&self) -> Result<PathBuf> {
        Ok(self.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    main: Option<String>,
}

/// A package found on disk.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LocatedPackage {
    pub name: String,
    pub dir: PathBuf,
    /// The resolved entry point, `<dir>/<main>`.
    pub entry: PathBuf,
}

/// A loaded entry point.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Module {
    pub path: PathBuf,
    pub source: String,
}

impl LocatedPackage {
    pub fn load(&self) -> Result<Module> {
        let source = std::fs::read_to_string(&self.entry)
            .map_err(|e| LocateError::ReadingEntry(self.entry.clone(), e))?;
        Ok(Module {
            path: self.entry.clone(),
            source,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Locator<R: GlobalRoot = PackageManager> {
    root: R,
}

impl<R: GlobalRoot> Locator<R> {
    pub fn new(root: R) -> Self {
        Self { root }
    }

    /// Find `package_name` and resolve its entry point.
    pub fn find(&self, package_name: &str) -> Result<LocatedPackage> {
        let root = self.root.global_root()?;
        let dir = package_dir(&root, package_name)
            .ok_or_else(|| LocateError::NotFound(package_name.to_owned()))?;

        let manifest_path = dir.join("package.json");
        let manifest = std::fs::read(&manifest_path)
            .map_err(|e| LocateError::ReadingManifest(manifest_path.clone(), e))?;
        let manifest: Manifest = serde_json::from_slice(&manifest)
            .map_err(|e| LocateError::ParsingManifest(manifest_path, e))?;

        let entry = dir.join(manifest.main.as_deref().unwrap_or(DEFAULT_MAIN));
        Ok(LocatedPackage {
            name: package_name.to_owned(),
            dir,
            entry,
        })
    }

    /// Find `package_name` and load its entry point.
    pub fn require(&self, package_name: &str) -> Result<Module> {
        let package = self.find(package_name)?;
        log::info!("loading {} from {}", package.name, package.entry.display());
        package.load()
    }
}

fn package_dir(root: &Path, package_name: &str) -> Option<PathBuf> {
    [
        root.join(package_name),
        root.join(NESTED_NODE_MODULES).join(package_name),
    ]
    .into_iter()
    .find(|candidate| candidate.exists())
}
