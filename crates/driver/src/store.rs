//! Handles on the external data store.
//!
//! A store is opened once per run, answers reference lookups during
//! validation and receives the run's artifacts once the engine has finished.
//! An explicit [`DataStore::close`] persists what was written; dropping a
//! handle without closing it discards pending writes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use geoinv_options::{DataRef, EntityCatalog, EntityInfo, MemoryCatalog};

use crate::engine::{Artifact, ArtifactKind};

// ============================================================================
// Traits
// ============================================================================

pub trait DataStore: EntityCatalog + Send {
    /// The store seen as a catalog for reference checks.
    fn catalog(&self) -> &dyn EntityCatalog;

    fn path(&self) -> &Path;

    /// Register the artifacts of run `run`.
    fn write_artifacts(&mut self, run: &str, artifacts: &[Artifact]) -> Result<(), StoreError>;

    /// Persist pending writes and release the handle.
    fn close(self: Box<Self>) -> Result<(), StoreError>;
}

pub trait StoreOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn DataStore>, StoreError>;

    /// Copy a store so that another run gets a handle of its own.
    fn fork(&self, source: &Path, dest: &Path) -> Result<(), StoreError> {
        if !source.exists() {
            return Err(StoreError::NotFound(source.to_path_buf()));
        }
        fs::copy(source, dest)?;
        Ok(())
    }
}

impl<S: StoreOpener + ?Sized> StoreOpener for &S {
    fn open(&self, path: &Path) -> Result<Box<dyn DataStore>, StoreError> {
        (**self).open(path)
    }

    fn fork(&self, source: &Path, dest: &Path) -> Result<(), StoreError> {
        (**self).fork(source, dest)
    }
}

// ============================================================================
// Manifest Store
// ============================================================================

/// A result file registered in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub run: String,
    pub name: String,
    pub kind: ArtifactKind,
    /// Relative to the manifest's directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entities: MemoryCatalog,
    #[serde(default)]
    pub results: Vec<ResultRecord>,
}

/// Directory-backed stand-in for the geoscience store.
///
/// The store path names a JSON manifest listing the entities runs may
/// reference. Artifacts are staged under `<stem>_results/.staging/<run>/`
/// and moved to `<stem>_results/<run>/` when the store is closed.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    manifest: Manifest,
    pending: usize,
    staged: Vec<String>,
}

impl ManifestStore {
    /// Write a fresh manifest holding `entities`.
    pub fn create(path: impl AsRef<Path>, entities: MemoryCatalog) -> Result<(), StoreError> {
        let manifest = Manifest {
            entities,
            results: Vec::new(),
        };
        write_atomic(path.as_ref(), &manifest)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            _ => StoreError::Io(e),
        })?;
        let manifest: Manifest =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            "opened store {} ({} entities, {} results)",
            path.display(),
            manifest.entities.len(),
            manifest.results.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            pending: 0,
            staged: Vec::new(),
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn results_root(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("store"));
        self.base_dir().join(format!("{}_results", stem))
    }

    fn results_dir(&self, run: &str) -> PathBuf {
        self.results_root().join(run)
    }

    fn staging_dir(&self, run: &str) -> PathBuf {
        self.results_root().join(STAGING_DIR).join(run)
    }

    fn stage(&mut self, run: &str, artifacts: &[Artifact]) -> Result<(), StoreError> {
        let staging = self.staging_dir(run);
        fs::create_dir_all(&staging)?;
        let dir = self.results_dir(run);

        for artifact in artifacts {
            fs::copy(&artifact.path, staging.join(&artifact.name))?;
            let dest = dir.join(&artifact.name);
            let relative = dest
                .strip_prefix(self.base_dir())
                .map(Path::to_path_buf)
                .unwrap_or(dest);
            self.manifest.results.push(ResultRecord {
                run: run.to_string(),
                name: artifact.name.clone(),
                kind: artifact.kind,
                path: relative,
            });
        }
        Ok(())
    }

    /// Move every staged run to its final directory.
    fn publish(&mut self) -> Result<(), StoreError> {
        while let Some(run) = self.staged.first().cloned() {
            let dest = self.results_dir(&run);
            if dest.exists() {
                fs::remove_dir_all(&dest)?;
            }
            fs::rename(self.staging_dir(&run), &dest)?;
            self.staged.remove(0);
        }
        remove_if_empty(&self.results_root().join(STAGING_DIR));
        Ok(())
    }

    fn discard_staged(&mut self) {
        for run in std::mem::take(&mut self.staged) {
            let staging = self.staging_dir(&run);
            if let Err(e) = fs::remove_dir_all(&staging) {
                debug!("could not remove {}: {}", staging.display(), e);
            }
        }
        let root = self.results_root();
        remove_if_empty(&root.join(STAGING_DIR));
        remove_if_empty(&root);
    }

    fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

const STAGING_DIR: &str = ".staging";

fn remove_if_empty(dir: &Path) {
    // Fails on non-empty or missing directories, both of which are kept as is.
    let _ = fs::remove_dir(dir);
}

fn write_atomic(path: &Path, manifest: &Manifest) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_string_pretty(manifest)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl EntityCatalog for ManifestStore {
    fn entity(&self, id: &DataRef) -> Option<EntityInfo> {
        self.manifest.entities.entity(id)
    }
}

impl DataStore for ManifestStore {
    fn catalog(&self) -> &dyn EntityCatalog {
        self
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn write_artifacts(&mut self, run: &str, artifacts: &[Artifact]) -> Result<(), StoreError> {
        if !self.staged.iter().any(|r| r == run) {
            self.staged.push(run.to_string());
        }
        let recorded = self.manifest.results.len();
        match self.stage(run, artifacts) {
            Ok(()) => {
                self.pending += artifacts.len();
                Ok(())
            }
            Err(e) => {
                // Nothing of a failed run is kept, including earlier batches.
                self.manifest.results.truncate(recorded);
                let earlier = self.manifest.results.iter().filter(|r| r.run == run).count();
                self.manifest.results.retain(|r| r.run != run);
                self.pending = self.pending.saturating_sub(earlier);
                self.staged.retain(|r| r != run);
                let staging = self.staging_dir(run);
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    debug!("could not remove {}: {}", staging.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    fn close(mut self: Box<Self>) -> Result<(), StoreError> {
        if self.pending > 0 {
            self.publish()?;
            write_atomic(&self.path, &self.manifest)?;
            info!("registered {} result(s) in {}", self.pending, self.path.display());
            self.pending = 0;
        }
        Ok(())
    }
}

impl Drop for ManifestStore {
    fn drop(&mut self) {
        // `close` publishes and clears both, so leftovers mean it never ran or failed.
        if self.pending > 0 && !std::thread::panicking() {
            warn!(
                "store {} released without closing; {} result(s) discarded",
                self.path.display(),
                self.pending
            );
        }
        if !self.staged.is_empty() {
            self.discard_staged();
        }
    }
}

/// Opens [`ManifestStore`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestOpener;

impl StoreOpener for ManifestOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn DataStore>, StoreError> {
        Ok(Box::new(ManifestStore::open(path)?))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("store {} is unreadable: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
