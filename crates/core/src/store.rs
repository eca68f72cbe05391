//! Filesystem backed resource store
//!
//! Maps store paths onto a directory tree below a fixed root:
//! ```text
//! <root>/
//!   styles/
//!     point.sld        -> "styles/point.sld"
//!   workspaces/        -> "workspaces"
//! ```

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::paths::{self, ResourcePath, Validation};
use crate::resource::{
    Backend, Resource, ResourceReader, ResourceStore, ResourceType, ResourceWriter, StagedOutput,
};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::debug;

/// Resource store over a directory on the local filesystem
#[derive(Clone, Debug)]
pub struct FileSystemResourceStore {
    backend: Arc<FileSystemBackend>,
}

impl FileSystemResourceStore {
    /// Open a store rooted at an existing directory
    pub fn open(root: &Path, validation: Validation) -> Result<Self> {
        let meta = fs::metadata(root)?;
        if !meta.is_dir() {
            return Err(StoreError::invalid(
                root.display().to_string(),
                "store root is not a directory",
            ));
        }
        Ok(Self {
            backend: Arc::new(FileSystemBackend {
                root: root.to_path_buf(),
                validation,
            }),
        })
    }

    /// Open the store described by `config`
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open(&config.root, config.validation())
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.backend.root
    }

    pub fn validation(&self) -> Validation {
        self.backend.validation
    }

    /// Resource for an already validated path
    pub fn get_path(&self, path: ResourcePath) -> Resource {
        Resource::new(path, self.backend.clone())
    }

    /// The root resource
    pub fn root_resource(&self) -> Resource {
        self.get_path(ResourcePath::root())
    }

    /// Store path of a native file, if it lies below the root
    pub fn resource_for_file(&self, file: &Path) -> Result<Option<Resource>> {
        match paths::convert(&self.backend.root, file) {
            Some(path) => Ok(Some(self.get(&path)?)),
            None => Ok(None),
        }
    }
}

impl ResourceStore for FileSystemResourceStore {
    fn get(&self, path: &str) -> Result<Resource> {
        let parsed = ResourcePath::parse(path, self.backend.validation)?;
        if !parsed.is_root() && paths::is_absolute(path, cfg!(windows)) {
            return Err(StoreError::invalid(path, "absolute path not allowed"));
        }
        Ok(self.get_path(parsed))
    }
}

#[derive(Debug)]
struct FileSystemBackend {
    root: PathBuf,
    validation: Validation,
}

impl FileSystemBackend {
    fn locate(&self, path: &ResourcePath) -> PathBuf {
        path.to_file(&self.root)
    }

    fn state_error(path: &ResourcePath, actual: ResourceType, operation: &'static str) -> StoreError {
        StoreError::State {
            path: path.to_string(),
            actual,
            operation,
        }
    }
}

impl Backend for FileSystemBackend {
    fn validation(&self) -> Validation {
        self.validation
    }

    fn resource_type(&self, path: &ResourcePath) -> ResourceType {
        match fs::metadata(self.locate(path)) {
            Ok(meta) if meta.is_dir() => ResourceType::Directory,
            Ok(_) => ResourceType::Resource,
            Err(_) => ResourceType::Undefined,
        }
    }

    fn last_modified(&self, path: &ResourcePath) -> Result<Option<SystemTime>> {
        match fs::metadata(self.locate(path)) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn open_read(&self, path: &ResourcePath) -> Result<ResourceReader> {
        match self.resource_type(path) {
            ResourceType::Resource => {
                let file = File::open(self.locate(path))?;
                Ok(Box::new(BufReader::new(file)))
            }
            other => Err(Self::state_error(path, other, "read")),
        }
    }

    fn open_write(&self, path: &ResourcePath) -> Result<ResourceWriter> {
        let kind = self.resource_type(path);
        if kind == ResourceType::Directory {
            return Err(Self::state_error(path, kind, "write"));
        }
        let target = self.file(path)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let staged = NamedTempFile::new_in(&dir)?;
        Ok(ResourceWriter::new(Box::new(StagedFile {
            staged: Some(staged),
            target,
        })))
    }

    fn children(&self, path: &ResourcePath) -> Result<Vec<String>> {
        if self.resource_type(path) != ResourceType::Directory {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(self.locate(path))? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if paths::valid_name(name, Validation::Lenient).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete(&self, path: &ResourcePath) -> Result<bool> {
        let file = self.locate(path);
        match self.resource_type(path) {
            ResourceType::Undefined => Ok(false),
            ResourceType::Directory if path.is_root() => Err(Self::state_error(
                path,
                ResourceType::Directory,
                "delete the store root",
            )),
            ResourceType::Directory => {
                debug!(path = %path, "removing directory tree");
                fs::remove_dir_all(file)?;
                Ok(true)
            }
            ResourceType::Resource => {
                debug!(path = %path, "removing resource");
                fs::remove_file(file)?;
                Ok(true)
            }
        }
    }

    fn rename(&self, from: &ResourcePath, to: &ResourcePath) -> Result<bool> {
        if self.resource_type(from) == ResourceType::Undefined {
            return Ok(false);
        }
        if from == to {
            return Ok(true);
        }
        if to.starts_with(from) {
            // cannot move a directory into itself
            return Ok(false);
        }
        let source = self.locate(from);
        let dest = self.locate(to);

        if same_entry(&source, &dest) {
            // Same entry under another spelling: the filesystem ignores case.
            // Go through an intermediate name or the rename is a no-op.
            let hop = source.with_file_name(format!(".rename-{}", uuid::Uuid::new_v4()));
            debug!(from = %from, to = %to, "case-only rename");
            fs::rename(&source, &hop)?;
            fs::rename(&hop, &dest)?;
            return Ok(true);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!(from = %from, to = %to, "renaming");
        fs::rename(&source, &dest)?;
        Ok(true)
    }

    fn file(&self, path: &ResourcePath) -> Result<PathBuf> {
        let file = self.locate(path);
        match self.resource_type(path) {
            ResourceType::Resource => Ok(file),
            ResourceType::Undefined => {
                if let Some(parent) = file.parent() {
                    fs::create_dir_all(parent)?;
                }
                File::create(&file)?;
                Ok(file)
            }
            ResourceType::Directory => {
                Err(Self::state_error(path, ResourceType::Directory, "open as file"))
            }
        }
    }

    fn dir(&self, path: &ResourcePath) -> Result<PathBuf> {
        let dir = self.locate(path);
        match self.resource_type(path) {
            ResourceType::Directory => Ok(dir),
            ResourceType::Undefined => {
                fs::create_dir_all(&dir)?;
                Ok(dir)
            }
            ResourceType::Resource => {
                Err(Self::state_error(path, ResourceType::Resource, "open as directory"))
            }
        }
    }
}

/// True when both paths exist and name the same filesystem entry
///
/// Distinct spellings resolve to one entry on case-insensitive filesystems.
/// Queried on every rename since the answer depends on the volume.
#[cfg(unix)]
fn same_entry(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_entry(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => false,
    }
}

/// Temporary sibling that replaces the target on commit
struct StagedFile {
    staged: Option<NamedTempFile>,
    target: PathBuf,
}

impl StagedFile {
    fn publish(&mut self) -> Result<()> {
        if let Some(mut staged) = self.staged.take() {
            staged.flush()?;
            staged.as_file().sync_all()?;
            staged
                .persist(&self.target)
                .map_err(|e| StoreError::Io(e.error))?;
        }
        Ok(())
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.staged.as_mut() {
            Some(staged) => staged.write(buf),
            None => Err(std::io::Error::other("output already committed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.staged.as_mut() {
            Some(staged) => staged.flush(),
            None => Ok(()),
        }
    }
}

impl StagedOutput for StagedFile {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.publish()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        // NamedTempFile removes itself; the target keeps its old content
        if self.staged.is_some() {
            debug!(target_file = %self.target.display(), "discarded uncommitted output");
        }
    }
}
