//! Resource handles
//!
//! A [`Resource`] is a thin value pairing a normalized path with the store it
//! was obtained from. It caches nothing: every type dependent operation asks
//! the backing [`Backend`] again, so changes made behind the store's back
//! (another process, an editor) are always observed.

use crate::error::{Result, StoreError};
use crate::paths::{ResourcePath, Validation};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Lifecycle state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Nothing exists at the path
    Undefined,
    /// A leaf holding content
    Resource,
    /// A container of other resources
    Directory,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::Undefined => "UNDEFINED",
            ResourceType::Resource => "RESOURCE",
            ResourceType::Directory => "DIRECTORY",
        };
        f.write_str(name)
    }
}

/// Readable content stream
pub type ResourceReader = Box<dyn Read + Send>;

/// Staged output that becomes visible only once committed
pub trait StagedOutput: Write + Send {
    /// Publish the written content, replacing any previous content atomically
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Writable content stream returned by [`Resource::open_write`]
///
/// Content is staged and published on [`ResourceWriter::commit`]. Dropping an
/// uncommitted writer discards the staged content.
pub struct ResourceWriter {
    inner: Box<dyn StagedOutput>,
}

impl ResourceWriter {
    pub fn new(inner: Box<dyn StagedOutput>) -> Self {
        Self { inner }
    }

    /// Publish the content, reporting any failure
    pub fn commit(self) -> Result<()> {
        self.inner.commit()
    }
}

impl Write for ResourceWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl fmt::Debug for ResourceWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceWriter").finish_non_exhaustive()
    }
}

/// Persistence medium behind a store
///
/// Implementations map normalized paths onto storage. All methods take the
/// already validated path; none of them may cache type information.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Validation applied to paths handed to this backend
    fn validation(&self) -> Validation;

    fn resource_type(&self, path: &ResourcePath) -> ResourceType;

    fn last_modified(&self, path: &ResourcePath) -> Result<Option<SystemTime>>;

    fn open_read(&self, path: &ResourcePath) -> Result<ResourceReader>;

    fn open_write(&self, path: &ResourcePath) -> Result<ResourceWriter>;

    /// Names of the immediate children, sorted; empty unless a directory
    fn children(&self, path: &ResourcePath) -> Result<Vec<String>>;

    fn delete(&self, path: &ResourcePath) -> Result<bool>;

    fn rename(&self, from: &ResourcePath, to: &ResourcePath) -> Result<bool>;

    /// Native file, created empty when undefined
    fn file(&self, path: &ResourcePath) -> Result<PathBuf>;

    /// Native directory, created when undefined
    fn dir(&self, path: &ResourcePath) -> Result<PathBuf>;
}

/// Entry point for obtaining resources
pub trait ResourceStore {
    /// Resource at `path`; fails for unsafe or absolute paths
    fn get(&self, path: &str) -> Result<Resource>;

    /// Delete the resource at `path`
    fn remove(&self, path: &str) -> Result<bool> {
        self.get(path)?.delete()
    }

    /// Rename the resource at `path` to `target`
    fn move_to(&self, path: &str, target: &str) -> Result<bool> {
        let target = self.get(target)?;
        self.get(path)?.rename_to(&target)
    }
}

/// Handle on a path within a store
#[derive(Clone)]
pub struct Resource {
    path: ResourcePath,
    backend: Arc<dyn Backend>,
}

impl Resource {
    pub fn new(path: ResourcePath, backend: Arc<dyn Backend>) -> Self {
        Self { path, backend }
    }

    /// Normalized path string, empty for the root
    pub fn path(&self) -> String {
        self.path.to_string()
    }

    pub fn resource_path(&self) -> &ResourcePath {
        &self.path
    }

    /// Final path segment, empty for the root
    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn resource_type(&self) -> ResourceType {
        self.backend.resource_type(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.resource_type() != ResourceType::Undefined
    }

    /// Modification time; `None` while undefined
    pub fn last_modified(&self) -> Result<Option<SystemTime>> {
        self.backend.last_modified(&self.path)
    }

    /// Resource one segment up, `None` for the root
    pub fn parent(&self) -> Option<Resource> {
        self.path.parent().map(|path| Resource {
            path,
            backend: Arc::clone(&self.backend),
        })
    }

    /// Resource at a relative path below this one
    pub fn get(&self, relative: &str) -> Result<Resource> {
        let path = self.path.child(relative, self.backend.validation())?;
        Ok(Resource {
            path,
            backend: Arc::clone(&self.backend),
        })
    }

    /// Immediate children; empty for leaves and undefined resources
    pub fn list(&self) -> Result<Vec<Resource>> {
        self.backend
            .children(&self.path)?
            .into_iter()
            .map(|name| {
                let path = self.path.child(&name, Validation::Lenient)?;
                Ok(Resource {
                    path,
                    backend: Arc::clone(&self.backend),
                })
            })
            .collect()
    }

    /// Content stream; a state error unless this is a leaf
    pub fn open_read(&self) -> Result<ResourceReader> {
        self.backend.open_read(&self.path)
    }

    /// Staged output stream; materializes the leaf and its parents
    pub fn open_write(&self) -> Result<ResourceWriter> {
        self.backend.open_write(&self.path)
    }

    /// Read the whole content
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_read()?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Replace the whole content
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut out = self.open_write()?;
        out.write_all(data)?;
        out.commit()
    }

    /// Remove this resource (recursively for directories)
    ///
    /// Returns `false` when there was nothing to delete.
    pub fn delete(&self) -> Result<bool> {
        self.backend.delete(&self.path)
    }

    /// Move this resource and its descendants to `target`
    pub fn rename_to(&self, target: &Resource) -> Result<bool> {
        if !Arc::ptr_eq(&self.backend, &target.backend) {
            return Err(StoreError::invalid(
                target.path(),
                "rename target belongs to a different store",
            ));
        }
        self.backend.rename(&self.path, &target.path)
    }

    /// Native file handle, creating an empty leaf when undefined
    pub fn file(&self) -> Result<PathBuf> {
        self.backend.file(&self.path)
    }

    /// Native directory handle, creating it when undefined
    pub fn dir(&self) -> Result<PathBuf> {
        self.backend.dir(&self.path)
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && Arc::ptr_eq(&self.backend, &other.backend)
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resource").field(&self.path()).finish()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}
