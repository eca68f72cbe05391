//! Convenience operations built on [`Resource`]

use crate::error::{Result, StoreError};
use crate::paths;
use crate::resource::{Resource, ResourceType};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Attempts made by [`unique_resource`] before giving up
pub const MAX_RENAME_ATTEMPTS: usize = 100;

pub fn exists(resource: &Resource) -> bool {
    resource.resource_type() != ResourceType::Undefined
}

/// True if the content can be opened and read
pub fn can_read(resource: &Resource) -> bool {
    match resource.open_read() {
        Ok(mut input) => {
            let mut byte = [0u8; 1];
            input.read(&mut byte).is_ok()
        }
        Err(_) => false,
    }
}

/// Dot-files are hidden
pub fn is_hidden(resource: &Resource) -> bool {
    resource.name().starts_with('.')
}

/// Existing native file or directory, `None` when undefined
pub fn find(resource: &Resource) -> Result<Option<PathBuf>> {
    match resource.resource_type() {
        ResourceType::Directory => resource.dir().map(Some),
        ResourceType::Resource => resource.file().map(Some),
        ResourceType::Undefined => Ok(None),
    }
}

/// Native file of an existing leaf; with `create`, materialize it first
pub fn file(resource: &Resource, create: bool) -> Result<Option<PathBuf>> {
    if create || resource.resource_type() == ResourceType::Resource {
        resource.file().map(Some)
    } else {
        Ok(None)
    }
}

/// Native directory of an existing directory; with `create`, make it first
pub fn directory(resource: &Resource, create: bool) -> Result<Option<PathBuf>> {
    if create || resource.resource_type() == ResourceType::Directory {
        resource.dir().map(Some)
    } else {
        Ok(None)
    }
}

/// Create an empty leaf; fails if anything exists at the path
pub fn create_new_file(resource: &Resource) -> Result<PathBuf> {
    match resource.resource_type() {
        ResourceType::Undefined => resource.file(),
        kind => Err(StoreError::AlreadyExists {
            path: resource.path(),
            kind,
        }),
    }
}

/// Create a directory; fails if anything exists at the path
pub fn create_new_directory(resource: &Resource) -> Result<PathBuf> {
    match resource.resource_type() {
        ResourceType::Undefined => resource.dir(),
        kind => Err(StoreError::AlreadyExists {
            path: resource.path(),
            kind,
        }),
    }
}

/// Leaf children of `dir` modified after `since`
pub fn search(dir: &Resource, since: SystemTime) -> Result<Vec<Resource>> {
    let mut found = Vec::new();
    for child in dir.list()? {
        if child.resource_type() != ResourceType::Resource {
            continue;
        }
        if let Some(modified) = child.last_modified()? {
            if modified > since {
                found.push(child);
            }
        }
    }
    Ok(found)
}

/// Write everything from `data` into `destination`
pub fn copy_from_reader(data: &mut dyn Read, destination: &Resource) -> Result<()> {
    let mut out = destination.open_write()?;
    std::io::copy(data, &mut out)?;
    out.flush()?;
    out.commit()
}

/// Copy content from `source` to `destination`, recursing into directories
pub fn copy(source: &Resource, destination: &Resource) -> Result<()> {
    match source.resource_type() {
        ResourceType::Directory => {
            for child in source.list()? {
                copy(&child, &destination.get(child.name())?)?;
            }
            Ok(())
        }
        _ => {
            let mut input = source.open_read()?;
            copy_from_reader(&mut input, destination)
        }
    }
}

/// Non-atomic rename: copy then delete the source
///
/// Returns `false` if either step fails.
pub fn rename_by_copy(source: &Resource, destination: &Resource) -> bool {
    match copy(source, destination) {
        Ok(()) => source.delete().unwrap_or(false),
        Err(_) => false,
    }
}

/// Selects resources during listing
pub trait ResourceFilter {
    fn accept(&self, resource: &Resource) -> bool;
}

impl<F> ResourceFilter for F
where
    F: Fn(&Resource) -> bool,
{
    fn accept(&self, resource: &Resource) -> bool {
        self(resource)
    }
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyFilter;

impl ResourceFilter for AnyFilter {
    fn accept(&self, _resource: &Resource) -> bool {
        true
    }
}

/// Accepts directories
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryFilter;

impl ResourceFilter for DirectoryFilter {
    fn accept(&self, resource: &Resource) -> bool {
        resource.resource_type() == ResourceType::Directory
    }
}

/// Accepts leaves whose extension is in a set (compared case-insensitively)
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: HashSet<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_uppercase())
                .collect(),
        }
    }
}

impl ResourceFilter for ExtensionFilter {
    fn accept(&self, resource: &Resource) -> bool {
        match paths::extension(resource.name()) {
            Some(ext) => self.extensions.contains(&ext.to_ascii_uppercase()),
            None => false,
        }
    }
}

/// Children of `dir` accepted by `filter`, descending into subdirectories if `recursive`
pub fn list(dir: &Resource, filter: &dyn ResourceFilter, recursive: bool) -> Result<Vec<Resource>> {
    let mut found = Vec::new();
    for child in dir.list()? {
        if filter.accept(&child) {
            found.push(child.clone());
        }
        if recursive && child.resource_type() == ResourceType::Directory {
            found.extend(list(&child, filter, true)?);
        }
    }
    Ok(found)
}

/// Every descendant of `dir`, parents before children
pub fn list_recursively(dir: &Resource) -> Result<Vec<Resource>> {
    list(dir, &AnyFilter, true)
}

/// URL scheme naming a store resource
pub const RESOURCE_SCHEME: &str = "resource:";

const FILE_SCHEME: &str = "file:";

/// `resource:` URL for `resource`; directories end with `/`
///
/// ```
/// # use rstore_core::{resources, FileSystemResourceStore, ResourceStore, Validation};
/// # let tmp = tempfile::tempdir().unwrap();
/// # let store = FileSystemResourceStore::open(tmp.path(), Validation::Strict).unwrap();
/// let style = store.get("styles/point.sld").unwrap();
/// assert_eq!(resources::to_url(&style), "resource:/styles/point.sld");
/// ```
pub fn to_url(resource: &Resource) -> String {
    let path = resource.path();
    if resource.resource_type() == ResourceType::Directory && !path.is_empty() {
        format!("{RESOURCE_SCHEME}/{path}/")
    } else {
        format!("{RESOURCE_SCHEME}/{path}")
    }
}

/// Resolve a user supplied location against `base`
///
/// `resource:` URLs and relative `file:` URLs always resolve below `base`.
/// A bare relative path resolves only when something exists there. Other
/// schemes (`http:`, `sde:` and the like) and absolute native paths lie
/// outside the store and yield `None`.
pub fn from_url(base: &Resource, url: &str) -> Result<Option<Resource>> {
    if let Some(path) = strip_scheme(url, RESOURCE_SCHEME) {
        return base.get(path).map(Some);
    }
    if let Some(path) = strip_scheme(url, FILE_SCHEME) {
        if path.starts_with('/') || paths::is_absolute(path, cfg!(windows)) {
            return Ok(None);
        }
        return base.get(path).map(Some);
    }
    if has_scheme(url) || paths::is_absolute(url, cfg!(windows)) {
        return Ok(None);
    }
    let resource = base.get(url)?;
    Ok(exists(&resource).then_some(resource))
}

/// Resolve a native path; relative paths are taken from `relative_dir`
///
/// Absolute paths are not part of the store and yield `None`.
pub fn from_path(path: &str, relative_dir: &Resource) -> Result<Option<Resource>> {
    if Path::new(path).is_absolute() || paths::is_absolute(path, cfg!(windows)) {
        return Ok(None);
    }
    let path = path.replace(std::path::MAIN_SEPARATOR, "/");
    relative_dir.get(&path).map(Some)
}

fn strip_scheme<'a>(url: &'a str, scheme: &str) -> Option<&'a str> {
    let head = url.get(..scheme.len())?;
    head.eq_ignore_ascii_case(scheme).then(|| &url[scheme.len()..])
}

/// `scheme:` prefix of at least two characters, so `C:` drive letters do not count
fn has_scheme(url: &str) -> bool {
    match url.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Undefined child of `dir` named `prefix` + random UUID + `suffix`
///
/// Only the final segment of `prefix` is used.
pub fn create_random(prefix: &str, suffix: &str, dir: &Resource) -> Result<Resource> {
    let prefix = paths::name(prefix.trim_end_matches('/'));
    loop {
        let candidate = dir.get(&format!("{}{}{}", prefix, uuid::Uuid::new_v4(), suffix))?;
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }
}

/// Undefined sibling of `resource` suitable as a rename target
///
/// Tries `new_name.ext`, then `new_name1.ext` up to `new_name100.ext`.
pub fn unique_resource(resource: &Resource, new_name: &str, extension: &str) -> Result<Resource> {
    let parent = resource
        .parent()
        .ok_or_else(|| StoreError::invalid(resource.path(), "the root has no siblings"))?;

    let mut target = parent.get(&format!("{new_name}.{extension}"))?;
    let mut attempt = 0;
    while exists(&target) {
        attempt += 1;
        if attempt > MAX_RENAME_ATTEMPTS {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!(
                    "all targets between {new_name}1.{extension} and \
                     {new_name}{MAX_RENAME_ATTEMPTS}.{extension} are in use"
                ),
            )));
        }
        target = parent.get(&format!("{new_name}{attempt}.{extension}"))?;
    }
    Ok(target)
}
