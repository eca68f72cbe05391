//! Store-relative path handling
//!
//! Resource paths are `/` separated sequences of names relative to the store
//! root. Parsing collapses leading, trailing and repeated separators and
//! rejects `.` segments and any name containing `..` or `\`. Strict
//! validation additionally rejects characters that are unsafe on common
//! filesystems or in URLs.
//!
//! ```
//! use rstore_core::paths::{self, Validation};
//!
//! let names = paths::parse("/styles//point.sld/", Validation::Strict).unwrap();
//! assert_eq!(names, vec!["styles", "point.sld"]);
//! assert!(paths::parse("styles/../secret", Validation::Strict).is_err());
//! ```

use crate::error::{Result, StoreError};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Path of the store root
pub const BASE: &str = "";

/// Segment separator
pub const SEPARATOR: char = '/';

/// Characters rejected by strict validation
pub const BLOCKED: &[char] = &[':', '*', ',', '\'', '&', '?', '"', '<', '>', '|'];

/// How strictly segment names are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    /// Reject traversal segments and the blocked character set
    #[default]
    Strict,
    /// Reject traversal segments only
    Lenient,
}

/// Check a single segment name
pub fn valid_name(name: &str, validation: Validation) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::invalid(name, "empty segment"));
    }
    if name == "." || name.contains("..") {
        return Err(StoreError::invalid(name, "relative segment not allowed"));
    }
    if name.contains(SEPARATOR) || name.contains('\\') {
        return Err(StoreError::invalid(name, "segment contains separator"));
    }
    if validation == Validation::Strict {
        if let Some(c) = name.chars().find(|c| BLOCKED.contains(c)) {
            return Err(StoreError::invalid(
                name,
                format!("contains invalid character {c:?}"),
            ));
        }
    }
    Ok(())
}

/// Split a path into its segment names
///
/// Empty segments produced by leading, trailing or repeated separators are
/// dropped, so `""` and `"/"` both yield the root (no segments).
pub fn parse(text: &str, validation: Validation) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for name in text.split(SEPARATOR).filter(|s| !s.is_empty()) {
        valid_name(name, validation).map_err(|e| match e {
            StoreError::InvalidPath { reason, .. } => StoreError::invalid(text, reason),
            other => other,
        })?;
        names.push(name.to_string());
    }
    Ok(names)
}

/// Parse and re-join, yielding the canonical form of `text`
pub fn normalize(text: &str, validation: Validation) -> Result<String> {
    Ok(parse(text, validation)?.join("/"))
}

/// Check whether `text` names a platform filesystem root
///
/// POSIX paths are absolute when they start with `/`. When `windows` is set,
/// drive letter paths (`C:/`, `C:\`) and UNC paths (`\\server`) count as well.
pub fn is_absolute(text: &str, windows: bool) -> bool {
    if text.starts_with(SEPARATOR) {
        return true;
    }
    if !windows {
        return false;
    }
    if text.starts_with("\\\\") {
        return true;
    }
    let bytes = text.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Build a normalized path from segment names
///
/// Individual items may themselves contain separators; the result is parsed
/// again so traversal segments are rejected wherever they appear.
pub fn path<S: AsRef<str>>(segments: &[S]) -> Result<String> {
    let joined = segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/");
    normalize(&joined, Validation::Lenient)
}

/// Append `child` to `base`
pub fn join(base: &str, child: &str) -> Result<String> {
    path(&[base, child])
}

/// Final segment of a normalized path (empty for the root)
pub fn name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Parent of a normalized path, or `None` for the root
pub fn parent(path: &str) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    Some(match path.rfind(SEPARATOR) {
        Some(idx) => path[..idx].to_string(),
        None => BASE.to_string(),
    })
}

/// Extension of the final segment, without the dot
pub fn extension(path: &str) -> Option<&str> {
    let name = name(path);
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => Some(&name[idx + 1..]),
        _ => None,
    }
}

/// Path of a companion resource sharing the base name of `path`
///
/// The extension of the final segment is replaced (or appended when there is
/// none): `sidecar("styles/point.sld", "xml") == "styles/point.xml"`.
pub fn sidecar(path: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    let name = name(path);
    let stem_len = match name.rfind('.') {
        Some(idx) if idx > 0 => idx,
        _ => name.len(),
    };
    let prefix_len = path.len() - name.len();
    format!("{}{}.{}", &path[..prefix_len], &name[..stem_len], extension)
}

/// Native location of a store path below `base`
pub fn to_file(base: &Path, path: &str) -> PathBuf {
    let mut file = base.to_path_buf();
    for name in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        file.push(name);
    }
    file
}

/// Store path of a native location, or `None` if it is not below `base`
pub fn convert(base: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(base).ok()?;
    let mut names = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => names.push(name.to_str()?.to_string()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(names.join("/"))
}

/// A validated, normalized store path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ResourcePath {
    names: Vec<String>,
}

impl ResourcePath {
    /// The store root
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(text: &str, validation: Validation) -> Result<Self> {
        Ok(Self {
            names: parse(text, validation)?,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.names
    }

    pub fn is_root(&self) -> bool {
        self.names.is_empty()
    }

    /// Final segment, empty for the root
    pub fn name(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or(BASE)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            names: self.names[..self.names.len() - 1].to_vec(),
        })
    }

    /// Descend by a relative path
    pub fn child(&self, relative: &str, validation: Validation) -> Result<Self> {
        let mut names = self.names.clone();
        names.extend(parse(relative, validation)?);
        Ok(Self { names })
    }

    /// True when `self` is `other` or lies below it
    pub fn starts_with(&self, other: &ResourcePath) -> bool {
        self.names.starts_with(&other.names)
    }

    /// Ancestors from the immediate parent up to (and including) the root
    pub fn ancestors(&self) -> impl Iterator<Item = ResourcePath> + '_ {
        (0..self.names.len()).rev().map(move |len| ResourcePath {
            names: self.names[..len].to_vec(),
        })
    }

    pub fn to_file(&self, base: &Path) -> PathBuf {
        let mut file = base.to_path_buf();
        file.extend(&self.names);
        file
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collapses_separators() {
        assert_eq!(
            parse("//a///b/c//", Validation::Strict).unwrap(),
            vec!["a", "b", "c"]
        );
        assert!(parse("", Validation::Strict).unwrap().is_empty());
        assert!(parse("/", Validation::Strict).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_traversal() {
        for bad in ["..", "a/..", "../a", "a/../b", ".", "a/./b"] {
            let err = parse(bad, Validation::Lenient).unwrap_err();
            assert!(err.is_validation(), "{bad} should be rejected");
        }
        for bad in ["a/..b", "x..", "a/b..c/d", "..\\..\\outside", "a\\b"] {
            let err = parse(bad, Validation::Lenient).unwrap_err();
            assert!(err.is_validation(), "{bad} should be rejected");
        }
        assert!(parse("a/.b/c.d", Validation::Strict).is_ok());
    }

    #[test]
    fn test_strict_blocks_characters() {
        for c in BLOCKED {
            let text = format!("dir/na{c}me");
            assert!(parse(&text, Validation::Strict).is_err(), "{text}");
            assert!(parse(&text, Validation::Lenient).is_ok(), "{text}");
        }
    }

    #[test]
    fn test_round_trip() {
        for text in ["", "a", "a/b/c", "/a/b/", "a//b", "styles/point.sld"] {
            let names = parse(text, Validation::Strict).unwrap();
            let rebuilt = path(&names).unwrap();
            assert_eq!(rebuilt, normalize(text, Validation::Strict).unwrap());
            assert_eq!(parse(&rebuilt, Validation::Strict).unwrap(), names);
        }
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("/etc/passwd", false));
        assert!(!is_absolute("etc/passwd", false));
        assert!(!is_absolute("C:/data", false));
        assert!(is_absolute("C:/data", true));
        assert!(is_absolute("c:\\data", true));
        assert!(is_absolute("\\\\server\\share", true));
        assert!(!is_absolute("data/C:", true));
        assert!(!is_absolute("C:data", true));
    }

    #[test]
    fn test_join_and_path() {
        assert_eq!(join("a/b", "c").unwrap(), "a/b/c");
        assert_eq!(join("", "c").unwrap(), "c");
        assert_eq!(path(&["a", "b/c", "d"]).unwrap(), "a/b/c/d");
        assert!(join("a", "..").is_err());
        assert!(path(&["a", "."]).is_err());
    }

    #[test]
    fn test_name_parent() {
        assert_eq!(name("a/b/c.txt"), "c.txt");
        assert_eq!(name("a"), "a");
        assert_eq!(name(""), "");
        assert_eq!(parent("a/b/c").as_deref(), Some("a/b"));
        assert_eq!(parent("a").as_deref(), Some(""));
        assert_eq!(parent(""), None);
    }

    #[test]
    fn test_extension_and_sidecar() {
        assert_eq!(extension("a/b.sld"), Some("sld"));
        assert_eq!(extension("a.d/b"), None);
        assert_eq!(sidecar("styles/point.sld", "xml"), "styles/point.xml");
        assert_eq!(sidecar("styles/point", ".xml"), "styles/point.xml");
        assert_eq!(sidecar("dir.v1/file", "xml"), "dir.v1/file.xml");
        assert_eq!(sidecar("a/archive.tar.gz", "md5"), "a/archive.tar.md5");
    }

    #[test]
    fn test_file_conversion() {
        let base = Path::new("/data/store");
        let file = to_file(base, "a/b/c.txt");
        assert_eq!(file, PathBuf::from("/data/store/a/b/c.txt"));
        assert_eq!(convert(base, &file).as_deref(), Some("a/b/c.txt"));
        assert_eq!(convert(base, base).as_deref(), Some(""));
        assert_eq!(convert(base, Path::new("/other/x")), None);
    }

    #[test]
    fn test_resource_path() {
        let p = ResourcePath::parse("a/b/c", Validation::Strict).unwrap();
        assert_eq!(p.name(), "c");
        assert_eq!(p.to_string(), "a/b/c");
        let parent = p.parent().unwrap();
        assert_eq!(parent.to_string(), "a/b");
        assert!(p.starts_with(&parent));
        assert!(!parent.starts_with(&p));
        assert!(ResourcePath::root().parent().is_none());

        let ancestors: Vec<String> = p.ancestors().map(|a| a.to_string()).collect();
        assert_eq!(ancestors, vec!["a/b", "a", ""]);

        let child = parent.child("x/y", Validation::Strict).unwrap();
        assert_eq!(child.to_string(), "a/b/x/y");
    }
}
