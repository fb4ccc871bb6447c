//! Namespaces: named, independently loadable units of guest code.
//!
//! A [`NamespaceReference`] is only a name. Turning it into module bytes is the job of a
//! [`NamespaceSource`]:
//! - [`MemorySource`] keeps bytes registered up front (the libretro core registers the ROM
//!   under the configured namespace).
//! - [`DirectorySource`] maps the name onto a path under a root directory, the way a
//!   classpath would: `pps-physics.core` becomes `pps_physics/core.wasm` (or `.wat`).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Invalid namespace or symbol names.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamespaceError {
    #[error("namespace name is empty")]
    Empty,

    #[error("namespace '{namespace}' has an invalid segment '{segment}'")]
    InvalidSegment { namespace: String, segment: String },

    #[error("entry symbol name is empty")]
    EmptySymbol,
}

/// Immutable symbolic name of a namespace, e.g. `pps-physics.core`.
///
/// Segments are separated by `.`, contain only ASCII alphanumerics, `-` and `_`, and do
/// not start with a digit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceReference(String);

impl NamespaceReference {
    pub fn new(name: impl Into<String>) -> Result<Self, NamespaceError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NamespaceError::Empty);
        }

        for segment in name.split('.') {
            if !is_valid_segment(segment) {
                return Err(NamespaceError::InvalidSegment {
                    namespace: name.clone(),
                    segment: segment.to_string(),
                });
            }
        }

        Ok(Self(name))
    }

    /// Skip validation for names checked by tests (the built-in defaults).
    pub(crate) fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Relative module path without extension: `-` becomes `_`, `.` becomes `/`.
    pub fn module_path(&self) -> PathBuf {
        self.0
            .split('.')
            .map(|segment| segment.replace('-', "_"))
            .collect()
    }
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        None => false,
        Some(first) if first.is_ascii_digit() => false,
        Some(first) => core::iter::once(first)
            .chain(chars)
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
    }
}

impl fmt::Display for NamespaceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NamespaceReference {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for NamespaceReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Failure to locate a namespace's module bytes.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no module found (searched: {})", .searched.join(", "))]
    NotFound { searched: Vec<String> },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the runtime finds module bytes for a namespace.
pub trait NamespaceSource {
    fn fetch(&self, namespace: &NamespaceReference) -> Result<Vec<u8>, SourceError>;
}

impl<S: NamespaceSource + ?Sized> NamespaceSource for Box<S> {
    fn fetch(&self, namespace: &NamespaceReference) -> Result<Vec<u8>, SourceError> {
        (**self).fetch(namespace)
    }
}

/// Module bytes registered in memory.
#[derive(Default, Clone)]
pub struct MemorySource {
    modules: HashMap<NamespaceReference, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the bytes for a namespace.
    pub fn insert(&mut self, namespace: NamespaceReference, bytes: impl Into<Vec<u8>>) {
        self.modules.insert(namespace, bytes.into());
    }

    pub fn with(mut self, namespace: NamespaceReference, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(namespace, bytes);
        self
    }
}

impl NamespaceSource for MemorySource {
    fn fetch(&self, namespace: &NamespaceReference) -> Result<Vec<u8>, SourceError> {
        self.modules
            .get(namespace)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                searched: vec![format!("memory:{namespace}")],
            })
    }
}

/// Module files under a root directory.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Extensions tried in order.
    pub const EXTENSIONS: [&'static str; 2] = ["wasm", "wat"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate file paths for a namespace, in lookup order.
    pub fn candidates(&self, namespace: &NamespaceReference) -> Vec<PathBuf> {
        let base = self.root.join(namespace.module_path());
        Self::EXTENSIONS
            .iter()
            .map(|ext| base.with_extension(ext))
            .collect()
    }
}

impl NamespaceSource for DirectorySource {
    fn fetch(&self, namespace: &NamespaceReference) -> Result<Vec<u8>, SourceError> {
        let candidates = self.candidates(namespace);
        for path in &candidates {
            match std::fs::read(path) {
                Ok(bytes) => {
                    tracing::debug!(%namespace, path = %path.display(), "namespace module found");
                    return Ok(bytes);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(SourceError::Io {
                        path: path.clone(),
                        source,
                    });
                }
            }
        }

        Err(SourceError::NotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        })
    }
}
