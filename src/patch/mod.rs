//! Patch vocabulary and key-based paths.
//!
//! A [`Patch`] describes one change to the document tree. Paths address
//! nodes by their stable `_key` rather than by position so that a patch
//! stays meaningful after concurrent insertions and removals.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::fmt;

pub mod apply;
pub mod dmp;

pub use apply::{apply_patch, apply_patches, apply_to_block};

/// One segment of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Addresses an array member by its `_key`.
    Key {
        #[serde(rename = "_key")]
        key: String,
    },
    /// Addresses an array member by position. Only used for members that
    /// have no usable key.
    Index(usize),
    /// Addresses an object field.
    Field(String),
}

impl PathSegment {
    pub fn key(key: impl Into<String>) -> Self {
        PathSegment::Key { key: key.into() }
    }

    pub fn field(name: impl Into<String>) -> Self {
        PathSegment::Field(name.into())
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key { key } => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key { key } => write!(f, "[_key==\"{key}\"]"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
            PathSegment::Field(name) => write!(f, ".{name}"),
        }
    }
}

/// A key-based address into the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathSegment>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn block(key: &str) -> Self {
        Self(vec![PathSegment::key(key)])
    }

    pub fn block_at(index: usize) -> Self {
        Self(vec![PathSegment::Index(index)])
    }

    /// `[{_key: block}, "children", {_key: child}]`
    pub fn child(block: &str, child: &str) -> Self {
        Self::block(block).join_field("children").join_key(child)
    }

    pub fn join_key(mut self, key: &str) -> Self {
        self.0.push(PathSegment::key(key));
        self
    }

    pub fn join_index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    pub fn join_field(mut self, name: &str) -> Self {
        self.0.push(PathSegment::field(name));
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&PathSegment> {
        self.0.first()
    }

    /// The path without its first segment.
    pub fn tail(&self) -> Path {
        Path(self.0.iter().skip(1).cloned().collect())
    }

    pub fn block_key(&self) -> Option<&str> {
        self.0.first().and_then(PathSegment::as_key)
    }

    /// The child key of a `[block, "children", child, ...]` path.
    pub fn child_key(&self) -> Option<&str> {
        match self.0.get(1) {
            Some(PathSegment::Field(field)) if field == "children" => {
                self.0.get(2).and_then(PathSegment::as_key)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for segment in &self.0 {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Before,
    After,
}

/// Where a patch came from. Remote patches are never echoed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Patch {
    Set {
        path: Path,
        value: Json,
    },
    Unset {
        path: Path,
    },
    Insert {
        path: Path,
        position: InsertPosition,
        items: Vec<Json>,
    },
    /// A diff-match-patch patch text applied to the string at `path`.
    DiffMatchPatch {
        path: Path,
        value: String,
    },
}

impl Patch {
    pub fn set(path: Path, value: Json) -> Self {
        Patch::Set { path, value }
    }

    pub fn unset(path: Path) -> Self {
        Patch::Unset { path }
    }

    pub fn insert(path: Path, position: InsertPosition, items: Vec<Json>) -> Self {
        Patch::Insert {
            path,
            position,
            items,
        }
    }

    /// Builds a text patch turning `old` into `new`.
    pub fn diff_match_patch(path: Path, old: &str, new: &str) -> Self {
        Patch::DiffMatchPatch {
            path,
            value: dmp::make_patch(old, new),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Patch::Set { path, .. }
            | Patch::Unset { path }
            | Patch::Insert { path, .. }
            | Patch::DiffMatchPatch { path, .. } => path,
        }
    }

    /// The same patch with its path rewritten.
    pub fn with_path(&self, path: Path) -> Self {
        let mut patch = self.clone();
        match &mut patch {
            Patch::Set { path: p, .. }
            | Patch::Unset { path: p }
            | Patch::Insert { path: p, .. }
            | Patch::DiffMatchPatch { path: p, .. } => *p = path,
        }
        patch
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("path not found: {0}")]
    PathNotFound(Path),
    #[error("expected an array at {0}")]
    NotAnArray(Path),
    #[error("expected an object at {0}")]
    NotAnObject(Path),
    #[error("expected a string at {0}")]
    NotAString(Path),
    #[error("insert must target an array member, got {0}")]
    InvalidInsertTarget(Path),
    #[error("malformed diff-match-patch text: {0}")]
    MalformedDiff(String),
    #[error("diff-match-patch context not found in target text")]
    DiffMismatch,
    #[error("patch would produce an invalid document: {0}")]
    InvalidDocument(String),
}
