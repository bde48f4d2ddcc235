//! Document and collection paths, and the segment codec.
//!
//! A document path alternates collection ids and document ids
//! (`users/alice/orders/o1`), so it always has an even number of segments.
//! A collection path has an odd number. Raw strings that may contain `/`
//! are embedded as a single segment with [`escape`] and recovered with
//! [`unescape`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Path separator reserved by the store.
pub const SEPARATOR: char = '/';

/// Placeholder written in place of [`SEPARATOR`] by [`escape`].
pub const PLACEHOLDER: char = '|';

/// Escape lead character.
pub const ESCAPE: char = '\\';

/// Encode `raw` so it can be used as one path segment.
///
/// `\` is doubled, `|` becomes `\|`, and `/` becomes `|`.
///
/// ```
/// use fsdb_types::path::{escape, unescape};
///
/// assert_eq!(escape("a/b"), "a|b");
/// assert_eq!(unescape(&escape("x/|\\y")), "x/|\\y");
/// ```
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            PLACEHOLDER => {
                out.push(ESCAPE);
                out.push(PLACEHOLDER);
            }
            SEPARATOR => out.push(PLACEHOLDER),
            c => out.push(c),
        }
    }
    out
}

/// Decode a segment produced by [`escape`].
///
/// An escaped character other than `\` or `|` is kept together with its
/// lead `\`, and a dangling trailing `\` is kept as is.
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            match c {
                ESCAPE | PLACEHOLDER => out.push(c),
                c => {
                    out.push(ESCAPE);
                    out.push(c);
                }
            }
            escaped = false;
            continue;
        }

        match c {
            ESCAPE => escaped = true,
            PLACEHOLDER => out.push(SEPARATOR),
            c => out.push(c),
        }
    }

    if escaped {
        out.push(ESCAPE);
    }
    out
}

fn split_segments(path: &str) -> Result<Vec<&str>, TypeError> {
    let invalid = |reason: &str| TypeError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("path must not be empty"));
    }
    if path.starts_with(SEPARATOR) || path.ends_with(SEPARATOR) {
        return Err(invalid("path must not start or end with '/'"));
    }

    let segments: Vec<&str> = path.split(SEPARATOR).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid("path segments must not be empty"));
    }
    Ok(segments)
}

/// Path of a single document.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    /// Parse and validate a document path.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        let count = split_segments(&path)?.len();
        if count % 2 != 0 {
            return Err(TypeError::InvalidPath {
                path,
                reason: format!("document path needs an even number of segments, got {count}"),
            });
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Last segment: the document id.
    pub fn id(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// The collection that contains this document.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rfind(SEPARATOR) {
            Some(idx) => CollectionPath(self.0[..idx].to_string()),
            None => CollectionPath(String::new()),
        }
    }

    /// Id of the containing collection (the collection-group key).
    pub fn collection_id(&self) -> &str {
        let mut it = self.0.rsplit(SEPARATOR);
        it.next();
        it.next().unwrap_or_default()
    }

    /// A sub-collection of this document.
    pub fn collection(&self, id: &str) -> Result<CollectionPath, TypeError> {
        CollectionPath::new(format!("{}{SEPARATOR}{id}", self.0))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocPath({})", self.0)
    }
}

impl FromStr for DocPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for DocPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for DocPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DocPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Path of a collection.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parse and validate a collection path.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        let count = split_segments(&path)?.len();
        if count % 2 != 1 {
            return Err(TypeError::InvalidPath {
                path,
                reason: format!("collection path needs an odd number of segments, got {count}"),
            });
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment: the collection id.
    pub fn id(&self) -> &str {
        self.0.rsplit(SEPARATOR).next().unwrap_or(&self.0)
    }

    /// The owning document, or `None` for a root collection.
    pub fn parent(&self) -> Option<DocPath> {
        self.0
            .rfind(SEPARATOR)
            .map(|idx| DocPath(self.0[..idx].to_string()))
    }

    /// A document inside this collection.
    pub fn doc(&self, id: &str) -> Result<DocPath, TypeError> {
        DocPath::new(format!("{}{SEPARATOR}{id}", self.0))
    }

    /// Returns `true` if `doc` is a direct child of this collection.
    pub fn contains(&self, doc: &DocPath) -> bool {
        doc.parent().0 == self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionPath({})", self.0)
    }
}

impl FromStr for CollectionPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for CollectionPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CollectionPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
