//! The index definition file: a set of composite indexes and field overrides.
//!
//! The JSON layout matches `firestore.indexes.json`, so files written here
//! can be deployed with the standard tooling and vice versa.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IndexError, IndexResult};
use crate::index::{FieldOverride, Index};

/// Every index definition of one database.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSet {
    #[serde(default)]
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub field_overrides: Vec<FieldOverride>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, index: Index) {
        self.indexes.push(index);
    }

    /// Remove every index structurally equal to one of `targets`.
    /// Returns how many were removed.
    pub fn remove(&mut self, targets: &[Index]) -> usize {
        let before = self.indexes.len();
        self.indexes.retain(|idx| !targets.contains(idx));
        before - self.indexes.len()
    }

    pub fn add_field_override(&mut self, field_override: FieldOverride) {
        self.field_overrides.push(field_override);
    }

    pub fn contains(&self, index: &Index) -> bool {
        self.indexes.contains(index)
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty() && self.field_overrides.is_empty()
    }

    /// Check every definition; the error lists all problems found.
    pub fn validate(&self) -> IndexResult<()> {
        let problems: Vec<String> = self
            .indexes
            .iter()
            .flat_map(Index::problems)
            .chain(self.field_overrides.iter().flat_map(FieldOverride::problems))
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(IndexError::Invalid(problems.join("; ")))
        }
    }

    /// Write as JSON with two-space indentation and a trailing newline.
    pub fn write_json<W: Write>(&self, mut writer: W) -> IndexResult<()> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn read_json<R: Read>(reader: R) -> IndexResult<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn read_file(path: impl AsRef<Path>) -> IndexResult<Self> {
        let path = path.as_ref();
        let set = Self::read_json(BufReader::new(File::open(path)?))?;
        debug!(
            path = %path.display(),
            indexes = set.indexes.len(),
            overrides = set.field_overrides.len(),
            "index file read"
        );
        Ok(set)
    }

    /// Write to `path`, replacing it atomically.
    pub fn write_file(&self, path: impl AsRef<Path>) -> IndexResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            self.write_json(&mut writer)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;
        debug!(path = %path.display(), indexes = self.indexes.len(), "index file written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{IndexField, QueryScope};

    fn orders_index() -> Index {
        Index::new("orders").asc("status").desc("createdAt")
    }

    #[test]
    fn json_layout_matches_index_files() {
        let mut set = IndexSet::new();
        set.add(orders_index());

        let mut out = Vec::new();
        set.write_json(&mut out).unwrap();
        let expected = r#"{
  "indexes": [
    {
      "collectionGroup": "orders",
      "queryScope": "COLLECTION",
      "fields": [
        {
          "fieldPath": "status",
          "order": "ASCENDING"
        },
        {
          "fieldPath": "createdAt",
          "order": "DESCENDING"
        }
      ]
    }
  ],
  "fieldOverrides": []
}
"#;
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firestore.indexes.json");

        let mut set = IndexSet::new();
        set.add(orders_index());
        set.add(
            Index::new("posts")
                .scope(QueryScope::CollectionGroup)
                .array_contains("tags")
                .desc("score"),
        );
        set.add_field_override(
            FieldOverride::new("posts", "body")
                .with_index(IndexField::asc("body"))
                .with_index(IndexField::array_contains("body")),
        );
        set.write_file(&path).unwrap();

        let read = IndexSet::read_file(&path).unwrap();
        assert_eq!(read, set);
        assert!(read.validate().is_ok());

        // Overwriting replaces the previous content.
        IndexSet::new().write_file(&path).unwrap();
        assert!(IndexSet::read_file(&path).unwrap().is_empty());
    }

    #[test]
    fn partial_documents_use_defaults() {
        let set = IndexSet::read_json(
            r#"{"indexes": [{"collectionGroup": "orders",
                "fields": [{"fieldPath": "a", "order": "ASCENDING"},
                           {"fieldPath": "b", "arrayConfig": "CONTAINS"}]}]}"#
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(set.indexes[0].query_scope, QueryScope::Collection);
        assert_eq!(set.indexes[0], Index::new("orders").asc("a").array_contains("b"));
        assert!(set.field_overrides.is_empty());
    }

    #[test]
    fn remove_by_structural_equality() {
        let mut set = IndexSet::new();
        set.add(orders_index());
        set.add(orders_index().scope(QueryScope::CollectionGroup));
        set.add(Index::new("orders").asc("status").asc("createdAt"));

        assert_eq!(set.remove(&[orders_index()]), 1);
        assert_eq!(set.indexes.len(), 2);
        assert!(!set.contains(&orders_index()));
        assert_eq!(set.remove(&[orders_index()]), 0);
    }

    #[test]
    fn validate_collects_every_problem() {
        let mut set = IndexSet::new();
        set.add(Index::new("orders").asc("status"));
        set.add(Index::new("").asc("a").desc("b"));
        let err = set.validate().unwrap_err();
        match err {
            IndexError::Invalid(msg) => {
                assert!(msg.contains("at least 2"));
                assert!(msg.contains("empty collection group"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let err = IndexSet::read_json(
            r#"{"indexes": [{"collectionGroup": "o", "queryScope": "DATABASE", "fields": []}]}"#
                .as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, IndexError::Json(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = IndexSet::read_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }
}
