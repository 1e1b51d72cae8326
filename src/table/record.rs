//! Immutable per-row case data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// One case: a row of the batch table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    /// Zero-based row position; defines navigation order.
    pub index: usize,
    /// Case folder, absolute or relative to the table's directory.
    pub path: String,
    /// Patient or ID label, if the table has one.
    pub label: Option<String>,
    /// Explicit file names overriding the folder-scan defaults.
    pub overrides: FileOverrides,
}

/// Per-row file name overrides. Blank cells are not recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FileOverrides {
    pub image: Option<String>,
    pub mask: Option<String>,
    /// Additional images, keyed by column name.
    pub extra_images: BTreeMap<String, String>,
    /// Additional masks, keyed by column name.
    pub extra_masks: BTreeMap<String, String>,
}

impl CaseRecord {
    /// One-based case number, as shown to the annotator.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// The label, or `#<number>` when the table has none.
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("#{}", self.number()),
        }
    }

    /// The case folder, with relative paths joined onto `base_dir`.
    pub fn root(&self, base_dir: Option<&Path>) -> PathBuf {
        let path = Path::new(&self.path);
        match base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> CaseRecord {
        CaseRecord {
            index: 1,
            path: path.to_string(),
            label: Some("Bob".to_string()),
            overrides: FileOverrides::default(),
        }
    }

    #[test]
    fn test_relative_root_joins_base_dir() {
        let rec = record("P002");
        assert_eq!(
            rec.root(Some(Path::new("/batches"))),
            PathBuf::from("/batches/P002")
        );
        assert_eq!(rec.root(None), PathBuf::from("P002"));
    }

    #[test]
    fn test_absolute_root_ignores_base_dir() {
        let rec = record("/data/P002");
        assert_eq!(
            rec.root(Some(Path::new("/batches"))),
            PathBuf::from("/data/P002")
        );
    }

    #[test]
    fn test_number_and_label() {
        let rec = record("P002");
        assert_eq!(rec.number(), 2);
        assert_eq!(rec.display_label(), "Bob");
    }
}
