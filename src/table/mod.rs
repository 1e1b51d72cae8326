//! Batch table loading and column resolution.
//!
//! A batch table is delimited text with a header row and one row per case.
//! The table itself is kept as plain text cells; which column plays which
//! role is decided once, when a [`ColumnMapping`] is resolved against it,
//! producing the immutable [`CaseRecord`]s the controller navigates.
//!
//! # Columns
//!
//! - `path` (required): the case folder, absolute or relative to the table file
//! - `patient` / `ID` (optional): display label, detected automatically
//! - image / mask override columns: explicit file names inside the case folder
//! - additional image / mask columns: extra volumes loaded with the case

mod record;

pub use record::{CaseRecord, FileOverrides};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CaseIterError;

/// Column names checked, in order, for a case label when none is configured.
pub const LABEL_FALLBACK_COLUMNS: &[&str] = &["patient", "ID"];

/// Which table columns carry which case data.
///
/// `path` is always required. Every other column that is configured is
/// required as well: naming a column that the table does not have is an
/// input error rather than a silent fallback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    pub path: String,
    pub label: Option<String>,
    pub image: Option<String>,
    pub mask: Option<String>,
    pub extra_images: Vec<String>,
    pub extra_masks: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            path: "path".to_string(),
            label: None,
            image: None,
            mask: None,
            extra_images: Vec::new(),
            extra_masks: Vec::new(),
        }
    }
}

/// Column indices after resolving a mapping against a header row.
#[derive(Debug)]
struct ResolvedColumns {
    path: usize,
    label: Option<usize>,
    image: Option<usize>,
    mask: Option<usize>,
    extra_images: Vec<(String, usize)>,
    extra_masks: Vec<(String, usize)>,
}

/// A loaded batch table: header row plus raw cells.
#[derive(Clone, Debug)]
pub struct BatchTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    base_dir: Option<PathBuf>,
}

impl BatchTable {
    /// Reads a batch table from a CSV file.
    ///
    /// Relative case paths in the table resolve against the file's directory.
    pub fn read(path: &Path) -> Result<Self, CaseIterError> {
        let file = File::open(path).map_err(CaseIterError::Io)?;
        let mut table = Self::from_reader(BufReader::new(file), path)?;
        table.base_dir = Some(
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        );
        Ok(table)
    }

    /// Reads a batch table from a CSV string.
    ///
    /// Relative case paths resolve against the working directory.
    pub fn from_csv_str(csv_str: &str) -> Result<Self, CaseIterError> {
        Self::from_reader(csv_str.as_bytes(), Path::new("<string>"))
    }

    /// Sets the directory relative case paths resolve against.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    fn from_reader<R: Read>(reader: R, path: &Path) -> Result<Self, CaseIterError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let parse_err = |source| CaseIterError::CsvParse {
            path: path.to_path_buf(),
            source,
        };

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(parse_err)?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for result in csv_reader.records() {
            let record = result.map_err(parse_err)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            headers,
            rows,
            base_dir: None,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of case rows (the header is not counted).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Directory that relative case paths resolve against, if known.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Resolves `mapping` against this table and builds one record per row.
    ///
    /// # Errors
    /// Returns [`CaseIterError::InvalidInput`] if the table has no rows, a
    /// configured column is missing, or a row has no case path.
    pub fn resolve(&self, mapping: &ColumnMapping) -> Result<Vec<CaseRecord>, CaseIterError> {
        if self.rows.is_empty() {
            return Err(CaseIterError::invalid_input("batch table has no cases"));
        }

        let columns = self.resolve_columns(mapping)?;

        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| build_record(index, row, &columns, &mapping.path))
            .collect()
    }

    fn resolve_columns(&self, mapping: &ColumnMapping) -> Result<ResolvedColumns, CaseIterError> {
        let label = match &mapping.label {
            Some(name) => Some(self.required_column(name, "label")?),
            None => LABEL_FALLBACK_COLUMNS
                .iter()
                .find_map(|name| self.column_index(name)),
        };

        let optional = |name: &Option<String>, what: &str| -> Result<Option<usize>, CaseIterError> {
            name.as_deref()
                .map(|n| self.required_column(n, what))
                .transpose()
        };

        let extras = |names: &[String], what: &str| -> Result<Vec<(String, usize)>, CaseIterError> {
            names
                .iter()
                .map(|n| self.required_column(n, what).map(|idx| (n.clone(), idx)))
                .collect()
        };

        Ok(ResolvedColumns {
            path: self.required_column(&mapping.path, "path")?,
            label,
            image: optional(&mapping.image, "image")?,
            mask: optional(&mapping.mask, "mask")?,
            extra_images: extras(&mapping.extra_images, "additional image")?,
            extra_masks: extras(&mapping.extra_masks, "additional mask")?,
        })
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn required_column(&self, name: &str, what: &str) -> Result<usize, CaseIterError> {
        self.column_index(name).ok_or_else(|| {
            CaseIterError::invalid_input(format!(
                "{} column '{}' not found (available columns: {})",
                what,
                name,
                self.headers.join(", ")
            ))
        })
    }
}

fn build_record(
    index: usize,
    row: &[String],
    columns: &ResolvedColumns,
    path_column: &str,
) -> Result<CaseRecord, CaseIterError> {
    let cell = |col: usize| -> Option<String> {
        row.get(col)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let path = cell(columns.path).ok_or_else(|| {
        CaseIterError::invalid_input(format!(
            "row {} has no value in path column '{}'",
            index + 1,
            path_column
        ))
    })?;

    let collect_extras = |extras: &[(String, usize)]| -> BTreeMap<String, String> {
        extras
            .iter()
            .filter_map(|(name, col)| cell(*col).map(|v| (name.clone(), v)))
            .collect()
    };

    Ok(CaseRecord {
        index,
        path,
        label: columns.label.and_then(cell),
        overrides: FileOverrides {
            image: columns.image.and_then(cell),
            mask: columns.mask.and_then(cell),
            extra_images: collect_extras(&columns.extra_images),
            extra_masks: collect_extras(&columns.extra_masks),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> &'static str {
        "path,patient,image,mask\n\
         P001,Alice,ct.nii.gz,\n\
         P002,Bob,,seg.nii.gz\n\
         /abs/P003,,,\n"
    }

    #[test]
    fn test_resolve_default_mapping() {
        let table = BatchTable::from_csv_str(sample_table()).expect("parse failed");
        assert_eq!(table.len(), 3);

        let cases = table.resolve(&ColumnMapping::default()).expect("resolve failed");
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].path, "P001");
        assert_eq!(cases[0].label.as_deref(), Some("Alice"));
        assert_eq!(cases[2].label, None);
        assert_eq!(cases[2].display_label(), "#3");

        // Override columns are only used when configured
        assert_eq!(cases[0].overrides.image, None);
    }

    #[test]
    fn test_resolve_with_overrides() {
        let table = BatchTable::from_csv_str(sample_table()).expect("parse failed");
        let mapping = ColumnMapping {
            image: Some("image".to_string()),
            mask: Some("mask".to_string()),
            ..Default::default()
        };
        let cases = table.resolve(&mapping).expect("resolve failed");

        assert_eq!(cases[0].overrides.image.as_deref(), Some("ct.nii.gz"));
        assert_eq!(cases[0].overrides.mask, None); // blank cell
        assert_eq!(cases[1].overrides.image, None);
        assert_eq!(cases[1].overrides.mask.as_deref(), Some("seg.nii.gz"));
    }

    #[test]
    fn test_label_falls_back_to_id_column() {
        let table = BatchTable::from_csv_str("ID,path\nX-1,a\n").expect("parse failed");
        let cases = table.resolve(&ColumnMapping::default()).expect("resolve failed");
        assert_eq!(cases[0].label.as_deref(), Some("X-1"));
    }

    #[test]
    fn test_missing_path_column_is_invalid_input() {
        let table = BatchTable::from_csv_str("folder,patient\na,b\n").expect("parse failed");
        let err = table.resolve(&ColumnMapping::default()).unwrap_err();
        match err {
            CaseIterError::InvalidInput { message } => {
                assert!(message.contains("'path'"));
                assert!(message.contains("folder, patient"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_configured_column_missing_is_invalid_input() {
        let table = BatchTable::from_csv_str("path\na\n").expect("parse failed");
        let mapping = ColumnMapping {
            extra_masks: vec!["liver".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            table.resolve(&mapping),
            Err(CaseIterError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_empty_table_is_invalid_input() {
        let table = BatchTable::from_csv_str("path,patient\n").expect("parse failed");
        assert!(table.is_empty());
        assert!(matches!(
            table.resolve(&ColumnMapping::default()),
            Err(CaseIterError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_blank_path_cell_is_invalid_input() {
        let table = BatchTable::from_csv_str("path,patient\na,x\n ,y\n").expect("parse failed");
        let err = table.resolve(&ColumnMapping::default()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_extra_columns_skip_blank_cells() {
        let table = BatchTable::from_csv_str("path,adc,liver\na,adc.nii,\nb,,l.nii\n")
            .expect("parse failed");
        let mapping = ColumnMapping {
            extra_images: vec!["adc".to_string()],
            extra_masks: vec!["liver".to_string()],
            ..Default::default()
        };
        let cases = table.resolve(&mapping).expect("resolve failed");
        assert_eq!(cases[0].overrides.extra_images.get("adc").map(String::as_str), Some("adc.nii"));
        assert!(cases[0].overrides.extra_masks.is_empty());
        assert!(cases[1].overrides.extra_images.is_empty());
        assert_eq!(cases[1].overrides.extra_masks.get("liver").map(String::as_str), Some("l.nii"));
    }

    #[test]
    fn test_ragged_rows_are_parse_errors() {
        let result = BatchTable::from_csv_str("path,patient\na,b,c\n");
        assert!(matches!(result, Err(CaseIterError::CsvParse { .. })));
    }
}
