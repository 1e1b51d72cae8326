//! Settings files.
//!
//! Everything the CLI accepts as flags can also live in a YAML file passed
//! with `--settings`. Flags given on the command line win over the file,
//! which wins over built-in defaults.
//!
//! ```yaml
//! start: 1
//! columns:
//!   path: folder
//!   mask: prior_mask
//!   extra_masks: [liver]
//! naming:
//!   mask_tag: tumor
//!   extension: .nii.gz
//! reader:
//!   reader_initials: JD
//!   save_new_masks: true
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::controller::BatchSettings;
use crate::error::CaseIterError;
use crate::naming::NamingPolicy;
use crate::reader::ReaderContext;
use crate::table::ColumnMapping;

/// Contents of a settings file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// One-based case to start at.
    pub start: Option<usize>,
    pub columns: ColumnMapping,
    pub naming: NamingPolicy,
    pub reader: ReaderContext,
}

impl Settings {
    /// Reads settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self, CaseIterError> {
        let file = File::open(path).map_err(CaseIterError::Io)?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|source| {
            CaseIterError::SettingsParse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Reads settings from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CaseIterError> {
        serde_yaml::from_str(yaml).map_err(|source| CaseIterError::SettingsParse {
            path: Path::new("<string>").to_path_buf(),
            source,
        })
    }

    /// The controller part of the settings.
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            columns: self.columns.clone(),
            naming: self.naming.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = Settings::from_yaml_str("{}").expect("parse failed");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.columns.path, "path");
        assert_eq!(settings.naming.mask_tag, "mask");
    }

    #[test]
    fn test_full_file() {
        let yaml = "start: 3\n\
                    columns:\n  path: folder\n  extra_masks: [liver, spleen]\n\
                    naming:\n  mask_tag: tumor\n\
                    reader:\n  reader_initials: jd\n  save_new_masks: true\n";
        let settings = Settings::from_yaml_str(yaml).expect("parse failed");
        assert_eq!(settings.start, Some(3));
        assert_eq!(settings.columns.path, "folder");
        assert_eq!(settings.columns.extra_masks, vec!["liver", "spleen"]);
        assert_eq!(settings.naming.mask_tag, "tumor");
        assert_eq!(settings.naming.extension, ".nii.gz");
        assert!(settings.reader.save_new_masks);

        let batch = settings.batch_settings();
        assert_eq!(batch.columns.path, "folder");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Settings::from_yaml_str("colums:\n  path: x\n").unwrap_err();
        assert!(matches!(err, CaseIterError::SettingsParse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("settings.yaml");
        std::fs::write(&path, "reader:\n  go_to_editor: true\n").unwrap();
        let settings = Settings::load(&path).expect("load failed");
        assert!(settings.reader.go_to_editor);
    }
}
