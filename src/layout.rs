//! Case folder layout: which file plays which role.
//!
//! Planning a case resolves every role to a concrete path without loading
//! anything. Explicit per-row overrides win over folder-scan defaults:
//!
//! - image: the override, else the first volume file in the case folder (in
//!   file name order) that is neither a mask written under the naming
//!   convention nor one of the reader's own outputs
//! - mask: the override, else the reader's own output name, so a reader
//!   revisiting a case picks up where they left off
//! - additional images: only when the row names one
//! - additional masks: the override, else the reader's output name. Masks
//!   the reader created in an earlier visit (`<base>_<name>_<READER>`) are
//!   planned as additional masks too
//!
//! Only the image is required. Mask paths that do not exist are fine; the
//! controller seeds an empty placeholder for them.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::CaseIterError;
use crate::naming::{is_volume_file, FileRole, NamingPolicy};
use crate::table::{CaseRecord, ColumnMapping};

/// A file a case expects to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedFile {
    pub role: FileRole,
    pub path: PathBuf,
}

/// The resolved file set of one case.
#[derive(Clone, Debug)]
pub struct CasePlan {
    pub root: PathBuf,
    pub files: Vec<PlannedFile>,
}

impl CasePlan {
    pub fn path_of(&self, role: &FileRole) -> Option<&Path> {
        self.files
            .iter()
            .find(|f| &f.role == role)
            .map(|f| f.path.as_path())
    }
}

/// Resolves the files for `record`.
///
/// # Errors
/// Returns [`CaseIterError::MissingData`] if the case folder does not exist
/// or no image can be resolved.
pub fn plan_case(
    record: &CaseRecord,
    base_dir: Option<&Path>,
    columns: &ColumnMapping,
    policy: &NamingPolicy,
    reader_initials: &str,
) -> Result<CasePlan, CaseIterError> {
    let root = record.root(base_dir);
    let missing = |message: String| CaseIterError::MissingData {
        case: record.display_label(),
        message,
    };

    if !root.is_dir() {
        return Err(missing(format!(
            "case folder {} does not exist",
            root.display()
        )));
    }

    let volumes = list_volumes(&root);

    let image = match record.overrides.image.as_deref() {
        Some(name) => {
            let path = root.join(name);
            if !path.is_file() {
                return Err(missing(format!(
                    "image file {} does not exist",
                    path.display()
                )));
            }
            path
        }
        None => scan_for_image(&volumes, |name| {
            policy.is_mask_file(name, &columns.extra_masks)
                || policy
                    .reader_output_segment(record, reader_initials, name)
                    .is_some()
        })
        .ok_or_else(|| missing(format!("no image volume found in {}", root.display())))?,
    };

    let mut files = vec![PlannedFile {
        role: FileRole::Image,
        path: image,
    }];

    let mask_path = |role: &FileRole, explicit: Option<&String>| match explicit {
        Some(name) => root.join(name),
        None => root.join(policy.resolve(record, reader_initials, role)),
    };

    files.push(PlannedFile {
        role: FileRole::Mask,
        path: mask_path(&FileRole::Mask, record.overrides.mask.as_ref()),
    });

    for column in &columns.extra_images {
        match record.overrides.extra_images.get(column) {
            Some(name) => files.push(PlannedFile {
                role: FileRole::ExtraImage(column.clone()),
                path: root.join(name),
            }),
            None => debug!(case = record.number(), column = %column, "no additional image for case"),
        }
    }

    for column in &columns.extra_masks {
        let role = FileRole::ExtraMask(column.clone());
        let path = mask_path(&role, record.overrides.extra_masks.get(column));
        files.push(PlannedFile { role, path });
    }

    let tag = policy.mask_tag.trim().to_ascii_lowercase();
    for path in &volumes {
        let Some(segment) = file_name(path)
            .and_then(|name| policy.reader_output_segment(record, reader_initials, name))
        else {
            continue;
        };
        let lower = segment.to_ascii_lowercase();
        let known = lower == tag
            || files.iter().any(|f| {
                &f.path == path
                    || matches!(&f.role, FileRole::ExtraMask(c) if c.trim().to_ascii_lowercase() == lower)
            });
        if known {
            continue;
        }
        debug!(case = record.number(), mask = %segment, "found earlier reader mask");
        files.push(PlannedFile {
            role: FileRole::ExtraMask(segment),
            path: path.clone(),
        });
    }

    Ok(CasePlan { root, files })
}

/// Volume files directly inside `root`, in file name order.
fn list_volumes(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_volume_file(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Finds the default image volume: the first one `is_mask` rejects.
fn scan_for_image(volumes: &[PathBuf], is_mask: impl Fn(&str) -> bool) -> Option<PathBuf> {
    volumes
        .iter()
        .find(|path| file_name(path).is_some_and(|name| !is_mask(name)))
        .cloned()
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|s| s.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::FileOverrides;
    use std::fs;

    fn record(path: &str) -> CaseRecord {
        CaseRecord {
            index: 0,
            path: path.to_string(),
            label: None,
            overrides: FileOverrides::default(),
        }
    }

    fn touch(path: &Path) {
        fs::write(path, b"volume").expect("write file");
    }

    #[test]
    fn test_scan_skips_masks_and_other_files() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let case = tmp.path().join("P001");
        fs::create_dir(&case).unwrap();
        touch(&case.join("P001_mask_AB.nii.gz"));
        touch(&case.join("notes.txt"));
        touch(&case.join("t1.nii.gz"));
        touch(&case.join("t2.nii.gz"));

        let plan = plan_case(
            &record("P001"),
            Some(tmp.path()),
            &ColumnMapping::default(),
            &NamingPolicy::default(),
            "cd",
        )
        .expect("plan failed");

        assert_eq!(plan.path_of(&FileRole::Image), Some(case.join("t1.nii.gz").as_path()));
        assert_eq!(
            plan.path_of(&FileRole::Mask),
            Some(case.join("P001_mask_CD.nii.gz").as_path())
        );
    }

    #[test]
    fn test_reader_outputs_are_never_the_image() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let case = tmp.path().join("P001");
        fs::create_dir(&case).unwrap();
        touch(&case.join("P001_liver_AB.nii.gz"));
        touch(&case.join("P001_mask_AB.nii.gz"));
        touch(&case.join("ct.nii.gz"));

        let plan = plan_case(
            &record("P001"),
            Some(tmp.path()),
            &ColumnMapping::default(),
            &NamingPolicy::default(),
            "ab",
        )
        .expect("plan failed");

        assert_eq!(plan.path_of(&FileRole::Image), Some(case.join("ct.nii.gz").as_path()));
        let roles: Vec<String> = plan.files.iter().map(|f| f.role.to_string()).collect();
        assert_eq!(roles, vec!["image", "mask", "mask:liver"]);
        assert_eq!(
            plan.path_of(&FileRole::ExtraMask("liver".to_string())),
            Some(case.join("P001_liver_AB.nii.gz").as_path())
        );
    }

    #[test]
    fn test_other_reader_outputs_stay_out_of_the_plan() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let case = tmp.path().join("P001");
        fs::create_dir(&case).unwrap();
        touch(&case.join("P001_liver_CD.nii.gz"));
        touch(&case.join("ct.nii.gz"));

        let columns = ColumnMapping {
            extra_masks: vec!["liver".to_string()],
            ..Default::default()
        };
        let plan = plan_case(&record("P001"), Some(tmp.path()), &columns, &NamingPolicy::default(), "AB")
            .expect("plan failed");

        assert_eq!(plan.path_of(&FileRole::Image), Some(case.join("ct.nii.gz").as_path()));
        assert_eq!(plan.files.len(), 3);
        assert_eq!(
            plan.path_of(&FileRole::ExtraMask("liver".to_string())),
            Some(case.join("P001_liver_AB.nii.gz").as_path())
        );
    }

    #[test]
    fn test_overrides_take_precedence() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(&tmp.path().join("a.nii.gz"));
        touch(&tmp.path().join("b.nrrd"));

        let mut rec = record(".");
        rec.overrides.image = Some("b.nrrd".to_string());
        rec.overrides.mask = Some("prior.nii.gz".to_string());

        let plan = plan_case(
            &rec,
            Some(tmp.path()),
            &ColumnMapping::default(),
            &NamingPolicy::default(),
            "AB",
        )
        .expect("plan failed");

        assert_eq!(plan.path_of(&FileRole::Image), Some(tmp.path().join("./b.nrrd").as_path()));
        assert_eq!(
            plan.path_of(&FileRole::Mask),
            Some(tmp.path().join("./prior.nii.gz").as_path())
        );
    }

    #[test]
    fn test_missing_folder_is_missing_data() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = plan_case(
            &record("nope"),
            Some(tmp.path()),
            &ColumnMapping::default(),
            &NamingPolicy::default(),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, CaseIterError::MissingData { .. }));
    }

    #[test]
    fn test_folder_without_image_is_missing_data() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(&tmp.path().join("case_mask_AB.nii.gz"));
        let err = plan_case(
            &record("."),
            Some(tmp.path()),
            &ColumnMapping::default(),
            &NamingPolicy::default(),
            "AB",
        )
        .unwrap_err();
        assert!(err.to_string().contains("no image volume"));
    }

    #[test]
    fn test_missing_image_override_is_missing_data() {
        let tmp = tempfile::tempdir().expect("tempdir");
        touch(&tmp.path().join("a.nii.gz"));
        let mut rec = record(".");
        rec.overrides.image = Some("gone.nii.gz".to_string());
        let err = plan_case(
            &rec,
            Some(tmp.path()),
            &ColumnMapping::default(),
            &NamingPolicy::default(),
            "",
        )
        .unwrap_err();
        assert!(matches!(err, CaseIterError::MissingData { .. }));
    }

    #[test]
    fn test_extra_roles() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let case = tmp.path().join("P9");
        fs::create_dir(&case).unwrap();
        touch(&case.join("ct.nii.gz"));

        let mut rec = record("P9");
        rec.overrides
            .extra_images
            .insert("adc".to_string(), "adc.nii.gz".to_string());

        let columns = ColumnMapping {
            extra_images: vec!["adc".to_string(), "dwi".to_string()],
            extra_masks: vec!["liver".to_string()],
            ..Default::default()
        };

        let plan = plan_case(&rec, Some(tmp.path()), &columns, &NamingPolicy::default(), "ab")
            .expect("plan failed");

        let roles: Vec<String> = plan.files.iter().map(|f| f.role.to_string()).collect();
        assert_eq!(roles, vec!["image", "mask", "image:adc", "mask:liver"]);
        assert_eq!(
            plan.path_of(&FileRole::ExtraMask("liver".to_string())),
            Some(case.join("P9_liver_AB.nii.gz").as_path())
        );
    }
}
