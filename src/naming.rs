//! File roles and the output naming convention.
//!
//! Every file a case works with has a [`FileRole`]. Output names are computed
//! by [`NamingPolicy::resolve`], a pure function of the case record, the
//! reader's initials and the role:
//!
//! | Role | Name |
//! |---|---|
//! | `image` | `<base><ext>` |
//! | `image:<name>` | `<base>_<name><ext>` |
//! | `mask` | `<base>_<tag>_<READER><ext>` |
//! | `mask:<name>` | `<base>_<name>_<READER><ext>` |
//!
//! `<base>` is the stem of the row's image override when one is given and the
//! case folder name otherwise. The reader suffix is omitted for blank initials.
//! Because the (normalised) initials are part of every mask name, two readers
//! never resolve to the same output, while the same reader revisiting a case
//! resolves to its own earlier output and overwrites it.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::CaseIterError;
use crate::reader::normalize_initials;
use crate::table::CaseRecord;

/// Volume file extensions recognised when scanning a case folder.
///
/// Compound extensions come first so that stripping picks the longest match.
pub const VOLUME_EXTENSIONS: &[&str] = &[".seg.nrrd", ".nii.gz", ".nii", ".nrrd", ".mha", ".mhd"];

/// The logical role of a file within a case.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileRole {
    /// The main image volume. The only required role.
    Image,
    /// The main mask (labelmap).
    Mask,
    /// An additional image volume, keyed by its table column.
    ExtraImage(String),
    /// An additional mask, keyed by its table column or annotator-chosen name.
    ExtraMask(String),
}

impl FileRole {
    pub fn is_mask(&self) -> bool {
        matches!(self, FileRole::Mask | FileRole::ExtraMask(_))
    }

    /// A case cannot be opened without its required roles.
    pub fn is_required(&self) -> bool {
        matches!(self, FileRole::Image)
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRole::Image => write!(f, "image"),
            FileRole::Mask => write!(f, "mask"),
            FileRole::ExtraImage(name) => write!(f, "image:{}", name),
            FileRole::ExtraMask(name) => write!(f, "mask:{}", name),
        }
    }
}

impl FromStr for FileRole {
    type Err = CaseIterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, name) = match s.split_once(':') {
            Some((kind, name)) => (kind, Some(name.trim())),
            None => (s, None),
        };

        match (kind.to_ascii_lowercase().as_str(), name) {
            ("image", None) => Ok(FileRole::Image),
            ("mask", None) => Ok(FileRole::Mask),
            ("image", Some(name)) if !name.is_empty() => Ok(FileRole::ExtraImage(name.to_string())),
            ("mask", Some(name)) if !name.is_empty() => Ok(FileRole::ExtraMask(name.to_string())),
            _ => Err(CaseIterError::invalid_input(format!(
                "unknown file role '{}' (expected image, mask, image:<name> or mask:<name>)",
                s
            ))),
        }
    }
}

impl Serialize for FileRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The project naming convention for case outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamingPolicy {
    /// Name segment identifying the main mask (the original project used "tumor").
    pub mask_tag: String,
    /// Extension of written masks, including the leading dot.
    pub extension: String,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            mask_tag: "mask".to_string(),
            extension: ".nii.gz".to_string(),
        }
    }
}

impl NamingPolicy {
    /// Resolves the file name for `role` in the case described by `record`.
    ///
    /// Total and deterministic: the same inputs always yield the same name.
    pub fn resolve(&self, record: &CaseRecord, reader_initials: &str, role: &FileRole) -> String {
        let base = base_name(record);
        let mut name = match role {
            FileRole::Image => base,
            FileRole::ExtraImage(column) => format!("{}_{}", base, sanitize_segment(column)),
            FileRole::Mask => format!("{}_{}", base, sanitize_segment(&self.mask_tag)),
            FileRole::ExtraMask(column) => format!("{}_{}", base, sanitize_segment(column)),
        };

        if role.is_mask() {
            let initials = normalize_initials(reader_initials);
            if !initials.is_empty() {
                name.push('_');
                name.push_str(&sanitize_segment(&initials));
            }
        }

        name.push_str(&self.extension);
        name
    }

    /// Resolves the full output path of `role`: the name placed in the case root.
    pub fn resolve_path(
        &self,
        record: &CaseRecord,
        base_dir: Option<&Path>,
        reader_initials: &str,
        role: &FileRole,
    ) -> PathBuf {
        record
            .root(base_dir)
            .join(self.resolve(record, reader_initials, role))
    }

    /// Checks the policy together with the additional mask names of a batch.
    ///
    /// Every mask role needs its own name segment: two roles sharing one
    /// would be saved to the same file.
    pub fn validate(&self, extra_masks: &[String]) -> Result<(), CaseIterError> {
        let tag = sanitize_segment(&self.mask_tag);
        if tag.is_empty() {
            return Err(CaseIterError::invalid_input("mask tag must not be empty"));
        }

        let ext = self.extension.as_str();
        if ext.len() < 2 || !ext.starts_with('.') || ext.contains(|c| c == '/' || c == '\\') {
            return Err(CaseIterError::invalid_input(format!(
                "extension '{}' must start with '.' and name a file type, e.g. '.nii.gz'",
                ext
            )));
        }

        let mut taken = vec![(tag.to_ascii_lowercase(), format!("mask tag '{}'", self.mask_tag))];
        for name in extra_masks {
            let segment = sanitize_segment(name).to_ascii_lowercase();
            if segment.is_empty() {
                return Err(CaseIterError::invalid_input("additional mask names must not be empty"));
            }
            if let Some((_, owner)) = taken.iter().find(|(s, _)| *s == segment) {
                return Err(CaseIterError::invalid_input(format!(
                    "additional mask '{}' would be saved under the same name as {}",
                    name, owner
                )));
            }
            taken.push((segment, format!("additional mask '{}'", name)));
        }
        Ok(())
    }

    /// Returns the mask name segment if `file_name` is a mask output written
    /// for `reader_initials` in this case, i.e. `<base>_<segment>_<READER><ext>`.
    ///
    /// Blank initials never match; without the reader suffix an output looks
    /// like any other volume in the folder.
    pub fn reader_output_segment(
        &self,
        record: &CaseRecord,
        reader_initials: &str,
        file_name: &str,
    ) -> Option<String> {
        let initials = sanitize_segment(&normalize_initials(reader_initials));
        if initials.is_empty() {
            return None;
        }

        let prefix = format!("{}_", base_name(record));
        let suffix = format!("_{}", initials);
        let segment = file_name
            .strip_suffix(self.extension.as_str())?
            .strip_prefix(prefix.as_str())?
            .strip_suffix(suffix.as_str())?;

        if segment.is_empty() || sanitize_segment(segment) != segment {
            None
        } else {
            Some(segment.to_string())
        }
    }

    /// Returns true if `file_name` looks like a mask written under this convention.
    ///
    /// `extra_masks` are the additional mask names in use for the batch.
    pub fn is_mask_file(&self, file_name: &str, extra_masks: &[String]) -> bool {
        let stem = strip_volume_extension(file_name).to_ascii_lowercase();
        std::iter::once(self.mask_tag.as_str())
            .chain(extra_masks.iter().map(String::as_str))
            .map(|tag| format!("_{}", sanitize_segment(tag).to_ascii_lowercase()))
            .any(|tag| stem.ends_with(&tag) || stem.contains(&format!("{}_", tag)))
    }
}

/// Returns true if `file_name` has one of the [`VOLUME_EXTENSIONS`].
pub fn is_volume_file(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    VOLUME_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Strips a (possibly compound) volume extension from a file name.
pub fn strip_volume_extension(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    for ext in VOLUME_EXTENSIONS {
        if lower.ends_with(ext) && lower.len() > ext.len() {
            return &file_name[..file_name.len() - ext.len()];
        }
    }
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => &file_name[..pos],
        _ => file_name,
    }
}

fn base_name(record: &CaseRecord) -> String {
    if let Some(image) = record.overrides.image.as_deref() {
        let file_name = Path::new(image)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(image);
        let stem = strip_volume_extension(file_name);
        if !stem.is_empty() {
            return stem.to_string();
        }
    }

    let folder = Path::new(&record.path)
        .components()
        .rev()
        .find_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        });

    match folder {
        Some(name) => name.to_string(),
        None => format!("case{}", record.number()),
    }
}

// Keeps names within one path segment.
fn sanitize_segment(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
