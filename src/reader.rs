//! Per-batch reader settings.
//!
//! A [`ReaderContext`] identifies the annotator and gates which masks are
//! persisted when a case is closed. It lives for one batch run and is passed
//! to the controller explicitly when the batch starts.

use serde::{Deserialize, Serialize};

use crate::error::CaseIterError;

/// Reader identity and persistence flags for one batch run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderContext {
    /// Initials appended to every saved file name.
    pub reader_initials: String,
    /// Persist masks that already existed in the case folder.
    pub save_loaded_masks: bool,
    /// Persist masks created during the session.
    pub save_new_masks: bool,
    /// Display hint for front-ends: switch to the segmentation editor after loading.
    pub go_to_editor: bool,
}

impl ReaderContext {
    /// Creates a context for the given reader with saving disabled.
    pub fn new(initials: impl AsRef<str>) -> Self {
        Self {
            reader_initials: normalize_initials(initials.as_ref()),
            ..Default::default()
        }
    }

    /// Sets both persistence flags.
    pub fn with_save_flags(mut self, save_loaded_masks: bool, save_new_masks: bool) -> Self {
        self.save_loaded_masks = save_loaded_masks;
        self.save_new_masks = save_new_masks;
        self
    }

    /// Sets the editor display hint.
    pub fn with_go_to_editor(mut self, go_to_editor: bool) -> Self {
        self.go_to_editor = go_to_editor;
        self
    }

    /// The normalised reader initials (may be empty).
    pub fn initials(&self) -> &str {
        &self.reader_initials
    }

    /// Returns true if closing a case can write anything at all.
    pub fn saves_anything(&self) -> bool {
        self.save_loaded_masks || self.save_new_masks
    }

    /// Checks the context before it is used for a batch run.
    ///
    /// Initials may only be blank while both save flags are off. Non-blank
    /// initials must be usable as a file name segment.
    pub fn validate(&self) -> Result<(), CaseIterError> {
        let initials = self.reader_initials.trim();
        if initials.is_empty() {
            if self.saves_anything() {
                return Err(CaseIterError::InvalidReader {
                    initials: self.reader_initials.clone(),
                    message: "reader initials are required when saving is enabled".to_string(),
                });
            }
            return Ok(());
        }

        if let Some(bad) = initials
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(CaseIterError::InvalidReader {
                initials: self.reader_initials.clone(),
                message: format!(
                    "character '{}' is not allowed (use letters, digits or '-')",
                    bad
                ),
            });
        }

        Ok(())
    }

    /// Normalises the stored initials in place.
    pub(crate) fn normalize(&mut self) {
        self.reader_initials = normalize_initials(&self.reader_initials);
    }
}

/// Trims and upper-cases reader initials so that "ab" and "AB" are the same reader.
pub fn normalize_initials(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_initials_allowed_without_saving() {
        let ctx = ReaderContext::new("  ");
        assert!(ctx.validate().is_ok());
        assert_eq!(ctx.initials(), "");
    }

    #[test]
    fn test_blank_initials_rejected_when_saving() {
        let ctx = ReaderContext::new("").with_save_flags(false, true);
        let err = ctx.validate().unwrap_err();
        assert!(matches!(err, CaseIterError::InvalidReader { .. }));
    }

    #[test]
    fn test_initials_are_normalised() {
        let ctx = ReaderContext::new(" jd ");
        assert_eq!(ctx.initials(), "JD");
    }

    #[test]
    fn test_path_separator_rejected() {
        let ctx = ReaderContext::new("a/b");
        assert!(ctx.validate().is_err());

        let ctx = ReaderContext::new("a_b");
        assert!(ctx.validate().is_err());

        let ctx = ReaderContext::new("jd-2");
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_deserialize_normalize() {
        let mut ctx: ReaderContext =
            serde_yaml::from_str("reader_initials: ab\nsave_new_masks: true\n").unwrap();
        ctx.normalize();
        assert_eq!(ctx.initials(), "AB");
        assert!(ctx.saves_anything());
        assert!(!ctx.save_loaded_masks);
    }
}
