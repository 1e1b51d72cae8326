//! The batch controller: navigation across cases.
//!
//! ```text
//!            start                next (last case)
//!   Idle ───────────▶ Running ─────────────────▶ Finished
//!    ▲                 │  ▲ next / previous          │
//!    │     reset       │  └──────────┘               │ start
//!    └─────────────────┘◀────────────────────────────┘
//! ```
//!
//! Exactly one [`CaseSession`] exists while running and none otherwise.
//! Leaving a case runs its save step once, then releases every handle.
//! [`BatchController::reset`] is the only cancellation and never saves.
//!
//! Cases that cannot be opened (missing folder or image) are reported and
//! skipped in the direction of travel. A failed save aborts navigation and
//! keeps the session open so no annotation work is lost.

mod report;

pub use report::{
    BatchEvent, JsonLinesSink, NoopSink, RecordingSink, ReportSink, Severity, TracingSink,
};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CaseIterError;
use crate::io::CaseIo;
use crate::layout::{plan_case, CasePlan};
use crate::naming::{FileRole, NamingPolicy};
use crate::reader::ReaderContext;
use crate::session::{CaseSession, LoadedFile};
use crate::table::{BatchTable, CaseRecord, ColumnMapping};

/// Batch-independent controller settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    pub columns: ColumnMapping,
    pub naming: NamingPolicy,
}

/// Coarse controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Running,
    Finished,
}

/// How the cursor got where it is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorState {
    NotStarted,
    Active,
    Finished,
    Reset,
}

/// Current row position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NavigationCursor {
    /// Zero-based row of the open (or last open) case.
    pub index: usize,
    pub state: CursorState,
}

/// Outcome of a navigation command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Navigation {
    /// A case is open at this zero-based index.
    Loaded { index: usize },
    /// The batch ran out of cases; nothing is open.
    Finished,
    /// `previous` on the first case. Nothing changed.
    AtFirstCase,
    /// `previous` found no loadable case before the current one. Nothing changed.
    NothingBefore,
}

/// Drives a reader through the cases of a batch table.
pub struct BatchController<I: CaseIo, S: ReportSink> {
    io: I,
    sink: S,
    settings: BatchSettings,
    cases: Vec<CaseRecord>,
    base_dir: Option<PathBuf>,
    reader: ReaderContext,
    state: ControllerState,
    cursor: NavigationCursor,
    session: Option<CaseSession<I::Handle>>,
}

impl<I: CaseIo, S: ReportSink> BatchController<I, S> {
    pub fn new(io: I, sink: S, settings: BatchSettings) -> Self {
        Self {
            io,
            sink,
            settings,
            cases: Vec::new(),
            base_dir: None,
            reader: ReaderContext::default(),
            state: ControllerState::Idle,
            cursor: NavigationCursor {
                index: 0,
                state: CursorState::NotStarted,
            },
            session: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn cursor(&self) -> NavigationCursor {
        self.cursor
    }

    pub fn session(&self) -> Option<&CaseSession<I::Handle>> {
        self.session.as_ref()
    }

    pub fn reader(&self) -> &ReaderContext {
        &self.reader
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn cases(&self) -> &[CaseRecord] {
        &self.cases
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    pub fn io(&self) -> &I {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut I {
        &mut self.io
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Starts a batch at the one-based `start_index`.
    ///
    /// # Errors
    /// Returns [`CaseIterError::InvalidInput`] for an empty table, missing
    /// columns, an out-of-range start or a naming policy under which two
    /// masks would share a file, [`CaseIterError::InvalidReader`] for
    /// unusable reader settings, and rejects starting while a batch is
    /// running. On error the controller is left as it was.
    pub fn start(
        &mut self,
        table: &BatchTable,
        start_index: usize,
        mut reader: ReaderContext,
    ) -> Result<Navigation, CaseIterError> {
        if self.state == ControllerState::Running {
            return Err(CaseIterError::invalid_input(
                "a batch is already running, reset it first",
            ));
        }

        reader.normalize();
        reader.validate()?;
        self.settings
            .naming
            .validate(&self.settings.columns.extra_masks)?;

        let cases = table.resolve(&self.settings.columns)?;
        if start_index == 0 || start_index > cases.len() {
            return Err(CaseIterError::invalid_input(format!(
                "start case {} is out of range (table has {} case(s))",
                start_index,
                cases.len()
            )));
        }

        self.cases = cases;
        self.base_dir = table.base_dir().map(|p| p.to_path_buf());
        self.reader = reader;
        self.sink.report(BatchEvent::BatchStarted {
            case_count: self.cases.len(),
            start: start_index,
        });

        Ok(match self.open_first(start_index - 1..self.cases.len()) {
            Some(index) => Navigation::Loaded { index },
            None => self.finish(),
        })
    }

    /// Saves and closes the current case, then opens the next one.
    pub fn next(&mut self) -> Result<Navigation, CaseIterError> {
        let current = self.running_index()?;
        self.close_current()?;

        if current + 1 >= self.cases.len() {
            return Ok(self.finish());
        }
        Ok(match self.open_first(current + 1..self.cases.len()) {
            Some(index) => Navigation::Loaded { index },
            None => self.finish(),
        })
    }

    /// Saves and closes the current case, then opens the previous one.
    ///
    /// A no-op on the first case, or when every earlier case is unloadable.
    pub fn previous(&mut self) -> Result<Navigation, CaseIterError> {
        let current = self.running_index()?;
        if current == 0 {
            self.sink.report(BatchEvent::FirstCaseSelected);
            return Ok(Navigation::AtFirstCase);
        }

        let target = (0..current).rev().find(|&index| match self.plan(index) {
            Ok(_) => true,
            Err(e) => {
                self.report_skipped(index, &e);
                false
            }
        });

        let Some(target) = target else {
            self.sink.report(BatchEvent::NoPreviousCase);
            return Ok(Navigation::NothingBefore);
        };

        self.close_current()?;
        // Files can vanish between planning and loading; fall forward if so.
        let len = self.cases.len();
        let opened = self
            .open_first((0..=target).rev())
            .or_else(|| self.open_first(target + 1..len));
        Ok(match opened {
            Some(index) => Navigation::Loaded { index },
            None => self.finish(),
        })
    }

    /// Discards the current case without saving and returns to idle.
    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            let roles = session.unsaved_edits(&ReaderContext::default());
            if !roles.is_empty() {
                self.sink.report(BatchEvent::EditsDiscarded {
                    number: session.record().number(),
                    roles,
                });
            }
            self.release(session);
        }

        self.cases.clear();
        self.base_dir = None;
        self.reader = ReaderContext::default();
        self.state = ControllerState::Idle;
        self.cursor = NavigationCursor {
            index: 0,
            state: CursorState::Reset,
        };
        self.sink.report(BatchEvent::BatchReset);
    }

    /// Records an edit of `role` in the open case.
    pub fn mark_modified(&mut self, role: &FileRole) -> Result<(), CaseIterError> {
        self.session
            .as_mut()
            .ok_or(CaseIterError::NotRunning)?
            .mark_modified(role)
    }

    /// Adds an empty annotator-created mask named `name` to the open case.
    ///
    /// # Errors
    /// Returns [`CaseIterError::InvalidInput`] if the case already has a mask
    /// that would be saved under the same file name.
    pub fn create_mask(&mut self, name: &str) -> Result<FileRole, CaseIterError> {
        let name = name.trim();
        let session = self.session.as_mut().ok_or(CaseIterError::NotRunning)?;
        let role = if name.is_empty() {
            FileRole::Mask
        } else {
            FileRole::ExtraMask(name.to_string())
        };
        if session.contains(&role) {
            return Err(CaseIterError::invalid_input(format!(
                "{} already exists in this case",
                role
            )));
        }

        let naming = &self.settings.naming;
        let initials = self.reader.initials();
        let file_name = naming.resolve(session.record(), initials, &role);
        let clash = session
            .masks()
            .map(|(existing, _)| existing)
            .find(|existing| {
                naming
                    .resolve(session.record(), initials, existing)
                    .eq_ignore_ascii_case(&file_name)
            });
        if let Some(existing) = clash {
            return Err(CaseIterError::invalid_input(format!(
                "{} would be saved as {}, the same file as {}",
                role, file_name, existing
            )));
        }

        let path = naming.resolve_path(session.record(), self.base_dir.as_deref(), initials, &role);
        let handle = self
            .io
            .create(&role)
            .map_err(|source| CaseIterError::Load {
                path: path.clone(),
                role: role.clone(),
                source,
            })?;
        session.insert(role.clone(), LoadedFile::newly_created(handle));
        self.sink.report(BatchEvent::PlaceholderCreated {
            role: role.clone(),
            path,
        });
        Ok(role)
    }

    /// Replaces the reader identity and save flags in one step.
    ///
    /// The new context is validated first; on error nothing changes and no
    /// event is reported.
    pub fn set_reader(&mut self, reader: ReaderContext) -> Result<(), CaseIterError> {
        self.update_reader(reader)
    }

    /// Changes the reader for subsequent saves. Files already written keep their names.
    pub fn set_reader_initials(&mut self, initials: &str) -> Result<(), CaseIterError> {
        let mut reader = self.reader.clone();
        reader.reader_initials = initials.to_string();
        self.update_reader(reader)
    }

    /// Changes which masks are persisted from now on.
    pub fn set_save_flags(
        &mut self,
        save_loaded_masks: bool,
        save_new_masks: bool,
    ) -> Result<(), CaseIterError> {
        let reader = self
            .reader
            .clone()
            .with_save_flags(save_loaded_masks, save_new_masks);
        self.update_reader(reader)
    }

    fn update_reader(&mut self, mut reader: ReaderContext) -> Result<(), CaseIterError> {
        reader.normalize();
        reader.validate()?;
        self.sink.report(BatchEvent::ReaderChanged {
            initials: reader.reader_initials.clone(),
            save_loaded_masks: reader.save_loaded_masks,
            save_new_masks: reader.save_new_masks,
        });
        self.reader = reader;
        Ok(())
    }

    fn running_index(&self) -> Result<usize, CaseIterError> {
        match (&self.state, &self.session) {
            (ControllerState::Running, Some(session)) => Ok(session.index()),
            _ => Err(CaseIterError::NotRunning),
        }
    }

    fn plan(&self, index: usize) -> Result<CasePlan, CaseIterError> {
        plan_case(
            &self.cases[index],
            self.base_dir.as_deref(),
            &self.settings.columns,
            &self.settings.naming,
            self.reader.initials(),
        )
    }

    fn report_skipped(&mut self, index: usize, error: &CaseIterError) {
        let record = &self.cases[index];
        self.sink.report(BatchEvent::CaseSkipped {
            number: record.number(),
            label: record.label.clone(),
            reason: error.to_string(),
        });
    }

    /// Opens the first loadable case among `candidates`, reporting the rest.
    fn open_first(&mut self, candidates: impl IntoIterator<Item = usize>) -> Option<usize> {
        for candidate in candidates {
            match self.open_case(candidate) {
                Ok(()) => return Some(candidate),
                Err(e) => self.report_skipped(candidate, &e),
            }
        }
        None
    }

    fn open_case(&mut self, index: usize) -> Result<(), CaseIterError> {
        let record = self.cases[index].clone();
        self.sink.report(BatchEvent::CaseLoading {
            number: record.number(),
            total: self.cases.len(),
            label: record.label.clone(),
        });

        let plan = self.plan(index)?;
        let mut session = CaseSession::new(record, plan.root);

        for planned in plan.files {
            let role = planned.role;
            let path = planned.path;
            match self.io.load(&path, &role) {
                Ok(Some(handle)) => {
                    session.insert(role.clone(), LoadedFile::pre_existing(handle, &path));
                    self.sink.report(BatchEvent::FileLoaded { role, path });
                }
                Ok(None) if role.is_mask() => match self.io.create(&role) {
                    Ok(handle) => {
                        session.insert(role.clone(), LoadedFile::newly_created(handle));
                        self.sink
                            .report(BatchEvent::PlaceholderCreated { role, path });
                    }
                    Err(source) => {
                        self.release(session);
                        return Err(CaseIterError::Load { path, role, source });
                    }
                },
                Ok(None) if role.is_required() => {
                    self.release(session);
                    return Err(CaseIterError::MissingData {
                        case: self.cases[index].display_label(),
                        message: format!("{} file {} does not exist", role, path.display()),
                    });
                }
                Ok(None) => self.sink.report(BatchEvent::FileMissing { role, path }),
                Err(source) => {
                    // An unreadable mask gets no placeholder: saving one would replace it.
                    self.sink.report(BatchEvent::FileLoadFailed {
                        role: role.clone(),
                        path: path.clone(),
                        error: source.to_string(),
                    });
                    if role.is_required() {
                        self.release(session);
                        return Err(CaseIterError::Load { path, role, source });
                    }
                }
            }
        }

        let file_count = session.files().count();
        self.session = Some(session);
        self.state = ControllerState::Running;
        self.cursor = NavigationCursor {
            index,
            state: CursorState::Active,
        };
        self.sink.report(BatchEvent::CaseLoaded {
            number: index + 1,
            file_count,
            open_editor: self.reader.go_to_editor,
        });
        Ok(())
    }

    /// Runs the save step for the open case and, if every write succeeded,
    /// releases it.
    fn close_current(&mut self) -> Result<(), CaseIterError> {
        let Self {
            io,
            sink,
            settings,
            base_dir,
            reader,
            session,
            ..
        } = self;
        let Some(open) = session.as_mut() else {
            return Ok(());
        };

        let number = open.record().number();
        sink.report(BatchEvent::CaseClosing {
            number,
            label: open.record().label.clone(),
        });

        let discarded = open.unsaved_edits(reader);
        if !discarded.is_empty() {
            sink.report(BatchEvent::EditsDiscarded {
                number,
                roles: discarded,
            });
        }

        let mut first_error = None;
        for role in open.pending_saves(reader) {
            let target = settings.naming.resolve_path(
                open.record(),
                base_dir.as_deref(),
                reader.initials(),
                &role,
            );
            let Some(file) = open.file(&role) else {
                continue;
            };

            match io.save(&file.handle, &target) {
                Ok(()) => {
                    open.mark_persisted(&role);
                    sink.report(BatchEvent::FileSaved { role, path: target });
                }
                Err(source) => {
                    sink.report(BatchEvent::SaveFailed {
                        role: role.clone(),
                        path: target.clone(),
                        error: source.to_string(),
                    });
                    if first_error.is_none() {
                        first_error = Some(CaseIterError::Save {
                            path: target,
                            role,
                            source,
                        });
                    }
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        if let Some(closed) = session.take() {
            for handle in closed.into_handles() {
                io.release(handle);
            }
            debug!(case = number, "case closed");
        }
        Ok(())
    }

    fn release(&mut self, session: CaseSession<I::Handle>) {
        for handle in session.into_handles() {
            self.io.release(handle);
        }
    }

    fn finish(&mut self) -> Navigation {
        if let Some(session) = self.session.take() {
            self.release(session);
        }
        self.state = ControllerState::Finished;
        self.cursor.state = CursorState::Finished;
        self.sink.report(BatchEvent::BatchFinished {
            case_count: self.cases.len(),
        });
        Navigation::Finished
    }
}
