//! Batch events and the sinks that render them.
//!
//! The controller never prints. Every load, save, skip and warning becomes a
//! [`BatchEvent`] handed to a [`ReportSink`]; presentation is the sink's job.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::naming::FileRole;

/// How loudly an event should be presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Something the controller did or could not do.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    BatchStarted {
        case_count: usize,
        start: usize,
    },
    CaseLoading {
        number: usize,
        total: usize,
        label: Option<String>,
    },
    FileLoaded {
        role: FileRole,
        path: PathBuf,
    },
    /// A mask with no file yet; an empty one was created.
    PlaceholderCreated {
        role: FileRole,
        path: PathBuf,
    },
    /// An optional file named by the table does not exist.
    FileMissing {
        role: FileRole,
        path: PathBuf,
    },
    FileLoadFailed {
        role: FileRole,
        path: PathBuf,
        error: String,
    },
    CaseLoaded {
        number: usize,
        file_count: usize,
        open_editor: bool,
    },
    CaseSkipped {
        number: usize,
        label: Option<String>,
        reason: String,
    },
    FirstCaseSelected,
    NoPreviousCase,
    CaseClosing {
        number: usize,
        label: Option<String>,
    },
    FileSaved {
        role: FileRole,
        path: PathBuf,
    },
    SaveFailed {
        role: FileRole,
        path: PathBuf,
        error: String,
    },
    EditsDiscarded {
        number: usize,
        roles: Vec<FileRole>,
    },
    ReaderChanged {
        initials: String,
        save_loaded_masks: bool,
        save_new_masks: bool,
    },
    BatchFinished {
        case_count: usize,
    },
    BatchReset,
}

impl BatchEvent {
    pub fn severity(&self) -> Severity {
        match self {
            BatchEvent::FileLoadFailed { .. } | BatchEvent::SaveFailed { .. } => Severity::Error,
            BatchEvent::FileMissing { .. }
            | BatchEvent::CaseSkipped { .. }
            | BatchEvent::FirstCaseSelected
            | BatchEvent::NoPreviousCase
            | BatchEvent::EditsDiscarded { .. } => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

fn label_suffix(label: &Option<String>) -> String {
    match label {
        Some(label) => format!(": {}", label),
        None => String::new(),
    }
}

impl fmt::Display for BatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchEvent::BatchStarted { case_count, start } => {
                write!(f, "Starting batch of {} case(s) at case {}", case_count, start)
            }
            BatchEvent::CaseLoading {
                number,
                total,
                label,
            } => write!(
                f,
                "Loading case ({}/{}){}...",
                number,
                total,
                label_suffix(label)
            ),
            BatchEvent::FileLoaded { role, path } => {
                write!(f, "Loaded {} from {}", role, path.display())
            }
            BatchEvent::PlaceholderCreated { role, path } => write!(
                f,
                "No existing {} at {}, created an empty one",
                role,
                path.display()
            ),
            BatchEvent::FileMissing { role, path } => {
                write!(f, "{} file {} does not exist, skipping", role, path.display())
            }
            BatchEvent::FileLoadFailed { role, path, error } => {
                write!(f, "Failed to load {} from {}: {}", role, path.display(), error)
            }
            BatchEvent::CaseLoaded {
                number, file_count, ..
            } => write!(f, "Case {} ready ({} file(s))", number, file_count),
            BatchEvent::CaseSkipped {
                number,
                label,
                reason,
            } => write!(f, "Skipping case {}{}: {}", number, label_suffix(label), reason),
            BatchEvent::FirstCaseSelected => {
                write!(f, "First case selected, cannot select previous case!")
            }
            BatchEvent::NoPreviousCase => {
                write!(f, "No loadable case before the current one, staying put")
            }
            BatchEvent::CaseClosing { number, label } => {
                write!(f, "Closing case {}{}", number, label_suffix(label))
            }
            BatchEvent::FileSaved { role, path } => {
                write!(f, "Saved {} in {}", role, path.display())
            }
            BatchEvent::SaveFailed { role, path, error } => {
                write!(f, "Failed to save {} to {}: {}", role, path.display(), error)
            }
            BatchEvent::EditsDiscarded { number, roles } => {
                let roles: Vec<String> = roles.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "Discarding unsaved edits in case {} ({})",
                    number,
                    roles.join(", ")
                )
            }
            BatchEvent::ReaderChanged {
                initials,
                save_loaded_masks,
                save_new_masks,
            } => write!(
                f,
                "Reader set to '{}' (save loaded masks: {}, save new masks: {})",
                initials, save_loaded_masks, save_new_masks
            ),
            BatchEvent::BatchFinished { case_count } => {
                write!(f, "All done! Processed {} case(s)", case_count)
            }
            BatchEvent::BatchReset => write!(f, "Batch reset"),
        }
    }
}

/// Receives controller events.
pub trait ReportSink {
    fn report(&mut self, event: BatchEvent);
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopSink;

impl ReportSink for NoopSink {
    fn report(&mut self, _event: BatchEvent) {}
}

/// Keeps every event, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<BatchEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded events matching `pred`.
    pub fn count(&self, pred: impl Fn(&BatchEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(*e)).count()
    }

    /// Paths of all `FileSaved` events.
    pub fn saved_paths(&self) -> Vec<PathBuf> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::FileSaved { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl ReportSink for RecordingSink {
    fn report(&mut self, event: BatchEvent) {
        self.events.push(event);
    }
}

/// Renders events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&mut self, event: BatchEvent) {
        match event.severity() {
            Severity::Info => info!("{}", event),
            Severity::Warning => warn!("{}", event),
            Severity::Error => error!("{}", event),
        }
    }
}

/// Writes each event as one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn report(&mut self, event: BatchEvent) {
        let written = serde_json::to_writer(&mut self.writer, &event)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(self.writer))
            .and_then(|()| self.writer.flush());
        if let Err(e) = written {
            warn!("failed to write event: {}", e);
        }
    }
}
