//! Line-oriented command surface.
//!
//! Each line is one command and maps onto one controller call. A command
//! runs to completion before the next line is read.
//!
//! | Command | Effect |
//! |---|---|
//! | `next`, `n` | save and close the case, open the next one |
//! | `previous`, `prev`, `p` | save and close the case, open the previous one |
//! | `reset` | discard the case without saving and stop the batch |
//! | `start [N]` | start again (at case `N`) after a reset or the end |
//! | `edit <role>` | record that `<role>` was edited |
//! | `attach <role> <file>` | use `<file>` as the content of `<role>` and mark it edited |
//! | `new-mask <name>` | add an empty mask to the case |
//! | `reader <INITIALS>` | change the reader for later saves |
//! | `save-loaded on\|off`, `save-new on\|off` | toggle persistence |
//! | `status`, `help`, `quit` | |
//!
//! End of input behaves like `reset`: nothing is saved.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;

use crate::controller::{BatchController, ControllerState, Navigation, ReportSink};
use crate::error::CaseIterError;
use crate::io::FsCaseIo;
use crate::naming::FileRole;
use crate::reader::ReaderContext;
use crate::session::Provenance;
use crate::table::BatchTable;

/// A parsed shell command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    Reset,
    Start(Option<usize>),
    Edit(FileRole),
    Attach(FileRole, PathBuf),
    NewMask(String),
    Reader(String),
    SaveLoaded(bool),
    SaveNew(bool),
    Status,
    Help,
    Quit,
}

/// Whether the shell keeps reading after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

impl FromStr for Command {
    type Err = CaseIterError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let rest: Vec<&str> = words.collect();

        let arg = |what: &str| -> Result<&str, CaseIterError> {
            rest.first().copied().ok_or_else(|| {
                CaseIterError::invalid_input(format!("'{}' needs {}", verb, what))
            })
        };

        let command = match verb.as_str() {
            "next" | "n" => Command::Next,
            "previous" | "prev" | "p" => Command::Previous,
            "reset" => Command::Reset,
            "start" => match rest.first() {
                Some(n) => Command::Start(Some(n.parse().map_err(|_| {
                    CaseIterError::invalid_input(format!("'{}' is not a case number", n))
                })?)),
                None => Command::Start(None),
            },
            "edit" => Command::Edit(arg("a role")?.parse()?),
            "attach" => {
                let role = arg("a role and a file")?.parse()?;
                let file = rest.get(1..).filter(|r| !r.is_empty()).ok_or_else(|| {
                    CaseIterError::invalid_input("'attach' needs a file after the role")
                })?;
                Command::Attach(role, PathBuf::from(file.join(" ")))
            }
            "new-mask" => Command::NewMask(arg("a mask name")?.to_string()),
            "reader" => Command::Reader(arg("reader initials")?.to_string()),
            "save-loaded" => Command::SaveLoaded(parse_switch(arg("on or off")?)?),
            "save-new" => Command::SaveNew(parse_switch(arg("on or off")?)?),
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => return Err(CaseIterError::UnknownCommand(line.trim().to_string())),
        };
        Ok(command)
    }
}

fn parse_switch(word: &str) -> Result<bool, CaseIterError> {
    match word.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(CaseIterError::invalid_input(format!(
            "expected on or off, got '{}'",
            other
        ))),
    }
}

/// Parses one input line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>, CaseIterError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    line.parse().map(Some)
}

/// Interactive driver around a filesystem-backed controller.
pub struct Shell<'t, S: ReportSink> {
    controller: BatchController<FsCaseIo, S>,
    table: &'t BatchTable,
    reader: ReaderContext,
    start: usize,
}

impl<'t, S: ReportSink> Shell<'t, S> {
    pub fn new(
        controller: BatchController<FsCaseIo, S>,
        table: &'t BatchTable,
        reader: ReaderContext,
        start: usize,
    ) -> Self {
        Self {
            controller,
            table,
            reader,
            start,
        }
    }

    pub fn controller(&self) -> &BatchController<FsCaseIo, S> {
        &self.controller
    }

    /// Reads and executes commands until `quit` or end of input.
    ///
    /// Command errors are printed and do not stop the shell; only failures
    /// to read input or write output do.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<(), CaseIterError> {
        for line in input.lines() {
            let line = line?;
            let flow = match parse_line(&line).and_then(|cmd| match cmd {
                Some(cmd) => self.execute(cmd, out),
                None => Ok(Flow::Continue),
            }) {
                Ok(flow) => flow,
                Err(CaseIterError::Io(e)) => return Err(CaseIterError::Io(e)),
                Err(e) => {
                    writeln!(out, "error: {}", e)?;
                    Flow::Continue
                }
            };
            if flow == Flow::Quit {
                break;
            }
        }

        if self.controller.state() == ControllerState::Running {
            self.controller.reset();
        }
        Ok(())
    }

    /// Executes one command.
    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Flow, CaseIterError> {
        match command {
            Command::Next => {
                let nav = self.controller.next()?;
                self.describe(nav, out)?;
            }
            Command::Previous => {
                let nav = self.controller.previous()?;
                self.describe(nav, out)?;
            }
            Command::Reset => {
                self.controller.reset();
                writeln!(out, "batch reset, nothing saved")?;
            }
            Command::Start(at) => {
                if let Some(at) = at {
                    self.start = at;
                }
                let nav = self
                    .controller
                    .start(self.table, self.start, self.reader.clone())?;
                self.describe(nav, out)?;
            }
            Command::Edit(role) => {
                self.controller.mark_modified(&role)?;
                writeln!(out, "{} marked as edited", role)?;
            }
            Command::Attach(role, file) => {
                let handle = self
                    .controller
                    .session()
                    .ok_or(CaseIterError::NotRunning)?
                    .file(&role)
                    .ok_or_else(|| CaseIterError::UnknownRole { role: role.clone() })?
                    .handle;
                self.controller
                    .io_mut()
                    .attach(handle, &file)
                    .map_err(|e| {
                        CaseIterError::invalid_input(format!(
                            "cannot attach {}: {}",
                            file.display(),
                            e
                        ))
                    })?;
                self.controller.mark_modified(&role)?;
                writeln!(out, "{} now backed by {}", role, file.display())?;
            }
            Command::NewMask(name) => {
                let role = self.controller.create_mask(&name)?;
                writeln!(out, "created {}", role)?;
            }
            Command::Reader(initials) => {
                let mut reader = self.reader.clone();
                reader.reader_initials = initials;
                self.update_reader(reader)?;
                writeln!(out, "reader is now '{}'", self.reader.initials())?;
            }
            Command::SaveLoaded(on) => {
                let reader = self.reader.clone().with_save_flags(on, self.reader.save_new_masks);
                self.update_reader(reader)?;
                writeln!(out, "save loaded masks: {}", on)?;
            }
            Command::SaveNew(on) => {
                let reader = self
                    .reader
                    .clone()
                    .with_save_flags(self.reader.save_loaded_masks, on);
                self.update_reader(reader)?;
                writeln!(out, "save new masks: {}", on)?;
            }
            Command::Status => self.status(out)?,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn update_reader(&mut self, mut reader: ReaderContext) -> Result<(), CaseIterError> {
        reader.normalize();
        if self.controller.state() == ControllerState::Running {
            self.controller.set_reader(reader.clone())?;
        } else {
            reader.validate()?;
        }
        self.reader = reader;
        Ok(())
    }

    fn describe<W: Write>(&self, nav: Navigation, out: &mut W) -> Result<(), CaseIterError> {
        match nav {
            Navigation::Loaded { index } => {
                let record = &self.controller.cases()[index];
                writeln!(
                    out,
                    "case {}/{}: {}",
                    record.number(),
                    self.controller.case_count(),
                    record.display_label()
                )?;
            }
            Navigation::Finished => writeln!(out, "batch finished")?,
            Navigation::AtFirstCase => writeln!(out, "already at the first case")?,
            Navigation::NothingBefore => writeln!(out, "no earlier case can be loaded")?,
        }
        Ok(())
    }

    fn status<W: Write>(&self, out: &mut W) -> Result<(), CaseIterError> {
        let cursor = self.controller.cursor();
        writeln!(
            out,
            "state: {:?}, reader: '{}', save loaded: {}, save new: {}",
            self.controller.state(),
            self.reader.initials(),
            self.reader.save_loaded_masks,
            self.reader.save_new_masks
        )?;

        let Some(session) = self.controller.session() else {
            return Ok(());
        };
        writeln!(
            out,
            "case {}/{}: {}",
            cursor.index + 1,
            self.controller.case_count(),
            session.record().display_label()
        )?;
        for (role, file) in session.files() {
            let origin = match (&file.source, file.provenance) {
                (Some(path), _) => path.display().to_string(),
                (None, Provenance::NewlyCreated) => "(new)".to_string(),
                (None, Provenance::PreExisting) => "(unknown)".to_string(),
            };
            let flag = if file.modified { " *" } else { "" };
            writeln!(out, "  {:<12} {}{}", role.to_string(), origin, flag)?;
        }
        Ok(())
    }
}

const HELP: &str = "commands:
  next | n                  save and close this case, open the next one
  previous | prev | p       save and close this case, open the previous one
  reset                     discard this case without saving and stop
  start [N]                 start again, optionally at case N
  edit <role>               mark a role as edited (image, mask, mask:<name>)
  attach <role> <file>      use <file> as the content of <role>
  new-mask <name>           add an empty mask to this case
  reader <INITIALS>         change the reader for later saves
  save-loaded on|off        persist masks that existed before
  save-new on|off           persist masks created in this case
  status                    show the current case
  quit                      stop without saving";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{BatchEvent, BatchSettings, RecordingSink};
    use std::fs;

    #[test]
    fn test_parse_navigation() {
        assert_eq!(parse_line("next").unwrap(), Some(Command::Next));
        assert_eq!(parse_line("  P ").unwrap(), Some(Command::Previous));
        assert_eq!(parse_line("start 3").unwrap(), Some(Command::Start(Some(3))));
        assert_eq!(parse_line("start").unwrap(), Some(Command::Start(None)));
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("# comment").unwrap(), None);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            parse_line("edit mask:liver").unwrap(),
            Some(Command::Edit(FileRole::ExtraMask("liver".to_string())))
        );
        assert_eq!(
            parse_line("attach mask /tmp/my file.nii.gz").unwrap(),
            Some(Command::Attach(
                FileRole::Mask,
                PathBuf::from("/tmp/my file.nii.gz")
            ))
        );
        assert_eq!(
            parse_line("save-new on").unwrap(),
            Some(Command::SaveNew(true))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_line("jump"),
            Err(CaseIterError::UnknownCommand(_))
        ));
        assert!(parse_line("attach mask").is_err());
        assert!(parse_line("edit").is_err());
        assert!(parse_line("start two").is_err());
        assert!(parse_line("save-loaded maybe").is_err());
    }

    #[test]
    fn test_reader_commands_report_one_change_each() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("a")).unwrap();
        fs::write(tmp.path().join("a").join("ct.nii.gz"), b"ct").unwrap();
        let table = BatchTable::from_csv_str("path\na\n")
            .unwrap()
            .with_base_dir(tmp.path());
        let controller =
            BatchController::new(FsCaseIo::new(), RecordingSink::new(), BatchSettings::default());
        let mut shell = Shell::new(controller, &table, ReaderContext::new("ab"), 1);
        let mut out = Vec::new();
        shell.execute(Command::Start(None), &mut out).unwrap();

        shell.execute(Command::SaveNew(true), &mut out).unwrap();
        shell
            .execute(Command::Reader(String::new()), &mut out)
            .unwrap_err();

        let changes = shell
            .controller()
            .sink()
            .count(|e| matches!(e, BatchEvent::ReaderChanged { .. }));
        assert_eq!(changes, 1);
        let reader = shell.controller().reader();
        assert_eq!(reader.initials(), "AB");
        assert!(reader.save_new_masks);
    }
}
