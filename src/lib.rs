//! Caseiter: batch case iteration for volume annotation.
//!
//! Caseiter walks an annotator through a table of case folders, one case at
//! a time. For each case it loads the image and any prior mask, tracks what
//! was created and edited, and on leaving the case writes masks under a
//! deterministic, reader-attributed name.
//!
//! # Modules
//!
//! - [`table`]: Batch table loading and column resolution
//! - [`naming`]: File roles and the output naming convention
//! - [`layout`]: Which file in a case folder plays which role
//! - [`io`]: The host IO boundary and a filesystem implementation
//! - [`session`]: The state of the open case
//! - [`controller`]: The navigation state machine and its events
//! - [`reader`]: Reader identity and persistence flags
//! - [`shell`]: Line-oriented command surface
//! - [`error`]: Error types for caseiter operations

pub mod config;
pub mod controller;
pub mod error;
pub mod io;
pub mod layout;
pub mod logging;
pub mod naming;
pub mod reader;
pub mod session;
pub mod shell;
pub mod table;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub use controller::{BatchController, BatchEvent, BatchSettings, Navigation, ReportSink};
pub use error::CaseIterError;
pub use naming::{FileRole, NamingPolicy};
pub use reader::ReaderContext;
pub use table::{BatchTable, CaseRecord, ColumnMapping};

use config::Settings;
use controller::{JsonLinesSink, TracingSink};
use logging::LogFormat;
use shell::{Command, Shell};

/// The caseiter CLI application.
#[derive(Parser)]
#[command(name = "caseiter")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Iterate over the cases of a batch table.
    Run(RunArgs),
    /// Check a batch table and show what each case would load.
    Check(CheckArgs),
}

/// Column and naming options shared by the subcommands.
#[derive(clap::Args)]
struct LayoutArgs {
    /// YAML settings file; flags override its values.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Column holding the case folder.
    #[arg(long)]
    path_column: Option<String>,

    /// Column holding the case label (default: 'patient' or 'ID' if present).
    #[arg(long)]
    label_column: Option<String>,

    /// Column naming the image file inside the case folder.
    #[arg(long)]
    image_column: Option<String>,

    /// Column naming an existing mask inside the case folder.
    #[arg(long)]
    mask_column: Option<String>,

    /// Comma separated columns naming additional images.
    #[arg(long, value_delimiter = ',')]
    extra_image_columns: Vec<String>,

    /// Comma separated columns naming additional masks.
    #[arg(long, value_delimiter = ',')]
    extra_mask_columns: Vec<String>,

    /// Name segment identifying main mask outputs.
    #[arg(long)]
    mask_tag: Option<String>,

    /// Extension of written masks, including the leading dot.
    #[arg(long)]
    extension: Option<String>,

    /// Reader initials appended to saved file names.
    #[arg(long, env = "CASEITER_READER")]
    reader: Option<String>,
}

/// Arguments for the run subcommand.
#[derive(clap::Args)]
struct RunArgs {
    /// Batch table (CSV with a header row).
    table: PathBuf,

    /// Case to start at (1-based).
    #[arg(long)]
    start: Option<usize>,

    /// Save masks that already existed in the case folder.
    #[arg(long)]
    save_loaded_masks: bool,

    /// Save masks created while working on a case.
    #[arg(long)]
    save_new_masks: bool,

    /// Ask front-ends to open the segmentation editor after each load.
    #[arg(long)]
    go_to_editor: bool,

    /// Read commands from this file instead of stdin.
    #[arg(long)]
    commands: Option<PathBuf>,

    /// How batch events are reported.
    #[arg(long, value_enum, default_value_t = EventFormat::Text)]
    events: EventFormat,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(flatten)]
    layout: LayoutArgs,
}

/// Arguments for the check subcommand.
#[derive(clap::Args)]
struct CheckArgs {
    /// Batch table (CSV with a header row).
    table: PathBuf,

    #[command(flatten)]
    layout: LayoutArgs,
}

/// Event presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EventFormat {
    /// Log lines on stderr.
    Text,
    /// One JSON object per event on stdout.
    Json,
}

/// Run the caseiter CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), CaseIterError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run(args)) => run_batch(args),
        Some(Commands::Check(args)) => run_check(args),
        None => {
            println!("caseiter {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Batch case iteration for volume annotation.");
            println!();
            println!("Run 'caseiter --help' for usage information.");
            Ok(())
        }
    }
}

/// Loads the settings file (if any) and applies flag overrides.
fn resolve_settings(args: &LayoutArgs) -> Result<Settings, CaseIterError> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    if let Some(path) = &args.path_column {
        settings.columns.path = path.clone();
    }
    if args.label_column.is_some() {
        settings.columns.label = args.label_column.clone();
    }
    if args.image_column.is_some() {
        settings.columns.image = args.image_column.clone();
    }
    if args.mask_column.is_some() {
        settings.columns.mask = args.mask_column.clone();
    }
    if !args.extra_image_columns.is_empty() {
        settings.columns.extra_images = trimmed(&args.extra_image_columns);
    }
    if !args.extra_mask_columns.is_empty() {
        settings.columns.extra_masks = trimmed(&args.extra_mask_columns);
    }
    if let Some(tag) = &args.mask_tag {
        settings.naming.mask_tag = tag.clone();
    }
    if let Some(extension) = &args.extension {
        settings.naming.extension = extension.clone();
    }
    if let Some(reader) = &args.reader {
        settings.reader.reader_initials = reader.clone();
    }

    Ok(settings)
}

fn trimmed(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Execute the run subcommand.
fn run_batch(args: RunArgs) -> Result<(), CaseIterError> {
    logging::init_logging(args.log_format);

    let mut settings = resolve_settings(&args.layout)?;
    settings.reader.save_loaded_masks |= args.save_loaded_masks;
    settings.reader.save_new_masks |= args.save_new_masks;
    settings.reader.go_to_editor |= args.go_to_editor;
    let start = args.start.or(settings.start).unwrap_or(1);

    let table = BatchTable::read(&args.table)?;

    match args.events {
        EventFormat::Text => drive(TracingSink, &table, &settings, start, args.commands),
        EventFormat::Json => drive(
            JsonLinesSink::new(std::io::stdout()),
            &table,
            &settings,
            start,
            args.commands,
        ),
    }
}

fn drive<S: ReportSink>(
    sink: S,
    table: &BatchTable,
    settings: &Settings,
    start: usize,
    commands: Option<PathBuf>,
) -> Result<(), CaseIterError> {
    let controller = BatchController::new(io::FsCaseIo::new(), sink, settings.batch_settings());
    let mut shell = Shell::new(controller, table, settings.reader.clone(), start);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    shell.execute(Command::Start(None), &mut out)?;

    match commands {
        Some(path) => {
            let file = std::fs::File::open(&path)?;
            shell.run(std::io::BufReader::new(file), &mut out)
        }
        None => shell.run(std::io::stdin().lock(), &mut out),
    }
}

/// Execute the check subcommand.
fn run_check(args: CheckArgs) -> Result<(), CaseIterError> {
    let settings = resolve_settings(&args.layout)?;
    let mut reader = settings.reader.clone();
    reader.normalize();
    reader.validate()?;
    settings.naming.validate(&settings.columns.extra_masks)?;

    let table = BatchTable::read(&args.table)?;
    let cases = table.resolve(&settings.columns)?;

    let mut unloadable = 0;
    for case in &cases {
        println!("{:>4}  {}  {}", case.number(), case.display_label(), case.path);
        match layout::plan_case(
            case,
            table.base_dir(),
            &settings.columns,
            &settings.naming,
            reader.initials(),
        ) {
            Ok(plan) => {
                for file in &plan.files {
                    let status = if file.path.is_file() {
                        "found"
                    } else if file.role.is_mask() {
                        "new"
                    } else {
                        "missing"
                    };
                    println!(
                        "        {:<12} {} ({})",
                        file.role.to_string(),
                        file.path.display(),
                        status
                    );
                }
            }
            Err(e) => {
                unloadable += 1;
                println!("        cannot load: {}", e);
            }
        }
    }

    println!();
    println!("{} case(s), {} cannot be loaded", cases.len(), unloadable);

    if unloadable > 0 {
        Err(CaseIterError::invalid_input(format!(
            "{} of {} case(s) cannot be loaded",
            unloadable,
            cases.len()
        )))
    } else {
        Ok(())
    }
}
